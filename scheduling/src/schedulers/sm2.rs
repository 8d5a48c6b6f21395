//! Component B, the classic SM-2 scheduler.

use chrono::{DateTime, Duration, Utc};

use super::{ReviewResult, SchedulerPrior};
use crate::Error;

/// `quality` is already validated to `0..=5` by the Quality Codec before this is called.
pub fn schedule(
    prior: &SchedulerPrior,
    quality: u8,
    practiced: DateTime<Utc>,
) -> Result<ReviewResult, Error> {
    let easiness = prior.easiness.filter(|e| *e > 0.0).unwrap_or(2.5);
    let repetitions = prior.repetitions.unwrap_or(0);

    let (new_easiness, new_interval, new_repetitions) = if repetitions == 0 {
        // First review: always lands one day out regardless of quality (the second review is
        // where a pass jumps to six days).
        (easiness, 1, 1)
    } else if quality < 3 {
        (easiness.max(1.3), 1, 0)
    } else {
        let f = f64::from(5 - quality);
        let new_easiness = (easiness + 0.1 - f * (0.08 + f * 0.02)).max(1.3);
        let new_interval = if repetitions == 1 {
            6
        } else {
            #[allow(clippy::cast_possible_truncation)]
            let interval = (prior.interval.unwrap_or(1) as f64 * new_easiness).round() as i64;
            interval
        };
        (new_easiness, new_interval, repetitions + 1)
    };

    let due = practiced + Duration::days(new_interval);
    Ok(ReviewResult {
        quality,
        easiness: Some(new_easiness),
        difficulty: None,
        stability: None,
        interval: new_interval,
        step: None,
        repetitions: new_repetitions,
        due,
        state: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn first_review_lands_one_day_out() {
        let prior = SchedulerPrior::default();
        let result = schedule(&prior, 3, at(0)).unwrap();
        assert_eq!(result.interval, 1);
        assert_eq!(result.repetitions, 1);
        assert_eq!(result.due, at(86_400));
    }

    #[test]
    fn second_review_pass_jumps_to_six_days() {
        let prior = SchedulerPrior {
            easiness: Some(2.5),
            interval: Some(1),
            repetitions: Some(1),
            ..Default::default()
        };
        let result = schedule(&prior, 4, at(0)).unwrap();
        assert_eq!(result.interval, 6);
        assert_eq!(result.repetitions, 2);
    }

    #[test]
    fn failing_quality_resets_repetitions_but_preserves_easiness() {
        let prior = SchedulerPrior {
            easiness: Some(2.3),
            interval: Some(15),
            repetitions: Some(3),
            ..Default::default()
        };
        let result = schedule(&prior, 1, at(0)).unwrap();
        assert_eq!(result.repetitions, 0);
        assert_eq!(result.interval, 1);
        assert_eq!(result.easiness, Some(2.3));
    }

    #[test]
    fn easiness_never_drops_below_1_3() {
        let prior = SchedulerPrior {
            easiness: Some(1.3),
            interval: Some(30),
            repetitions: Some(4),
            ..Default::default()
        };
        let result = schedule(&prior, 3, at(0)).unwrap();
        assert!(result.easiness.unwrap() >= 1.3);
    }

    #[test]
    fn missing_easiness_defaults_to_2_5() {
        let prior = SchedulerPrior {
            repetitions: Some(2),
            interval: Some(6),
            ..Default::default()
        };
        let result = schedule(&prior, 4, at(0)).unwrap();
        // (2.5 + 0.1 - 1*(0.08+1*0.02)) = 2.5
        assert!((result.easiness.unwrap() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn scenario_first_review_good() {
        // End-to-end scenario 1: quality=3 ("good"), first review.
        let prior = SchedulerPrior::default();
        let practiced = at(1_735_638_477); // 2024-12-31 11:47:57 UTC
        let result = schedule(&prior, 3, practiced).unwrap();
        assert_eq!(result.quality, 3);
        assert_eq!(result.repetitions, 1);
        assert_eq!(result.interval, 1);
        assert!(result.easiness.unwrap() >= 2.36 && result.easiness.unwrap() <= 2.46);
        assert_eq!(result.due, at(1_735_638_477 + 86_400));
    }
}
