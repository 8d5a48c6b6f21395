//! Component C, the FSRS scheduler. Shells the stability/difficulty update math out to the
//! `rs_fsrs` crate's published implementation; this module owns state/rating translation, the
//! legacy-easiness difficulty fallback, the maximum-interval clamp, and deterministic fuzz.

mod utils;

use chrono::{DateTime, Duration, Utc};
use rs_fsrs::{Card as FsrsCard, Parameters, FSRS};

use self::utils::{
    deterministic_fuzzed_interval, difficulty_from_easiness, number_to_state, state_to_number,
    to_fsrs_rating,
};
use super::{ReviewResult, SchedulerPrior};
use crate::model::{SrPrefs, TuneId};
use crate::quality::{quality_to_fsrs_rating_direct, FirstReviewHint, Quality};
use crate::{Error, LibraryError, SchedulerErrorKind};

const DEFAULT_MAXIMUM_INTERVAL: i64 = 36_500;

fn build_parameters(sr_prefs: &SrPrefs) -> Parameters {
    let mut params = Parameters::default();
    if let Some(weights) = sr_prefs.fsrs_weights {
        params.w = weights;
    }
    if let Some(request_retention) = sr_prefs.request_retention {
        params.request_retention = request_retention;
    }
    #[allow(clippy::cast_possible_truncation)]
    let maximum_interval = sr_prefs.maximum_interval.unwrap_or(DEFAULT_MAXIMUM_INTERVAL) as i32;
    params.maximum_interval = maximum_interval;
    params
}

pub fn schedule(
    prior: &SchedulerPrior,
    quality: Quality,
    hint: Option<FirstReviewHint>,
    tune_id: TuneId,
    practiced: DateTime<Utc>,
    sr_prefs: &SrPrefs,
) -> Result<ReviewResult, Error> {
    let rating = to_fsrs_rating(quality_to_fsrs_rating_direct(quality.value())?);

    let difficulty = match prior.difficulty {
        Some(d) if d > 0.0 => d,
        _ => prior.easiness.map_or(5.0, difficulty_from_easiness),
    };

    let state = match hint {
        Some(FirstReviewHint::New) => rs_fsrs::State::Learning,
        Some(FirstReviewHint::Rescheduled) => rs_fsrs::State::Relearning,
        None => match prior.state {
            Some(n) => number_to_state(n)?,
            None => rs_fsrs::State::New,
        },
    };

    #[allow(clippy::cast_possible_truncation)]
    let card = FsrsCard {
        due: prior.last_review.unwrap_or(practiced),
        stability: prior.stability.unwrap_or(0.0),
        difficulty,
        elapsed_days: 0,
        scheduled_days: prior.interval.unwrap_or(0),
        reps: 0,
        lapses: 0,
        state,
        last_review: prior.last_review.unwrap_or(practiced),
    };

    let fsrs = FSRS::new(build_parameters(sr_prefs));
    let record_log = fsrs.repeat(card, practiced);
    let item = record_log.get(&rating).ok_or_else(|| {
        Error::Library(LibraryError::Scheduler(SchedulerErrorKind::Custom {
            scheduler_name: "fsrs".to_string(),
            error: "rs_fsrs did not return a scheduling entry for the requested rating"
                .to_string(),
        }))
    })?;
    let next_card = &item.card;

    let maximum_interval = sr_prefs.maximum_interval.unwrap_or(DEFAULT_MAXIMUM_INTERVAL);
    let base_interval = i64::from(next_card.scheduled_days).clamp(1, maximum_interval);
    let interval = if sr_prefs.enable_fuzzing {
        deterministic_fuzzed_interval(tune_id, practiced, base_interval, maximum_interval)
    } else {
        base_interval
    };
    let due = practiced + Duration::days(interval);

    Ok(ReviewResult {
        quality: quality.value(),
        easiness: None,
        difficulty: Some(next_card.difficulty),
        stability: Some(next_card.stability),
        interval,
        step: None,
        repetitions: i64::from(next_card.reps),
        due,
        state: Some(state_to_number(next_card.state)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AlgType;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn first_review_new_starts_from_learning() {
        let prior = SchedulerPrior::default();
        let sr_prefs = SrPrefs::default_for(AlgType::FSRS);
        let result = schedule(
            &prior,
            Quality::Fsrs(2),
            Some(FirstReviewHint::New),
            634,
            at(1_735_638_477),
            &sr_prefs,
        )
        .unwrap();
        assert!(result.stability.unwrap() > 0.0);
        assert!(result.interval >= 1);
    }

    #[test]
    fn again_then_good_strictly_advances_due() {
        let sr_prefs = SrPrefs::default_for(AlgType::FSRS);
        let prior = SchedulerPrior::default();
        let first = schedule(
            &prior,
            Quality::Fsrs(0),
            Some(FirstReviewHint::New),
            1,
            at(0),
            &sr_prefs,
        )
        .unwrap();

        let second_prior = SchedulerPrior {
            stability: first.stability,
            difficulty: first.difficulty,
            state: first.state,
            last_review: Some(at(0)),
            ..Default::default()
        };
        let second = schedule(&second_prior, Quality::Fsrs(2), None, 1, at(60), &sr_prefs).unwrap();
        assert!(second.due > first.due);
    }

    #[test]
    fn missing_difficulty_falls_back_to_easiness() {
        let prior = SchedulerPrior {
            easiness: Some(2.5),
            ..Default::default()
        };
        let sr_prefs = SrPrefs::default_for(AlgType::FSRS);
        let result = schedule(&prior, Quality::Fsrs(2), None, 1, at(0), &sr_prefs).unwrap();
        assert!(result.difficulty.unwrap() > 0.0);
    }
}
