//! Component D, the Scheduler Facade, plus the shared types B and C both produce.

pub mod fsrs;
pub mod sm2;

use chrono::{DateTime, Utc};

use crate::model::{AlgType, SrPrefs, Technique, TuneId};
use crate::quality::{FirstReviewHint, Quality};
use crate::Error;

/// The prior state a scheduler needs, read off the latest `PracticeRecord` (or defaults, on a
/// tune's first review). Deliberately a superset of what either scheduler alone needs, so the
/// facade can stay ignorant of which one it is calling.
#[derive(Clone, Debug, Default)]
pub struct SchedulerPrior {
    pub easiness: Option<f64>,
    pub interval: Option<i64>,
    pub repetitions: Option<i64>,
    pub stability: Option<f64>,
    pub difficulty: Option<f64>,
    pub step: Option<i64>,
    pub state: Option<u8>,
    pub last_review: Option<DateTime<Utc>>,
}

/// The uniform result both schedulers produce. `easiness`/`step` are populated only by SM-2;
/// `stability`/`difficulty`/`state` only by FSRS; both fill `quality`, `interval`, `repetitions`,
/// `due`.
#[derive(Clone, Debug)]
pub struct ReviewResult {
    pub quality: u8,
    pub easiness: Option<f64>,
    pub difficulty: Option<f64>,
    pub stability: Option<f64>,
    pub interval: i64,
    pub step: Option<i64>,
    pub repetitions: i64,
    pub due: DateTime<Utc>,
    pub state: Option<u8>,
}

/// `SM2` dispatches to the SM-2 scheduler; every other technique dispatches to FSRS.
pub fn effective_alg_type(technique: Technique) -> AlgType {
    if technique.is_sm2_scale() {
        AlgType::SM2
    } else {
        AlgType::FSRS
    }
}

/// Runs the Scheduler Facade: picks B or C by `technique` and returns a uniform `ReviewResult`.
pub fn schedule(
    technique: Technique,
    prior: &SchedulerPrior,
    quality: Quality,
    hint: Option<FirstReviewHint>,
    tune_id: TuneId,
    practiced: DateTime<Utc>,
    sr_prefs: &SrPrefs,
) -> Result<ReviewResult, Error> {
    let alg_type = effective_alg_type(technique);
    log::debug!("dispatching tune {tune_id} (technique={technique}) to {alg_type} scheduler");
    match alg_type {
        AlgType::SM2 => sm2::schedule(prior, quality.value(), practiced),
        AlgType::FSRS => fsrs::schedule(prior, quality, hint, tune_id, practiced, sr_prefs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SrPrefs;
    use crate::quality::Quality;

    #[test]
    fn facade_picks_sm2_for_sm2_technique() {
        let prior = SchedulerPrior::default();
        let sr_prefs = SrPrefs::default_for(AlgType::SM2);
        let result = schedule(
            Technique::Sm2,
            &prior,
            Quality::Sm2(3),
            None,
            1,
            Utc::now(),
            &sr_prefs,
        )
        .unwrap();
        assert_eq!(result.repetitions, 1);
        assert!(result.easiness.is_some());
        assert!(result.stability.is_none());
    }

    #[test]
    fn facade_picks_fsrs_for_everything_else() {
        let prior = SchedulerPrior::default();
        let sr_prefs = SrPrefs::default_for(AlgType::FSRS);
        let result = schedule(
            Technique::MotorSkills,
            &prior,
            Quality::Fsrs(2),
            Some(FirstReviewHint::New),
            1,
            Utc::now(),
            &sr_prefs,
        )
        .unwrap();
        assert!(result.stability.is_some());
        assert!(result.easiness.is_none());
    }
}
