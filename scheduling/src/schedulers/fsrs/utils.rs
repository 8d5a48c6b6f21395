//! Conversions between our 0-indexed domain types and `rs_fsrs`'s own (1-indexed) `Rating` and
//! `State` enums, plus the deterministic-fuzz helper used by `schedule`.

use chrono::{DateTime, Utc};
use rs_fsrs::{Rating as FsrsRating, State as FsrsState};

use crate::model::{StateId, TuneId};
use crate::quality::Rating;
use crate::{Error, LibraryError, SchedulerErrorKind};

/// `rs_fsrs::Rating` is 1-indexed (Again=1..Easy=4); ours is 0-indexed. Never compare the two by
/// numeric value — always convert variant to variant.
pub fn to_fsrs_rating(rating: Rating) -> FsrsRating {
    match rating {
        Rating::Again => FsrsRating::Again,
        Rating::Hard => FsrsRating::Hard,
        Rating::Good => FsrsRating::Good,
        Rating::Easy => FsrsRating::Easy,
    }
}

pub fn number_to_state(num: StateId) -> Result<FsrsState, Error> {
    match num {
        0 => Ok(FsrsState::New),
        1 => Ok(FsrsState::Learning),
        2 => Ok(FsrsState::Review),
        3 => Ok(FsrsState::Relearning),
        other => Err(Error::Library(LibraryError::Scheduler(
            SchedulerErrorKind::InvalidState(other),
        ))),
    }
}

pub fn state_to_number(state: FsrsState) -> StateId {
    match state {
        FsrsState::New => 0,
        FsrsState::Learning => 1,
        FsrsState::Review => 2,
        FsrsState::Relearning => 3,
    }
}

/// `difficulty := round(1 + (1 − (easiness − 1.3)/(2.5 − 1.3)) · 9)`, clamped to `[1, 10]`.
/// Used when a record carries only legacy SM-2 easiness (4.C edge case).
pub fn difficulty_from_easiness(easiness: f64) -> f64 {
    let raw = 1.0 + (1.0 - (easiness - 1.3) / (2.5 - 1.3)) * 9.0;
    raw.round().clamp(1.0, 10.0)
}

/// The three-bracket fuzz percentage table: ±15% under 7 days, ±10% under 20 days, ±5% beyond.
fn fuzz_bracket_days(interval: i64) -> (i64, i64) {
    let pct = if interval < 7 {
        0.15
    } else if interval < 20 {
        0.10
    } else {
        0.05
    };
    #[allow(clippy::cast_possible_truncation)]
    let delta = ((interval as f64) * pct).round() as i64;
    let delta = delta.max(1);
    ((interval - delta).max(1), interval + delta)
}

/// Picks a deterministic interval within the fuzz bracket, seeded from
/// `tune_id XOR floor(unix_seconds(reviewed_at))` so scheduling is reproducible under test while
/// still spreading due dates across a day's worth of candidate tunes.
pub fn deterministic_fuzzed_interval(
    tune_id: TuneId,
    reviewed_at: DateTime<Utc>,
    interval: i64,
    maximum_interval: i64,
) -> i64 {
    if interval < 1 {
        return interval.max(1);
    }
    let (lo, hi) = fuzz_bracket_days(interval);
    let span = (hi - lo + 1).max(1);
    #[allow(clippy::cast_sign_loss)]
    let seed = (tune_id as u64) ^ (reviewed_at.timestamp().max(0) as u64);
    #[allow(clippy::cast_possible_wrap)]
    let offset = (seed.wrapping_mul(2_654_435_761) % span as u64) as i64;
    (lo + offset).clamp(1, maximum_interval)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_from_easiness_is_bounded() {
        assert!((1.0..=10.0).contains(&difficulty_from_easiness(2.5)));
        assert!((1.0..=10.0).contains(&difficulty_from_easiness(1.3)));
        assert!((1.0..=10.0).contains(&difficulty_from_easiness(4.0)));
    }

    #[test]
    fn fuzz_is_deterministic_for_same_inputs() {
        let at = DateTime::from_timestamp(1_735_638_477, 0).unwrap();
        let a = deterministic_fuzzed_interval(634, at, 10, 36_500);
        let b = deterministic_fuzzed_interval(634, at, 10, 36_500);
        assert_eq!(a, b);
    }

    #[test]
    fn fuzz_stays_within_bracket() {
        let at = DateTime::from_timestamp(1_735_638_477, 0).unwrap();
        let fuzzed = deterministic_fuzzed_interval(1, at, 30, 36_500);
        let (lo, hi) = fuzz_bracket_days(30);
        assert!(fuzzed >= lo && fuzzed <= hi);
    }

    #[test]
    fn state_round_trips() {
        for n in 0..4u8 {
            let state = number_to_state(n).unwrap();
            assert_eq!(state_to_number(state), n);
        }
        assert!(number_to_state(9).is_err());
    }
}
