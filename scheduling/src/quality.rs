//! Conversion fabric between the two rating scales. Represented as a tagged sum type rather than
//! a shared integer, to prevent silent cross-scale contamination (Design Note, "Two rating
//! scales"). Conversion only happens at the scheduler boundary; the `technique` column on
//! `PracticeRecord` identifies which scale a persisted `quality` lives in.

use crate::model::Technique;
use crate::{Error, LibraryError, QualityErrorKind};

/// A validated quality value, tagged with the scale it was validated against.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Quality {
    Sm2(u8),
    Fsrs(u8),
}

impl Quality {
    pub fn value(self) -> u8 {
        match self {
            Quality::Sm2(q) | Quality::Fsrs(q) => q,
        }
    }
}

/// The 4-value FSRS rating scale.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Rating {
    Again = 0,
    Hard = 1,
    Good = 2,
    Easy = 3,
}

/// Signals the FSRS first-review state for the synthetic `new`/`rescheduled` labels (4.C).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FirstReviewHint {
    New,
    Rescheduled,
}

/// Either a resolved quality, or the synthetic `not_set`/`clear` sentinel (4.A/4.H): staged
/// feedback scheduler fields should be erased and nothing further computed.
#[derive(Clone, Copy, Debug)]
pub enum LabelOutcome {
    Resolved {
        quality: Quality,
        hint: Option<FirstReviewHint>,
    },
    NotSet,
}

/// `bounds_for(technique) -> (lo, hi)`: SM-2 technique -> (0,5); all others -> (0,3).
pub fn bounds_for(technique: Technique) -> (u8, u8) {
    if technique.is_sm2_scale() { (0, 5) } else { (0, 3) }
}

pub fn is_4_value(technique: Technique) -> bool {
    !technique.is_sm2_scale()
}

/// Resolves a symbolic feedback label into a quality, using `technique` to select which label
/// table applies. Out-of-range quality for the selected technique is a programmer error and is
/// unreachable here since every branch below only ever constructs in-range values; bounds are
/// still enforced explicitly through `validate_quality` for values coming from persisted storage.
pub fn label_to_quality(label: &str, technique: Technique) -> Result<LabelOutcome, Error> {
    let normalized = label.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "not_set" | "clear" => return Ok(LabelOutcome::NotSet),
        "new" => {
            let quality = if technique.is_sm2_scale() { 3 } else { 2 };
            return Ok(LabelOutcome::Resolved {
                quality: tag(technique, quality),
                hint: Some(FirstReviewHint::New),
            });
        }
        "rescheduled" => {
            let quality = if technique.is_sm2_scale() { 3 } else { 2 };
            return Ok(LabelOutcome::Resolved {
                quality: tag(technique, quality),
                hint: Some(FirstReviewHint::Rescheduled),
            });
        }
        _ => {}
    }

    let quality = if technique.is_sm2_scale() {
        match normalized.as_str() {
            "failed" => 0,
            "barely" => 1,
            "struggled" => 2,
            "recalled" => 3,
            "trivial" => 4,
            "perfect" => 5,
            _ => {
                return Err(Error::Library(LibraryError::Quality(
                    QualityErrorKind::UnknownLabel(label.to_string()),
                )));
            }
        }
    } else {
        match normalized.as_str() {
            "again" => 0,
            "hard" => 1,
            "good" => 2,
            "easy" => 3,
            _ => {
                return Err(Error::Library(LibraryError::Quality(
                    QualityErrorKind::UnknownLabel(label.to_string()),
                )));
            }
        }
    };
    Ok(LabelOutcome::Resolved {
        quality: tag(technique, quality),
        hint: None,
    })
}

fn tag(technique: Technique, quality: u8) -> Quality {
    if technique.is_sm2_scale() {
        Quality::Sm2(quality)
    } else {
        Quality::Fsrs(quality)
    }
}

/// Validates a stored integer quality against the bounds for `technique`.
pub fn validate_quality(quality: i64, technique: Technique) -> Result<Quality, Error> {
    let (lo, hi) = bounds_for(technique);
    if quality < i64::from(lo) || quality > i64::from(hi) {
        return Err(Error::Library(LibraryError::Quality(
            QualityErrorKind::OutOfRange {
                quality,
                lo,
                hi,
                technique: technique.to_string(),
            },
        )));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let quality = quality as u8;
    Ok(tag(technique, quality))
}

/// `quality_to_fsrs_rating_sm2(q: 0..5) -> Rating`: 0,1 -> Again, 2 -> Hard, 3 -> Good, 4,5 -> Easy.
pub fn quality_to_fsrs_rating_sm2(q: u8) -> Result<Rating, Error> {
    match q {
        0 | 1 => Ok(Rating::Again),
        2 => Ok(Rating::Hard),
        3 => Ok(Rating::Good),
        4 | 5 => Ok(Rating::Easy),
        _ => Err(Error::Library(LibraryError::Quality(
            QualityErrorKind::OutOfRange {
                quality: i64::from(q),
                lo: 0,
                hi: 5,
                technique: "sm2".to_string(),
            },
        ))),
    }
}

/// `quality_to_fsrs_rating_direct(q: 0..3) -> Rating`: identity.
pub fn quality_to_fsrs_rating_direct(q: u8) -> Result<Rating, Error> {
    match q {
        0 => Ok(Rating::Again),
        1 => Ok(Rating::Hard),
        2 => Ok(Rating::Good),
        3 => Ok(Rating::Easy),
        _ => Err(Error::Library(LibraryError::Quality(
            QualityErrorKind::OutOfRange {
                quality: i64::from(q),
                lo: 0,
                hi: 3,
                technique: "fsrs".to_string(),
            },
        ))),
    }
}

/// `fsrs_rating_to_quality_sm2(r) -> 0..5`: inverse using representative choices
/// Again -> 0, Hard -> 2, Good -> 3, Easy -> 5.
pub fn fsrs_rating_to_quality_sm2(r: Rating) -> u8 {
    match r {
        Rating::Again => 0,
        Rating::Hard => 2,
        Rating::Good => 3,
        Rating::Easy => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sm2_labels_resolve() {
        let outcome = label_to_quality("perfect", Technique::Sm2).unwrap();
        match outcome {
            LabelOutcome::Resolved { quality, hint } => {
                assert_eq!(quality.value(), 5);
                assert!(hint.is_none());
            }
            LabelOutcome::NotSet => panic!("expected resolved"),
        }
    }

    #[test]
    fn fsrs_labels_resolve() {
        let outcome = label_to_quality("good", Technique::Fsrs).unwrap();
        match outcome {
            LabelOutcome::Resolved { quality, .. } => assert_eq!(quality.value(), 2),
            LabelOutcome::NotSet => panic!("expected resolved"),
        }
    }

    #[test]
    fn not_set_clears() {
        assert!(matches!(
            label_to_quality("not_set", Technique::Fsrs).unwrap(),
            LabelOutcome::NotSet
        ));
        assert!(matches!(
            label_to_quality("clear", Technique::Sm2).unwrap(),
            LabelOutcome::NotSet
        ));
    }

    #[test]
    fn new_and_rescheduled_carry_hints() {
        let outcome = label_to_quality("new", Technique::Fsrs).unwrap();
        assert!(matches!(
            outcome,
            LabelOutcome::Resolved {
                hint: Some(FirstReviewHint::New),
                ..
            }
        ));
        let outcome = label_to_quality("rescheduled", Technique::Fsrs).unwrap();
        assert!(matches!(
            outcome,
            LabelOutcome::Resolved {
                hint: Some(FirstReviewHint::Rescheduled),
                ..
            }
        ));
    }

    #[test]
    fn unknown_label_errors() {
        assert!(label_to_quality("bogus", Technique::Fsrs).is_err());
    }

    #[test]
    fn quality_to_fsrs_rating_sm2_mapping() {
        assert_eq!(quality_to_fsrs_rating_sm2(0).unwrap(), Rating::Again);
        assert_eq!(quality_to_fsrs_rating_sm2(1).unwrap(), Rating::Again);
        assert_eq!(quality_to_fsrs_rating_sm2(2).unwrap(), Rating::Hard);
        assert_eq!(quality_to_fsrs_rating_sm2(3).unwrap(), Rating::Good);
        assert_eq!(quality_to_fsrs_rating_sm2(4).unwrap(), Rating::Easy);
        assert_eq!(quality_to_fsrs_rating_sm2(5).unwrap(), Rating::Easy);
    }

    #[test]
    fn quality_to_fsrs_rating_direct_is_identity() {
        for (q, expected) in [
            (0, Rating::Again),
            (1, Rating::Hard),
            (2, Rating::Good),
            (3, Rating::Easy),
        ] {
            assert_eq!(quality_to_fsrs_rating_direct(q).unwrap(), expected);
        }
    }

    #[test]
    fn bounds_match_technique() {
        assert_eq!(bounds_for(Technique::Sm2), (0, 5));
        assert_eq!(bounds_for(Technique::Fsrs), (0, 3));
        assert!(!is_4_value(Technique::Sm2));
        assert!(is_4_value(Technique::Fsrs));
    }

    #[test]
    fn validate_quality_rejects_out_of_range() {
        assert!(validate_quality(6, Technique::Sm2).is_err());
        assert!(validate_quality(5, Technique::Sm2).is_ok());
        assert!(validate_quality(4, Technique::Fsrs).is_err());
    }
}
