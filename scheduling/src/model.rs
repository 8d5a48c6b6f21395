//! Domain entities. These types should match `migrations/0001_init.sql`; each `FromRow` struct
//! follows <https://docs.rs/sqlx/latest/sqlx/sqlite/types/index.html> for column type mapping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub type UserId = i64;
pub type PlaylistId = i64;
pub type TuneId = i64;
pub type PracticeRecordId = i64;
pub type StateId = u8;
pub type RatingId = u8;

pub const DEFAULT_ACCEPTABLE_DELINQUENCY_WINDOW: i64 = 7;
pub const DEFAULT_MIN_REVIEWS_PER_DAY: i64 = 3;
pub const DEFAULT_MAX_REVIEWS_PER_DAY: i64 = 10;
pub const DEFAULT_DAYS_PER_WEEK: i64 = 7;
pub const DEFAULT_WEEKLY_RULES: &str = "{}";
pub const DEFAULT_EXCEPTIONS: &str = "[]";

/// The algorithm used for a particular review. Determines which quality scale the stored
/// `quality` uses and which scheduler the Scheduler Facade dispatches to.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum Technique {
    Sm2,
    #[default]
    Fsrs,
    MotorSkills,
    Metronome,
    DailyPractice,
    Custom,
}

impl Technique {
    /// `SM2` uses the 6-value scale; everything else uses the 4-value FSRS scale.
    pub fn is_sm2_scale(self) -> bool {
        matches!(self, Technique::Sm2)
    }
}

/// A high-level practice intent. Stored alongside each `PracticeRecord`; the scheduler uses it
/// only to pick a default technique.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum Goal {
    InitialLearn,
    #[default]
    Recall,
    Fluency,
    SessionReady,
    PerformancePolish,
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize, sqlx::Type, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum AlgType {
    #[default]
    SM2,
    FSRS,
}

/// Read-only to the core; created by catalog ingestion.
#[derive(Clone, Debug, Deserialize, FromRow, Serialize)]
pub struct Tune {
    pub id: TuneId,
    pub title: String,
    pub r#type: Option<String>,
    pub structure: Option<String>,
    pub mode: Option<String>,
    pub incipit: Option<String>,
    pub genre: Option<String>,
    pub deleted: bool,
    pub private_for: Option<UserId>,
}

/// The edge between a playlist and a tune. `scheduled`, when non-null, is the authoritative
/// override for the tune's next review (see `PracticeRecord` below for the fallback).
#[derive(Clone, Debug, Deserialize, FromRow, Serialize)]
pub struct PlaylistTune {
    pub playlist_ref: PlaylistId,
    pub tune_ref: TuneId,
    pub learned: Option<String>,
    pub deleted: bool,
    pub scheduled: Option<DateTime<Utc>>,
    pub goal: Option<String>,
    pub technique: Option<String>,
}

/// One row per review, ever. Nothing in this crate issues an `UPDATE` or `DELETE` against this
/// table: invariant U1 (unique `(tune_ref, playlist_ref, practiced)`) and U2 ("latest" is the
/// max-`id` row, not the max-timestamp row) both depend on that.
#[derive(Clone, Debug, Deserialize, FromRow, Serialize)]
pub struct PracticeRecord {
    pub id: PracticeRecordId,
    pub playlist_ref: PlaylistId,
    pub tune_ref: TuneId,
    pub practiced: DateTime<Utc>,
    pub quality: i64,
    pub easiness: Option<f64>,
    pub interval: Option<i64>,
    pub repetitions: Option<i64>,
    pub review_date: DateTime<Utc>,
    pub stability: Option<f64>,
    pub difficulty: Option<f64>,
    pub step: Option<i64>,
    pub lapses: Option<i64>,
    pub state: Option<i64>,
    pub goal: String,
    pub technique: String,
}

/// At most one per `(user, playlist, tune, purpose="practice")`. Overlays the join view without
/// mutating history; all fields are cleared together on commit, clear, or an explicit `not_set`.
#[derive(Clone, Debug, Default, Deserialize, FromRow, Serialize)]
pub struct StagedFeedback {
    pub user_ref: UserId,
    pub playlist_ref: PlaylistId,
    pub tune_ref: TuneId,
    pub quality: Option<i64>,
    pub practiced: Option<DateTime<Utc>>,
    pub due: Option<DateTime<Utc>>,
    pub easiness: Option<f64>,
    pub difficulty: Option<f64>,
    pub interval: Option<i64>,
    pub step: Option<i64>,
    pub repetitions: Option<i64>,
    pub stability: Option<f64>,
    pub goal: Option<String>,
    pub technique: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SchedulingPrefs {
    pub acceptable_delinquency_window: i64,
    pub min_reviews_per_day: i64,
    pub max_reviews_per_day: i64,
    pub days_per_week: i64,
    pub weekly_rules: String,
    pub exceptions: String,
}

impl Default for SchedulingPrefs {
    fn default() -> Self {
        Self {
            acceptable_delinquency_window: DEFAULT_ACCEPTABLE_DELINQUENCY_WINDOW,
            min_reviews_per_day: DEFAULT_MIN_REVIEWS_PER_DAY,
            max_reviews_per_day: DEFAULT_MAX_REVIEWS_PER_DAY,
            days_per_week: DEFAULT_DAYS_PER_WEEK,
            weekly_rules: DEFAULT_WEEKLY_RULES.to_string(),
            exceptions: DEFAULT_EXCEPTIONS.to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SrPrefs {
    pub alg_type: AlgType,
    pub fsrs_weights: Option<[f64; 17]>,
    pub request_retention: Option<f64>,
    pub maximum_interval: Option<i64>,
    pub learning_steps: Vec<i64>,
    pub relearning_steps: Vec<i64>,
    pub enable_fuzzing: bool,
}

impl SrPrefs {
    pub fn default_for(alg_type: AlgType) -> Self {
        Self {
            alg_type,
            fsrs_weights: None,
            request_retention: None,
            maximum_interval: None,
            learning_steps: Vec::new(),
            relearning_steps: Vec::new(),
            enable_fuzzing: false,
        }
    }
}

/// One row of a persisted daily-queue snapshot.
#[derive(Clone, Debug, Deserialize, FromRow, Serialize)]
pub struct DailyPracticeQueueRow {
    pub id: i64,
    pub user_ref: UserId,
    pub playlist_ref: PlaylistId,
    pub mode: String,
    pub queue_date: String,
    pub window_start_utc: String,
    pub window_end_utc: String,
    pub tune_ref: TuneId,
    pub bucket: i64,
    pub order_index: i64,
    pub snapshot_coalesced_ts: String,
    pub scheduled_snapshot: Option<String>,
    pub latest_review_date_snapshot: Option<String>,
    pub acceptable_delinquency_window_snapshot: i64,
    pub tz_offset_minutes_snapshot: Option<i64>,
    pub generated_at: String,
    pub completed_at: Option<String>,
    pub exposures_required: Option<i64>,
    pub exposures_completed: i64,
    pub outcome: Option<String>,
    pub active: bool,
}

/// One row of `practice_list_staged` (or `practice_list_joined`, a strict subset of the same
/// shape with `has_staged` always 0). Column names mirror the view contract verbatim.
#[derive(Clone, Debug, Deserialize, FromRow, Serialize)]
pub struct PracticeListRow {
    pub id: TuneId,
    pub title: String,
    pub r#type: Option<String>,
    pub structure: Option<String>,
    pub mode: Option<String>,
    pub incipit: Option<String>,
    pub genre: Option<String>,
    pub deleted: bool,
    pub private_for: Option<UserId>,
    pub learned: Option<String>,
    pub scheduled: Option<String>,
    pub latest_practiced: Option<String>,
    pub latest_quality: Option<i64>,
    pub latest_easiness: Option<f64>,
    pub latest_difficulty: Option<f64>,
    pub latest_interval: Option<i64>,
    pub latest_step: Option<i64>,
    pub latest_repetitions: Option<i64>,
    pub latest_review_date: Option<String>,
    pub latest_goal: Option<String>,
    pub latest_technique: Option<String>,
    pub tags: String,
    pub playlist_ref: PlaylistId,
    pub user_ref: UserId,
    pub playlist_deleted: bool,
    pub notes: String,
    pub favorite_url: String,
    pub has_override: bool,
    pub recall_eval: Option<String>,
    pub has_staged: bool,
}

impl PracticeListRow {
    /// `ts := COALESCE(scheduled, latest_review_date)` — the coalesced timestamp used for both
    /// bucket classification and phase ordering.
    pub fn coalesced_ts(&self) -> Option<&str> {
        self.scheduled.as_deref().or(self.latest_review_date.as_deref())
    }
}
