//! Component K, the External API: a thin composition layer over G–J exposing exactly the
//! contracts of SPEC_FULL.md §6.1–§6.2. No independent business rules live here — every
//! operation below is a direct call into [`crate::queue`], [`crate::feedback`], or
//! [`crate::prefs`], plus (for queue reads) the join that decorates a snapshot row with its
//! tune metadata for the host.

use sqlx::SqlitePool;

use crate::feedback::{FeedbackInput, SubmitFeedbackOutcome};
use crate::model::{
    AlgType, DailyPracticeQueueRow, PlaylistId, SchedulingPrefs, SrPrefs, TuneId, UserId,
};
use crate::queue::{AddManualOutcome, QueueStore};
use crate::{Error, repository};
use chrono::{DateTime, Utc};

/// `QueueEntry` (§6.1): a snapshot row decorated with its joined tune metadata and staged
/// overlay, as the host needs to render one practice-list item without a second round trip.
#[derive(Clone, Debug, serde::Serialize)]
pub struct QueueEntry {
    pub tune_ref: TuneId,
    pub bucket: i64,
    pub order_index: i64,
    pub snapshot_coalesced_ts: String,
    pub scheduled_snapshot: Option<String>,
    pub latest_review_date_snapshot: Option<String>,
    pub window_start_utc: String,
    pub window_end_utc: String,
    pub generated_at: String,
    pub active: bool,
    pub title: String,
    pub r#type: Option<String>,
    pub structure: Option<String>,
    pub mode: Option<String>,
    pub incipit: Option<String>,
    pub genre: Option<String>,
    pub learned: Option<String>,
    pub goal: Option<String>,
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
    pub has_staged: bool,
}

async fn decorate(
    db: &SqlitePool,
    user_ref: UserId,
    playlist_ref: PlaylistId,
    rows: Vec<DailyPracticeQueueRow>,
) -> Result<Vec<QueueEntry>, Error> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let candidates = repository::fetch_candidates(db, user_ref, playlist_ref, true).await?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let joined = candidates.iter().find(|c| c.id == row.tune_ref);
            QueueEntry {
                tune_ref: row.tune_ref,
                bucket: row.bucket,
                order_index: row.order_index,
                snapshot_coalesced_ts: row.snapshot_coalesced_ts,
                scheduled_snapshot: row.scheduled_snapshot,
                latest_review_date_snapshot: row.latest_review_date_snapshot,
                window_start_utc: row.window_start_utc,
                window_end_utc: row.window_end_utc,
                generated_at: row.generated_at,
                active: row.active,
                title: joined.map_or_else(String::new, |c| c.title.clone()),
                r#type: joined.and_then(|c| c.r#type.clone()),
                structure: joined.and_then(|c| c.structure.clone()),
                mode: joined.and_then(|c| c.mode.clone()),
                incipit: joined.and_then(|c| c.incipit.clone()),
                genre: joined.and_then(|c| c.genre.clone()),
                learned: joined.and_then(|c| c.learned.clone()),
                goal: joined.and_then(|c| c.latest_goal.clone()),
                latest_practiced: joined.and_then(|c| c.latest_practiced.clone()),
                latest_quality: joined.and_then(|c| c.latest_quality),
                latest_easiness: joined.and_then(|c| c.latest_easiness),
                latest_difficulty: joined.and_then(|c| c.latest_difficulty),
                latest_interval: joined.and_then(|c| c.latest_interval),
                latest_step: joined.and_then(|c| c.latest_step),
                latest_repetitions: joined.and_then(|c| c.latest_repetitions),
                latest_review_date: joined.and_then(|c| c.latest_review_date.clone()),
                latest_goal: joined.and_then(|c| c.latest_goal.clone()),
                latest_technique: joined.and_then(|c| c.latest_technique.clone()),
                has_staged: joined.is_some_and(|c| c.has_staged),
            }
        })
        .collect())
}

/// `get_queue` (§6.1): fetch or generate the active snapshot and decorate it with tune metadata.
pub async fn get_queue(
    db: &SqlitePool,
    user_ref: UserId,
    playlist_ref: PlaylistId,
    sit_down_utc: DateTime<Utc>,
    tz_offset_minutes: Option<i32>,
    force_regen: bool,
) -> Result<Vec<QueueEntry>, Error> {
    let store = QueueStore::new(db.clone());
    let rows = store
        .generate_or_get(user_ref, playlist_ref, sit_down_utc, tz_offset_minutes, force_regen)
        .await?;
    decorate(db, user_ref, playlist_ref, rows).await
}

/// `reset_queue` (§6.1).
pub struct ResetOutcome {
    pub deactivated: u64,
}

pub async fn reset_queue(
    db: &SqlitePool,
    user_ref: UserId,
    playlist_ref: PlaylistId,
) -> Result<ResetOutcome, Error> {
    let store = QueueStore::new(db.clone());
    let deactivated = store.reset(user_ref, playlist_ref).await?;
    Ok(ResetOutcome { deactivated })
}

/// `refill_queue` (§6.1): returns only the newly appended rows, decorated.
pub async fn refill_queue(
    db: &SqlitePool,
    user_ref: UserId,
    playlist_ref: PlaylistId,
    sit_down_utc: DateTime<Utc>,
    tz_offset_minutes: Option<i32>,
    count: usize,
) -> Result<Vec<QueueEntry>, Error> {
    let store = QueueStore::new(db.clone());
    let rows = store
        .refill(user_ref, playlist_ref, sit_down_utc, tz_offset_minutes, count)
        .await?;
    decorate(db, user_ref, playlist_ref, rows).await
}

/// `add_tunes_to_queue` (§6.1).
pub async fn add_tunes_to_queue(
    db: &SqlitePool,
    user_ref: UserId,
    playlist_ref: PlaylistId,
    tune_ids: &[TuneId],
    sit_down_utc: DateTime<Utc>,
    tz_offset_minutes: Option<i32>,
) -> Result<AddManualOutcome, Error> {
    let store = QueueStore::new(db.clone());
    store
        .add_manual(user_ref, playlist_ref, tune_ids, sit_down_utc, tz_offset_minutes)
        .await
}

/// `submit_feedback` (§6.1).
pub async fn submit_feedback(
    db: &SqlitePool,
    user_ref: UserId,
    playlist_ref: PlaylistId,
    sit_down_utc: DateTime<Utc>,
    updates: &[FeedbackInput],
    stage: bool,
) -> Result<SubmitFeedbackOutcome, Error> {
    crate::feedback::submit_feedback(db, user_ref, playlist_ref, sit_down_utc, updates, stage).await
}

/// `commit_staged` (§6.1).
pub struct CommitStagedOutcome {
    pub count: usize,
}

pub async fn commit_staged(
    db: &SqlitePool,
    user_ref: UserId,
    playlist_ref: PlaylistId,
) -> Result<CommitStagedOutcome, Error> {
    let outcome = crate::feedback::commit_staged(db, user_ref, playlist_ref).await?;
    Ok(CommitStagedOutcome { count: outcome.succeeded.len() })
}

/// `get_scheduling_prefs` / `set_scheduling_prefs` (§6.2).
pub async fn get_scheduling_prefs(db: &SqlitePool, user_ref: UserId) -> Result<SchedulingPrefs, Error> {
    crate::prefs::get_scheduling_prefs_or_defaults(db, user_ref).await
}

pub async fn set_scheduling_prefs(
    db: &SqlitePool,
    user_ref: UserId,
    prefs: &SchedulingPrefs,
) -> Result<(), Error> {
    crate::prefs::set_scheduling_prefs(db, user_ref, prefs).await
}

/// `get_sr_prefs` / `set_sr_prefs` (§6.2).
pub async fn get_sr_prefs(db: &SqlitePool, user_ref: UserId, alg: AlgType) -> Result<SrPrefs, Error> {
    crate::prefs::get_sr_prefs(db, user_ref, alg).await
}

pub async fn set_sr_prefs(db: &SqlitePool, user_ref: UserId, prefs: &SrPrefs) -> Result<(), Error> {
    crate::prefs::set_sr_prefs(db, user_ref, prefs).await
}
