//! Component J, the Tune/History Repository: read access to the `practice_list_*` views and the
//! only write path onto `practice_record`/`playlist_tune.scheduled`.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::model::{PlaylistId, PlaylistTune, PracticeListRow, PracticeRecord, PracticeRecordId, TuneId, UserId};
use crate::{Error, LibraryError, RepositoryErrorKind};

fn format_ts(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// The candidate universe for the Queue Generator: every non-deleted row of the staged join
/// view for `(user_ref, playlist_ref)`. Playlist-deleted rows are excluded unless
/// `include_playlist_deleted` is set (the legacy ad-hoc list can ask for everything).
pub async fn fetch_candidates(
    db: &SqlitePool,
    user_ref: UserId,
    playlist_ref: PlaylistId,
    include_playlist_deleted: bool,
) -> Result<Vec<PracticeListRow>, Error> {
    let rows = sqlx::query_as::<_, PracticeListRow>(
        r"SELECT * FROM practice_list_staged
          WHERE user_ref = ? AND playlist_ref = ? AND deleted = 0
            AND (? OR playlist_deleted = 0)",
    )
    .bind(user_ref)
    .bind(playlist_ref)
    .bind(include_playlist_deleted)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn get_playlist_tune(
    db: &SqlitePool,
    playlist_ref: PlaylistId,
    tune_ref: TuneId,
) -> Result<PlaylistTune, Error> {
    sqlx::query_as::<_, PlaylistTune>(
        r"SELECT playlist_ref, tune_ref, learned, deleted, scheduled, goal, technique
          FROM playlist_tune WHERE playlist_ref = ? AND tune_ref = ?",
    )
    .bind(playlist_ref)
    .bind(tune_ref)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| {
        Error::Library(LibraryError::Repository(RepositoryErrorKind::PlaylistTuneNotFound {
            playlist_ref,
            tune_ref,
        }))
    })
}

/// The authoritative prior for the Scheduler Facade: the max-id row for `(tune_ref,
/// playlist_ref)` (Invariant U2 — id-wins, not timestamp-wins). `None` on a tune's first review.
pub async fn get_latest_practice_record(
    db: &SqlitePool,
    playlist_ref: PlaylistId,
    tune_ref: TuneId,
) -> Result<Option<PracticeRecord>, Error> {
    let row = sqlx::query_as::<_, PracticeRecord>(
        r"SELECT * FROM practice_record
          WHERE playlist_ref = ? AND tune_ref = ?
          ORDER BY id DESC LIMIT 1",
    )
    .bind(playlist_ref)
    .bind(tune_ref)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Fields for a single append-only `PracticeRecord` insert. Every field here is either already
/// resolved (no further lookups) or a scheduler output.
pub struct NewPracticeRecord {
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

/// Returns `true` if `(tune_ref, playlist_ref, practiced)` is already taken — the U1 check
/// `feedback::unique_practiced_timestamp` drives its +1-second retry loop with.
pub async fn practiced_timestamp_taken(
    conn: &mut SqliteConnection,
    playlist_ref: PlaylistId,
    tune_ref: TuneId,
    practiced: DateTime<Utc>,
) -> Result<bool, Error> {
    let count: i64 = sqlx::query_scalar(
        r"SELECT COUNT(*) FROM practice_record WHERE tune_ref = ? AND playlist_ref = ? AND practiced = ?",
    )
    .bind(tune_ref)
    .bind(playlist_ref)
    .bind(format_ts(practiced))
    .fetch_one(&mut *conn)
    .await?;
    Ok(count > 0)
}

/// Appends one immutable history row. Callers must have already resolved U1 (see
/// `practiced_timestamp_taken`); this function does not itself retry.
pub async fn append_practice_record(
    conn: &mut SqliteConnection,
    record: &NewPracticeRecord,
) -> Result<PracticeRecordId, Error> {
    let id: i64 = sqlx::query_scalar(
        r"INSERT INTO practice_record
              (playlist_ref, tune_ref, practiced, quality, easiness, interval, repetitions,
               review_date, stability, difficulty, step, lapses, state, goal, technique)
          VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
          RETURNING id",
    )
    .bind(record.playlist_ref)
    .bind(record.tune_ref)
    .bind(format_ts(record.practiced))
    .bind(record.quality)
    .bind(record.easiness)
    .bind(record.interval)
    .bind(record.repetitions)
    .bind(format_ts(record.review_date))
    .bind(record.stability)
    .bind(record.difficulty)
    .bind(record.step)
    .bind(record.lapses)
    .bind(record.state)
    .bind(&record.goal)
    .bind(&record.technique)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

/// The authoritative override for a tune's next review. `PlaylistTune` must already exist.
pub async fn update_playlist_tune_scheduled(
    conn: &mut SqliteConnection,
    playlist_ref: PlaylistId,
    tune_ref: TuneId,
    scheduled: DateTime<Utc>,
) -> Result<(), Error> {
    let result = sqlx::query(
        r"UPDATE playlist_tune SET scheduled = ? WHERE playlist_ref = ? AND tune_ref = ?",
    )
    .bind(format_ts(scheduled))
    .bind(playlist_ref)
    .bind(tune_ref)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(Error::Library(LibraryError::Repository(
            RepositoryErrorKind::PlaylistTuneNotFound { playlist_ref, tune_ref },
        )));
    }
    Ok(())
}
