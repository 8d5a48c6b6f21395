//! Component G, the Queue Store: snapshot persistence, fetch, deactivation, and the two
//! user-driven append operations (refill, manual-add).

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::Mutex as AsyncMutex;

use super::generator::{classify_bucket, generate_queue, QueueCandidate};
use crate::model::{DailyPracticeQueueRow, PlaylistId, TuneId, UserId};
use crate::window::{compute_windows, Windows};
use crate::{repository, Error, LibraryError, QueueErrorKind};

fn format_ts(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// `add_tunes_to_queue`'s result shape (§6.1).
#[derive(Clone, Debug, Default)]
pub struct AddManualOutcome {
    pub added: Vec<TuneId>,
    pub skipped_existing: Vec<TuneId>,
    pub missing: Vec<TuneId>,
    pub duplicate_request_ignored: Vec<TuneId>,
}

/// Serializes queue mutations per `(user_ref, playlist_ref)` ahead of the database transaction,
/// since SQLite's own locking is coarser (whole-database) than this logical resource (§5).
pub struct QueueStore {
    db: SqlitePool,
    locks: StdMutex<HashMap<(UserId, PlaylistId), Arc<AsyncMutex<()>>>>,
}

impl QueueStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db, locks: StdMutex::new(HashMap::new()) }
    }

    fn lock_for(&self, user_ref: UserId, playlist_ref: PlaylistId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        locks
            .entry((user_ref, playlist_ref))
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    pub async fn fetch_active(
        &self,
        user_ref: UserId,
        playlist_ref: PlaylistId,
        window_start_utc: DateTime<Utc>,
    ) -> Result<Vec<DailyPracticeQueueRow>, Error> {
        let rows = sqlx::query_as::<_, DailyPracticeQueueRow>(
            r"SELECT * FROM daily_practice_queue
              WHERE user_ref = ? AND playlist_ref = ? AND window_start_utc = ? AND active = 1
              ORDER BY order_index ASC",
        )
        .bind(user_ref)
        .bind(playlist_ref)
        .bind(format_ts(window_start_utc))
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub async fn generate_or_get(
        &self,
        user_ref: UserId,
        playlist_ref: PlaylistId,
        sit_down_utc: DateTime<Utc>,
        tz_offset_minutes: Option<i32>,
        force_regen: bool,
    ) -> Result<Vec<DailyPracticeQueueRow>, Error> {
        let resource_lock = self.lock_for(user_ref, playlist_ref);
        let _guard = resource_lock.lock().await;

        let scheduling_prefs = crate::prefs::get_scheduling_prefs_or_defaults(&self.db, user_ref).await?;
        let windows = compute_windows(
            sit_down_utc,
            tz_offset_minutes,
            scheduling_prefs.acceptable_delinquency_window,
        );

        if !force_regen {
            let existing = self.fetch_active(user_ref, playlist_ref, windows.start_of_day_utc).await?;
            if !existing.is_empty() {
                return Ok(existing);
            }
        }

        let mut tx = self.db.begin().await?;
        if force_regen {
            sqlx::query(
                r"UPDATE daily_practice_queue SET active = 0
                  WHERE user_ref = ? AND playlist_ref = ? AND window_start_utc = ? AND active = 1",
            )
            .bind(user_ref)
            .bind(playlist_ref)
            .bind(format_ts(windows.start_of_day_utc))
            .execute(&mut *tx)
            .await?;
        }

        let candidates = repository::fetch_candidates(&self.db, user_ref, playlist_ref, false).await?;
        let selected = generate_queue(
            &candidates,
            &windows,
            scheduling_prefs.min_reviews_per_day,
            scheduling_prefs.max_reviews_per_day,
            false,
        );
        log::info!(
            "generated daily queue for user {user_ref} playlist {playlist_ref}: {} tunes from {} candidates (window_start={})",
            selected.len(),
            candidates.len(),
            windows.start_of_day_str,
        );

        let generated_at = Utc::now();
        for (i, candidate) in selected.iter().enumerate() {
            insert_snapshot_row(
                &mut tx,
                user_ref,
                playlist_ref,
                &windows,
                candidate,
                i as i64,
                scheduling_prefs.acceptable_delinquency_window,
                tz_offset_minutes,
                generated_at,
            )
            .await?;
        }
        tx.commit().await?;

        self.fetch_active(user_ref, playlist_ref, windows.start_of_day_utc).await
    }

    /// Idempotent: a second call deactivates nothing and returns `0`.
    pub async fn reset(&self, user_ref: UserId, playlist_ref: PlaylistId) -> Result<u64, Error> {
        let resource_lock = self.lock_for(user_ref, playlist_ref);
        let _guard = resource_lock.lock().await;

        let result = sqlx::query(
            r"UPDATE daily_practice_queue SET active = 0
              WHERE user_ref = ? AND playlist_ref = ? AND active = 1",
        )
        .bind(user_ref)
        .bind(playlist_ref)
        .execute(&self.db)
        .await?;
        log::debug!(
            "reset queue for user {user_ref} playlist {playlist_ref}: deactivated {} rows",
            result.rows_affected()
        );
        Ok(result.rows_affected())
    }

    /// Capacity (`max_reviews_per_day`) is deliberately not enforced here (Open Question b).
    pub async fn refill(
        &self,
        user_ref: UserId,
        playlist_ref: PlaylistId,
        sit_down_utc: DateTime<Utc>,
        tz_offset_minutes: Option<i32>,
        count: usize,
    ) -> Result<Vec<DailyPracticeQueueRow>, Error> {
        let resource_lock = self.lock_for(user_ref, playlist_ref);
        let _guard = resource_lock.lock().await;

        let scheduling_prefs = crate::prefs::get_scheduling_prefs_or_defaults(&self.db, user_ref).await?;
        let windows = compute_windows(
            sit_down_utc,
            tz_offset_minutes,
            scheduling_prefs.acceptable_delinquency_window,
        );

        let existing = self.fetch_active(user_ref, playlist_ref, windows.start_of_day_utc).await?;
        if existing.is_empty() {
            return Err(Error::Library(LibraryError::Queue(QueueErrorKind::NoActiveQueue {
                playlist_ref,
            })));
        }
        let already_present: std::collections::HashSet<TuneId> =
            existing.iter().map(|row| row.tune_ref).collect();
        let max_order_index = existing.iter().map(|row| row.order_index).max().unwrap_or(-1);

        let candidates = repository::fetch_candidates(&self.db, user_ref, playlist_ref, false).await?;
        let mut backlog = generate_queue(
            &candidates,
            &windows,
            scheduling_prefs.min_reviews_per_day,
            0,
            true,
        )
        .into_iter()
        .filter(|c| c.bucket == 3 && !already_present.contains(&c.tune_ref))
        .collect::<Vec<_>>();
        // `generate_queue`'s own ordering may stop short of Q3 once `min` is satisfied; refill
        // wants the full Q3 backlog ordered desc, independent of capacity/minimum.
        backlog.sort_by_key(|c| std::cmp::Reverse(c.ts));
        backlog.truncate(count);

        let mut tx = self.db.begin().await?;
        let generated_at = Utc::now();
        for (i, candidate) in backlog.iter().enumerate() {
            insert_snapshot_row(
                &mut tx,
                user_ref,
                playlist_ref,
                &windows,
                candidate,
                max_order_index + 1 + i as i64,
                scheduling_prefs.acceptable_delinquency_window,
                tz_offset_minutes,
                generated_at,
            )
            .await?;
        }
        tx.commit().await?;

        let new_tune_refs: Vec<TuneId> = backlog.iter().map(|c| c.tune_ref).collect();
        let all = self.fetch_active(user_ref, playlist_ref, windows.start_of_day_utc).await?;
        Ok(all.into_iter().filter(|row| new_tune_refs.contains(&row.tune_ref)).collect())
    }

    /// Capacity (`max_reviews_per_day`) is deliberately not enforced here (Open Question c):
    /// manual additions are a user-explicit override.
    pub async fn add_manual(
        &self,
        user_ref: UserId,
        playlist_ref: PlaylistId,
        tune_ids: &[TuneId],
        sit_down_utc: DateTime<Utc>,
        tz_offset_minutes: Option<i32>,
    ) -> Result<AddManualOutcome, Error> {
        let mut outcome = AddManualOutcome::default();
        let mut seen_in_request = std::collections::HashSet::new();
        let mut deduped = Vec::new();
        for &tune_id in tune_ids {
            if seen_in_request.insert(tune_id) {
                deduped.push(tune_id);
            } else {
                outcome.duplicate_request_ignored.push(tune_id);
            }
        }

        let scheduling_prefs = crate::prefs::get_scheduling_prefs_or_defaults(&self.db, user_ref).await?;
        let windows = compute_windows(
            sit_down_utc,
            tz_offset_minutes,
            scheduling_prefs.acceptable_delinquency_window,
        );

        // `generate_or_get` takes the resource lock itself, so this has to happen before we
        // take it below — otherwise a tune-less snapshot would deadlock against itself.
        let existing = self
            .generate_or_get(user_ref, playlist_ref, sit_down_utc, tz_offset_minutes, false)
            .await?;

        let resource_lock = self.lock_for(user_ref, playlist_ref);
        let _guard = resource_lock.lock().await;

        let already_present: std::collections::HashSet<TuneId> =
            existing.iter().map(|row| row.tune_ref).collect();

        let mut to_add = Vec::new();
        for &tune_id in &deduped {
            if already_present.contains(&tune_id) {
                outcome.skipped_existing.push(tune_id);
                continue;
            }
            match repository::get_playlist_tune(&self.db, playlist_ref, tune_id).await {
                Ok(playlist_tune) if !playlist_tune.deleted => to_add.push(tune_id),
                _ => outcome.missing.push(tune_id),
            }
        }

        if to_add.is_empty() {
            return Ok(outcome);
        }

        let mut tx = self.db.begin().await?;
        let shift = to_add.len() as i64;
        sqlx::query(
            r"UPDATE daily_practice_queue SET order_index = order_index + ?
              WHERE user_ref = ? AND playlist_ref = ? AND window_start_utc = ? AND active = 1",
        )
        .bind(shift)
        .bind(user_ref)
        .bind(playlist_ref)
        .bind(format_ts(windows.start_of_day_utc))
        .execute(&mut *tx)
        .await?;

        let generated_at = Utc::now();
        for (i, &tune_id) in to_add.iter().enumerate() {
            repository::update_playlist_tune_scheduled(&mut tx, playlist_ref, tune_id, sit_down_utc)
                .await?;
            let row = repository::fetch_candidates(&self.db, user_ref, playlist_ref, false)
                .await?
                .into_iter()
                .find(|row| row.id == tune_id)
                .ok_or_else(|| {
                    Error::Library(LibraryError::Repository(
                        crate::RepositoryErrorKind::PlaylistTuneNotFound { playlist_ref, tune_ref: tune_id },
                    ))
                })?;
            // The override write above lands in `tx`, not yet visible to the pool-level read
            // that fetched `row`, so the bucket must come from `sit_down_utc` directly rather
            // than from `row`'s (possibly stale) coalesced timestamp.
            let bucket = classify_bucket(sit_down_utc, &windows);
            let candidate = QueueCandidate { tune_ref: tune_id, bucket, ts: sit_down_utc, row };
            insert_snapshot_row(
                &mut tx,
                user_ref,
                playlist_ref,
                &windows,
                &candidate,
                i as i64,
                scheduling_prefs.acceptable_delinquency_window,
                tz_offset_minutes,
                generated_at,
            )
            .await?;
        }
        tx.commit().await?;

        outcome.added = to_add;
        Ok(outcome)
    }
}

#[allow(clippy::too_many_arguments)]
async fn insert_snapshot_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    user_ref: UserId,
    playlist_ref: PlaylistId,
    windows: &Windows,
    candidate: &QueueCandidate,
    order_index: i64,
    acceptable_delinquency_window: i64,
    tz_offset_minutes: Option<i32>,
    generated_at: DateTime<Utc>,
) -> Result<(), Error> {
    sqlx::query(
        r"INSERT INTO daily_practice_queue
              (user_ref, playlist_ref, mode, queue_date, window_start_utc, window_end_utc,
               tune_ref, bucket, order_index, snapshot_coalesced_ts, scheduled_snapshot,
               latest_review_date_snapshot, acceptable_delinquency_window_snapshot,
               tz_offset_minutes_snapshot, generated_at, exposures_completed, active)
          VALUES (?, ?, 'per_day', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 1)",
    )
    .bind(user_ref)
    .bind(playlist_ref)
    .bind(windows.start_of_day_utc.format("%Y-%m-%d").to_string())
    .bind(&windows.start_of_day_str)
    .bind(&windows.end_of_day_str)
    .bind(candidate.tune_ref)
    .bind(i64::from(candidate.bucket))
    .bind(order_index)
    .bind(format_ts(candidate.ts))
    .bind(candidate.row.scheduled.clone())
    .bind(candidate.row.latest_review_date.clone())
    .bind(acceptable_delinquency_window)
    .bind(tz_offset_minutes.map(i64::from))
    .bind(format_ts(generated_at))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed(db: &SqlitePool) {
        sqlx::query("INSERT INTO playlist (id, user_ref) VALUES (1, 1)").execute(db).await.unwrap();
        for i in 1..=3 {
            sqlx::query("INSERT INTO tune (id, title) VALUES (?, ?)")
                .bind(i)
                .bind(format!("Tune {i}"))
                .execute(db)
                .await
                .unwrap();
            sqlx::query("INSERT INTO playlist_tune (playlist_ref, tune_ref, scheduled) VALUES (1, ?, ?)")
                .bind(i)
                .bind("2025-01-01 08:00:00")
                .execute(db)
                .await
                .unwrap();
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn generate_or_get_is_idempotent_without_force_regen(db: SqlitePool) {
        seed(&db).await;
        let store = QueueStore::new(db);
        let sit_down = DateTime::from_timestamp(1_735_718_400, 0).unwrap(); // 2025-01-01
        let first = store.generate_or_get(1, 1, sit_down, None, false).await.unwrap();
        let second = store.generate_or_get(1, 1, sit_down, None, false).await.unwrap();
        assert_eq!(first.len(), second.len());
        assert_eq!(
            first.iter().map(|r| r.tune_ref).collect::<Vec<_>>(),
            second.iter().map(|r| r.tune_ref).collect::<Vec<_>>()
        );
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn reset_is_idempotent(db: SqlitePool) {
        seed(&db).await;
        let store = QueueStore::new(db);
        let sit_down = DateTime::from_timestamp(1_735_718_400, 0).unwrap();
        store.generate_or_get(1, 1, sit_down, None, false).await.unwrap();
        let first = store.reset(1, 1).await.unwrap();
        let second = store.reset(1, 1).await.unwrap();
        assert_eq!(first, 3);
        assert_eq!(second, 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn manual_add_dedups_and_shifts_order(db: SqlitePool) {
        seed(&db).await;
        sqlx::query("INSERT INTO tune (id, title) VALUES (4, 'D'), (5, 'E')").execute(&db).await.unwrap();
        sqlx::query("INSERT INTO playlist_tune (playlist_ref, tune_ref) VALUES (1, 4), (1, 5)")
            .execute(&db)
            .await
            .unwrap();

        let store = QueueStore::new(db);
        let sit_down = DateTime::from_timestamp(1_735_718_400, 0).unwrap();
        store.generate_or_get(1, 1, sit_down, None, false).await.unwrap();

        let outcome = store
            .add_manual(1, 1, &[4, 2, 5, 5], sit_down, None)
            .await
            .unwrap();
        assert_eq!(outcome.duplicate_request_ignored, vec![5]);
        assert_eq!(outcome.skipped_existing, vec![2]);
        assert_eq!(outcome.added, vec![4, 5]);
        assert!(outcome.missing.is_empty());
    }
}
