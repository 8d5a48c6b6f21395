//! Component H, the Feedback Pipeline: stage / clear / commit, quality resolution, Scheduler
//! Facade dispatch, U1 enforcement, and the resulting history + `PlaylistTune.scheduled` update.

use chrono::{DateTime, Duration, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::model::{Goal, PlaylistId, PlaylistTune, Technique, TuneId, UserId};
use crate::quality::{label_to_quality, LabelOutcome};
use crate::schedulers::{schedule as facade_schedule, SchedulerPrior};
use crate::{repository, Error};

/// One tune's worth of a feedback submission (`updates: map<tune_id, {...}>` in §6.1, flattened
/// into an indexed `Vec` here since Rust has no literal analogue of a request-scoped map type).
#[derive(Clone, Debug)]
pub struct FeedbackInput {
    pub tune_id: TuneId,
    pub feedback: String,
    pub goal: Option<Goal>,
    pub technique: Option<Technique>,
}

#[derive(Clone, Debug)]
pub struct TuneFeedbackError {
    pub tune_id: TuneId,
    pub error: String,
}

#[derive(Clone, Debug, Default)]
pub struct SubmitFeedbackOutcome {
    pub succeeded: Vec<TuneId>,
    pub per_tune_errors: Vec<TuneFeedbackError>,
}

fn format_ts(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// `technique` resolution order: the input's explicit value, then the tune's own persisted
/// technique, then SM-2 ("if no user algorithm preference exists, SM-2 is the default").
fn resolve_technique(input: &FeedbackInput, playlist_tune: &PlaylistTune) -> Technique {
    input.technique.unwrap_or_else(|| {
        playlist_tune
            .technique
            .as_deref()
            .and_then(|t| t.parse().ok())
            .unwrap_or(Technique::Sm2)
    })
}

fn prior_from_latest(latest: Option<&crate::model::PracticeRecord>) -> SchedulerPrior {
    match latest {
        None => SchedulerPrior::default(),
        Some(record) => SchedulerPrior {
            easiness: record.easiness,
            interval: record.interval,
            repetitions: record.repetitions,
            stability: record.stability,
            difficulty: record.difficulty,
            step: record.step,
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            state: record.state.map(|s| s as u8),
            last_review: Some(record.practiced),
        },
    }
}

/// U1: while `(tune_ref, playlist_ref, practiced)` collides, advance by one second. Deterministic
/// given the same starting instant and database state.
async fn unique_practiced_timestamp(
    tx: &mut Transaction<'_, Sqlite>,
    playlist_ref: PlaylistId,
    tune_ref: TuneId,
    desired: DateTime<Utc>,
) -> Result<DateTime<Utc>, Error> {
    let mut candidate = desired;
    while repository::practiced_timestamp_taken(tx, playlist_ref, tune_ref, candidate).await? {
        candidate += Duration::seconds(1);
    }
    Ok(candidate)
}

async fn clear_staged(
    tx: &mut Transaction<'_, Sqlite>,
    user_ref: UserId,
    playlist_ref: PlaylistId,
    tune_ref: TuneId,
) -> Result<(), Error> {
    sqlx::query(
        r"DELETE FROM table_transient_data
          WHERE user_ref = ? AND playlist_ref = ? AND tune_ref = ? AND purpose = 'practice'",
    )
    .bind(user_ref)
    .bind(playlist_ref)
    .bind(tune_ref)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn upsert_staged(
    tx: &mut Transaction<'_, Sqlite>,
    user_ref: UserId,
    playlist_ref: PlaylistId,
    tune_ref: TuneId,
    quality: i64,
    practiced: DateTime<Utc>,
    result: &crate::schedulers::ReviewResult,
    goal: &str,
    technique: &str,
) -> Result<(), Error> {
    sqlx::query(
        r"INSERT INTO table_transient_data
              (user_ref, playlist_ref, tune_ref, purpose, quality, practiced, due, easiness,
               difficulty, interval, step, repetitions, stability, goal, technique)
          VALUES (?, ?, ?, 'practice', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
          ON CONFLICT(user_ref, playlist_ref, tune_ref, purpose) DO UPDATE SET
              quality = excluded.quality, practiced = excluded.practiced, due = excluded.due,
              easiness = excluded.easiness, difficulty = excluded.difficulty,
              interval = excluded.interval, step = excluded.step,
              repetitions = excluded.repetitions, stability = excluded.stability,
              goal = excluded.goal, technique = excluded.technique",
    )
    .bind(user_ref)
    .bind(playlist_ref)
    .bind(tune_ref)
    .bind(quality)
    .bind(format_ts(practiced))
    .bind(format_ts(result.due))
    .bind(result.easiness)
    .bind(result.difficulty)
    .bind(result.interval)
    .bind(result.step)
    .bind(result.repetitions)
    .bind(result.stability)
    .bind(goal)
    .bind(technique)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Processes one tune's feedback against an open transaction, staging or committing per
/// `stage`. Component-level failures (unknown label, missing `PlaylistTune`, scheduler error)
/// are returned as `Err` for the *caller* to record per-tune — they never abort the transaction
/// themselves.
async fn process_one(
    db: &SqlitePool,
    tx: &mut Transaction<'_, Sqlite>,
    user_ref: UserId,
    playlist_ref: PlaylistId,
    desired_practiced: DateTime<Utc>,
    input: &FeedbackInput,
    stage: bool,
) -> Result<(), Error> {
    let playlist_tune = repository::get_playlist_tune(db, playlist_ref, input.tune_id).await?;
    let technique = resolve_technique(input, &playlist_tune);

    let outcome = label_to_quality(&input.feedback, technique)?;
    let (quality, hint) = match outcome {
        LabelOutcome::NotSet => {
            clear_staged(tx, user_ref, playlist_ref, input.tune_id).await?;
            return Ok(());
        }
        LabelOutcome::Resolved { quality, hint } => (quality, hint),
    };

    let latest = repository::get_latest_practice_record(db, playlist_ref, input.tune_id).await?;
    let prior = prior_from_latest(latest.as_ref());
    let sr_prefs = crate::prefs::get_sr_prefs(db, user_ref, crate::schedulers::effective_alg_type(technique)).await?;
    let result = facade_schedule(
        technique,
        &prior,
        quality,
        hint,
        input.tune_id,
        desired_practiced,
        &sr_prefs,
    )?;

    let goal = input.goal.unwrap_or_default().to_string();
    let technique_str = technique.to_string();

    if stage {
        let practiced =
            unique_practiced_timestamp(tx, playlist_ref, input.tune_id, desired_practiced).await?;
        upsert_staged(
            tx,
            user_ref,
            playlist_ref,
            input.tune_id,
            i64::from(quality.value()),
            practiced,
            &result,
            &goal,
            &technique_str,
        )
        .await?;
        return Ok(());
    }

    let practiced =
        unique_practiced_timestamp(tx, playlist_ref, input.tune_id, desired_practiced).await?;
    let record = repository::NewPracticeRecord {
        playlist_ref,
        tune_ref: input.tune_id,
        practiced,
        quality: i64::from(quality.value()),
        easiness: result.easiness,
        interval: Some(result.interval),
        repetitions: Some(result.repetitions),
        review_date: result.due,
        stability: result.stability,
        difficulty: result.difficulty,
        step: result.step,
        lapses: None,
        state: result.state.map(i64::from),
        goal,
        technique: technique_str,
    };
    repository::append_practice_record(tx, &record).await?;
    repository::update_playlist_tune_scheduled(tx, playlist_ref, input.tune_id, result.due).await?;
    clear_staged(tx, user_ref, playlist_ref, input.tune_id).await?;
    Ok(())
}

/// `submit_feedback` (§6.1): one transaction covers every tune; a per-tune logical failure
/// (unknown label, missing `PlaylistTune`, scheduler error) is recorded in `per_tune_errors`
/// without rolling back tunes that already succeeded. Only a storage failure aborts the whole
/// request.
pub async fn submit_feedback(
    db: &SqlitePool,
    user_ref: UserId,
    playlist_ref: PlaylistId,
    sit_down_utc: DateTime<Utc>,
    inputs: &[FeedbackInput],
    stage: bool,
) -> Result<SubmitFeedbackOutcome, Error> {
    let items: Vec<(FeedbackInput, DateTime<Utc>)> =
        inputs.iter().cloned().map(|input| (input, sit_down_utc)).collect();
    submit_feedback_with_timestamps(db, user_ref, playlist_ref, &items, stage).await
}

/// Shared transaction loop for `submit_feedback` and `commit_staged`: each input carries its own
/// `practiced` instant, since a commit replays timestamps captured at staging time rather than
/// the commit wall-clock.
async fn submit_feedback_with_timestamps(
    db: &SqlitePool,
    user_ref: UserId,
    playlist_ref: PlaylistId,
    items: &[(FeedbackInput, DateTime<Utc>)],
    stage: bool,
) -> Result<SubmitFeedbackOutcome, Error> {
    let mut tx = db.begin().await?;
    let mut outcome = SubmitFeedbackOutcome::default();

    for (input, desired_practiced) in items {
        match process_one(db, &mut tx, user_ref, playlist_ref, *desired_practiced, input, stage).await {
            Ok(()) => outcome.succeeded.push(input.tune_id),
            Err(Error::Library(library_error)) => {
                log::warn!(
                    "feedback for tune {} (playlist {playlist_ref}) failed: {library_error}",
                    input.tune_id
                );
                outcome.per_tune_errors.push(TuneFeedbackError {
                    tune_id: input.tune_id,
                    error: library_error.to_string(),
                });
            }
            Err(storage_error) => return Err(storage_error),
        }
    }

    tx.commit().await?;
    log::info!(
        "committed feedback for user {user_ref} playlist {playlist_ref}: {} succeeded, {} failed (stage={stage})",
        outcome.succeeded.len(),
        outcome.per_tune_errors.len(),
    );
    Ok(outcome)
}

#[derive(sqlx::FromRow)]
struct StagedRow {
    tune_ref: TuneId,
    quality: Option<i64>,
    practiced: Option<String>,
    goal: Option<String>,
    technique: Option<String>,
}

/// `commit_staged(playlist)` (§6.1): commits every staged row with a non-null quality for
/// `(user_ref, playlist_ref)`. Same per-tune partial-failure policy as `submit_feedback`. The
/// committed `PracticeRecord.practiced` is the staged `practiced` value, not the commit instant —
/// staging and committing can happen minutes or days apart.
pub async fn commit_staged(
    db: &SqlitePool,
    user_ref: UserId,
    playlist_ref: PlaylistId,
) -> Result<SubmitFeedbackOutcome, Error> {
    let staged = sqlx::query_as::<_, StagedRow>(
        r"SELECT tune_ref, quality, practiced, goal, technique FROM table_transient_data
          WHERE user_ref = ? AND playlist_ref = ? AND purpose = 'practice' AND quality IS NOT NULL",
    )
    .bind(user_ref)
    .bind(playlist_ref)
    .fetch_all(db)
    .await?;

    let items: Vec<(FeedbackInput, DateTime<Utc>)> = staged
        .into_iter()
        .map(|row| {
            let practiced = row
                .practiced
                .as_deref()
                .and_then(crate::queue::generator::parse_ts)
                .unwrap_or_else(|| {
                    log::warn!(
                        "staged row for tune {} (playlist {playlist_ref}) has no parseable \
                         practiced timestamp; falling back to commit time",
                        row.tune_ref
                    );
                    Utc::now()
                });
            (
                FeedbackInput {
                    tune_id: row.tune_ref,
                    feedback: staged_label_from_quality(row.quality, row.technique.as_deref()),
                    goal: row.goal.and_then(|g| g.parse().ok()),
                    technique: row.technique.and_then(|t| t.parse().ok()),
                },
                practiced,
            )
        })
        .collect();

    // Re-resolving from the numeric quality rather than trusting a stored label keeps the
    // commit path symmetric with a fresh `submit_feedback(stage=false)` call; both ultimately
    // recompute via the Scheduler Facade against the authoritative latest PracticeRecord.
    submit_feedback_with_timestamps(db, user_ref, playlist_ref, &items, false).await
}

fn staged_label_from_quality(quality: Option<i64>, technique: Option<&str>) -> String {
    let is_sm2 = technique.and_then(|t| t.parse::<Technique>().ok()).is_some_and(Technique::is_sm2_scale);
    let q = quality.unwrap_or(0);
    if is_sm2 {
        match q {
            0 => "failed",
            1 => "barely",
            2 => "struggled",
            3 => "recalled",
            4 => "trivial",
            _ => "perfect",
        }
    } else {
        match q {
            0 => "again",
            1 => "hard",
            2 => "good",
            _ => "easy",
        }
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed(db: &SqlitePool) {
        sqlx::query("INSERT INTO playlist (id, user_ref) VALUES (1, 1)").execute(db).await.unwrap();
        sqlx::query("INSERT INTO tune (id, title) VALUES (634, 'The Maid Behind the Bar')")
            .execute(db)
            .await
            .unwrap();
        sqlx::query("INSERT INTO playlist_tune (playlist_ref, tune_ref) VALUES (1, 634)")
            .execute(db)
            .await
            .unwrap();
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn scenario_first_review_good_sm2(db: SqlitePool) {
        seed(&db).await;
        let sit_down = DateTime::from_timestamp(1_735_638_477, 0).unwrap();
        let inputs = vec![FeedbackInput {
            tune_id: 634,
            feedback: "good".to_string(),
            goal: None,
            technique: Some(Technique::Sm2),
        }];
        let outcome = submit_feedback(&db, 1, 1, sit_down, &inputs, false).await.unwrap();
        assert_eq!(outcome.succeeded, vec![634]);
        assert!(outcome.per_tune_errors.is_empty());

        let latest = repository::get_latest_practice_record(&db, 1, 634).await.unwrap().unwrap();
        assert_eq!(latest.quality, 3);
        assert_eq!(latest.repetitions, Some(1));
        assert_eq!(latest.interval, Some(1));
        assert!(latest.easiness.unwrap() >= 2.36 && latest.easiness.unwrap() <= 2.46);

        let playlist_tune = repository::get_playlist_tune(&db, 1, 634).await.unwrap();
        assert!(playlist_tune.scheduled.is_some());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn scenario_fsrs_again_then_good_respects_u1(db: SqlitePool) {
        seed(&db).await;
        let first_at = DateTime::from_timestamp(1_735_638_477, 0).unwrap();
        let second_at = first_at + Duration::seconds(60);

        submit_feedback(
            &db,
            1,
            1,
            first_at,
            &[FeedbackInput { tune_id: 634, feedback: "again".to_string(), goal: None, technique: Some(Technique::Fsrs) }],
            false,
        )
        .await
        .unwrap();
        submit_feedback(
            &db,
            1,
            1,
            second_at,
            &[FeedbackInput { tune_id: 634, feedback: "good".to_string(), goal: None, technique: Some(Technique::Fsrs) }],
            false,
        )
        .await
        .unwrap();

        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT practiced, review_date FROM practice_record WHERE tune_ref = 634 ORDER BY id",
        )
        .fetch_all(&db)
        .await
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_ne!(rows[0].0, rows[1].0);
        assert!(rows[1].1 > rows[0].1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn unknown_label_is_a_per_tune_error_not_a_fatal_one(db: SqlitePool) {
        seed(&db).await;
        let sit_down = Utc::now();
        let outcome = submit_feedback(
            &db,
            1,
            1,
            sit_down,
            &[FeedbackInput { tune_id: 634, feedback: "bogus".to_string(), goal: None, technique: None }],
            false,
        )
        .await
        .unwrap();
        assert!(outcome.succeeded.is_empty());
        assert_eq!(outcome.per_tune_errors.len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn staged_then_committed_round_trip(db: SqlitePool) {
        seed(&db).await;
        let sit_down = Utc::now();
        submit_feedback(
            &db,
            1,
            1,
            sit_down,
            &[FeedbackInput { tune_id: 634, feedback: "good".to_string(), goal: None, technique: Some(Technique::Sm2) }],
            true,
        )
        .await
        .unwrap();

        let staged: (Option<i64>, Option<String>) =
            sqlx::query_as("SELECT quality, practiced FROM table_transient_data WHERE tune_ref = 634")
                .fetch_one(&db)
                .await
                .unwrap();
        assert!(staged.0.is_some());
        assert!(staged.1.is_some());

        let outcome = commit_staged(&db, 1, 1).await.unwrap();
        assert_eq!(outcome.succeeded, vec![634]);

        let remaining = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM table_transient_data WHERE tune_ref = 634 AND quality IS NOT NULL",
        )
        .fetch_one(&db)
        .await
        .unwrap();
        assert_eq!(remaining, 0);
    }
}
