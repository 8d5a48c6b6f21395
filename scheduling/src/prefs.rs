//! Component I, the Preferences Store.

use sqlx::SqlitePool;

use crate::model::{
    AlgType, SchedulingPrefs, SrPrefs, UserId, DEFAULT_ACCEPTABLE_DELINQUENCY_WINDOW,
    DEFAULT_DAYS_PER_WEEK, DEFAULT_EXCEPTIONS, DEFAULT_MAX_REVIEWS_PER_DAY,
    DEFAULT_MIN_REVIEWS_PER_DAY, DEFAULT_WEEKLY_RULES,
};
use crate::Error;

#[derive(sqlx::FromRow)]
struct SchedulingPrefsRow {
    acceptable_delinquency_window: Option<i64>,
    min_reviews_per_day: Option<i64>,
    max_reviews_per_day: Option<i64>,
    days_per_week: Option<i64>,
    weekly_rules: Option<String>,
    exceptions: Option<String>,
}

/// Read-through with a transient default: a missing row is never persisted just by reading it,
/// and any null legacy column is backfilled with its documented default.
pub async fn get_scheduling_prefs_or_defaults(
    db: &SqlitePool,
    user_ref: UserId,
) -> Result<SchedulingPrefs, Error> {
    let row = sqlx::query_as::<_, SchedulingPrefsRow>(
        r"SELECT acceptable_delinquency_window, min_reviews_per_day, max_reviews_per_day,
                 days_per_week, weekly_rules, exceptions
          FROM prefs_scheduling_options WHERE user_ref = ?",
    )
    .bind(user_ref)
    .fetch_optional(db)
    .await?;

    Ok(match row {
        Some(row) => SchedulingPrefs {
            acceptable_delinquency_window: row
                .acceptable_delinquency_window
                .unwrap_or(DEFAULT_ACCEPTABLE_DELINQUENCY_WINDOW),
            min_reviews_per_day: row.min_reviews_per_day.unwrap_or(DEFAULT_MIN_REVIEWS_PER_DAY),
            max_reviews_per_day: row.max_reviews_per_day.unwrap_or(DEFAULT_MAX_REVIEWS_PER_DAY),
            days_per_week: row.days_per_week.unwrap_or(DEFAULT_DAYS_PER_WEEK),
            weekly_rules: row.weekly_rules.unwrap_or_else(|| DEFAULT_WEEKLY_RULES.to_string()),
            exceptions: row.exceptions.unwrap_or_else(|| DEFAULT_EXCEPTIONS.to_string()),
        },
        None => SchedulingPrefs::default(),
    })
}

pub async fn set_scheduling_prefs(
    db: &SqlitePool,
    user_ref: UserId,
    prefs: &SchedulingPrefs,
) -> Result<(), Error> {
    sqlx::query(
        r"INSERT INTO prefs_scheduling_options
              (user_ref, acceptable_delinquency_window, min_reviews_per_day, max_reviews_per_day,
               days_per_week, weekly_rules, exceptions)
          VALUES (?, ?, ?, ?, ?, ?, ?)
          ON CONFLICT(user_ref) DO UPDATE SET
              acceptable_delinquency_window = excluded.acceptable_delinquency_window,
              min_reviews_per_day = excluded.min_reviews_per_day,
              max_reviews_per_day = excluded.max_reviews_per_day,
              days_per_week = excluded.days_per_week,
              weekly_rules = excluded.weekly_rules,
              exceptions = excluded.exceptions",
    )
    .bind(user_ref)
    .bind(prefs.acceptable_delinquency_window)
    .bind(prefs.min_reviews_per_day)
    .bind(prefs.max_reviews_per_day)
    .bind(prefs.days_per_week)
    .bind(&prefs.weekly_rules)
    .bind(&prefs.exceptions)
    .execute(db)
    .await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct SrPrefsRow {
    fsrs_weights: Option<String>,
    request_retention: Option<f64>,
    maximum_interval: Option<i64>,
    learning_steps: Option<String>,
    relearning_steps: Option<String>,
    enable_fuzzing: bool,
}

/// Missing record yields defaults: SM-2 uses no weights, FSRS uses the published default
/// parameters (left as `None` here — the FSRS scheduler substitutes `rs_fsrs::Parameters`'s own
/// defaults when `fsrs_weights` is `None`).
pub async fn get_sr_prefs(
    db: &SqlitePool,
    user_ref: UserId,
    alg_type: AlgType,
) -> Result<SrPrefs, Error> {
    let row = sqlx::query_as::<_, SrPrefsRow>(
        r"SELECT fsrs_weights, request_retention, maximum_interval, learning_steps,
                 relearning_steps, enable_fuzzing
          FROM prefs_spaced_repetition WHERE user_ref = ? AND alg_type = ?",
    )
    .bind(user_ref)
    .bind(alg_type.to_string())
    .fetch_optional(db)
    .await?;

    Ok(match row {
        Some(row) => SrPrefs {
            alg_type,
            fsrs_weights: row
                .fsrs_weights
                .and_then(|w| serde_json::from_str::<Vec<f64>>(&w).ok())
                .and_then(|w| w.try_into().ok()),
            request_retention: row.request_retention,
            maximum_interval: row.maximum_interval,
            learning_steps: row
                .learning_steps
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default(),
            relearning_steps: row
                .relearning_steps
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default(),
            enable_fuzzing: row.enable_fuzzing,
        },
        None => SrPrefs::default_for(alg_type),
    })
}

pub async fn set_sr_prefs(db: &SqlitePool, user_ref: UserId, prefs: &SrPrefs) -> Result<(), Error> {
    let fsrs_weights = prefs
        .fsrs_weights
        .map(|w| serde_json::to_string(&w).unwrap_or_default());
    let learning_steps = serde_json::to_string(&prefs.learning_steps).unwrap_or_default();
    let relearning_steps = serde_json::to_string(&prefs.relearning_steps).unwrap_or_default();

    sqlx::query(
        r"INSERT INTO prefs_spaced_repetition
              (user_ref, alg_type, fsrs_weights, request_retention, maximum_interval,
               learning_steps, relearning_steps, enable_fuzzing)
          VALUES (?, ?, ?, ?, ?, ?, ?, ?)
          ON CONFLICT(user_ref, alg_type) DO UPDATE SET
              fsrs_weights = excluded.fsrs_weights,
              request_retention = excluded.request_retention,
              maximum_interval = excluded.maximum_interval,
              learning_steps = excluded.learning_steps,
              relearning_steps = excluded.relearning_steps,
              enable_fuzzing = excluded.enable_fuzzing",
    )
    .bind(user_ref)
    .bind(prefs.alg_type.to_string())
    .bind(fsrs_weights)
    .bind(prefs.request_retention)
    .bind(prefs.maximum_interval)
    .bind(learning_steps)
    .bind(relearning_steps)
    .bind(prefs.enable_fuzzing)
    .execute(db)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(migrations = "./migrations")]
    async fn missing_scheduling_prefs_yields_documented_defaults(db: SqlitePool) {
        let prefs = get_scheduling_prefs_or_defaults(&db, 1).await.unwrap();
        assert_eq!(prefs.acceptable_delinquency_window, 7);
        assert_eq!(prefs.min_reviews_per_day, 3);
        assert_eq!(prefs.max_reviews_per_day, 10);
        assert_eq!(prefs.days_per_week, 7);
        assert_eq!(prefs.weekly_rules, "{}");
        assert_eq!(prefs.exceptions, "[]");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn set_then_get_scheduling_prefs_round_trips(db: SqlitePool) {
        let mut prefs = SchedulingPrefs::default();
        prefs.max_reviews_per_day = 20;
        set_scheduling_prefs(&db, 1, &prefs).await.unwrap();
        let fetched = get_scheduling_prefs_or_defaults(&db, 1).await.unwrap();
        assert_eq!(fetched.max_reviews_per_day, 20);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn missing_sr_prefs_yields_defaults_for_alg(db: SqlitePool) {
        let prefs = get_sr_prefs(&db, 1, AlgType::FSRS).await.unwrap();
        assert_eq!(prefs.alg_type, AlgType::FSRS);
        assert!(prefs.fsrs_weights.is_none());
        assert!(!prefs.enable_fuzzing);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn set_then_get_sr_prefs_round_trips(db: SqlitePool) {
        let mut prefs = SrPrefs::default_for(AlgType::FSRS);
        prefs.enable_fuzzing = true;
        prefs.fsrs_weights = Some([0.5; 17]);
        set_sr_prefs(&db, 1, &prefs).await.unwrap();
        let fetched = get_sr_prefs(&db, 1, AlgType::FSRS).await.unwrap();
        assert!(fetched.enable_fuzzing);
        assert_eq!(fetched.fsrs_weights, Some([0.5; 17]));
    }
}
