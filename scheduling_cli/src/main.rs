use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::{Error, IntoDiagnostic, miette};
use scheduling::api;
use scheduling::config::{Environment, get_data_dir, get_env_config};
use scheduling::feedback::FeedbackInput;
use scheduling::model::{AlgType, Goal, PlaylistId, Technique, TuneId, UserId};
use sqlx::{
    Sqlite,
    migrate::{MigrateDatabase, Migrator},
    sqlite::{SqlitePool, SqlitePoolOptions},
};
use std::path::PathBuf;

/// Repertoire practice scheduling engine
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(short, long, default_value_t = Environment::Production)]
    environment: Environment,

    /// Acting user. Every operation is scoped to this user.
    #[arg(short, long)]
    user: UserId,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch today's practice queue for a playlist, generating it first if needed
    Queue(QueueArgs),
    /// Deactivate the active snapshot so the next `queue` call regenerates from scratch
    Reset { playlist: PlaylistId },
    /// Top up an existing snapshot with additional backlog tunes
    Refill(RefillArgs),
    /// Manually add specific tunes to today's queue
    Add(AddArgs),
    /// Record feedback for one or more tunes just practiced
    Feedback(FeedbackArgs),
    /// Promote all staged feedback for a playlist into permanent practice history
    CommitStaged { playlist: PlaylistId },
    /// Print or update the scheduling preferences for the acting user
    Prefs(PrefsArgs),
    /// Print or update spaced-repetition algorithm preferences for the acting user
    SrPrefs(SrPrefsArgs),
}

#[derive(Debug, clap::Args)]
struct QueueArgs {
    playlist: PlaylistId,
    /// Minutes east of UTC for the local calendar day. Defaults to the system's local offset.
    #[arg(long)]
    tz_offset_minutes: Option<i32>,
    /// Discard the active snapshot and regenerate before returning it
    #[arg(long)]
    force_regen: bool,
}

#[derive(Debug, clap::Args)]
struct RefillArgs {
    playlist: PlaylistId,
    #[arg(long)]
    tz_offset_minutes: Option<i32>,
    /// How many additional tunes to pull from the backlog
    #[arg(long, default_value_t = 1)]
    count: usize,
}

#[derive(Debug, clap::Args)]
struct AddArgs {
    playlist: PlaylistId,
    /// Comma-separated tune ids
    #[arg(long, value_delimiter = ',')]
    tunes: Vec<TuneId>,
    #[arg(long)]
    tz_offset_minutes: Option<i32>,
}

#[derive(Debug, clap::Args)]
struct FeedbackArgs {
    playlist: PlaylistId,
    tune: TuneId,
    /// Free-text feedback label (e.g. `good`, `struggled`, `not_set`)
    feedback: String,
    #[arg(long)]
    goal: Option<Goal>,
    #[arg(long)]
    technique: Option<Technique>,
    /// Write to the staging area instead of committing immediately
    #[arg(long)]
    stage: bool,
}

#[derive(Debug, clap::Args)]
struct PrefsArgs {
    #[command(subcommand)]
    command: PrefsCommands,
}

#[derive(Debug, Subcommand)]
enum PrefsCommands {
    Get,
    Set {
        #[arg(long)]
        acceptable_delinquency_window: Option<i64>,
        #[arg(long)]
        min_reviews_per_day: Option<i64>,
        #[arg(long)]
        max_reviews_per_day: Option<i64>,
        #[arg(long)]
        days_per_week: Option<i64>,
    },
}

#[derive(Debug, clap::Args)]
struct SrPrefsArgs {
    alg: AlgType,
    #[command(subcommand)]
    command: SrPrefsCommands,
}

#[derive(Debug, Subcommand)]
enum SrPrefsCommands {
    Get,
    Set {
        #[arg(long)]
        request_retention: Option<f64>,
        #[arg(long)]
        maximum_interval: Option<i64>,
        #[arg(long)]
        enable_fuzzing: Option<bool>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let args = Cli::parse();
    let res = process_args(args).await;
    if let Err(e) = res {
        println!("{e:?}");
        std::process::exit(1);
    }
}

async fn connect(environment: Environment) -> Result<SqlitePool, Error> {
    let _ = get_data_dir();
    let env_config = get_env_config(environment);

    let mut database_already_exists = false;
    if Sqlite::database_exists(env_config.database_url.as_str())
        .await
        .unwrap_or(false)
    {
        database_already_exists = true;
    } else {
        Sqlite::create_database(env_config.database_url.as_str())
            .await
            .into_diagnostic()?;
    }

    let pool = SqlitePoolOptions::new()
        .max_lifetime(None)
        .idle_timeout(None)
        .connect(&env_config.database_url)
        .await
        .map_err(|e| miette!("Failed to connect to the database: {:?}", e))?;

    if !database_already_exists {
        let crate_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
        let mut migrations_path = PathBuf::from(&crate_dir);
        migrations_path.push("..");
        migrations_path.push("scheduling");
        migrations_path.push("migrations");
        Migrator::new(migrations_path)
            .await
            .into_diagnostic()?
            .run(&pool)
            .await
            .map_err(|e| miette!("Failed to migrate the database: {:?}", e))?;
    }

    Ok(pool)
}

fn local_tz_offset_minutes() -> i32 {
    Local::now().offset().local_minus_utc() / 60
}

#[allow(clippy::too_many_lines)]
async fn process_args(args: Cli) -> Result<(), Error> {
    let pool = connect(args.environment).await?;
    let user_ref = args.user;
    let now: DateTime<Utc> = Utc::now();

    match args.command {
        Commands::Queue(queue_args) => {
            let tz = queue_args
                .tz_offset_minutes
                .unwrap_or_else(local_tz_offset_minutes);
            let entries = api::get_queue(
                &pool,
                user_ref,
                queue_args.playlist,
                now,
                Some(tz),
                queue_args.force_regen,
            )
            .await
            .map_err(|e| miette!("{e}"))?;
            print_queue(&entries);
        }
        Commands::Reset { playlist } => {
            let outcome = api::reset_queue(&pool, user_ref, playlist)
                .await
                .map_err(|e| miette!("{e}"))?;
            println!(
                "{}",
                format!("deactivated {} queue rows", outcome.deactivated).green()
            );
        }
        Commands::Refill(refill_args) => {
            let tz = refill_args
                .tz_offset_minutes
                .unwrap_or_else(local_tz_offset_minutes);
            let entries = api::refill_queue(
                &pool,
                user_ref,
                refill_args.playlist,
                now,
                Some(tz),
                refill_args.count,
            )
            .await
            .map_err(|e| miette!("{e}"))?;
            print_queue(&entries);
        }
        Commands::Add(add_args) => {
            let tz = add_args
                .tz_offset_minutes
                .unwrap_or_else(local_tz_offset_minutes);
            let outcome = api::add_tunes_to_queue(
                &pool,
                user_ref,
                add_args.playlist,
                &add_args.tunes,
                now,
                Some(tz),
            )
            .await
            .map_err(|e| miette!("{e}"))?;
            println!(
                "added {}, skipped {} already active, {} missing, {} duplicate",
                outcome.added.len(),
                outcome.skipped_existing.len(),
                outcome.missing.len(),
                outcome.duplicate_request_ignored.len()
            );
        }
        Commands::Feedback(feedback_args) => {
            let outcome = api::submit_feedback(
                &pool,
                user_ref,
                feedback_args.playlist,
                now,
                &[FeedbackInput {
                    tune_id: feedback_args.tune,
                    feedback: feedback_args.feedback,
                    goal: feedback_args.goal,
                    technique: feedback_args.technique,
                }],
                feedback_args.stage,
            )
            .await
            .map_err(|e| miette!("{e}"))?;
            if outcome.per_tune_errors.is_empty() {
                println!("{}", "feedback recorded".green());
            }
            for tune_error in outcome.per_tune_errors {
                println!(
                    "{}",
                    format!("tune {}: {}", tune_error.tune_id, tune_error.error).red()
                );
            }
        }
        Commands::CommitStaged { playlist } => {
            let outcome = api::commit_staged(&pool, user_ref, playlist)
                .await
                .map_err(|e| miette!("{e}"))?;
            println!("{}", format!("committed {} staged tunes", outcome.count).green());
        }
        Commands::Prefs(prefs_args) => match prefs_args.command {
            PrefsCommands::Get => {
                let prefs = api::get_scheduling_prefs(&pool, user_ref)
                    .await
                    .map_err(|e| miette!("{e}"))?;
                println!("{prefs:#?}");
            }
            PrefsCommands::Set {
                acceptable_delinquency_window,
                min_reviews_per_day,
                max_reviews_per_day,
                days_per_week,
            } => {
                let mut prefs = api::get_scheduling_prefs(&pool, user_ref)
                    .await
                    .map_err(|e| miette!("{e}"))?;
                if let Some(v) = acceptable_delinquency_window {
                    prefs.acceptable_delinquency_window = v;
                }
                if let Some(v) = min_reviews_per_day {
                    prefs.min_reviews_per_day = v;
                }
                if let Some(v) = max_reviews_per_day {
                    prefs.max_reviews_per_day = v;
                }
                if let Some(v) = days_per_week {
                    prefs.days_per_week = v;
                }
                api::set_scheduling_prefs(&pool, user_ref, &prefs)
                    .await
                    .map_err(|e| miette!("{e}"))?;
                println!("{}", "scheduling preferences updated".green());
            }
        },
        Commands::SrPrefs(sr_prefs_args) => match sr_prefs_args.command {
            SrPrefsCommands::Get => {
                let prefs = api::get_sr_prefs(&pool, user_ref, sr_prefs_args.alg)
                    .await
                    .map_err(|e| miette!("{e}"))?;
                println!("{prefs:#?}");
            }
            SrPrefsCommands::Set {
                request_retention,
                maximum_interval,
                enable_fuzzing,
            } => {
                let mut prefs = api::get_sr_prefs(&pool, user_ref, sr_prefs_args.alg)
                    .await
                    .map_err(|e| miette!("{e}"))?;
                if let Some(v) = request_retention {
                    prefs.request_retention = Some(v);
                }
                if let Some(v) = maximum_interval {
                    prefs.maximum_interval = Some(v);
                }
                if let Some(v) = enable_fuzzing {
                    prefs.enable_fuzzing = v;
                }
                api::set_sr_prefs(&pool, user_ref, &prefs)
                    .await
                    .map_err(|e| miette!("{e}"))?;
                println!("{}", "spaced-repetition preferences updated".green());
            }
        },
    }
    Ok(())
}

fn print_queue(entries: &[api::QueueEntry]) {
    if entries.is_empty() {
        println!("{}", "queue is empty".yellow());
        return;
    }
    for entry in entries {
        let staged_marker = if entry.has_staged { " [staged]" } else { "" };
        println!(
            "{:>4}  bucket {}  {}{}",
            entry.tune_ref,
            entry.bucket,
            entry.title,
            staged_marker.yellow()
        );
    }
}
