pub mod api;
pub mod config;
pub mod feedback;
pub mod model;
pub mod prefs;
pub mod quality;
pub mod queue;
pub mod repository;
pub mod schedulers;
pub mod window;

use miette::Diagnostic;
use model::{RatingId, StateId};
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Sqlx Error: {source}")]
    Sqlx { source: sqlx::Error },
    #[error("Io Error: {description}, {source}")]
    Io {
        description: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    #[diagnostic(transparent)]
    Library(#[from] LibraryError),
}

impl From<sqlx::Error> for Error {
    fn from(source: sqlx::Error) -> Self {
        Error::Sqlx { source }
    }
}

// Note that `LibraryError` is `Clone` while `Error` is not, so per-tune failures can be
// accumulated into a response alongside successes without giving up the `sqlx::Error` source.
#[derive(Clone, Debug, Diagnostic, Error)]
pub enum LibraryError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Quality(#[from] QualityErrorKind),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Scheduler(#[from] SchedulerErrorKind),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Repository(#[from] RepositoryErrorKind),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Queue(#[from] QueueErrorKind),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Feedback(#[from] FeedbackErrorKind),
    #[error("{0}")]
    InvalidConfig(String),
}

#[derive(Clone, Debug, Diagnostic, Error)]
pub enum QualityErrorKind {
    #[error("Unknown feedback label `{0}`.")]
    UnknownLabel(String),
    #[error("Quality `{quality}` is out of range `{lo}..={hi}` for technique `{technique}`.")]
    OutOfRange {
        quality: i64,
        lo: u8,
        hi: u8,
        technique: String,
    },
}

#[derive(Clone, Debug, Diagnostic, Error)]
pub enum SchedulerErrorKind {
    #[error("No scheduler named `{0}` was found.")]
    NotFound(String),
    #[error("Invalid FSRS state. Received `{0}`.")]
    InvalidState(StateId),
    #[error("Invalid FSRS rating. Received `{0}`.")]
    InvalidRating(RatingId),
    #[error("`{scheduler_name}` scheduler returned an error: {error}")]
    Custom {
        scheduler_name: String,
        error: String,
    },
}

#[derive(Clone, Debug, Diagnostic, Error)]
pub enum RepositoryErrorKind {
    #[error("No playlist_tune found for playlist {playlist_ref}, tune {tune_ref}.")]
    PlaylistTuneNotFound { playlist_ref: i64, tune_ref: i64 },
}

#[derive(Clone, Debug, Diagnostic, Error)]
pub enum QueueErrorKind {
    #[error("No active daily practice queue exists for playlist {playlist_ref}.")]
    NoActiveQueue { playlist_ref: i64 },
}

#[derive(Clone, Debug, Diagnostic, Error)]
pub enum FeedbackErrorKind {
    #[error("Cannot stage or commit feedback for a tune with unresolved quality.")]
    MissingQuality,
}
