//! Shared error types for the services crate.

use thiserror::Error;

use lesson_core::machine::AnswerError;
use lesson_core::model::{DefinitionError, PlaybackSettingsError, TaskId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the lesson session controller and `LessonService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("no tasks available for session")]
    Empty,
    #[error("unknown task {0}")]
    UnknownTask(TaskId),
    #[error("task {task} is not available: {reason}")]
    Unavailable {
        task: TaskId,
        reason: DefinitionError,
    },
    #[error(transparent)]
    Answer(#[from] AnswerError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `PreferenceService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PreferenceError {
    #[error(transparent)]
    Settings(#[from] PlaybackSettingsError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by audio resolvers.
///
/// Callers treat these like "no audio"; they only show up in logs.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AudioError {
    #[error("audio base url cannot carry a path")]
    InvalidBase,
    #[error("audio lookup failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("audio lookup returned an invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors raised while reading `EngineConfig` from the environment.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid value for environment variable {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

/// Errors emitted while bootstrapping the engine services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServicesError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
