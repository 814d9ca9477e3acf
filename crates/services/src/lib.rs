#![forbid(unsafe_code)]
//! Async orchestration of lesson sessions: loading and sequencing lessons,
//! mirroring progress to storage, driving the vocabulary player and the
//! engagement timer.

pub mod app_services;
pub mod audio;
pub mod config;
pub mod engagement;
pub mod error;
pub mod lesson;
pub mod playback;
pub mod preference_service;
pub mod sync;

pub use lesson_core::Clock;

pub use app_services::AppServices;
pub use audio::{AudioCache, AudioResolver, HttpAudioResolver, StaticAudioResolver};
pub use config::EngineConfig;
pub use engagement::EngagementTicker;
pub use error::{AudioError, ConfigError, PreferenceError, ServicesError, SessionError};
pub use lesson::{
    Activation, AnswerResult, EngagementReport, LessonService, SelectionMode, SessionController,
    SessionState, TaskSlot, TaskUpdate,
};
pub use playback::{AudioOutput, PlaybackHandle};
pub use preference_service::PreferenceService;
pub use sync::ProgressSync;
