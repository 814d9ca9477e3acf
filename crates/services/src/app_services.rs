use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::audio::{AudioCache, AudioResolver, HttpAudioResolver, StaticAudioResolver};
use crate::config::EngineConfig;
use crate::error::ServicesError;
use crate::lesson::LessonService;
use crate::preference_service::PreferenceService;
use crate::sync::ProgressSync;

/// Assembles the engine services over one storage backend.
///
/// Must be built inside a tokio runtime: it starts the progress sync worker.
#[derive(Clone)]
pub struct AppServices {
    config: EngineConfig,
    sync: ProgressSync,
    lessons: Arc<LessonService>,
    preferences: Arc<PreferenceService>,
    audio: Arc<dyn AudioResolver>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage at `config.database_url`.
    ///
    /// # Errors
    ///
    /// Returns `ServicesError` if the database cannot be opened or migrated.
    pub async fn new_sqlite(config: EngineConfig, clock: Clock) -> Result<Self, ServicesError> {
        let storage = Storage::sqlite(&config.database_url).await?;
        tracing::info!(database_url = %config.database_url, "storage ready");
        Ok(Self::from_storage(config, clock, &storage))
    }

    /// Build services over in-memory storage.
    #[must_use]
    pub fn in_memory(config: EngineConfig, clock: Clock) -> Self {
        Self::from_storage(config, clock, &Storage::in_memory())
    }

    #[must_use]
    pub fn from_storage(config: EngineConfig, clock: Clock, storage: &Storage) -> Self {
        let sync = ProgressSync::spawn(Arc::clone(&storage.progress));
        let lessons = Arc::new(LessonService::new(
            clock,
            Arc::clone(&storage.content),
            Arc::clone(&storage.progress),
            sync.clone(),
        ));
        let preferences = Arc::new(PreferenceService::new(
            Arc::clone(&storage.preferences),
            config.preference_owner.clone(),
        ));
        let audio: Arc<dyn AudioResolver> = match &config.audio_base_url {
            Some(base) => Arc::new(HttpAudioResolver::new(base.clone())),
            None => Arc::new(StaticAudioResolver::new()),
        };

        Self {
            config,
            sync,
            lessons,
            preferences,
            audio,
        }
    }

    /// Replace the audio resolver, e.g. with a bundled table.
    #[must_use]
    pub fn with_audio_resolver(mut self, audio: Arc<dyn AudioResolver>) -> Self {
        self.audio = audio;
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn lessons(&self) -> Arc<LessonService> {
        Arc::clone(&self.lessons)
    }

    #[must_use]
    pub fn preferences(&self) -> Arc<PreferenceService> {
        Arc::clone(&self.preferences)
    }

    /// A fresh audio cache for one lesson session.
    #[must_use]
    pub fn audio_for_session(&self) -> AudioCache {
        AudioCache::new(Arc::clone(&self.audio))
    }

    /// Wait for queued progress writes, e.g. before shutdown.
    pub async fn flush(&self) {
        self.sync.flush().await;
    }

    #[must_use]
    pub fn failed_writes(&self) -> u64 {
        self.sync.failed_writes()
    }
}
