use std::sync::Arc;

use lesson_core::model::{PlaybackSettings, PlaybackSettingsError};
use storage::repository::PreferenceRepository;

use crate::error::PreferenceError;

/// Playback preferences of one user or device.
#[derive(Clone)]
pub struct PreferenceService {
    repo: Arc<dyn PreferenceRepository>,
    owner: String,
}

impl PreferenceService {
    #[must_use]
    pub fn new(repo: Arc<dyn PreferenceRepository>, owner: impl Into<String>) -> Self {
        Self {
            repo,
            owner: owner.into(),
        }
    }

    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Load persisted preferences (or defaults if missing).
    ///
    /// # Errors
    ///
    /// Returns `PreferenceError` on storage failures.
    pub async fn load(&self) -> Result<PlaybackSettings, PreferenceError> {
        let settings = self.repo.get_preferences(&self.owner).await?;
        Ok(settings.unwrap_or_default())
    }

    /// Persist already validated preferences.
    ///
    /// # Errors
    ///
    /// Returns `PreferenceError` on storage failures.
    pub async fn save(&self, settings: PlaybackSettings) -> Result<PlaybackSettings, PreferenceError> {
        self.repo.save_preferences(&self.owner, &settings).await?;
        tracing::debug!(owner = %self.owner, ?settings, "playback preferences saved");
        Ok(settings)
    }

    /// Load, change and save in one step.
    ///
    /// # Errors
    ///
    /// Returns `PreferenceError` if `change` rejects the value or storage fails.
    pub async fn update(
        &self,
        change: impl FnOnce(PlaybackSettings) -> Result<PlaybackSettings, PlaybackSettingsError>,
    ) -> Result<PlaybackSettings, PreferenceError> {
        let current = self.load().await?;
        let updated = change(current)?;
        self.save(updated).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lesson_core::model::RepeatCount;
    use std::time::Duration;
    use storage::repository::InMemoryRepository;

    #[tokio::test]
    async fn missing_preferences_fall_back_to_defaults() {
        let service = PreferenceService::new(Arc::new(InMemoryRepository::new()), "phone");
        assert_eq!(service.load().await.unwrap(), PlaybackSettings::default());
    }

    #[tokio::test]
    async fn update_persists_per_owner() {
        let repo = Arc::new(InMemoryRepository::new());
        let phone = PreferenceService::new(repo.clone(), "phone");
        let tablet = PreferenceService::new(repo, "tablet");

        let saved = phone
            .update(|s| {
                Ok(s.with_speed(0.75)?
                    .with_pause(Duration::from_secs(3))?
                    .with_repeat_count(RepeatCount::Infinite)
                    .with_random_mode(true))
            })
            .await
            .unwrap();
        assert_eq!(phone.load().await.unwrap(), saved);
        assert_eq!(saved.repeat_count(), RepeatCount::Infinite);
        assert_eq!(tablet.load().await.unwrap(), PlaybackSettings::default());
    }

    #[tokio::test]
    async fn invalid_change_is_rejected_and_not_saved() {
        let service = PreferenceService::new(Arc::new(InMemoryRepository::new()), "phone");
        let err = service.update(|s| s.with_speed(2.0)).await.unwrap_err();
        assert!(matches!(err, PreferenceError::Settings(_)));
        assert_eq!(service.load().await.unwrap(), PlaybackSettings::default());
    }
}
