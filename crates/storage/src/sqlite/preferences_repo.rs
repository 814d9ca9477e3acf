use async_trait::async_trait;
use chrono::Utc;
use lesson_core::model::PlaybackSettings;

use super::SqliteRepository;
use super::mapping::{conn, map_preferences_row};
use crate::repository::{PreferenceRepository, StorageError};

#[async_trait]
impl PreferenceRepository for SqliteRepository {
    async fn get_preferences(&self, owner: &str) -> Result<Option<PlaybackSettings>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT
                playback_speed,
                pause_between_repeats_ms,
                repeat_count,
                random_mode
            FROM playback_preferences
            WHERE owner = ?1
            ",
        )
        .bind(owner)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };
        map_preferences_row(&row).map(Some)
    }

    async fn save_preferences(
        &self,
        owner: &str,
        settings: &PlaybackSettings,
    ) -> Result<(), StorageError> {
        let pause_ms = i64::try_from(settings.pause_between_repeats().as_millis())
            .map_err(|_| StorageError::Serialization("pause overflow".into()))?;

        sqlx::query(
            r"
            INSERT INTO playback_preferences (
                owner,
                playback_speed,
                pause_between_repeats_ms,
                repeat_count,
                random_mode,
                updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(owner) DO UPDATE SET
                playback_speed = excluded.playback_speed,
                pause_between_repeats_ms = excluded.pause_between_repeats_ms,
                repeat_count = excluded.repeat_count,
                random_mode = excluded.random_mode,
                updated_at = excluded.updated_at
            ",
        )
        .bind(owner)
        .bind(f64::from(settings.playback_speed()))
        .bind(pause_ms)
        .bind(settings.repeat_count().as_option().map(i64::from))
        .bind(settings.random_mode())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }
}
