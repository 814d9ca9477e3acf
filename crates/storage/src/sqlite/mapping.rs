use chrono::{DateTime, Utc};
use lesson_core::model::{
    CompletionData, LessonProgress, LessonStatus, PlaybackSettings, RepeatCount, SessionId,
    TaskDefinition, TaskId, TaskPayload, TaskProgress, TaskStatus,
};
use sqlx::Row;
use std::time::Duration;

use crate::repository::{SessionRecord, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn session_id_to_text(id: SessionId) -> String {
    id.value().to_string()
}

pub(crate) fn session_id_from_text(raw: &str) -> Result<SessionId, StorageError> {
    raw.parse::<SessionId>().map_err(ser)
}

pub(crate) fn task_id_to_i64(id: TaskId) -> Result<i64, StorageError> {
    i64::try_from(id.value()).map_err(|_| StorageError::Serialization("task_id overflow".into()))
}

pub(crate) fn task_id_from_i64(v: i64) -> Result<TaskId, StorageError> {
    u64::try_from(v)
        .map(TaskId::new)
        .map_err(|_| StorageError::Serialization("task_id sign overflow".into()))
}

pub(crate) fn map_session_row(row: &sqlx::sqlite::SqliteRow) -> Result<SessionRecord, StorageError> {
    let id: String = row.try_get("id").map_err(ser)?;
    Ok(SessionRecord {
        id: session_id_from_text(&id)?,
        title: row.try_get("title").map_err(ser)?,
        position: u32_from_i64("position", row.try_get::<i64, _>("position").map_err(ser)?)?,
    })
}

pub(crate) fn map_definition_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<TaskDefinition, StorageError> {
    let task_id = task_id_from_i64(row.try_get::<i64, _>("task_id").map_err(ser)?)?;
    let title: String = row.try_get("title").map_err(ser)?;
    let payload: String = row.try_get("payload").map_err(ser)?;
    match serde_json::from_str::<TaskPayload>(&payload) {
        Ok(payload) => Ok(TaskDefinition::new(task_id, title, payload)),
        Err(error) => {
            tracing::warn!(%task_id, %error, "unreadable task payload");
            Ok(TaskDefinition::unreadable(task_id, title, error.to_string()))
        }
    }
}

pub(crate) fn map_task_progress_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<TaskProgress, StorageError> {
    let session_id: String = row.try_get("session_id").map_err(ser)?;
    let status: String = row.try_get("status").map_err(ser)?;
    let data: String = row.try_get("completion_data").map_err(ser)?;
    let data = serde_json::from_str::<serde_json::Value>(&data).map_err(ser)?;
    let completed_at: Option<DateTime<Utc>> = row.try_get("completed_at").map_err(ser)?;
    let updated_at: Option<DateTime<Utc>> = row.try_get("updated_at").map_err(ser)?;

    TaskProgress::from_persisted(
        session_id_from_text(&session_id)?,
        task_id_from_i64(row.try_get::<i64, _>("task_id").map_err(ser)?)?,
        status.parse::<TaskStatus>().map_err(ser)?,
        CompletionData::from_value(data).map_err(ser)?,
        completed_at,
        updated_at,
    )
    .map_err(ser)
}

pub(crate) fn map_lesson_progress_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<LessonProgress, StorageError> {
    let session_id: String = row.try_get("session_id").map_err(ser)?;
    let status: String = row.try_get("status").map_err(ser)?;

    LessonProgress::from_persisted(
        session_id_from_text(&session_id)?,
        u32_from_i64(
            "tasks_completed",
            row.try_get::<i64, _>("tasks_completed").map_err(ser)?,
        )?,
        u32_from_i64("total_tasks", row.try_get::<i64, _>("total_tasks").map_err(ser)?)?,
        status.parse::<LessonStatus>().map_err(ser)?,
        row.try_get("completed_at").map_err(ser)?,
    )
    .map_err(ser)
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn map_preferences_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<PlaybackSettings, StorageError> {
    let speed: f64 = row.try_get("playback_speed").map_err(ser)?;
    let pause_ms = u32_from_i64(
        "pause_between_repeats_ms",
        row.try_get::<i64, _>("pause_between_repeats_ms").map_err(ser)?,
    )?;
    let repeat_count = row
        .try_get::<Option<i64>, _>("repeat_count")
        .map_err(ser)?
        .map(|v| u32_from_i64("repeat_count", v))
        .transpose()?;
    let random_mode: bool = row.try_get("random_mode").map_err(ser)?;

    PlaybackSettings::new(
        speed as f32,
        Duration::from_millis(u64::from(pause_ms)),
        RepeatCount::from_option(repeat_count).map_err(ser)?,
        random_mode,
    )
    .map_err(ser)
}
