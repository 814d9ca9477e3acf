use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates sessions with their task definitions, task and lesson progress, and
/// playback preferences.
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS sessions (
                    id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    position INTEGER NOT NULL CHECK (position >= 0)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS task_definitions (
                    session_id TEXT NOT NULL,
                    task_id INTEGER NOT NULL,
                    position INTEGER NOT NULL CHECK (position >= 0),
                    title TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    PRIMARY KEY (session_id, task_id),
                    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS task_progress (
                    session_id TEXT NOT NULL,
                    task_id INTEGER NOT NULL,
                    status TEXT NOT NULL
                        CHECK (status IN ('not_started', 'in_progress', 'completed')),
                    completion_data TEXT NOT NULL DEFAULT '{}',
                    completed_at TEXT,
                    updated_at TEXT,
                    PRIMARY KEY (session_id, task_id),
                    CHECK ((status = 'completed') = (completed_at IS NOT NULL))
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS lesson_progress (
                    session_id TEXT PRIMARY KEY,
                    tasks_completed INTEGER NOT NULL CHECK (tasks_completed >= 0),
                    total_tasks INTEGER NOT NULL CHECK (total_tasks >= 0),
                    status TEXT NOT NULL CHECK (status IN ('in_progress', 'completed')),
                    completed_at TEXT
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS playback_preferences (
                    owner TEXT PRIMARY KEY,
                    playback_speed REAL NOT NULL,
                    pause_between_repeats_ms INTEGER NOT NULL
                        CHECK (pause_between_repeats_ms >= 0),
                    repeat_count INTEGER CHECK (repeat_count IS NULL OR repeat_count > 0),
                    random_mode INTEGER NOT NULL,
                    updated_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_sessions_position
                    ON sessions(position, id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_task_definitions_session_position
                    ON task_definitions(session_id, position);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(version = 1, "applied sqlite migration");
    }

    Ok(())
}
