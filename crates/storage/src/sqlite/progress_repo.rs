use async_trait::async_trait;
use lesson_core::model::{LessonProgress, SessionId, TaskProgress};

use super::SqliteRepository;
use super::mapping::{
    conn, map_lesson_progress_row, map_task_progress_row, ser, session_id_to_text,
    task_id_to_i64,
};
use crate::repository::{ProgressRepository, StorageError};

#[async_trait]
impl ProgressRepository for SqliteRepository {
    async fn upsert_task_progress(&self, progress: &TaskProgress) -> Result<(), StorageError> {
        let data = serde_json::to_string(progress.completion_data()).map_err(ser)?;

        sqlx::query(
            r"
            INSERT INTO task_progress (
                session_id,
                task_id,
                status,
                completion_data,
                completed_at,
                updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(session_id, task_id) DO UPDATE SET
                status = excluded.status,
                completion_data = excluded.completion_data,
                completed_at = excluded.completed_at,
                updated_at = excluded.updated_at
            ",
        )
        .bind(session_id_to_text(progress.session_id()))
        .bind(task_id_to_i64(progress.task_id())?)
        .bind(progress.status().as_str())
        .bind(data)
        .bind(progress.completed_at())
        .bind(progress.updated_at())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn upsert_lesson_progress(&self, progress: &LessonProgress) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO lesson_progress (
                session_id,
                tasks_completed,
                total_tasks,
                status,
                completed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(session_id) DO UPDATE SET
                tasks_completed = excluded.tasks_completed,
                total_tasks = excluded.total_tasks,
                status = excluded.status,
                completed_at = excluded.completed_at
            ",
        )
        .bind(session_id_to_text(progress.session_id()))
        .bind(i64::from(progress.tasks_completed()))
        .bind(i64::from(progress.total_tasks()))
        .bind(progress.status().as_str())
        .bind(progress.completed_at())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn task_progress(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<TaskProgress>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT session_id, task_id, status, completion_data, completed_at, updated_at
            FROM task_progress
            WHERE session_id = ?1
            ORDER BY task_id ASC
            ",
        )
        .bind(session_id_to_text(session_id))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_task_progress_row(&row)?);
        }
        Ok(out)
    }

    async fn lesson_progress(
        &self,
        session_id: SessionId,
    ) -> Result<Option<LessonProgress>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT session_id, tasks_completed, total_tasks, status, completed_at
            FROM lesson_progress
            WHERE session_id = ?1
            ",
        )
        .bind(session_id_to_text(session_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_lesson_progress_row).transpose()
    }
}
