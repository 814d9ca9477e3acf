use async_trait::async_trait;
use lesson_core::model::{SessionId, TaskDefinition};

use super::SqliteRepository;
use super::mapping::{
    conn, map_definition_row, map_session_row, ser, session_id_to_text, task_id_to_i64,
};
use crate::repository::{ContentRepository, SessionRecord, StorageError};

#[async_trait]
impl ContentRepository for SqliteRepository {
    async fn upsert_session(
        &self,
        session: &SessionRecord,
        tasks: &[TaskDefinition],
    ) -> Result<(), StorageError> {
        let session_id = session_id_to_text(session.id);
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO sessions (id, title, position)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                position = excluded.position
            ",
        )
        .bind(&session_id)
        .bind(&session.title)
        .bind(i64::from(session.position))
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query("DELETE FROM task_definitions WHERE session_id = ?1")
            .bind(&session_id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (position, task) in tasks.iter().enumerate() {
            let payload = serde_json::to_string(task.payload()).map_err(ser)?;
            let position = i64::try_from(position)
                .map_err(|_| StorageError::Serialization("position overflow".into()))?;
            sqlx::query(
                r"
                INSERT INTO task_definitions (session_id, task_id, position, title, payload)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ",
            )
            .bind(&session_id)
            .bind(task_id_to_i64(task.id())?)
            .bind(position)
            .bind(task.title())
            .bind(payload)
            .execute(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
                other => conn(other),
            })?;
        }

        tx.commit().await.map_err(conn)?;
        tracing::debug!(session_id = %session.id, tasks = tasks.len(), "stored session content");
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<SessionRecord, StorageError> {
        let row = sqlx::query("SELECT id, title, position FROM sessions WHERE id = ?1")
            .bind(session_id_to_text(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        map_session_row(&row)
    }

    async fn get_task_definitions(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<TaskDefinition>, StorageError> {
        // distinguishes an unknown session from an empty one
        self.get_session(session_id).await?;

        let rows = sqlx::query(
            r"
            SELECT task_id, title, payload
            FROM task_definitions
            WHERE session_id = ?1
            ORDER BY position ASC, task_id ASC
            ",
        )
        .bind(session_id_to_text(session_id))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_definition_row(&row)?);
        }
        Ok(out)
    }

    async fn next_session(&self, session_id: SessionId) -> Result<Option<SessionId>, StorageError> {
        let current = self.get_session(session_id).await?;

        let row = sqlx::query(
            r"
            SELECT id, title, position
            FROM sessions
            WHERE position > ?1 OR (position = ?1 AND id > ?2)
            ORDER BY position ASC, id ASC
            LIMIT 1
            ",
        )
        .bind(i64::from(current.position))
        .bind(session_id_to_text(session_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.map(|row| map_session_row(&row).map(|record| record.id))
            .transpose()
    }
}
