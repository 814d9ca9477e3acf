use std::sync::Arc;

use lesson_core::Clock;
use lesson_core::model::{SessionId, TaskId};
use storage::repository::{ContentRepository, ProgressRepository};

use super::controller::SessionController;
use super::state::SessionState;
use crate::error::SessionError;
use crate::sync::ProgressSync;

/// Loads lesson sessions and sequences between them.
#[derive(Clone)]
pub struct LessonService {
    clock: Clock,
    content: Arc<dyn ContentRepository>,
    progress: Arc<dyn ProgressRepository>,
    sync: ProgressSync,
}

impl LessonService {
    #[must_use]
    pub fn new(
        clock: Clock,
        content: Arc<dyn ContentRepository>,
        progress: Arc<dyn ProgressRepository>,
        sync: ProgressSync,
    ) -> Self {
        Self {
            clock,
            content,
            progress,
            sync,
        }
    }

    /// Load a session with its stored progress.
    ///
    /// `deep_link` names a task that must be selected first, whatever its status.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the session or its rows cannot be read,
    /// and `SessionError::Empty` if it has no task that can be shown.
    pub async fn load(
        &self,
        session_id: SessionId,
        deep_link: Option<TaskId>,
    ) -> Result<SessionController, SessionError> {
        let definitions = self.content.get_task_definitions(session_id).await?;
        let stored_tasks = self.progress.task_progress(session_id).await?;
        let stored_lesson = self.progress.lesson_progress(session_id).await?;

        let restored = SessionState::restore(
            session_id,
            definitions,
            stored_tasks,
            stored_lesson,
            deep_link,
            self.clock.now(),
        )?;
        let lesson = restored.state.lesson();
        tracing::info!(
            %session_id,
            tasks = restored.state.slots().len(),
            tasks_completed = lesson.tasks_completed(),
            total_tasks = lesson.total_tasks(),
            "lesson session loaded"
        );

        let lesson_corrected = restored.lesson_corrected;
        let controller =
            SessionController::new(restored.state, self.clock.clone(), self.sync.clone());
        if lesson_corrected {
            tracing::debug!(%session_id, "stored lesson row is stale or missing, rewriting");
            controller.push_lesson();
        }
        Ok(controller)
    }

    /// The session that follows `session_id` in the course, if any.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` on storage failures.
    pub async fn next_session(
        &self,
        session_id: SessionId,
    ) -> Result<Option<SessionId>, SessionError> {
        Ok(self.content.next_session(session_id).await?)
    }
}
