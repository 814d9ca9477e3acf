use async_trait::async_trait;
use lesson_core::model::{
    LessonProgress, PlaybackSettings, SessionId, TaskDefinition, TaskId, TaskProgress,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A lesson as the content store knows it, including its place in the course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: SessionId,
    pub title: String,
    pub position: u32,
}

impl SessionRecord {
    #[must_use]
    pub fn new(id: SessionId, title: impl Into<String>, position: u32) -> Self {
        Self {
            id,
            title: title.into(),
            position,
        }
    }
}

/// Read side of lesson content, plus the upsert used by seeding and tests.
#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Persist a session and replace its task list.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the session cannot be stored.
    async fn upsert_session(
        &self,
        session: &SessionRecord,
        tasks: &[TaskDefinition],
    ) -> Result<(), StorageError>;

    /// Fetch a session by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_session(&self, id: SessionId) -> Result<SessionRecord, StorageError>;

    /// Task definitions of a session in presentation order.
    ///
    /// A payload that cannot be decoded comes back as
    /// [`TaskDefinition::unreadable`] so the rest of the session still loads.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown session, or other
    /// storage errors.
    async fn get_task_definitions(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<TaskDefinition>, StorageError>;

    /// The session that follows `session_id` in course order, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown session, or other storage errors.
    async fn next_session(&self, session_id: SessionId) -> Result<Option<SessionId>, StorageError>;
}

/// Durable mirror of task and lesson progress.
///
/// Both writes are upserts keyed by session (and task), so repeating a write is harmless.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be written.
    async fn upsert_task_progress(&self, progress: &TaskProgress) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be written.
    async fn upsert_lesson_progress(&self, progress: &LessonProgress) -> Result<(), StorageError>;

    /// Every stored task row of a session, ordered by task id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if rows cannot be read or violate progress invariants.
    async fn task_progress(&self, session_id: SessionId)
    -> Result<Vec<TaskProgress>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be read or violates progress invariants.
    async fn lesson_progress(
        &self,
        session_id: SessionId,
    ) -> Result<Option<LessonProgress>, StorageError>;
}

/// Playback preferences keyed per user or device.
#[async_trait]
pub trait PreferenceRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be read or holds out-of-range values.
    async fn get_preferences(&self, owner: &str) -> Result<Option<PlaybackSettings>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be written.
    async fn save_preferences(
        &self,
        owner: &str,
        settings: &PlaybackSettings,
    ) -> Result<(), StorageError>;
}

type TaskKey = (SessionId, TaskId);

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    sessions: Arc<Mutex<HashMap<SessionId, (SessionRecord, Vec<TaskDefinition>)>>>,
    task_progress: Arc<Mutex<BTreeMap<TaskKey, TaskProgress>>>,
    lesson_progress: Arc<Mutex<HashMap<SessionId, LessonProgress>>>,
    preferences: Arc<Mutex<HashMap<String, PlaybackSettings>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|e| StorageError::Connection(e.to_string()))
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentRepository for InMemoryRepository {
    async fn upsert_session(
        &self,
        session: &SessionRecord,
        tasks: &[TaskDefinition],
    ) -> Result<(), StorageError> {
        let mut guard = lock(&self.sessions)?;
        guard.insert(session.id, (session.clone(), tasks.to_vec()));
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<SessionRecord, StorageError> {
        let guard = lock(&self.sessions)?;
        guard
            .get(&id)
            .map(|(record, _)| record.clone())
            .ok_or(StorageError::NotFound)
    }

    async fn get_task_definitions(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<TaskDefinition>, StorageError> {
        let guard = lock(&self.sessions)?;
        guard
            .get(&session_id)
            .map(|(_, tasks)| tasks.clone())
            .ok_or(StorageError::NotFound)
    }

    async fn next_session(&self, session_id: SessionId) -> Result<Option<SessionId>, StorageError> {
        let guard = lock(&self.sessions)?;
        let (current, _) = guard.get(&session_id).ok_or(StorageError::NotFound)?;
        Ok(guard
            .values()
            .map(|(record, _)| record)
            .filter(|record| {
                (record.position, record.id) > (current.position, current.id)
            })
            .min_by_key(|record| (record.position, record.id))
            .map(|record| record.id))
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn upsert_task_progress(&self, progress: &TaskProgress) -> Result<(), StorageError> {
        let mut guard = lock(&self.task_progress)?;
        guard.insert(
            (progress.session_id(), progress.task_id()),
            progress.clone(),
        );
        Ok(())
    }

    async fn upsert_lesson_progress(&self, progress: &LessonProgress) -> Result<(), StorageError> {
        let mut guard = lock(&self.lesson_progress)?;
        guard.insert(progress.session_id(), progress.clone());
        Ok(())
    }

    async fn task_progress(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<TaskProgress>, StorageError> {
        let guard = lock(&self.task_progress)?;
        Ok(guard
            .range((session_id, TaskId::new(0))..=(session_id, TaskId::new(u64::MAX)))
            .map(|(_, progress)| progress.clone())
            .collect())
    }

    async fn lesson_progress(
        &self,
        session_id: SessionId,
    ) -> Result<Option<LessonProgress>, StorageError> {
        let guard = lock(&self.lesson_progress)?;
        Ok(guard.get(&session_id).cloned())
    }
}

#[async_trait]
impl PreferenceRepository for InMemoryRepository {
    async fn get_preferences(&self, owner: &str) -> Result<Option<PlaybackSettings>, StorageError> {
        let guard = lock(&self.preferences)?;
        Ok(guard.get(owner).copied())
    }

    async fn save_preferences(
        &self,
        owner: &str,
        settings: &PlaybackSettings,
    ) -> Result<(), StorageError> {
        let mut guard = lock(&self.preferences)?;
        guard.insert(owner.to_owned(), *settings);
        Ok(())
    }
}

/// Aggregates the content, progress, and preference repositories behind trait
/// objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub content: Arc<dyn ContentRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub preferences: Arc<dyn PreferenceRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let content: Arc<dyn ContentRepository> = Arc::new(repo.clone());
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let preferences: Arc<dyn PreferenceRepository> = Arc::new(repo);
        Self {
            content,
            progress,
            preferences,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lesson_core::model::{
        CompletionData, LessonStatus, RepeatCount, TaskPayload, TaskStatus, VocabularyCard,
    };
    use lesson_core::time::fixed_now;

    fn vocabulary(id: u64) -> TaskDefinition {
        TaskDefinition::new(
            TaskId::new(id),
            "Words",
            TaskPayload::Vocabulary {
                cards: vec![VocabularyCard::new("hola").with_translation("hello")],
                required_time_secs: None,
            },
        )
    }

    #[tokio::test]
    async fn sessions_are_ordered_by_position() {
        let repo = InMemoryRepository::new();
        let first = SessionRecord::new(SessionId::generate(), "One", 1);
        let second = SessionRecord::new(SessionId::generate(), "Two", 2);
        repo.upsert_session(&second, &[vocabulary(1)]).await.unwrap();
        repo.upsert_session(&first, &[vocabulary(1), vocabulary(2)])
            .await
            .unwrap();

        assert_eq!(repo.next_session(first.id).await.unwrap(), Some(second.id));
        assert_eq!(repo.next_session(second.id).await.unwrap(), None);
        assert_eq!(
            repo.get_task_definitions(first.id).await.unwrap().len(),
            2
        );
        assert!(matches!(
            repo.next_session(SessionId::generate()).await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn task_progress_upsert_replaces_row() {
        let repo = InMemoryRepository::new();
        let session = SessionId::generate();
        let other = SessionId::generate();
        let now = fixed_now();

        let started = TaskProgress::from_persisted(
            session,
            TaskId::new(1),
            TaskStatus::InProgress,
            CompletionData::new().text_partial(0, "hola"),
            None,
            Some(now),
        )
        .unwrap();
        repo.upsert_task_progress(&started).await.unwrap();

        let done = TaskProgress::from_persisted(
            session,
            TaskId::new(1),
            TaskStatus::Completed,
            CompletionData::acknowledged_partial(),
            Some(now),
            Some(now),
        )
        .unwrap();
        repo.upsert_task_progress(&done).await.unwrap();
        repo.upsert_task_progress(&done).await.unwrap();
        repo.upsert_task_progress(&TaskProgress::not_started(other, TaskId::new(1)))
            .await
            .unwrap();

        let rows = repo.task_progress(session).await.unwrap();
        assert_eq!(rows, vec![done]);
    }

    #[tokio::test]
    async fn lesson_and_preferences_round_trip() {
        let repo = InMemoryRepository::new();
        let session = SessionId::generate();
        assert_eq!(repo.lesson_progress(session).await.unwrap(), None);

        let mut lesson = LessonProgress::new(session, 1);
        lesson.recount(1, fixed_now());
        repo.upsert_lesson_progress(&lesson).await.unwrap();
        let stored = repo.lesson_progress(session).await.unwrap().unwrap();
        assert_eq!(stored.status(), LessonStatus::Completed);

        let prefs = PlaybackSettings::default().with_repeat_count(RepeatCount::Infinite);
        repo.save_preferences("device-1", &prefs).await.unwrap();
        assert_eq!(repo.get_preferences("device-1").await.unwrap(), Some(prefs));
        assert_eq!(repo.get_preferences("device-2").await.unwrap(), None);
    }
}
