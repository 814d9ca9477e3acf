use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lesson_core::model::{LessonProgress, SessionId, TaskProgress};
use storage::repository::ProgressRepository;
use tokio::sync::{mpsc, oneshot};

enum SyncCommand {
    Task(TaskProgress),
    Lesson(LessonProgress),
    Flush(oneshot::Sender<()>),
}

/// Downstream mirror of in-memory progress.
///
/// Every push enqueues a full-row upsert. One worker drains the queue in order, so
/// the store ends up with the latest snapshot. Failures are logged and dropped; the
/// next push for the same row writes it again.
///
/// Lesson rows are tracked per session until a write lands, so callers can resend
/// the row with their next change.
#[derive(Clone)]
pub struct ProgressSync {
    tx: mpsc::UnboundedSender<SyncCommand>,
    failed_writes: Arc<AtomicU64>,
    unsettled_lessons: Arc<Mutex<HashSet<SessionId>>>,
}

fn settle(set: &Mutex<HashSet<SessionId>>) -> MutexGuard<'_, HashSet<SessionId>> {
    set.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ProgressSync {
    /// Start the worker on the current tokio runtime.
    #[must_use]
    pub fn spawn(repo: Arc<dyn ProgressRepository>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let failed_writes = Arc::new(AtomicU64::new(0));
        let unsettled_lessons = Arc::new(Mutex::new(HashSet::new()));
        tokio::spawn(run(
            repo,
            rx,
            Arc::clone(&failed_writes),
            Arc::clone(&unsettled_lessons),
        ));
        Self {
            tx,
            failed_writes,
            unsettled_lessons,
        }
    }

    /// Queue a task row. Never blocks.
    pub fn push_task(&self, progress: TaskProgress) {
        if self.tx.send(SyncCommand::Task(progress)).is_err() {
            tracing::warn!("progress sync worker is gone, dropping task row");
        }
    }

    /// Queue a lesson row. Never blocks.
    pub fn push_lesson(&self, progress: LessonProgress) {
        settle(&self.unsettled_lessons).insert(progress.session_id());
        if self.tx.send(SyncCommand::Lesson(progress)).is_err() {
            tracing::warn!("progress sync worker is gone, dropping lesson row");
        }
    }

    /// Wait until everything queued before this call has been attempted.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(SyncCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// True while the last lesson row pushed for `session_id` has not been stored.
    #[must_use]
    pub fn lesson_unsettled(&self, session_id: SessionId) -> bool {
        settle(&self.unsettled_lessons).contains(&session_id)
    }

    /// Writes that failed since the worker started.
    #[must_use]
    pub fn failed_writes(&self) -> u64 {
        self.failed_writes.load(Ordering::Relaxed)
    }
}

async fn run(
    repo: Arc<dyn ProgressRepository>,
    mut rx: mpsc::UnboundedReceiver<SyncCommand>,
    failed_writes: Arc<AtomicU64>,
    unsettled_lessons: Arc<Mutex<HashSet<SessionId>>>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            SyncCommand::Task(progress) => {
                if let Err(error) = repo.upsert_task_progress(&progress).await {
                    failed_writes.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        session_id = %progress.session_id(),
                        task_id = %progress.task_id(),
                        status = %progress.status(),
                        %error,
                        "task progress write failed"
                    );
                }
            }
            SyncCommand::Lesson(progress) => {
                match repo.upsert_lesson_progress(&progress).await {
                    Ok(()) => {
                        settle(&unsettled_lessons).remove(&progress.session_id());
                    }
                    Err(error) => {
                        settle(&unsettled_lessons).insert(progress.session_id());
                        failed_writes.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            session_id = %progress.session_id(),
                            status = %progress.status(),
                            %error,
                            "lesson progress write failed"
                        );
                    }
                }
            }
            SyncCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("progress sync worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use lesson_core::model::{CompletionData, SessionId, TaskId, TaskStatus};
    use lesson_core::time::fixed_now;
    use storage::repository::{InMemoryRepository, StorageError};

    #[tokio::test]
    async fn last_push_wins() {
        let repo = Arc::new(InMemoryRepository::new());
        let sync = ProgressSync::spawn(repo.clone());
        let session = SessionId::generate();

        let first = TaskProgress::not_started(session, TaskId::new(1));
        let second = TaskProgress::from_persisted(
            session,
            TaskId::new(1),
            TaskStatus::InProgress,
            CompletionData::new().text_partial(0, "hola"),
            None,
            Some(fixed_now()),
        )
        .unwrap();

        sync.push_task(first);
        sync.push_task(second.clone());
        sync.flush().await;

        let rows = repo.task_progress(session).await.unwrap();
        assert_eq!(rows, vec![second]);
        assert_eq!(rows[0].status(), TaskStatus::InProgress);
        assert_eq!(sync.failed_writes(), 0);
    }

    struct Unreachable;

    #[async_trait::async_trait]
    impl ProgressRepository for Unreachable {
        async fn upsert_task_progress(&self, _: &TaskProgress) -> Result<(), StorageError> {
            Err(StorageError::Connection("offline".into()))
        }
        async fn upsert_lesson_progress(&self, _: &LessonProgress) -> Result<(), StorageError> {
            Err(StorageError::Connection("offline".into()))
        }
        async fn task_progress(&self, _: SessionId) -> Result<Vec<TaskProgress>, StorageError> {
            Ok(Vec::new())
        }
        async fn lesson_progress(
            &self,
            _: SessionId,
        ) -> Result<Option<LessonProgress>, StorageError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn failures_are_counted_and_worker_keeps_going() {
        let sync = ProgressSync::spawn(Arc::new(Unreachable));
        let session = SessionId::generate();
        sync.push_task(TaskProgress::not_started(session, TaskId::new(1)));
        sync.push_lesson(LessonProgress::new(session, 3));
        sync.flush().await;
        assert_eq!(sync.failed_writes(), 2);

        sync.push_task(TaskProgress::not_started(session, TaskId::new(2)));
        sync.flush().await;
        assert_eq!(sync.failed_writes(), 3);
        assert!(sync.lesson_unsettled(session));
    }

    #[tokio::test]
    async fn stored_lesson_row_is_settled() {
        let repo = Arc::new(InMemoryRepository::new());
        let sync = ProgressSync::spawn(repo.clone());
        let session = SessionId::generate();
        assert!(!sync.lesson_unsettled(session));

        sync.push_lesson(LessonProgress::new(session, 2));
        assert!(sync.lesson_unsettled(session));
        sync.flush().await;
        assert!(!sync.lesson_unsettled(session));
        assert!(repo.lesson_progress(session).await.unwrap().is_some());
    }
}
