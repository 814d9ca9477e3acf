use std::time::Duration;

use lesson_core::model::{
    CompletionData, DefinitionError, LessonProgress, LessonStatus, PlaybackSettings, QuizItem,
    RepeatCount, SessionId, TaskDefinition, TaskId, TaskPayload, TaskProgress, TaskStatus,
    VocabularyCard,
};
use lesson_core::time::fixed_now;
use storage::repository::{
    ContentRepository, PreferenceRepository, ProgressRepository, SessionRecord, StorageError,
};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    SqliteRepository::open(&url).await.expect("open")
}

fn listening(id: u64) -> TaskDefinition {
    TaskDefinition::new(
        TaskId::new(id),
        "Listen",
        TaskPayload::Listening {
            audio_key: Some("dialogue-1".into()),
            items: vec![
                QuizItem::new("l1", "Where is Ana?", vec!["home".into(), "work".into()], 1),
                QuizItem::new("l2", "Who calls?", vec!["Luis".into(), "Marta".into()], 0),
            ],
        },
    )
}

fn vocabulary(id: u64) -> TaskDefinition {
    TaskDefinition::new(
        TaskId::new(id),
        "Words",
        TaskPayload::Vocabulary {
            cards: vec![
                VocabularyCard::new("el gato").with_translation("the cat"),
                VocabularyCard::new("el perro").with_translation("the dog"),
            ],
            required_time_secs: Some(600),
        },
    )
}

#[tokio::test]
async fn sqlite_stores_sessions_in_course_order() {
    let repo = connect("memdb_content").await;
    let first = SessionRecord::new(SessionId::generate(), "Lesson 1", 1);
    let second = SessionRecord::new(SessionId::generate(), "Lesson 2", 2);

    repo.upsert_session(&second, &[vocabulary(1)]).await.unwrap();
    repo.upsert_session(&first, &[vocabulary(1), listening(2)])
        .await
        .unwrap();

    let tasks = repo.get_task_definitions(first.id).await.unwrap();
    assert_eq!(tasks, vec![vocabulary(1), listening(2)]);
    assert_eq!(repo.get_session(second.id).await.unwrap(), second);

    assert_eq!(repo.next_session(first.id).await.unwrap(), Some(second.id));
    assert_eq!(repo.next_session(second.id).await.unwrap(), None);

    // re-seeding replaces the task list
    repo.upsert_session(&first, &[listening(2)]).await.unwrap();
    assert_eq!(
        repo.get_task_definitions(first.id).await.unwrap(),
        vec![listening(2)]
    );

    assert!(matches!(
        repo.get_task_definitions(SessionId::generate()).await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn sqlite_rejects_duplicate_task_ids_in_one_session() {
    let repo = connect("memdb_duplicates").await;
    let session = SessionRecord::new(SessionId::generate(), "Dupes", 1);
    let result = repo
        .upsert_session(&session, &[vocabulary(1), listening(1)])
        .await;
    assert!(result.is_err());
    // the whole upsert rolls back
    assert!(matches!(
        repo.get_session(session.id).await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn sqlite_unreadable_payload_keeps_the_rest_of_the_session() {
    let repo = connect("memdb_bad_payload").await;
    let session = SessionRecord::new(SessionId::generate(), "Broken", 1);
    repo.upsert_session(&session, &[vocabulary(1), listening(2)])
        .await
        .unwrap();

    sqlx::query(
        "UPDATE task_definitions SET payload = '{\"type\":\"karaoke\"}'
         WHERE session_id = ?1 AND task_id = 2",
    )
    .bind(session.id.to_string())
    .execute(repo.pool())
    .await
    .unwrap();

    let tasks = repo.get_task_definitions(session.id).await.unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0], vocabulary(1));
    assert_eq!(tasks[1].id(), TaskId::new(2));
    assert_eq!(tasks[1].title(), "Listen");
    assert!(matches!(
        tasks[1].validate(),
        Err(DefinitionError::Malformed { reason }) if reason.contains("karaoke")
    ));
}

#[tokio::test]
async fn sqlite_task_progress_upsert_is_idempotent() {
    let repo = connect("memdb_task_progress").await;
    let session = SessionId::generate();
    let now = fixed_now();

    let data = CompletionData::new()
        .correct_answer_partial("l1", 1)
        .with("wrong_answers", serde_json::json!({ "l1": [0] }));
    let in_progress = TaskProgress::from_persisted(
        session,
        TaskId::new(2),
        TaskStatus::InProgress,
        data.clone(),
        None,
        Some(now),
    )
    .unwrap();
    repo.upsert_task_progress(&in_progress).await.unwrap();
    repo.upsert_task_progress(&in_progress).await.unwrap();

    let rows = repo.task_progress(session).await.unwrap();
    assert_eq!(rows, vec![in_progress]);
    assert_eq!(rows[0].completion_data().correct_answer("l1"), Some(1));

    let completed = TaskProgress::from_persisted(
        session,
        TaskId::new(2),
        TaskStatus::Completed,
        data,
        Some(now),
        Some(now),
    )
    .unwrap();
    repo.upsert_task_progress(&completed).await.unwrap();
    let rows = repo.task_progress(session).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status(), TaskStatus::Completed);
    assert_eq!(rows[0].completed_at(), Some(now));
}

#[tokio::test]
async fn sqlite_lesson_progress_round_trips() {
    let repo = connect("memdb_lesson_progress").await;
    let session = SessionId::generate();
    assert_eq!(repo.lesson_progress(session).await.unwrap(), None);

    let mut lesson = LessonProgress::new(session, 2);
    lesson.recount(2, fixed_now());
    repo.upsert_lesson_progress(&lesson).await.unwrap();
    assert_eq!(repo.lesson_progress(session).await.unwrap(), Some(lesson.clone()));

    lesson.recount(1, fixed_now());
    repo.upsert_lesson_progress(&lesson).await.unwrap();
    let stored = repo.lesson_progress(session).await.unwrap().unwrap();
    assert_eq!(stored.status(), LessonStatus::InProgress);
    assert_eq!(stored.tasks_completed(), 1);
    assert_eq!(stored.completed_at(), None);
}

#[tokio::test]
async fn sqlite_preferences_keep_infinite_repeat() {
    let repo = connect("memdb_preferences").await;
    assert_eq!(repo.get_preferences("phone").await.unwrap(), None);

    let prefs = PlaybackSettings::new(0.75, Duration::from_millis(2_500), RepeatCount::Infinite, true)
        .unwrap();
    repo.save_preferences("phone", &prefs).await.unwrap();
    assert_eq!(repo.get_preferences("phone").await.unwrap(), Some(prefs));

    let finite = prefs.with_repeat_count(RepeatCount::finite(4).unwrap());
    repo.save_preferences("phone", &finite).await.unwrap();
    assert_eq!(repo.get_preferences("phone").await.unwrap(), Some(finite));
}
