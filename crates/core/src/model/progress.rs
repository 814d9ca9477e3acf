use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::ids::{SessionId, TaskId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("completed_at must be set iff status is completed (status: {status})")]
    CompletedAtMismatch { status: TaskStatus },

    #[error("lesson status {status} does not match {completed}/{total} completed tasks")]
    LessonStatusMismatch {
        status: LessonStatus,
        completed: u32,
        total: u32,
    },

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("completion data must be a JSON object")]
    NotAnObject,
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl TaskStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "not_started",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ProgressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(Self::NotStarted),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(ProgressError::InvalidStatus(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonStatus {
    #[default]
    InProgress,
    Completed,
}

impl LessonStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LessonStatus::InProgress => "in_progress",
            LessonStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for LessonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LessonStatus {
    type Err = ProgressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(ProgressError::InvalidStatus(other.to_owned())),
        }
    }
}

//
// ─── COMPLETION DATA ───────────────────────────────────────────────────────────
//

const ANSWERS: &str = "answers";
const WRONG_ANSWERS: &str = "wrong_answers";
const ACKNOWLEDGED: &str = "acknowledged";
const TEXTS: &str = "texts";
const STARTED_AT: &str = "started_at";
const ELAPSED_MS: &str = "elapsed_ms";

/// Opaque per-task bag of answers, text, and timing.
///
/// Merges are shallow: top-level keys of a partial replace the existing ones.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletionData(Map<String, Value>);

impl CompletionData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an arbitrary JSON value.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NotAnObject` unless the value is an object (or null).
    pub fn from_value(value: Value) -> Result<Self, ProgressError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            _ => Err(ProgressError::NotAnObject),
        }
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Last-write-wins merge of every top-level key in `partial`.
    pub fn merge(&mut self, partial: CompletionData) {
        for (key, value) in partial.0 {
            self.0.insert(key, value);
        }
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    // ─── conventional keys ───

    /// The choice recorded as correct for `item`, if any.
    #[must_use]
    pub fn correct_answer(&self, item: &str) -> Option<usize> {
        self.0
            .get(ANSWERS)
            .and_then(|answers| answers.get(item))
            .and_then(Value::as_u64)
            .and_then(|choice| usize::try_from(choice).ok())
    }

    #[must_use]
    pub fn correct_answers(&self) -> BTreeMap<String, usize> {
        let Some(Value::Object(answers)) = self.0.get(ANSWERS) else {
            return BTreeMap::new();
        };
        answers
            .iter()
            .filter_map(|(item, choice)| {
                let choice = usize::try_from(choice.as_u64()?).ok()?;
                Some((item.clone(), choice))
            })
            .collect()
    }

    /// Wrong choices per item. Only used for display styling.
    #[must_use]
    pub fn wrong_answers(&self) -> BTreeMap<String, BTreeSet<usize>> {
        let Some(Value::Object(wrong)) = self.0.get(WRONG_ANSWERS) else {
            return BTreeMap::new();
        };
        wrong
            .iter()
            .map(|(item, choices)| {
                let set = choices
                    .as_array()
                    .map(|arr| {
                        arr.iter()
                            .filter_map(Value::as_u64)
                            .filter_map(|c| usize::try_from(c).ok())
                            .collect::<BTreeSet<usize>>()
                    })
                    .unwrap_or_default();
                (item.clone(), set)
            })
            .filter(|(_, set)| !set.is_empty())
            .collect()
    }

    #[must_use]
    pub fn acknowledged(&self) -> bool {
        self.0
            .get(ACKNOWLEDGED)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Free text typed for each writing prompt, keyed by prompt index.
    #[must_use]
    pub fn texts(&self) -> BTreeMap<usize, String> {
        let Some(Value::Object(texts)) = self.0.get(TEXTS) else {
            return BTreeMap::new();
        };
        texts
            .iter()
            .filter_map(|(idx, text)| Some((idx.parse().ok()?, text.as_str()?.to_owned())))
            .collect()
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.0
            .get(STARTED_AT)
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|at| at.with_timezone(&Utc))
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> Option<u64> {
        self.0.get(ELAPSED_MS).and_then(Value::as_u64)
    }

    // ─── partial builders ───

    /// Partial that records `choice` as the correct answer for `item`.
    #[must_use]
    pub fn correct_answer_partial(&self, item: &str, choice: usize) -> Self {
        let mut answers = match self.0.get(ANSWERS) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        answers.insert(item.to_owned(), Value::from(choice));
        Self::new().with(ANSWERS, Value::Object(answers))
    }

    /// Partial that adds `choice` to the wrong choices of `item`.
    #[must_use]
    pub fn wrong_answer_partial(&self, item: &str, choice: usize) -> Self {
        let mut wrong = self.wrong_answers();
        wrong.entry(item.to_owned()).or_default().insert(choice);
        let map: Map<String, Value> = wrong
            .into_iter()
            .map(|(item, set)| (item, Value::from(set.into_iter().collect::<Vec<_>>())))
            .collect();
        Self::new().with(WRONG_ANSWERS, Value::Object(map))
    }

    #[must_use]
    pub fn acknowledged_partial() -> Self {
        Self::new().with(ACKNOWLEDGED, Value::Bool(true))
    }

    #[must_use]
    pub fn text_partial(&self, prompt: usize, text: &str) -> Self {
        let mut texts = match self.0.get(TEXTS) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        texts.insert(prompt.to_string(), Value::from(text));
        Self::new().with(TEXTS, Value::Object(texts))
    }

    #[must_use]
    pub fn engagement_partial(started_at: DateTime<Utc>, elapsed_ms: u64) -> Self {
        Self::new()
            .with(STARTED_AT, Value::from(started_at.to_rfc3339()))
            .with(ELAPSED_MS, Value::from(elapsed_ms))
    }
}

//
// ─── TASK PROGRESS ─────────────────────────────────────────────────────────────
//

/// Progress of one task within one session.
///
/// `completed_at` is set iff `status == Completed`.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskProgress {
    session_id: SessionId,
    task_id: TaskId,
    status: TaskStatus,
    completion_data: CompletionData,
    completed_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl TaskProgress {
    /// A task nobody has touched yet.
    #[must_use]
    pub fn not_started(session_id: SessionId, task_id: TaskId) -> Self {
        Self {
            session_id,
            task_id,
            status: TaskStatus::NotStarted,
            completion_data: CompletionData::new(),
            completed_at: None,
            updated_at: None,
        }
    }

    /// Rehydrate progress from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::CompletedAtMismatch` if the timestamp and status disagree.
    pub fn from_persisted(
        session_id: SessionId,
        task_id: TaskId,
        status: TaskStatus,
        completion_data: CompletionData,
        completed_at: Option<DateTime<Utc>>,
        updated_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ProgressError> {
        if completed_at.is_some() != (status == TaskStatus::Completed) {
            return Err(ProgressError::CompletedAtMismatch { status });
        }
        Ok(Self {
            session_id,
            task_id,
            status,
            completion_data,
            completed_at,
            updated_at,
        })
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.status
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    #[must_use]
    pub fn completion_data(&self) -> &CompletionData {
        &self.completion_data
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub(crate) fn start(&mut self) {
        if self.status == TaskStatus::NotStarted {
            self.status = TaskStatus::InProgress;
        }
    }

    pub(crate) fn merge(&mut self, partial: CompletionData, now: DateTime<Utc>) {
        self.completion_data.merge(partial);
        self.updated_at = Some(now);
    }

    pub(crate) fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(now);
        self.updated_at = Some(now);
    }

    pub(crate) fn reset(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::InProgress;
        self.completion_data.clear();
        self.completed_at = None;
        self.updated_at = Some(now);
    }
}

//
// ─── LESSON PROGRESS ───────────────────────────────────────────────────────────
//

/// What changed after a lesson recount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LessonChange {
    Unchanged,
    Counted,
    Completed,
    Reopened,
}

/// Lesson-level aggregate of task completion.
///
/// `status == Completed` iff `tasks_completed >= total_tasks`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonProgress {
    session_id: SessionId,
    tasks_completed: u32,
    total_tasks: u32,
    status: LessonStatus,
    completed_at: Option<DateTime<Utc>>,
}

impl LessonProgress {
    #[must_use]
    pub fn new(session_id: SessionId, total_tasks: u32) -> Self {
        let mut progress = Self {
            session_id,
            tasks_completed: 0,
            total_tasks,
            status: LessonStatus::InProgress,
            completed_at: None,
        };
        if total_tasks == 0 {
            progress.status = LessonStatus::Completed;
        }
        progress
    }

    /// Rehydrate lesson progress from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::LessonStatusMismatch` if the status contradicts the counts.
    pub fn from_persisted(
        session_id: SessionId,
        tasks_completed: u32,
        total_tasks: u32,
        status: LessonStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ProgressError> {
        let should_be_complete = tasks_completed >= total_tasks;
        if should_be_complete != (status == LessonStatus::Completed) {
            return Err(ProgressError::LessonStatusMismatch {
                status,
                completed: tasks_completed,
                total: total_tasks,
            });
        }
        Ok(Self {
            session_id,
            tasks_completed,
            total_tasks,
            status,
            completed_at,
        })
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn tasks_completed(&self) -> u32 {
        self.tasks_completed
    }

    #[must_use]
    pub fn total_tasks(&self) -> u32 {
        self.total_tasks
    }

    #[must_use]
    pub fn status(&self) -> LessonStatus {
        self.status
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == LessonStatus::Completed
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Replace the counter with a fresh count of completed tasks.
    pub fn recount(&mut self, tasks_completed: u32, now: DateTime<Utc>) -> LessonChange {
        if tasks_completed == self.tasks_completed {
            return LessonChange::Unchanged;
        }
        self.tasks_completed = tasks_completed;

        let complete = tasks_completed >= self.total_tasks;
        match (self.status, complete) {
            (LessonStatus::InProgress, true) => {
                self.status = LessonStatus::Completed;
                self.completed_at = Some(now);
                LessonChange::Completed
            }
            (LessonStatus::Completed, false) => {
                self.status = LessonStatus::InProgress;
                self.completed_at = None;
                LessonChange::Reopened
            }
            _ => LessonChange::Counted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use serde_json::json;

    #[test]
    fn merge_is_last_write_wins_per_key() {
        let mut data = CompletionData::new()
            .with("a", json!(1))
            .with("b", json!(2));
        data.merge(CompletionData::new().with("b", json!(3)).with("c", json!(4)));
        assert_eq!(data.into_value(), json!({ "a": 1, "b": 3, "c": 4 }));
    }

    #[test]
    fn wrong_answers_accumulate_as_sets() {
        let mut data = CompletionData::new();
        let partial = data.wrong_answer_partial("item1", 2);
        data.merge(partial);
        let partial = data.wrong_answer_partial("item1", 2);
        data.merge(partial);
        let partial = data.wrong_answer_partial("item1", 0);
        data.merge(partial);

        let wrong = data.wrong_answers();
        assert_eq!(wrong["item1"], BTreeSet::from([0, 2]));
    }

    #[test]
    fn engagement_fields_round_trip() {
        let data = CompletionData::engagement_partial(fixed_now(), 1500);
        assert_eq!(data.started_at(), Some(fixed_now()));
        assert_eq!(data.elapsed_ms(), Some(1500));
    }

    #[test]
    fn non_object_data_is_rejected() {
        assert_eq!(
            CompletionData::from_value(json!([1, 2])),
            Err(ProgressError::NotAnObject)
        );
        assert!(CompletionData::from_value(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn persisted_progress_enforces_completed_at_invariant() {
        let session = SessionId::generate();
        let err = TaskProgress::from_persisted(
            session,
            TaskId::new(1),
            TaskStatus::InProgress,
            CompletionData::new(),
            Some(fixed_now()),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ProgressError::CompletedAtMismatch { .. }));
    }

    #[test]
    fn recount_completes_and_reopens() {
        let now = fixed_now();
        let mut lesson = LessonProgress::new(SessionId::generate(), 2);
        assert_eq!(lesson.recount(1, now), LessonChange::Counted);
        assert_eq!(lesson.recount(2, now), LessonChange::Completed);
        assert!(lesson.is_completed());
        assert_eq!(lesson.completed_at(), Some(now));
        assert_eq!(lesson.recount(2, now), LessonChange::Unchanged);
        assert_eq!(lesson.recount(1, now), LessonChange::Reopened);
        assert_eq!(lesson.status(), LessonStatus::InProgress);
        assert_eq!(lesson.completed_at(), None);
    }

    #[test]
    fn status_strings_parse_back() {
        for status in [
            TaskStatus::NotStarted,
            TaskStatus::InProgress,
            TaskStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("done".parse::<LessonStatus>().is_err());
    }
}
