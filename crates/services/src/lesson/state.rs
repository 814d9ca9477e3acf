use std::collections::HashMap;

use chrono::{DateTime, Utc};
use lesson_core::engagement::EngagementTimer;
use lesson_core::machine::TaskMachine;
use lesson_core::model::{
    DefinitionError, LessonChange, LessonProgress, SessionId, TaskDefinition, TaskId, TaskKind,
    TaskProgress,
};

use super::selection::{Activation, SelectionMode};
use crate::error::SessionError;

/// One task of the session with everything the engine keeps for it.
#[derive(Debug, Clone)]
pub struct TaskSlot {
    machine: TaskMachine,
    unavailable: Option<DefinitionError>,
    engagement: Option<EngagementTimer>,
}

impl TaskSlot {
    fn new(session_id: SessionId, definition: TaskDefinition, stored: Option<TaskProgress>) -> Self {
        let unavailable = definition.validate().err();
        let progress =
            stored.unwrap_or_else(|| TaskProgress::not_started(session_id, definition.id()));
        let engagement = (definition.kind() == TaskKind::Vocabulary).then(|| {
            EngagementTimer::restore(
                definition.required_time(),
                progress.completion_data().started_at(),
                progress.is_completed(),
            )
        });
        Self {
            machine: TaskMachine::new(definition, progress),
            unavailable,
            engagement,
        }
    }

    #[must_use]
    pub fn task_id(&self) -> TaskId {
        self.machine.task_id()
    }

    #[must_use]
    pub fn machine(&self) -> &TaskMachine {
        &self.machine
    }

    /// Why the task cannot be shown, if it cannot.
    #[must_use]
    pub fn unavailable(&self) -> Option<&DefinitionError> {
        self.unavailable.as_ref()
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.unavailable.is_none()
    }

    /// Engagement timer of a vocabulary task.
    #[must_use]
    pub fn engagement(&self) -> Option<&EngagementTimer> {
        self.engagement.as_ref()
    }

    pub(crate) fn machine_mut(&mut self) -> &mut TaskMachine {
        &mut self.machine
    }

    pub(crate) fn engagement_mut(&mut self) -> Option<&mut EngagementTimer> {
        self.engagement.as_mut()
    }

    fn counts_as_completed(&self) -> bool {
        self.is_available() && self.machine.is_completed()
    }
}

/// The canonical in-memory state of one lesson session.
///
/// The progress store only mirrors this.
#[derive(Debug, Clone)]
pub struct SessionState {
    session_id: SessionId,
    slots: Vec<TaskSlot>,
    lesson: LessonProgress,
    current: usize,
    selection: SelectionMode,
    activation: Activation,
}

/// A restored session plus whether the stored lesson row is stale or missing.
pub(crate) struct Restored {
    pub state: SessionState,
    pub lesson_corrected: bool,
}

impl SessionState {
    /// Join definitions with stored rows and pick the initial task.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Empty` when no task can be shown.
    pub(crate) fn restore(
        session_id: SessionId,
        definitions: Vec<TaskDefinition>,
        stored_tasks: Vec<TaskProgress>,
        stored_lesson: Option<LessonProgress>,
        deep_link: Option<TaskId>,
        now: DateTime<Utc>,
    ) -> Result<Restored, SessionError> {
        let mut stored: HashMap<TaskId, TaskProgress> = stored_tasks
            .into_iter()
            .map(|progress| (progress.task_id(), progress))
            .collect();
        let slots: Vec<TaskSlot> = definitions
            .into_iter()
            .map(|definition| {
                let row = stored.remove(&definition.id());
                TaskSlot::new(session_id, definition, row)
            })
            .collect();

        let total = count(slots.iter().filter(|slot| slot.is_available()));
        if total == 0 {
            return Err(SessionError::Empty);
        }
        let completed = count(slots.iter().filter(|slot| slot.counts_as_completed()));

        let (lesson, lesson_corrected) = match stored_lesson {
            Some(mut row) if row.total_tasks() == total => {
                let change = row.recount(completed, now);
                (row, change != LessonChange::Unchanged)
            }
            other => {
                let mut fresh = LessonProgress::new(session_id, total);
                fresh.recount(completed, now);
                (fresh, other.is_some() || completed > 0)
            }
        };

        let (current, selection) = match deep_link {
            Some(task_id) => match slots.iter().position(|slot| slot.task_id() == task_id) {
                Some(index) => (index, SelectionMode::Manual),
                None => {
                    tracing::warn!(%session_id, %task_id, "deep link names an unknown task");
                    (auto_index(&slots), SelectionMode::Auto)
                }
            },
            None => (auto_index(&slots), SelectionMode::Auto),
        };
        let activation = Activation::first(slots[current].task_id());

        Ok(Restored {
            state: Self {
                session_id,
                slots,
                lesson,
                current,
                selection,
                activation,
            },
            lesson_corrected,
        })
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn slots(&self) -> &[TaskSlot] {
        &self.slots
    }

    #[must_use]
    pub fn lesson(&self) -> &LessonProgress {
        &self.lesson
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn current(&self) -> &TaskSlot {
        &self.slots[self.current]
    }

    #[must_use]
    pub fn selection(&self) -> SelectionMode {
        self.selection
    }

    #[must_use]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> &mut TaskSlot {
        &mut self.slots[index]
    }

    /// Index of `task_id`, provided the task can be worked on.
    pub(crate) fn index_of(&self, task_id: TaskId) -> Result<usize, SessionError> {
        let index = self
            .slots
            .iter()
            .position(|slot| slot.task_id() == task_id)
            .ok_or(SessionError::UnknownTask(task_id))?;
        match &self.slots[index].unavailable {
            Some(reason) => Err(SessionError::Unavailable {
                task: task_id,
                reason: reason.clone(),
            }),
            None => Ok(index),
        }
    }

    pub(crate) fn index_of_any(&self, task_id: TaskId) -> Result<usize, SessionError> {
        self.slots
            .iter()
            .position(|slot| slot.task_id() == task_id)
            .ok_or(SessionError::UnknownTask(task_id))
    }

    /// Move the pointer. Returns the new activation, or `None` if nothing moved.
    pub(crate) fn move_to(&mut self, index: usize, selection: SelectionMode) -> Option<Activation> {
        self.selection = selection;
        if index == self.current {
            return None;
        }
        self.current = index;
        self.activation = self.activation.next(self.slots[index].task_id());
        Some(self.activation)
    }

    /// Start a new activation of the current task without moving.
    pub(crate) fn reactivate(&mut self) -> Activation {
        self.activation = self.activation.next(self.slots[self.current].task_id());
        self.activation
    }

    /// Where auto selection would point now.
    pub(crate) fn auto_index(&self) -> usize {
        auto_index(&self.slots)
    }

    /// Recount completed tasks into the lesson row.
    pub(crate) fn recount(&mut self, now: DateTime<Utc>) -> LessonChange {
        let completed = count(self.slots.iter().filter(|slot| slot.counts_as_completed()));
        self.lesson.recount(completed, now)
    }
}

/// First available task that is not completed, else the first available task.
fn auto_index(slots: &[TaskSlot]) -> usize {
    slots
        .iter()
        .position(|slot| slot.is_available() && !slot.machine.is_completed())
        .or_else(|| slots.iter().position(TaskSlot::is_available))
        .unwrap_or(0)
}

fn count<'a>(slots: impl Iterator<Item = &'a TaskSlot>) -> u32 {
    u32::try_from(slots.count()).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lesson_core::model::{CompletionData, QuizItem, TaskPayload, TaskStatus, VocabularyCard};
    use lesson_core::time::fixed_now;

    fn writing(id: u64) -> TaskDefinition {
        TaskDefinition::new(
            TaskId::new(id),
            "Write",
            TaskPayload::Writing {
                prompts: vec!["¿Qué hiciste ayer?".into()],
            },
        )
    }

    fn broken(id: u64) -> TaskDefinition {
        TaskDefinition::new(TaskId::new(id), "Empty", TaskPayload::Attention { items: vec![] })
    }

    fn done(session: SessionId, id: u64) -> TaskProgress {
        TaskProgress::from_persisted(
            session,
            TaskId::new(id),
            TaskStatus::Completed,
            CompletionData::acknowledged_partial(),
            Some(fixed_now()),
            Some(fixed_now()),
        )
        .unwrap()
    }

    #[test]
    fn picks_first_incomplete_task() {
        let session = SessionId::generate();
        let restored = SessionState::restore(
            session,
            vec![writing(1), writing(2), writing(3)],
            vec![done(session, 1)],
            None,
            None,
            fixed_now(),
        )
        .unwrap();
        let state = restored.state;
        assert_eq!(state.current().task_id(), TaskId::new(2));
        assert_eq!(state.selection(), SelectionMode::Auto);
        assert_eq!(state.lesson().tasks_completed(), 1);
        assert_eq!(state.lesson().total_tasks(), 3);
        // progress exists but the lesson row does not
        assert!(restored.lesson_corrected);
    }

    #[test]
    fn fresh_lesson_needs_no_lesson_row_yet() {
        let session = SessionId::generate();
        let restored = SessionState::restore(
            session,
            vec![writing(1), writing(2)],
            vec![],
            None,
            None,
            fixed_now(),
        )
        .unwrap();
        assert!(!restored.lesson_corrected);
    }

    #[test]
    fn all_completed_selects_first_for_review() {
        let session = SessionId::generate();
        let state = SessionState::restore(
            session,
            vec![writing(1), writing(2)],
            vec![done(session, 2), done(session, 1)],
            None,
            None,
            fixed_now(),
        )
        .unwrap()
        .state;
        assert_eq!(state.current_index(), 0);
        assert!(state.lesson().is_completed());
    }

    #[test]
    fn deep_link_wins_and_is_manual() {
        let session = SessionId::generate();
        let state = SessionState::restore(
            session,
            vec![writing(1), writing(2), writing(3)],
            vec![done(session, 1)],
            None,
            Some(TaskId::new(3)),
            fixed_now(),
        )
        .unwrap()
        .state;
        assert_eq!(state.current().task_id(), TaskId::new(3));
        assert_eq!(state.selection(), SelectionMode::Manual);
    }

    #[test]
    fn unknown_deep_link_falls_back_to_auto() {
        let session = SessionId::generate();
        let state = SessionState::restore(
            session,
            vec![writing(1)],
            vec![],
            None,
            Some(TaskId::new(42)),
            fixed_now(),
        )
        .unwrap()
        .state;
        assert_eq!(state.current_index(), 0);
        assert_eq!(state.selection(), SelectionMode::Auto);
    }

    #[test]
    fn unavailable_tasks_are_kept_but_not_counted() {
        let session = SessionId::generate();
        let state = SessionState::restore(
            session,
            vec![broken(1), writing(2)],
            vec![],
            None,
            None,
            fixed_now(),
        )
        .unwrap()
        .state;
        assert_eq!(state.slots().len(), 2);
        assert_eq!(state.slots()[0].unavailable(), Some(&DefinitionError::NoItems));
        assert_eq!(state.lesson().total_tasks(), 1);
        assert_eq!(state.current().task_id(), TaskId::new(2));
        assert!(matches!(
            state.index_of(TaskId::new(1)),
            Err(SessionError::Unavailable { .. })
        ));
        assert!(matches!(
            state.index_of(TaskId::new(9)),
            Err(SessionError::UnknownTask(_))
        ));
    }

    #[test]
    fn unreadable_task_becomes_a_placeholder() {
        let session = SessionId::generate();
        let lost = TaskDefinition::unreadable(TaskId::new(2), "Lost", "unknown variant `karaoke`");
        let state = SessionState::restore(
            session,
            vec![writing(1), lost, writing(3)],
            vec![],
            None,
            Some(TaskId::new(2)),
            fixed_now(),
        )
        .unwrap()
        .state;
        assert_eq!(state.lesson().total_tasks(), 2);
        assert_eq!(state.current().task_id(), TaskId::new(2));
        assert!(matches!(
            state.current().unavailable(),
            Some(DefinitionError::Malformed { .. })
        ));
        assert!(matches!(
            state.index_of(TaskId::new(2)),
            Err(SessionError::Unavailable { .. })
        ));
    }

    #[test]
    fn nothing_to_show_is_empty() {
        let session = SessionId::generate();
        let result =
            SessionState::restore(session, vec![broken(1)], vec![], None, None, fixed_now());
        assert!(matches!(result, Err(SessionError::Empty)));
        let result = SessionState::restore(session, vec![], vec![], None, None, fixed_now());
        assert!(matches!(result, Err(SessionError::Empty)));
    }

    #[test]
    fn stale_lesson_counter_is_recounted() {
        let session = SessionId::generate();
        let stale = LessonProgress::from_persisted(
            session,
            0,
            2,
            lesson_core::model::LessonStatus::InProgress,
            None,
        )
        .unwrap();
        let restored = SessionState::restore(
            session,
            vec![writing(1), writing(2)],
            vec![done(session, 1), done(session, 2)],
            Some(stale),
            None,
            fixed_now(),
        )
        .unwrap();
        assert!(restored.lesson_corrected);
        assert_eq!(restored.state.lesson().tasks_completed(), 2);
        assert!(restored.state.lesson().is_completed());
    }

    #[test]
    fn vocabulary_timer_resumes_from_stored_start() {
        let session = SessionId::generate();
        let vocab = TaskDefinition::new(
            TaskId::new(1),
            "Words",
            TaskPayload::Vocabulary {
                cards: vec![VocabularyCard::new("gato")],
                required_time_secs: Some(600),
            },
        );
        let started = fixed_now() - chrono::Duration::minutes(3);
        let row = TaskProgress::from_persisted(
            session,
            TaskId::new(1),
            TaskStatus::InProgress,
            CompletionData::engagement_partial(started, 180_000),
            None,
            Some(fixed_now()),
        )
        .unwrap();
        let quiz = TaskDefinition::new(
            TaskId::new(2),
            "Quiz",
            TaskPayload::Attention {
                items: vec![QuizItem::new("a1", "?", vec!["sí".into(), "no".into()], 0)],
            },
        );
        let state =
            SessionState::restore(session, vec![vocab, quiz], vec![row], None, None, fixed_now())
                .unwrap()
                .state;
        let timer = state.slots()[0].engagement().unwrap();
        assert_eq!(timer.started_at(), Some(started));
        assert!(state.slots()[1].engagement().is_none());
    }
}
