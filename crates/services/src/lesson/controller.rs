use chrono::{DateTime, Utc};
use lesson_core::Clock;
use lesson_core::engagement::EngagementTick;
use lesson_core::machine::{AnswerOutcome, Transition};
use lesson_core::model::{
    CompletionData, LessonChange, LessonProgress, SessionId, TaskId, TaskStatus,
};

use super::selection::{Activation, SelectionMode};
use super::state::{SessionState, TaskSlot};
use crate::error::SessionError;
use crate::sync::ProgressSync;

/// What one operation did to a task and to the lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskUpdate {
    pub task_id: TaskId,
    pub transition: Transition,
    pub status: TaskStatus,
    pub lesson: LessonChange,
}

/// Result of choosing an option for a quiz item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerResult {
    pub outcome: AnswerOutcome,
    pub update: TaskUpdate,
}

/// One engagement tick applied to the active vocabulary task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngagementReport {
    pub tick: EngagementTick,
    pub update: TaskUpdate,
}

/// Drives one lesson session.
///
/// All mutations go through here. Each one updates [`SessionState`] first and
/// then queues the changed rows on [`ProgressSync`]; nothing waits for the store.
pub struct SessionController {
    state: SessionState,
    clock: Clock,
    sync: ProgressSync,
}

impl SessionController {
    pub(crate) fn new(state: SessionState, clock: Clock, sync: ProgressSync) -> Self {
        let mut controller = Self { state, clock, sync };
        let now = controller.clock.now();
        controller.on_activated(now);
        controller
    }

    // ─── reads ───

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.state.session_id()
    }

    #[must_use]
    pub fn tasks(&self) -> &[TaskSlot] {
        self.state.slots()
    }

    #[must_use]
    pub fn current(&self) -> &TaskSlot {
        self.state.current()
    }

    #[must_use]
    pub fn lesson(&self) -> &LessonProgress {
        self.state.lesson()
    }

    #[must_use]
    pub fn activation(&self) -> Activation {
        self.state.activation()
    }

    #[must_use]
    pub fn selection_mode(&self) -> SelectionMode {
        self.state.selection()
    }

    /// Whether the UI should enable "next".
    ///
    /// Only a gate for the host: [`SessionController::next`] itself always moves.
    #[must_use]
    pub fn can_advance(&self) -> bool {
        let current = self.state.current();
        let has_next = self.state.current_index() + 1 < self.state.slots().len();
        has_next && (!current.is_available() || current.machine().is_completed())
    }

    // ─── navigation ───

    /// Make `task_id` the current task.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownTask` if the session has no such task.
    pub fn select(&mut self, task_id: TaskId) -> Result<Activation, SessionError> {
        let index = self.state.index_of_any(task_id)?;
        self.navigate(index);
        Ok(self.state.activation())
    }

    /// Move to the next task. `None` at the end of the lesson.
    pub fn next(&mut self) -> Option<Activation> {
        let index = self.state.current_index() + 1;
        if index >= self.state.slots().len() {
            return None;
        }
        self.navigate(index);
        Some(self.state.activation())
    }

    /// Move to the previous task. `None` at the start of the lesson.
    pub fn previous(&mut self) -> Option<Activation> {
        let index = self.state.current_index().checked_sub(1)?;
        self.navigate(index);
        Some(self.state.activation())
    }

    /// Follow the "first incomplete task" default, unless the user has chosen.
    ///
    /// Returns the new activation when the pointer moved.
    pub fn reselect(&mut self) -> Option<Activation> {
        if self.state.selection() == SelectionMode::Manual {
            return None;
        }
        let index = self.state.auto_index();
        let moved = self.state.move_to(index, SelectionMode::Auto)?;
        self.on_activated(self.clock.now());
        Some(moved)
    }

    /// Hand task selection back to the engine and reselect.
    pub fn reset_selection(&mut self) -> Option<Activation> {
        let index = self.state.current_index();
        self.state.move_to(index, SelectionMode::Auto);
        self.reselect()
    }

    fn navigate(&mut self, index: usize) {
        if self.state.move_to(index, SelectionMode::Manual).is_some() {
            self.on_activated(self.clock.now());
        }
    }

    /// Capture the engagement start of a vocabulary task on its first activation.
    fn on_activated(&mut self, now: DateTime<Utc>) {
        let index = self.state.current_index();
        let slot = self.state.slot_mut(index);
        if !slot.is_available() || slot.machine().is_completed() {
            return;
        }
        let Some(timer) = slot.engagement_mut() else {
            return;
        };
        if timer.started_at().is_some() {
            return;
        }
        let started_at = timer.activate(now);
        let transition = slot
            .machine_mut()
            .record_progress(CompletionData::engagement_partial(started_at, 0), now);
        self.after(index, transition, now);
    }

    // ─── task operations ───

    /// Merge granular progress into a task.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the task is unknown or unavailable.
    pub fn record_progress(
        &mut self,
        task_id: TaskId,
        partial: CompletionData,
    ) -> Result<TaskUpdate, SessionError> {
        let index = self.state.index_of(task_id)?;
        let now = self.clock.now();
        let transition = self
            .state
            .slot_mut(index)
            .machine_mut()
            .record_progress(partial, now);
        Ok(self.after(index, transition, now))
    }

    /// Explicitly complete a task.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the task is unknown or unavailable.
    pub fn complete(
        &mut self,
        task_id: TaskId,
        final_data: CompletionData,
    ) -> Result<TaskUpdate, SessionError> {
        let index = self.state.index_of(task_id)?;
        let now = self.clock.now();
        let transition = self
            .state
            .slot_mut(index)
            .machine_mut()
            .complete(final_data, now);
        Ok(self.after(index, transition, now))
    }

    /// Reopen a completed task with cleared data.
    ///
    /// Replaying the current vocabulary task starts a new activation with a fresh
    /// engagement start; tickers for the old one stop on their next tick.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the task is unknown or unavailable.
    pub fn replay(&mut self, task_id: TaskId) -> Result<TaskUpdate, SessionError> {
        let index = self.state.index_of(task_id)?;
        let now = self.clock.now();
        let is_current = index == self.state.current_index();
        let slot = self.state.slot_mut(index);
        let transition = slot.machine_mut().replay(now);
        if transition != Transition::Replayed {
            return Ok(self.after(index, transition, now));
        }

        let mut restarted = None;
        if let Some(timer) = slot.engagement_mut() {
            timer.reset();
            if is_current {
                restarted = Some(timer.activate(now));
            }
        }
        if let Some(started_at) = restarted {
            self.state.reactivate();
            self.state
                .slot_mut(index)
                .machine_mut()
                .record_progress(CompletionData::engagement_partial(started_at, 0), now);
        }
        Ok(self.after(index, transition, now))
    }

    /// Choose `choice` for quiz item `item_id` of a rules, listening or attention task.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the task is unknown or unavailable, or the item or
    /// choice does not exist.
    pub fn answer(
        &mut self,
        task_id: TaskId,
        item_id: &str,
        choice: usize,
    ) -> Result<AnswerResult, SessionError> {
        let index = self.state.index_of(task_id)?;
        let now = self.clock.now();
        let (outcome, transition) = self
            .state
            .slot_mut(index)
            .machine_mut()
            .answer(item_id, choice, now)?;
        Ok(AnswerResult {
            outcome,
            update: self.after(index, transition, now),
        })
    }

    /// Press "I said it out loud".
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the task is unknown or unavailable.
    pub fn acknowledge(&mut self, task_id: TaskId) -> Result<TaskUpdate, SessionError> {
        let index = self.state.index_of(task_id)?;
        let now = self.clock.now();
        let transition = self.state.slot_mut(index).machine_mut().acknowledge(now);
        Ok(self.after(index, transition, now))
    }

    /// Store the text typed for a writing prompt.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the task is unknown or unavailable.
    pub fn save_text(
        &mut self,
        task_id: TaskId,
        prompt: usize,
        text: &str,
    ) -> Result<TaskUpdate, SessionError> {
        let index = self.state.index_of(task_id)?;
        let now = self.clock.now();
        let transition = self
            .state
            .slot_mut(index)
            .machine_mut()
            .save_text(prompt, text, now);
        Ok(self.after(index, transition, now))
    }

    /// Apply one engagement tick for `activation`.
    ///
    /// Returns `None` when the activation is stale, the current task has no running
    /// timer, or the task is already completed. The tick that reaches the required
    /// time completes the task.
    pub fn engagement_tick(&mut self, activation: Activation) -> Option<EngagementReport> {
        if activation != self.state.activation() {
            return None;
        }
        let index = self.state.current_index();
        let now = self.clock.now();
        let slot = self.state.slot_mut(index);
        if !slot.is_available() || slot.machine().is_completed() {
            return None;
        }
        let tick = slot.engagement_mut()?.tick(now)?;
        let elapsed_ms = u64::try_from(tick.elapsed.as_millis()).unwrap_or(u64::MAX);
        let transition = slot
            .machine_mut()
            .record_progress(CompletionData::engagement_partial(tick.started_at, elapsed_ms), now);
        Some(EngagementReport {
            tick,
            update: self.after(index, transition, now),
        })
    }

    // ─── sync ───

    /// Mirror a change downstream and keep the lesson aggregate in step.
    fn after(&mut self, index: usize, transition: Transition, now: DateTime<Utc>) -> TaskUpdate {
        let session_id = self.state.session_id();
        let machine = self.state.slots()[index].machine();
        let task_id = machine.task_id();
        let status = machine.status();

        if transition.is_change() {
            if transition != Transition::Recorded {
                tracing::debug!(%session_id, %task_id, %status, ?transition, "task transition");
            }
            self.sync.push_task(machine.progress().clone());
        }

        let mut lesson = LessonChange::Unchanged;
        if transition.affects_lesson() {
            lesson = self.state.recount(now);
        }
        if lesson == LessonChange::Completed {
            tracing::info!(
                %session_id,
                tasks_completed = self.state.lesson().tasks_completed(),
                "lesson completed"
            );
        }
        // a lesson row that never landed rides along with the next change
        let resend = transition.is_change() && self.sync.lesson_unsettled(session_id);
        if lesson != LessonChange::Unchanged || resend {
            self.sync.push_lesson(self.state.lesson().clone());
        }

        TaskUpdate {
            task_id,
            transition,
            status,
            lesson,
        }
    }

    /// Queue the lesson row as it stands.
    pub(crate) fn push_lesson(&self) {
        self.sync.push_lesson(self.state.lesson().clone());
    }

    /// Wait for queued writes to reach the store.
    pub async fn flush(&self) {
        self.sync.flush().await;
    }
}
