use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::completion::CompletionRule;
use crate::model::{CompletionData, TaskDefinition, TaskId, TaskProgress, TaskStatus};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnswerError {
    #[error("task {task} has no item {item}")]
    UnknownItem { task: TaskId, item: String },

    #[error("item {item} has {options} options, choice {choice} is out of range")]
    ChoiceOutOfRange {
        item: String,
        choice: usize,
        options: usize,
    },
}

/// Observable effect of an operation on a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    /// `not_started → in_progress`
    Started,
    /// Data changed, status did not.
    Recorded,
    /// First entry into `completed` since the last replay.
    Completed,
    /// `completed → in_progress` with cleared data.
    Replayed,
}

impl Transition {
    /// Whether the row must be written downstream.
    #[must_use]
    pub fn is_change(self) -> bool {
        !matches!(self, Transition::Unchanged)
    }

    /// Whether the lesson aggregate needs a recount.
    #[must_use]
    pub fn affects_lesson(self) -> bool {
        matches!(self, Transition::Completed | Transition::Replayed)
    }
}

/// Result of choosing an option for a quiz item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    Correct,
    /// Recorded for styling only; the correct option stays hidden.
    Wrong,
    /// Item already solved, or the whole task is completed.
    Locked,
}

/// Lifecycle of one task's progress, shared by every task type.
///
/// The task type only contributes its [`CompletionRule`].
#[derive(Debug, Clone)]
pub struct TaskMachine {
    definition: TaskDefinition,
    rule: CompletionRule,
    progress: TaskProgress,
}

impl TaskMachine {
    #[must_use]
    pub fn new(definition: TaskDefinition, progress: TaskProgress) -> Self {
        let rule = CompletionRule::for_task(&definition);
        Self {
            definition,
            rule,
            progress,
        }
    }

    #[must_use]
    pub fn definition(&self) -> &TaskDefinition {
        &self.definition
    }

    #[must_use]
    pub fn task_id(&self) -> TaskId {
        self.definition.id()
    }

    #[must_use]
    pub fn rule(&self) -> &CompletionRule {
        &self.rule
    }

    #[must_use]
    pub fn progress(&self) -> &TaskProgress {
        &self.progress
    }

    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.progress.status()
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.progress.is_completed()
    }

    /// Tasks are never gated on earlier tasks. Navigation gating is a UI concern.
    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        true
    }

    /// Merge a granular change into the bag and complete the task if its rule is met.
    ///
    /// Ignored once the task is completed: inputs stay locked until replay.
    pub fn record_progress(&mut self, partial: CompletionData, now: DateTime<Utc>) -> Transition {
        if self.is_completed() {
            return Transition::Unchanged;
        }
        let was_new = self.status() == TaskStatus::NotStarted;
        self.progress.start();
        self.progress.merge(partial, now);

        if self.rule.is_satisfied(self.progress.completion_data()) {
            self.progress.mark_completed(now);
            return Transition::Completed;
        }
        if was_new {
            Transition::Started
        } else {
            Transition::Recorded
        }
    }

    /// Explicitly finish the task with `final_data`.
    ///
    /// Calling this on a completed task only refreshes the data and never reports
    /// `Completed` again. When the rule does not yet permit completion the data is
    /// recorded like any other progress.
    pub fn complete(&mut self, final_data: CompletionData, now: DateTime<Utc>) -> Transition {
        if self.is_completed() {
            if final_data.is_empty() {
                return Transition::Unchanged;
            }
            self.progress.merge(final_data, now);
            return Transition::Recorded;
        }

        let mut probe = self.progress.completion_data().clone();
        probe.merge(final_data.clone());
        if !self.rule.permits_completion(&probe) {
            if final_data.is_empty() {
                return Transition::Unchanged;
            }
            return self.record_progress(final_data, now);
        }

        self.progress.start();
        self.progress.merge(final_data, now);
        self.progress.mark_completed(now);
        Transition::Completed
    }

    /// Reopen a completed task with a cleared bag. No-op in any other state.
    pub fn replay(&mut self, now: DateTime<Utc>) -> Transition {
        if !self.is_completed() {
            return Transition::Unchanged;
        }
        self.progress.reset(now);
        Transition::Replayed
    }

    /// Choose `choice` for quiz item `item_id`.
    ///
    /// Wrong choices are remembered and the item stays open; the first correct
    /// choice locks the item.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError` if the item does not exist or the choice is out of range.
    pub fn answer(
        &mut self,
        item_id: &str,
        choice: usize,
        now: DateTime<Utc>,
    ) -> Result<(AnswerOutcome, Transition), AnswerError> {
        let item = self
            .definition
            .payload()
            .find_item(item_id)
            .ok_or_else(|| AnswerError::UnknownItem {
                task: self.task_id(),
                item: item_id.to_owned(),
            })?;
        if choice >= item.options.len() {
            return Err(AnswerError::ChoiceOutOfRange {
                item: item_id.to_owned(),
                choice,
                options: item.options.len(),
            });
        }

        let data = self.progress.completion_data();
        if self.is_completed() || data.correct_answer(item_id).is_some() {
            return Ok((AnswerOutcome::Locked, Transition::Unchanged));
        }

        if item.is_correct(choice) {
            let partial = data.correct_answer_partial(item_id, choice);
            Ok((AnswerOutcome::Correct, self.record_progress(partial, now)))
        } else {
            let partial = data.wrong_answer_partial(item_id, choice);
            Ok((AnswerOutcome::Wrong, self.record_progress(partial, now)))
        }
    }

    /// The "I said it out loud" control.
    pub fn acknowledge(&mut self, now: DateTime<Utc>) -> Transition {
        self.record_progress(CompletionData::acknowledged_partial(), now)
    }

    /// Store free text typed for writing prompt `prompt`.
    pub fn save_text(&mut self, prompt: usize, text: &str, now: DateTime<Utc>) -> Transition {
        let partial = self.progress.completion_data().text_partial(prompt, text);
        self.record_progress(partial, now)
    }
}
