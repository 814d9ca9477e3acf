use lesson_core::model::TaskId;

/// Who picked the current task.
///
/// Once the user (or a deep link) has chosen, automatic re-selection stays off
/// until [`SessionController::reset_selection`](super::SessionController::reset_selection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    #[default]
    Auto,
    Manual,
}

/// Identifies one activation of a task.
///
/// Every time a task becomes current the generation moves on, so callbacks
/// captured for an earlier activation can tell they are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Activation {
    task_id: TaskId,
    generation: u64,
}

impl Activation {
    pub(crate) fn first(task_id: TaskId) -> Self {
        Self {
            task_id,
            generation: 1,
        }
    }

    pub(crate) fn next(self, task_id: TaskId) -> Self {
        Self {
            task_id,
            generation: self.generation.wrapping_add(1),
        }
    }

    #[must_use]
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
