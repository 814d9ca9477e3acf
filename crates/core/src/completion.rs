use std::time::Duration;

use crate::model::{CompletionData, TaskDefinition, TaskPayload};

/// The "what marks this task complete" policy of a task type.
///
/// Evaluated against the completion bag after every recorded change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionRule {
    /// Every listed item answered correctly at least once, plus an optional
    /// "said it out loud" acknowledgement.
    AllCorrect {
        items: Vec<String>,
        requires_acknowledgement: bool,
    },
    /// Only the explicit acknowledgement completes the task; text is optional.
    Acknowledgement,
    /// Completion follows elapsed engaged time.
    Engagement { required: Option<Duration> },
}

impl CompletionRule {
    #[must_use]
    pub fn for_task(definition: &TaskDefinition) -> Self {
        match definition.payload() {
            TaskPayload::Vocabulary { .. } => CompletionRule::Engagement {
                required: definition.required_time(),
            },
            TaskPayload::Writing { .. } | TaskPayload::Unreadable { .. } => {
                CompletionRule::Acknowledgement
            }
            TaskPayload::Rules { speak_aloud, .. } => CompletionRule::AllCorrect {
                items: item_ids(definition),
                requires_acknowledgement: *speak_aloud,
            },
            TaskPayload::Listening { .. } | TaskPayload::Attention { .. } => {
                CompletionRule::AllCorrect {
                    items: item_ids(definition),
                    requires_acknowledgement: false,
                }
            }
        }
    }

    #[must_use]
    pub fn is_timer_gated(&self) -> bool {
        matches!(self, CompletionRule::Engagement { .. })
    }

    /// Whether the bag alone completes the task.
    #[must_use]
    pub fn is_satisfied(&self, data: &CompletionData) -> bool {
        match self {
            CompletionRule::AllCorrect {
                items,
                requires_acknowledgement,
            } => {
                items.iter().all(|item| data.correct_answer(item).is_some())
                    && (!requires_acknowledgement || data.acknowledged())
            }
            CompletionRule::Acknowledgement => data.acknowledged(),
            CompletionRule::Engagement { required: Some(required) } => {
                let required_ms = u64::try_from(required.as_millis()).unwrap_or(u64::MAX);
                data.elapsed_ms().is_some_and(|elapsed| elapsed >= required_ms)
            }
            CompletionRule::Engagement { required: None } => false,
        }
    }

    /// Whether an explicit `complete` call may finish the task.
    ///
    /// A timed task without a requirement is always eligible but never completes by itself.
    #[must_use]
    pub fn permits_completion(&self, data: &CompletionData) -> bool {
        matches!(self, CompletionRule::Engagement { required: None }) || self.is_satisfied(data)
    }
}

fn item_ids(definition: &TaskDefinition) -> Vec<String> {
    definition
        .payload()
        .quiz_items()
        .map(|item| item.id.clone())
        .collect()
}
