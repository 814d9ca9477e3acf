use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::TaskId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// A task definition that cannot be presented.
///
/// These never abort a session: the task is shown as "not available".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DefinitionError {
    #[error("vocabulary task has no cards")]
    NoCards,

    #[error("task has no items")]
    NoItems,

    #[error("writing task has no prompts")]
    NoPrompts,

    #[error("item {item} has no options")]
    NoOptions { item: String },

    #[error("item {item} marks option {correct} as correct but has {options} options")]
    CorrectOutOfRange {
        item: String,
        correct: usize,
        options: usize,
    },

    #[error("item id {item} appears more than once")]
    DuplicateItem { item: String },

    #[error("item id cannot be empty")]
    EmptyItemId,

    #[error("payload cannot be read: {reason}")]
    Malformed { reason: String },
}

//
// ─── KIND ──────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Vocabulary,
    Rules,
    Listening,
    Attention,
    Writing,
    /// The stored payload could not be decoded.
    Unknown,
}

impl TaskKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Vocabulary => "vocabulary",
            TaskKind::Rules => "rules",
            TaskKind::Listening => "listening",
            TaskKind::Attention => "attention",
            TaskKind::Writing => "writing",
            TaskKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── PAYLOAD PIECES ────────────────────────────────────────────────────────────
//

/// One audio-bearing card of a vocabulary drill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyCard {
    pub phrase: String,
    #[serde(default)]
    pub translation: Option<String>,
    /// Key handed to the audio resolver. Falls back to `phrase` when absent.
    #[serde(default)]
    pub audio_key: Option<String>,
}

impl VocabularyCard {
    #[must_use]
    pub fn new(phrase: impl Into<String>) -> Self {
        Self {
            phrase: phrase.into(),
            translation: None,
            audio_key: None,
        }
    }

    #[must_use]
    pub fn with_translation(mut self, translation: impl Into<String>) -> Self {
        self.translation = Some(translation.into());
        self
    }

    #[must_use]
    pub fn audio_key(&self) -> &str {
        self.audio_key.as_deref().unwrap_or(&self.phrase)
    }
}

/// A multiple-choice question that must be answered correctly at least once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizItem {
    pub id: String,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct: usize,
}

impl QuizItem {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        prompt: impl Into<String>,
        options: Vec<String>,
        correct: usize,
    ) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            options,
            correct,
        }
    }

    #[must_use]
    pub fn is_correct(&self, choice: usize) -> bool {
        choice == self.correct
    }
}

/// An explanation block of a rules task, optionally followed by reinforcement questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleBlock {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub questions: Vec<QuizItem>,
}

//
// ─── PAYLOAD ───────────────────────────────────────────────────────────────────
//

/// Type-specific content of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskPayload {
    Vocabulary {
        cards: Vec<VocabularyCard>,
        #[serde(default)]
        required_time_secs: Option<u32>,
    },
    Rules {
        blocks: Vec<RuleBlock>,
        #[serde(default)]
        speak_aloud: bool,
    },
    Listening {
        #[serde(default)]
        audio_key: Option<String>,
        items: Vec<QuizItem>,
    },
    Attention {
        items: Vec<QuizItem>,
    },
    Writing {
        prompts: Vec<String>,
    },
    /// Stand-in for a stored payload that failed to decode. Never serialized.
    #[serde(skip)]
    Unreadable { reason: String },
}

impl TaskPayload {
    #[must_use]
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskPayload::Vocabulary { .. } => TaskKind::Vocabulary,
            TaskPayload::Rules { .. } => TaskKind::Rules,
            TaskPayload::Listening { .. } => TaskKind::Listening,
            TaskPayload::Attention { .. } => TaskKind::Attention,
            TaskPayload::Writing { .. } => TaskKind::Writing,
            TaskPayload::Unreadable { .. } => TaskKind::Unknown,
        }
    }

    /// Every quiz item of the task, in presentation order.
    pub fn quiz_items(&self) -> Box<dyn Iterator<Item = &QuizItem> + '_> {
        match self {
            TaskPayload::Rules { blocks, .. } => {
                Box::new(blocks.iter().flat_map(|block| block.questions.iter()))
            }
            TaskPayload::Listening { items, .. } | TaskPayload::Attention { items } => {
                Box::new(items.iter())
            }
            TaskPayload::Vocabulary { .. }
            | TaskPayload::Writing { .. }
            | TaskPayload::Unreadable { .. } => Box::new(std::iter::empty()),
        }
    }

    #[must_use]
    pub fn find_item(&self, item_id: &str) -> Option<&QuizItem> {
        self.quiz_items().find(|item| item.id == item_id)
    }
}

//
// ─── DEFINITION ────────────────────────────────────────────────────────────────
//

/// Immutable task content loaded from the content store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinition {
    id: TaskId,
    #[serde(default)]
    title: String,
    payload: TaskPayload,
}

impl TaskDefinition {
    #[must_use]
    pub fn new(id: TaskId, title: impl Into<String>, payload: TaskPayload) -> Self {
        Self {
            id,
            title: title.into(),
            payload,
        }
    }

    /// A task whose stored payload could not be decoded.
    ///
    /// It keeps its place in the lesson and is shown as "not available".
    #[must_use]
    pub fn unreadable(id: TaskId, title: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(
            id,
            title,
            TaskPayload::Unreadable {
                reason: reason.into(),
            },
        )
    }

    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn kind(&self) -> TaskKind {
        self.payload.kind()
    }

    #[must_use]
    pub fn payload(&self) -> &TaskPayload {
        &self.payload
    }

    /// Cards of a vocabulary task; empty for other kinds.
    #[must_use]
    pub fn cards(&self) -> &[VocabularyCard] {
        match &self.payload {
            TaskPayload::Vocabulary { cards, .. } => cards,
            _ => &[],
        }
    }

    /// Engaged time required before a vocabulary task completes itself.
    #[must_use]
    pub fn required_time(&self) -> Option<Duration> {
        match &self.payload {
            TaskPayload::Vocabulary {
                required_time_secs: Some(secs),
                ..
            } if *secs > 0 => Some(Duration::from_secs(u64::from(*secs))),
            _ => None,
        }
    }

    /// Check that the payload has something to show.
    ///
    /// # Errors
    ///
    /// Returns the first `DefinitionError` found.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        match &self.payload {
            TaskPayload::Vocabulary { cards, .. } => {
                if cards.is_empty() {
                    return Err(DefinitionError::NoCards);
                }
            }
            TaskPayload::Writing { prompts } => {
                if prompts.is_empty() {
                    return Err(DefinitionError::NoPrompts);
                }
            }
            TaskPayload::Rules { blocks, .. } => {
                if blocks.is_empty() {
                    return Err(DefinitionError::NoItems);
                }
            }
            TaskPayload::Listening { items, .. } | TaskPayload::Attention { items } => {
                if items.is_empty() {
                    return Err(DefinitionError::NoItems);
                }
            }
            TaskPayload::Unreadable { reason } => {
                return Err(DefinitionError::Malformed {
                    reason: reason.clone(),
                });
            }
        }

        let mut seen = HashSet::new();
        for item in self.payload.quiz_items() {
            if item.id.trim().is_empty() {
                return Err(DefinitionError::EmptyItemId);
            }
            if !seen.insert(item.id.as_str()) {
                return Err(DefinitionError::DuplicateItem {
                    item: item.id.clone(),
                });
            }
            if item.options.is_empty() {
                return Err(DefinitionError::NoOptions {
                    item: item.id.clone(),
                });
            }
            if item.correct >= item.options.len() {
                return Err(DefinitionError::CorrectOutOfRange {
                    item: item.id.clone(),
                    correct: item.correct,
                    options: item.options.len(),
                });
            }
        }
        Ok(())
    }
}
