mod ids;
mod playback;
mod progress;
mod task;

pub use ids::{ParseIdError, SessionId, TaskId};

pub use playback::{
    MAX_PAUSE_BETWEEN_REPEATS_MS, MAX_PLAYBACK_SPEED, MIN_PLAYBACK_SPEED, PlaybackSettings,
    PlaybackSettingsError, RepeatCount,
};
pub use progress::{
    CompletionData, LessonChange, LessonProgress, LessonStatus, ProgressError, TaskProgress,
    TaskStatus,
};
pub use task::{
    DefinitionError, QuizItem, RuleBlock, TaskDefinition, TaskKind, TaskPayload, VocabularyCard,
};
