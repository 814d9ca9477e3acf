//! Lesson sessions: the canonical in-memory state, the controller that mutates
//! it, and the service that loads it from storage.

mod controller;
mod selection;
mod service;
mod state;

pub use controller::{AnswerResult, EngagementReport, SessionController, TaskUpdate};
pub use selection::{Activation, SelectionMode};
pub use service::LessonService;
pub use state::{SessionState, TaskSlot};
