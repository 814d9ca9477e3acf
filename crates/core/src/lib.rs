#![forbid(unsafe_code)]

//! Domain model and pure state machines for the lesson session engine.
//!
//! Nothing here performs I/O; time comes in as arguments or through [`Clock`].

pub mod completion;
pub mod engagement;
pub mod machine;
pub mod model;
pub mod scheduler;
pub mod time;

pub use time::Clock;
