//! Practice attempts
//!
//! Hands a finished clip to the remote services:
//! - transcription (backend proxy or the speech provider directly)
//! - scoring against the lesson item's text
//! - storing the scored attempt

mod backend;
mod config;
mod orchestrator;
mod outcome;

pub use backend::{AttemptBackend, Transcriber};
pub use config::PracticeConfig;
pub use orchestrator::AttemptOrchestrator;
pub use outcome::{AttemptOutcome, PracticeError, PracticeItem};
