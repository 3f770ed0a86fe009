use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::{ApiError, AttemptSaved, LessonItem, WordScore};
use crate::audio::CaptureError;

/// The phrase a learner is asked to say
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PracticeItem {
    pub lesson_item_id: i64,
    pub target_text: String,
}

impl PracticeItem {
    pub fn new(lesson_item_id: i64, target_text: impl Into<String>) -> Self {
        Self {
            lesson_item_id,
            target_text: target_text.into(),
        }
    }
}

impl From<&LessonItem> for PracticeItem {
    fn from(item: &LessonItem) -> Self {
        Self::new(item.id, item.text.clone())
    }
}

/// Feedback for one spoken attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptOutcome {
    pub lesson_item_id: i64,
    pub transcript: String,
    /// Overall score, 0 to 100
    pub score: f64,
    pub word_scores: Vec<WordScore>,
    pub suggestions: Vec<String>,
    /// Backend acknowledgement, absent until the attempt is stored
    pub saved: Option<AttemptSaved>,
}

/// Failure of a practice attempt
///
/// Capture failures ("we could not record you") are kept apart from
/// processing failures ("we recorded you but could not process it").
#[derive(Debug, Error)]
pub enum PracticeError {
    #[error("could not record audio: {0}")]
    Capture(#[from] CaptureError),

    #[error("transcription failed: {0}")]
    Transcribe(#[source] ApiError),

    #[error("scoring failed: {0}")]
    Score(#[source] ApiError),

    /// Scoring succeeded; only storing the attempt failed
    #[error("attempt could not be saved: {source}")]
    Persist {
        #[source]
        source: ApiError,
        outcome: Box<AttemptOutcome>,
    },
}

impl PracticeError {
    pub fn is_capture_failure(&self) -> bool {
        matches!(self, PracticeError::Capture(_))
    }

    /// Whether retrying the same clip may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            PracticeError::Capture(_) => false,
            PracticeError::Transcribe(e) | PracticeError::Score(e) => e.is_retryable(),
            PracticeError::Persist { source, .. } => source.is_retryable(),
        }
    }

    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            PracticeError::Capture(_) => None,
            PracticeError::Transcribe(e) | PracticeError::Score(e) => Some(e),
            PracticeError::Persist { source, .. } => Some(source),
        }
    }
}
