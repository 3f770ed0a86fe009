//! Remote services consumed by the practice flow
//!
//! - `ApiClient`: the practice backend (transcribe, score, attempts, lessons,
//!   leaderboard, preferences)
//! - `ProviderClient`: the hosted speech provider, called directly

pub mod client;
pub mod error;
pub mod messages;
pub mod provider;

pub use client::{ApiClient, ApiContext, ApiTimeouts};
pub use error::ApiError;
pub use messages::{
    AttemptRecord, AttemptRequest, AttemptSaved, HealthStatus, Language, LeaderboardEntry, Lesson,
    LessonItem, Preferences, PreferencesUpdate, ScoreRequest, ScoreResponse, TranscriptionResponse,
    WordFeedback, WordScore,
};
pub use provider::ProviderClient;
