use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

/// Practice language, serialized as the speech provider's tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "en", alias = "english")]
    English,
    #[serde(rename = "yo", alias = "yoruba")]
    Yoruba,
    #[serde(rename = "ig", alias = "igbo")]
    Igbo,
    #[serde(rename = "ha", alias = "hausa")]
    Hausa,
}

impl Language {
    pub fn tag(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Yoruba => "yo",
            Language::Igbo => "ig",
            Language::Hausa => "ha",
        }
    }

    /// Name the backend stores on lessons
    pub fn name(&self) -> &'static str {
        match self {
            Language::English => "english",
            Language::Yoruba => "yoruba",
            Language::Igbo => "igbo",
            Language::Hausa => "hausa",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Language {
    type Err = String;

    /// Accepts tags (`yo`) and names (`Yoruba`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" | "english" => Ok(Language::English),
            "yo" | "yoruba" => Ok(Language::Yoruba),
            "ig" | "igbo" => Ok(Language::Igbo),
            "ha" | "hausa" => Ok(Language::Hausa),
            other => Err(format!("unsupported language: {}", other)),
        }
    }
}

/// Transcription response (backend or provider)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    pub transcript: String,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub request_id: Option<String>,
}

/// Scoring request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub target_text: String,
    pub transcript: String,
    pub confidence: f32,
}

/// Per-word verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WordFeedback {
    Correct,
    Partial,
    Incorrect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordScore {
    pub word: String,
    pub score: f64,
    pub feedback: WordFeedback,
}

/// Scoring response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResponse {
    /// Overall score, 0 to 100
    pub score: f64,
    #[serde(default)]
    pub word_scores: Vec<WordScore>,
    #[serde(default, deserialize_with = "string_or_seq")]
    pub suggestions: Vec<String>,
}

/// Attempt persistence request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRequest {
    pub lesson_item_id: i64,
    pub transcript: String,
    pub score: f64,
    pub word_feedback: Vec<WordScore>,
}

/// Acknowledgement of a stored attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptSaved {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub xp: i64,
    #[serde(default)]
    pub streak: i64,
}

/// A stored attempt from the learner's history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub id: i64,
    pub lesson_item_id: i64,
    pub transcript: String,
    pub score: f64,
    #[serde(default)]
    pub word_feedback: serde_json::Value,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub id: i64,
    pub title: String,
    pub language: String,
    #[serde(default, alias = "difficulty")]
    pub level: Option<String>,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonItem {
    pub id: i64,
    pub lesson_id: i64,
    /// Phrase the learner reads aloud
    pub text: String,
    #[serde(default)]
    pub expected_answer: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

/// One learner's standing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    #[serde(default, alias = "user_id")]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub xp: i64,
    #[serde(default)]
    pub streak: i64,
    #[serde(default)]
    pub rank: Option<u32>,
}

/// Stored learner preferences
///
/// Only `target_language` is interpreted; other keys are kept as sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub target_language: Option<String>,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub updated_at: Option<NaiveDateTime>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Preference changes, sent JSON-encoded in the `preferences_update` query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreferencesUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

/// Error body shapes seen from the backend
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    pub(crate) fn into_message(self) -> Option<String> {
        match self.detail {
            Some(serde_json::Value::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
            None => self.message,
        }
    }
}

/// The scoring service returns either a list or a single sentence
fn string_or_seq<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Null(()),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) if s.is_empty() => Vec::new(),
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
        OneOrMany::Null(()) => Vec::new(),
    })
}
