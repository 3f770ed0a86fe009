use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info};

use super::error::{from_reqwest, ApiError};
use super::messages::{
    AttemptRecord, AttemptRequest, AttemptSaved, ErrorBody, HealthStatus, Language,
    LeaderboardEntry, Lesson, LessonItem, Preferences, PreferencesUpdate, ScoreRequest,
    ScoreResponse, TranscriptionResponse,
};
use crate::audio::Clip;

/// Who we talk to and as whom
///
/// Passed explicitly to every client; there is no process-wide token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiContext {
    /// Backend base URL, e.g. `https://api.example.com`
    pub base_url: String,
    /// Bearer token for the signed-in learner
    pub auth_token: Option<String>,
}

impl ApiContext {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

/// Per-request time limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiTimeouts {
    /// JSON endpoints
    pub request: Duration,
    /// Audio upload and transcription
    pub transcribe: Duration,
}

impl Default for ApiTimeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(30),
            transcribe: Duration::from_secs(90),
        }
    }
}

/// Client for the practice backend REST API
pub struct ApiClient {
    http: Client,
    context: ApiContext,
    timeouts: ApiTimeouts,
}

impl ApiClient {
    pub fn new(context: ApiContext, timeouts: ApiTimeouts) -> Result<Self, ApiError> {
        let http = Client::builder()
            .build()
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

        info!("API client targeting {}", context.base_url);

        Ok(Self {
            http,
            context,
            timeouts,
        })
    }

    pub fn context(&self) -> &ApiContext {
        &self.context
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.context.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.context.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        timeout: Duration,
    ) -> Result<T, ApiError> {
        let timeout_secs = timeout.as_secs();
        let response = self
            .authorize(request)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| from_reqwest(e, timeout_secs))?;

        read_json(response, timeout_secs).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        debug!("GET {}", url);
        self.send(self.http.get(url).query(query), self.timeouts.request)
            .await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        debug!("POST {}", url);
        self.send(self.http.post(url).json(body), self.timeouts.request)
            .await
    }

    /// Upload a clip for transcription
    pub async fn transcribe(
        &self,
        clip: &Clip,
        language: Language,
    ) -> Result<TranscriptionResponse, ApiError> {
        let bytes = clip
            .encoded_bytes()
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

        info!(
            "Transcribing {} ({} bytes, {}, language={})",
            clip.file_name(),
            bytes.len(),
            clip.content_type(),
            language
        );

        let part = Part::bytes(bytes)
            .file_name(clip.file_name())
            .mime_str(clip.content_type())
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        let form = Form::new()
            .part("audio_file", part)
            .text("language", language.tag().to_string());

        let request = self.http.post(self.url("/transcribe/")).multipart(form);
        let response: TranscriptionResponse = self.send(request, self.timeouts.transcribe).await?;

        info!("Transcription received: {} chars", response.transcript.len());
        Ok(response)
    }

    /// Score a transcript against the target text
    pub async fn score(
        &self,
        target_text: &str,
        transcript: &str,
        confidence: f32,
    ) -> Result<ScoreResponse, ApiError> {
        let request = ScoreRequest {
            target_text: target_text.to_string(),
            transcript: transcript.to_string(),
            confidence,
        };
        let response: ScoreResponse = self.post_json("/score/", &request).await?;
        info!(
            "Score received: {:.1} ({} words)",
            response.score,
            response.word_scores.len()
        );
        Ok(response)
    }

    /// Persist a scored attempt
    pub async fn save_attempt(&self, attempt: &AttemptRequest) -> Result<AttemptSaved, ApiError> {
        let saved: AttemptSaved = self.post_json("/attempts/", attempt).await?;
        info!(
            "Attempt stored for item {} (xp={}, streak={})",
            attempt.lesson_item_id, saved.xp, saved.streak
        );
        Ok(saved)
    }

    /// Learner's recent attempts, newest first
    pub async fn attempts(&self, skip: u32, limit: u32) -> Result<Vec<AttemptRecord>, ApiError> {
        self.get_json(
            "/attempts/",
            &[("skip", skip.to_string()), ("limit", limit.to_string())],
        )
        .await
    }

    pub async fn lessons(
        &self,
        language: Option<&str>,
        level: Option<&str>,
    ) -> Result<Vec<Lesson>, ApiError> {
        let mut query = Vec::new();
        if let Some(language) = language {
            query.push(("language", language.to_string()));
        }
        if let Some(level) = level {
            query.push(("level", level.to_string()));
        }
        self.get_json("/lessons/", &query).await
    }

    pub async fn lesson_items(&self, lesson_id: i64) -> Result<Vec<LessonItem>, ApiError> {
        self.get_json(&format!("/lessons/{}/items", lesson_id), &[])
            .await
    }

    pub async fn lesson_item(&self, item_id: i64) -> Result<LessonItem, ApiError> {
        self.get_json(&format!("/lessons/items/{}", item_id), &[])
            .await
    }

    /// Top learners, optionally for one language
    pub async fn leaderboard(
        &self,
        language: Option<&str>,
        limit: u32,
    ) -> Result<Vec<LeaderboardEntry>, ApiError> {
        let mut query = Vec::new();
        if let Some(language) = language {
            query.push(("language", language.to_string()));
        }
        query.push(("limit", limit.to_string()));
        self.get_json("/leaderboard/", &query).await
    }

    pub async fn preferences(&self) -> Result<Preferences, ApiError> {
        self.get_json("/preference/", &[]).await
    }

    /// The backend reads the update as a JSON string query parameter
    pub async fn update_preferences(
        &self,
        update: &PreferencesUpdate,
    ) -> Result<Preferences, ApiError> {
        let encoded =
            serde_json::to_string(update).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        let url = self.url("/preference/");
        debug!("PUT {}", url);
        let request = self
            .http
            .put(url)
            .query(&[("preferences_update", encoded)]);
        let preferences: Preferences = self.send(request, self.timeouts.request).await?;
        info!(
            "Preferences updated (target language: {})",
            preferences.target_language.as_deref().unwrap_or("-")
        );
        Ok(preferences)
    }

    pub async fn health(&self) -> Result<HealthStatus, ApiError> {
        self.get_json("/health", &[]).await
    }
}

/// Decode a success body or classify the failure
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: Response,
    timeout_secs: u64,
) -> Result<T, ApiError> {
    let status = response.status();

    if status.is_success() {
        let body = response
            .bytes()
            .await
            .map_err(|e| from_reqwest(e, timeout_secs))?;
        return serde_json::from_slice(&body).map_err(|e| ApiError::Parse(e.to_string()));
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(ErrorBody::into_message)
        .filter(|m| !m.is_empty())
        .or_else(|| (!text.is_empty()).then(|| text.clone()))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        });

    error!("API error ({}): {}", status.as_u16(), message);
    Err(ApiError::from_status(status.as_u16(), message))
}
