use async_trait::async_trait;

use crate::api::{
    ApiClient, ApiError, AttemptRequest, AttemptSaved, Language, ProviderClient, ScoreResponse,
    TranscriptionResponse,
};
use crate::audio::Clip;

/// Turns a clip into text
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        clip: &Clip,
        language: Language,
    ) -> Result<TranscriptionResponse, ApiError>;
}

/// Scores transcripts and stores attempts
#[async_trait]
pub trait AttemptBackend: Send + Sync {
    async fn score(
        &self,
        target_text: &str,
        transcript: &str,
        confidence: f32,
    ) -> Result<ScoreResponse, ApiError>;

    async fn save_attempt(&self, attempt: &AttemptRequest) -> Result<AttemptSaved, ApiError>;
}

#[async_trait]
impl Transcriber for ApiClient {
    async fn transcribe(
        &self,
        clip: &Clip,
        language: Language,
    ) -> Result<TranscriptionResponse, ApiError> {
        ApiClient::transcribe(self, clip, language).await
    }
}

#[async_trait]
impl AttemptBackend for ApiClient {
    async fn score(
        &self,
        target_text: &str,
        transcript: &str,
        confidence: f32,
    ) -> Result<ScoreResponse, ApiError> {
        ApiClient::score(self, target_text, transcript, confidence).await
    }

    async fn save_attempt(&self, attempt: &AttemptRequest) -> Result<AttemptSaved, ApiError> {
        ApiClient::save_attempt(self, attempt).await
    }
}

#[async_trait]
impl Transcriber for ProviderClient {
    async fn transcribe(
        &self,
        clip: &Clip,
        language: Language,
    ) -> Result<TranscriptionResponse, ApiError> {
        ProviderClient::transcribe(self, clip, language).await
    }
}
