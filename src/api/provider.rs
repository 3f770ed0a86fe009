// Direct transcription against the hosted speech provider
//
// Used when the backend's /transcribe/ proxy is bypassed. Authenticates with
// the provider API key instead of the learner's token.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::info;

use super::client::read_json;
use super::error::{from_reqwest, ApiError};
use super::messages::{Language, TranscriptionResponse};
use crate::audio::Clip;

pub struct ProviderClient {
    http: Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl ProviderClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ApiError::InvalidRequest(
                "speech provider API key not configured".to_string(),
            ));
        }

        let http = Client::builder()
            .build()
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key,
            timeout,
        })
    }

    pub async fn transcribe(
        &self,
        clip: &Clip,
        language: Language,
    ) -> Result<TranscriptionResponse, ApiError> {
        let bytes = clip
            .encoded_bytes()
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

        info!(
            "Sending {} bytes to speech provider (language={})",
            bytes.len(),
            language
        );

        let part = Part::bytes(bytes)
            .file_name(clip.file_name())
            .mime_str(clip.content_type())
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

        let timeout_secs = self.timeout.as_secs();
        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("language", language.tag())])
            .bearer_auth(&self.api_key)
            .multipart(Form::new().part("audio", part))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| from_reqwest(e, timeout_secs))?;

        read_json(response, timeout_secs).await
    }
}
