use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::api::{ApiContext, ApiTimeouts};
use crate::audio::{CaptureConfig, CaptureConstraints};
use crate::practice::PracticeConfig;

/// Environment overrides use this prefix, e.g. `OYA_SPEAK__SPEECH__API_KEY`
pub const ENV_PREFIX: &str = "OYA_SPEAK";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub speech: SpeechConfig,
    pub capture: CaptureSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub auth_token: Option<String>,
    pub request_timeout_secs: u64,
    pub transcribe_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://oya-speak-r.onrender.com".to_string(),
            auth_token: None,
            request_timeout_secs: 30,
            transcribe_timeout_secs: 90,
        }
    }
}

/// Hosted speech provider, used when transcribing without the backend
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub provider_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub max_duration_secs: u64,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            max_duration_secs: 30,
            sample_rate: 16000,
            channels: 1,
        }
    }
}

impl Config {
    /// Load `path` (any format the `config` crate knows, extension optional)
    /// and apply environment overrides. A missing file yields the defaults.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .with_context(|| format!("Failed to read config from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn api_context(&self) -> ApiContext {
        let context = ApiContext::new(self.api.base_url.clone());
        match self.api.auth_token.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => context.with_token(token),
            None => context,
        }
    }

    pub fn api_timeouts(&self) -> ApiTimeouts {
        ApiTimeouts {
            request: Duration::from_secs(self.api.request_timeout_secs),
            transcribe: Duration::from_secs(self.api.transcribe_timeout_secs),
        }
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            max_duration_secs: self.capture.max_duration_secs,
            constraints: CaptureConstraints {
                sample_rate: self.capture.sample_rate,
                channel_count: self.capture.channels,
                ..CaptureConstraints::default()
            },
        }
    }

    pub fn practice_config(&self) -> PracticeConfig {
        PracticeConfig {
            transcribe_timeout: Duration::from_secs(self.api.transcribe_timeout_secs),
            ..PracticeConfig::default()
        }
    }
}
