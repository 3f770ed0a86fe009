use std::time::Duration;

/// Settings for one practice round trip
#[derive(Debug, Clone, PartialEq)]
pub struct PracticeConfig {
    /// Transcription is abandoned after this long
    pub transcribe_timeout: Duration,
    /// Confidence sent with every scoring request
    pub score_confidence: f32,
}

impl Default for PracticeConfig {
    fn default() -> Self {
        Self {
            transcribe_timeout: Duration::from_secs(90),
            score_confidence: 1.0,
        }
    }
}
