use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::backend::{AttemptBackend, Transcriber};
use super::config::PracticeConfig;
use super::outcome::{AttemptOutcome, PracticeError, PracticeItem};
use crate::api::{ApiClient, ApiError, AttemptRequest, Language};
use crate::audio::{AudioCapture, CaptureError, Clip, SessionClip};

/// Sends a finished clip through transcription, scoring and storage
pub struct AttemptOrchestrator {
    transcriber: Arc<dyn Transcriber>,
    backend: Arc<dyn AttemptBackend>,
    config: PracticeConfig,
}

impl AttemptOrchestrator {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        backend: Arc<dyn AttemptBackend>,
        config: PracticeConfig,
    ) -> Self {
        Self {
            transcriber,
            backend,
            config,
        }
    }

    /// Orchestrator that uses the backend for every step
    pub fn with_client(client: Arc<ApiClient>, config: PracticeConfig) -> Self {
        Self::new(client.clone(), client, config)
    }

    pub fn config(&self) -> &PracticeConfig {
        &self.config
    }

    /// Run one attempt to completion
    ///
    /// A failure to store the attempt still returns the computed feedback
    /// inside `PracticeError::Persist`.
    pub async fn submit(
        &self,
        clip: &Clip,
        item: &PracticeItem,
        language: Language,
    ) -> Result<AttemptOutcome, PracticeError> {
        let attempt_id = Uuid::new_v4();
        info!(
            "Attempt {} for item {} ({}, {}{})",
            attempt_id,
            item.lesson_item_id,
            language,
            clip.content_type(),
            if clip.is_fallback() { ", fallback" } else { "" }
        );

        let transcript = self
            .transcribe(clip, language)
            .await
            .map_err(PracticeError::Transcribe)?;
        info!("Attempt {} transcript: {:?}", attempt_id, transcript);

        let scored = self
            .backend
            .score(&item.target_text, &transcript, self.config.score_confidence)
            .await
            .map_err(PracticeError::Score)?;
        info!("Attempt {} scored {:.1}", attempt_id, scored.score);

        let mut outcome = AttemptOutcome {
            lesson_item_id: item.lesson_item_id,
            transcript,
            score: scored.score,
            word_scores: scored.word_scores,
            suggestions: scored.suggestions,
            saved: None,
        };

        let request = AttemptRequest {
            lesson_item_id: item.lesson_item_id,
            transcript: outcome.transcript.clone(),
            score: outcome.score,
            word_feedback: outcome.word_scores.clone(),
        };

        match self.backend.save_attempt(&request).await {
            Ok(saved) => {
                outcome.saved = Some(saved);
                Ok(outcome)
            }
            Err(source) => {
                warn!("Attempt {} scored but not saved: {}", attempt_id, source);
                Err(PracticeError::Persist {
                    source,
                    outcome: Box::new(outcome),
                })
            }
        }
    }

    /// Stop `capture` and submit the clip of its latest session
    ///
    /// Also picks up a clip from a session that hit its duration limit.
    /// Clips left over from earlier sessions are discarded.
    pub async fn submit_recording(
        &self,
        capture: &AudioCapture,
        clips: &mut mpsc::UnboundedReceiver<SessionClip>,
        item: &PracticeItem,
        language: Language,
    ) -> Result<AttemptOutcome, PracticeError> {
        capture.stop().await?;

        let session_id = capture
            .session_id()
            .ok_or_else(|| CaptureError::Finalization("no recording to submit".to_string()))?;

        while let Ok(done) = clips.try_recv() {
            if done.session_id == session_id {
                return self.submit(&done.clip, item, language).await;
            }
            debug!("Discarding clip from earlier session {}", done.session_id);
        }

        Err(CaptureError::Finalization(format!(
            "session {} delivered no clip",
            session_id
        ))
        .into())
    }

    async fn transcribe(&self, clip: &Clip, language: Language) -> Result<String, ApiError> {
        let limit = self.config.transcribe_timeout;
        match tokio::time::timeout(limit, self.transcriber.transcribe(clip, language)).await {
            Ok(result) => Ok(result?.transcript),
            Err(_) => {
                warn!("Transcription abandoned after {:?}", limit);
                Err(ApiError::Timeout(limit.as_secs()))
            }
        }
    }
}
