//! Waveform normalization
//!
//! Turns whatever container the capture device produced into a canonical
//! 16kHz, 16-bit PCM WAV clip. When decoding fails the raw capture is handed
//! back untouched as a fallback clip instead of losing the recording.

use std::sync::Arc;

use tracing::{info, warn};

use super::clip::{Clip, FallbackClip, NormalizedClip, RawCapture, WAV_MIME_TYPE};
use super::decode::{AudioDecoder, DecodeError, DecodedAudio, SymphoniaDecoder};

/// Quantize one float sample to signed 16-bit PCM
///
/// Clamps to [-1, 1] first; negative samples scale by 32768, the rest by
/// 32767, so both extremes land exactly on the i16 range.
pub fn quantize(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Interleave and quantize decoded channels into a normalized clip
///
/// The clip keeps the decoded channel count so header and payload agree.
pub fn encode_pcm(decoded: &DecodedAudio) -> NormalizedClip {
    let frames = decoded.frames();
    let channel_count = decoded.channel_count();
    let mut samples = Vec::with_capacity(frames * channel_count);

    for i in 0..frames {
        for channel in &decoded.channels {
            samples.push(quantize(channel[i]));
        }
    }

    NormalizedClip::from_samples(channel_count as u16, &samples)
}

/// Decodes raw captures and re-encodes them as canonical WAV clips
pub struct WaveformNormalizer {
    decoder: Arc<dyn AudioDecoder>,
    label_fallback_as_wav: bool,
}

impl WaveformNormalizer {
    pub fn new(decoder: Arc<dyn AudioDecoder>) -> Self {
        Self {
            decoder,
            label_fallback_as_wav: false,
        }
    }

    /// Label fallback clips `audio/wav` whatever their real container
    ///
    /// Reproduces the legacy web client, which mislabels un-decoded bytes.
    pub fn with_legacy_wav_label(mut self, enabled: bool) -> Self {
        self.label_fallback_as_wav = enabled;
        self
    }

    /// Normalize one capture; never fails, falls back to the raw bytes
    pub fn normalize(&self, raw: RawCapture) -> Clip {
        match self.try_normalize(&raw) {
            Ok(clip) => {
                info!(
                    "Normalized clip: {:.2}s, {}Hz, {} channel(s), {} bytes",
                    clip.duration_seconds(),
                    clip.sample_rate(),
                    clip.channel_count(),
                    clip.pcm_bytes().len()
                );
                Clip::Normalized(clip)
            }
            Err(e) => {
                let mime_type = if self.label_fallback_as_wav {
                    WAV_MIME_TYPE.to_string()
                } else {
                    raw.mime_type
                };
                warn!(
                    "Normalization failed ({}), delivering raw capture as {} ({} bytes)",
                    e,
                    mime_type,
                    raw.bytes.len()
                );
                Clip::Fallback(FallbackClip {
                    bytes: raw.bytes,
                    mime_type,
                })
            }
        }
    }

    fn try_normalize(&self, raw: &RawCapture) -> Result<NormalizedClip, DecodeError> {
        // Context lives only for this call, so it is released on every path
        let mut context = self.decoder.open()?;
        let decoded = context.decode(&raw.bytes, &raw.mime_type)?;

        if decoded.channel_count() == 0 {
            return Err(DecodeError::Empty);
        }

        Ok(encode_pcm(&decoded))
    }
}

impl Default for WaveformNormalizer {
    fn default() -> Self {
        Self::new(Arc::new(SymphoniaDecoder::default()))
    }
}
