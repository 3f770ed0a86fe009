use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::debug;

use super::clip::TARGET_SAMPLE_RATE;

/// Reasons a raw capture could not be decoded
#[derive(Debug, Error)]
pub enum DecodeError {
    /// No decoding context could be created
    #[error("decoder unavailable: {0}")]
    Unavailable(String),

    /// The container or codec is not supported
    #[error("unsupported audio format: {0}")]
    Unsupported(String),

    /// The stream is corrupt or truncated
    #[error("corrupt audio stream: {0}")]
    Corrupt(String),

    /// The stream decoded to nothing usable
    #[error("no audio data decoded")]
    Empty,
}

impl From<SymphoniaError> for DecodeError {
    fn from(e: SymphoniaError) -> Self {
        match e {
            SymphoniaError::Unsupported(what) => DecodeError::Unsupported(what.to_string()),
            other => DecodeError::Corrupt(other.to_string()),
        }
    }
}

/// Linear PCM, one buffer per channel, values nominally in [-1, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl DecodedAudio {
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Frames available in every channel
    pub fn frames(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// A decoding context; dropping it releases whatever it holds
pub trait DecodeContext: Send {
    fn decode(&mut self, raw: &[u8], mime_type: &str) -> Result<DecodedAudio, DecodeError>;
}

/// Source of decoding contexts
pub trait AudioDecoder: Send + Sync {
    fn open(&self) -> Result<Box<dyn DecodeContext>, DecodeError>;
}

/// Symphonia-backed decoder producing audio at a fixed output rate
///
/// Like a browser decoding context created at 16kHz, every decoded stream is
/// resampled to `output_rate` regardless of its native rate.
pub struct SymphoniaDecoder {
    output_rate: u32,
}

impl SymphoniaDecoder {
    pub fn new(output_rate: u32) -> Self {
        Self { output_rate }
    }
}

impl Default for SymphoniaDecoder {
    fn default() -> Self {
        Self::new(TARGET_SAMPLE_RATE)
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn open(&self) -> Result<Box<dyn DecodeContext>, DecodeError> {
        if self.output_rate == 0 {
            return Err(DecodeError::Unavailable("output rate must be non-zero".to_string()));
        }
        Ok(Box::new(SymphoniaContext {
            output_rate: self.output_rate,
        }))
    }
}

struct SymphoniaContext {
    output_rate: u32,
}

impl DecodeContext for SymphoniaContext {
    fn decode(&mut self, raw: &[u8], mime_type: &str) -> Result<DecodedAudio, DecodeError> {
        let source = MediaSourceStream::new(Box::new(Cursor::new(raw.to_vec())), Default::default());

        let mut hint = Hint::new();
        let base_type = mime_type.split(';').next().unwrap_or_default().trim();
        if !base_type.is_empty() {
            hint.mime_type(base_type);
        }

        let probed = symphonia::default::get_probe().format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::Unsupported("no decodable audio track".to_string()))?;
        let track_id = track.id;
        let mut decoder =
            symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

        let mut source_rate = track.codec_params.sample_rate.unwrap_or(0);
        let mut channels: Vec<Vec<f32>> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break
                }
                Err(e) => return Err(e.into()),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                // Skip a malformed packet, keep the rest of the stream
                Err(SymphoniaError::DecodeError(msg)) => {
                    debug!("Skipping undecodable packet: {}", msg);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let spec = *decoded.spec();
            let channel_count = spec.channels.count();
            if channel_count == 0 {
                continue;
            }
            source_rate = spec.rate;
            if channels.is_empty() {
                channels = vec![Vec::new(); channel_count];
            }

            let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buffer.copy_interleaved_ref(decoded);
            for frame in buffer.samples().chunks_exact(channel_count) {
                for (channel, &sample) in channels.iter_mut().zip(frame) {
                    channel.push(sample);
                }
            }
        }

        if channels.is_empty() || source_rate == 0 {
            return Err(DecodeError::Empty);
        }

        debug!(
            "Decoded {} channel(s) at {}Hz, {} frames",
            channels.len(),
            source_rate,
            channels[0].len()
        );

        let channels = channels
            .iter()
            .map(|c| resample_linear(c, source_rate, self.output_rate))
            .collect();

        Ok(DecodedAudio {
            sample_rate: self.output_rate,
            channels,
        })
    }
}

/// Resample one channel by linear interpolation
///
/// Returns the input unchanged when the rates already match.
pub fn resample_linear(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || source_rate == 0 {
        return samples.to_vec();
    }

    if samples.is_empty() {
        return Vec::new();
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let output_len = (samples.len() as f64 * ratio).round() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = (src_pos - idx as f64) as f32;

        let sample = match (samples.get(idx), samples.get(idx + 1)) {
            (Some(&a), Some(&b)) => a * (1.0 - frac) + b * frac,
            (Some(&a), None) => a,
            _ => 0.0,
        };
        output.push(sample);
    }

    output
}
