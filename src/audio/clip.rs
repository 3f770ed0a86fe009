use std::io::Cursor;

/// Output sample rate of every normalized clip
pub const TARGET_SAMPLE_RATE: u32 = 16000;
/// Output bit depth of every normalized clip
pub const TARGET_BIT_DEPTH: u16 = 16;
/// Content type of a normalized clip
pub const WAV_MIME_TYPE: &str = "audio/wav";

/// Sealed output of a capture session, before normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCapture {
    /// Concatenated encoded chunks in arrival order
    pub bytes: Vec<u8>,
    /// Container type reported by the device
    pub mime_type: String,
}

/// Canonical 16-bit PCM waveform (little-endian, interleaved)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedClip {
    sample_rate: u32,
    channel_count: u16,
    bit_depth: u16,
    pcm_bytes: Vec<u8>,
}

impl NormalizedClip {
    /// Build a clip from interleaved samples
    pub(crate) fn from_samples(channel_count: u16, samples: &[i16]) -> Self {
        let pcm_bytes = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self {
            sample_rate: TARGET_SAMPLE_RATE,
            channel_count,
            bit_depth: TARGET_BIT_DEPTH,
            pcm_bytes,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn bit_depth(&self) -> u16 {
        self.bit_depth
    }

    /// Raw PCM payload, without the container header
    pub fn pcm_bytes(&self) -> &[u8] {
        &self.pcm_bytes
    }

    pub fn duration_seconds(&self) -> f64 {
        let bytes_per_second =
            self.sample_rate as f64 * self.channel_count as f64 * (self.bit_depth / 8) as f64;
        if bytes_per_second == 0.0 {
            return 0.0;
        }
        self.pcm_bytes.len() as f64 / bytes_per_second
    }

    /// Encode as a WAV container
    ///
    /// Mono and stereo clips get the canonical 44-byte PCM header. Clips with
    /// more channels get a longer WAVE_FORMAT_EXTENSIBLE header from hound.
    pub fn wav_bytes(&self) -> Result<Vec<u8>, hound::Error> {
        let spec = hound::WavSpec {
            channels: self.channel_count,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bit_depth,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::with_capacity(44 + self.pcm_bytes.len()));
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
            for pair in self.pcm_bytes.chunks_exact(2) {
                writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
            }
            writer.finalize()?;
        }

        Ok(cursor.into_inner())
    }
}

/// Raw capture delivered unmodified because normalization failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackClip {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Result of normalizing one capture session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clip {
    Normalized(NormalizedClip),
    Fallback(FallbackClip),
}

impl Clip {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Clip::Fallback(_))
    }

    pub fn content_type(&self) -> &str {
        match self {
            Clip::Normalized(_) => WAV_MIME_TYPE,
            Clip::Fallback(fallback) => &fallback.mime_type,
        }
    }

    /// File name used for uploads and playback
    pub fn file_name(&self) -> String {
        let extension = match self.content_type().split(';').next().unwrap_or_default() {
            "audio/wav" | "audio/wave" | "audio/x-wav" => "wav",
            "audio/webm" => "webm",
            "audio/ogg" => "ogg",
            "audio/mpeg" => "mp3",
            "audio/mp4" => "m4a",
            "audio/flac" => "flac",
            _ => "bin",
        };
        format!("recording.{}", extension)
    }

    /// Bytes to upload or play: the WAV container, or the raw fallback bytes
    pub fn encoded_bytes(&self) -> Result<Vec<u8>, hound::Error> {
        match self {
            Clip::Normalized(clip) => clip.wav_bytes(),
            Clip::Fallback(fallback) => Ok(fallback.bytes.clone()),
        }
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        match self {
            Clip::Normalized(clip) => Some(clip.duration_seconds()),
            Clip::Fallback(_) => None,
        }
    }
}
