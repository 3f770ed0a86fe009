pub mod capture;
pub mod clip;
pub mod decode;
pub mod device;
pub mod normalize;
pub mod playback;

#[cfg(feature = "microphone")]
pub mod microphone;

pub use capture::{AudioCapture, CaptureConfig, CapturePhase, SessionClip};
pub use clip::{Clip, FallbackClip, NormalizedClip, RawCapture, TARGET_SAMPLE_RATE, WAV_MIME_TYPE};
pub use decode::{AudioDecoder, DecodeContext, DecodeError, DecodedAudio, SymphoniaDecoder};
pub use device::{
    AudioSource, CaptureConstraints, CaptureDevice, CaptureError, DeviceEvent, DeviceFactory,
    DeviceStream, FileDevice, StreamControl,
};
pub use normalize::{quantize, WaveformNormalizer};
pub use playback::{PlaybackHandle, PlaybackRegistry};
