pub mod api;
pub mod audio;
pub mod config;
pub mod practice;

pub use api::{ApiClient, ApiContext, ApiError, ApiTimeouts, Language, ProviderClient};
pub use audio::{
    AudioCapture, AudioSource, CaptureConfig, CaptureError, Clip, DeviceFactory, NormalizedClip,
    PlaybackRegistry, RawCapture, WaveformNormalizer,
};
pub use config::Config;
pub use practice::{AttemptOrchestrator, AttemptOutcome, PracticeConfig, PracticeError, PracticeItem};
