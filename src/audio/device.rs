use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// Errors raised while acquiring or driving a capture device
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The user (or the OS) refused microphone access
    #[error("microphone permission denied")]
    PermissionDenied,

    /// No capture device exists on this host
    #[error("no audio capture device available")]
    DeviceUnavailable,

    /// A session is already recording or still finalizing
    #[error("a capture session is already active")]
    AlreadyRecording,

    /// Any other device failure
    #[error("capture device error: {0}")]
    Device(String),

    /// Finalization task failed before a clip was delivered
    #[error("capture finalization failed: {0}")]
    Finalization(String),
}

/// Requested capture format and processing
///
/// Devices treat these as targets; the normalizer fixes the final format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConstraints {
    /// Target sample rate in Hz
    pub sample_rate: u32,
    /// Target channel count (1 = mono)
    pub channel_count: u16,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // Speech provider expects 16kHz
            channel_count: 1,   // Mono
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// Event delivered by an open device stream, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// An encoded fragment of the recording
    Data(Vec<u8>),
    /// The device confirmed the stream has stopped; no data follows
    Stopped,
}

/// Control side of an open device stream
pub trait StreamControl: Send {
    /// Ask the device to stop; the device answers with [`DeviceEvent::Stopped`]
    fn request_stop(&mut self);

    /// Release the underlying hardware (stop all tracks)
    ///
    /// Must be idempotent.
    fn release(&mut self);
}

/// An open capture stream: ordered events plus its control handle
pub struct DeviceStream {
    pub events: mpsc::Receiver<DeviceEvent>,
    pub control: Box<dyn StreamControl>,
    /// Container type of the encoded data, e.g. `audio/wav` or `audio/webm`
    pub mime_type: String,
}

/// Audio capture device
///
/// Implementations:
/// - [`FileDevice`]: replays an encoded file (testing, batch practice)
/// - `MicrophoneDevice`: live capture through cpal (feature `microphone`)
#[async_trait::async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Acquire the device and begin delivering encoded chunks
    async fn open(&self, constraints: &CaptureConstraints) -> Result<DeviceStream, CaptureError>;

    /// Get device name for logging
    fn name(&self) -> &str;
}

/// Capture source type
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Default microphone input
    Microphone,
    /// Encoded audio file replayed as if recorded
    File(PathBuf),
}

/// Capture device factory
pub struct DeviceFactory;

impl DeviceFactory {
    /// Create a capture device for the given source
    pub fn create(source: AudioSource) -> Result<Arc<dyn CaptureDevice>, CaptureError> {
        match source {
            AudioSource::Microphone => {
                #[cfg(feature = "microphone")]
                {
                    Ok(Arc::new(super::microphone::MicrophoneDevice::new()))
                }

                #[cfg(not(feature = "microphone"))]
                {
                    Err(CaptureError::Device(
                        "microphone capture requires the `microphone` feature".to_string(),
                    ))
                }
            }

            AudioSource::File(path) => Ok(Arc::new(FileDevice::new(path))),
        }
    }
}

/// Guess a container MIME type from a file extension
pub fn mime_type_for_path(path: &std::path::Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("wav") => "audio/wav",
        Some("webm") => "audio/webm",
        Some("ogg") | Some("oga") => "audio/ogg",
        Some("mp3") => "audio/mpeg",
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("flac") => "audio/flac",
        _ => "application/octet-stream",
    }
}

/// Replays an encoded audio file as a capture stream
///
/// The whole file is delivered as fixed-size chunks right away; the stream
/// then waits for a stop request before confirming with `Stopped`.
pub struct FileDevice {
    path: PathBuf,
    chunk_size: usize,
    name: String,
}

impl FileDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("file:{}", path.display());
        Self {
            path,
            chunk_size: 16 * 1024,
            name,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

#[async_trait::async_trait]
impl CaptureDevice for FileDevice {
    async fn open(&self, constraints: &CaptureConstraints) -> Result<DeviceStream, CaptureError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CaptureError::DeviceUnavailable)
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(CaptureError::PermissionDenied)
            }
            Err(e) => return Err(CaptureError::Device(e.to_string())),
        };

        info!(
            "Opened file device {} ({} bytes, requested {}Hz/{}ch)",
            self.path.display(),
            bytes.len(),
            constraints.sample_rate,
            constraints.channel_count
        );

        let chunks: Vec<Vec<u8>> = bytes.chunks(self.chunk_size).map(<[u8]>::to_vec).collect();
        let (tx, rx) = mpsc::channel(chunks.len() + 1);
        let (stop_tx, stop_rx) = oneshot::channel();

        tokio::spawn(async move {
            for chunk in chunks {
                if tx.send(DeviceEvent::Data(chunk)).await.is_err() {
                    return;
                }
            }
            // Sender dropped also counts as a stop request
            let _ = stop_rx.await;
            let _ = tx.send(DeviceEvent::Stopped).await;
        });

        Ok(DeviceStream {
            events: rx,
            control: Box::new(FileControl {
                stop_tx: Some(stop_tx),
                released: false,
            }),
            mime_type: mime_type_for_path(&self.path).to_string(),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct FileControl {
    stop_tx: Option<oneshot::Sender<()>>,
    released: bool,
}

impl StreamControl for FileControl {
    fn request_stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.stop_tx.take();
            debug!("File device released");
        }
    }
}
