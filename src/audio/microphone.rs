// Live microphone capture through cpal
//
// cpal streams are not Send on every platform, so each session owns a
// dedicated thread that builds the stream, buffers float samples, and hands
// them over as one WAV container when asked to stop.

use std::io::Cursor;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use super::device::{
    CaptureConstraints, CaptureDevice, CaptureError, DeviceEvent, DeviceStream, StreamControl,
};

type SampleBuffer = Arc<Mutex<Vec<f32>>>;

/// Default system microphone
pub struct MicrophoneDevice {
    name: String,
}

impl MicrophoneDevice {
    pub fn new() -> Self {
        Self {
            name: "microphone".to_string(),
        }
    }
}

impl Default for MicrophoneDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CaptureDevice for MicrophoneDevice {
    async fn open(&self, constraints: &CaptureConstraints) -> Result<DeviceStream, CaptureError> {
        let (events_tx, events_rx) = mpsc::channel(4);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let constraints = constraints.clone();

        std::thread::Builder::new()
            .name("oya-speak-mic".to_string())
            .spawn(move || record_thread(constraints, ready_tx, stop_rx, events_tx))
            .map_err(|e| CaptureError::Device(e.to_string()))?;

        ready_rx
            .await
            .map_err(|_| CaptureError::Device("microphone thread exited early".to_string()))??;

        Ok(DeviceStream {
            events: events_rx,
            control: Box::new(MicrophoneControl {
                stop_tx: Some(stop_tx),
            }),
            mime_type: "audio/wav".to_string(),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct MicrophoneControl {
    stop_tx: Option<std_mpsc::Sender<()>>,
}

impl StreamControl for MicrophoneControl {
    fn request_stop(&mut self) {
        if let Some(tx) = &self.stop_tx {
            let _ = tx.send(());
        }
    }

    fn release(&mut self) {
        // Dropping the sender wakes the thread, which drops the stream
        if self.stop_tx.take().is_some() {
            debug!("Microphone released");
        }
    }
}

fn record_thread(
    constraints: CaptureConstraints,
    ready_tx: oneshot::Sender<Result<(), CaptureError>>,
    stop_rx: std_mpsc::Receiver<()>,
    events_tx: mpsc::Sender<DeviceEvent>,
) {
    let (stream, spec, samples) = match build_stream(&constraints) {
        Ok(parts) => parts,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(CaptureError::Device(e.to_string())));
        return;
    }
    if ready_tx.send(Ok(())).is_err() {
        return;
    }

    // Either an explicit stop or the control being dropped ends recording
    let _ = stop_rx.recv();
    drop(stream);

    let samples = std::mem::take(&mut *samples.lock().unwrap_or_else(|e| e.into_inner()));
    match encode_wav(spec, &samples) {
        Ok(bytes) => {
            info!(
                "Microphone stopped: {} samples, {} bytes",
                samples.len(),
                bytes.len()
            );
            let _ = events_tx.blocking_send(DeviceEvent::Data(bytes));
        }
        Err(e) => error!("Failed to encode microphone buffer: {}", e),
    }
    let _ = events_tx.blocking_send(DeviceEvent::Stopped);
}

fn encode_wav(spec: hound::WavSpec, samples: &[f32]) -> Result<Vec<u8>, hound::Error> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

fn build_stream(
    constraints: &CaptureConstraints,
) -> Result<(cpal::Stream, hound::WavSpec, SampleBuffer), CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(CaptureError::DeviceUnavailable)?;

    let config = pick_config(&device, constraints)?;
    info!(
        "Using microphone {:?}: {}Hz, {} channel(s) (echo cancellation, noise suppression and gain control are left to the OS)",
        device.name().unwrap_or_default(),
        config.sample_rate.0,
        config.channels
    );

    let spec = hound::WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate.0,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let samples: SampleBuffer = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&samples);
    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buffer) = sink.lock() {
                    buffer.extend_from_slice(data);
                }
            },
            |err| error!("Microphone stream error: {}", err),
            None,
        )
        .map_err(map_build_error)?;

    Ok((stream, spec, samples))
}

/// Prefer an f32 config matching the constraints, else the device default
fn pick_config(
    device: &cpal::Device,
    constraints: &CaptureConstraints,
) -> Result<cpal::StreamConfig, CaptureError> {
    let wanted_rate = cpal::SampleRate(constraints.sample_rate);

    if let Ok(ranges) = device.supported_input_configs() {
        for range in ranges {
            if range.channels() == constraints.channel_count
                && range.sample_format() == cpal::SampleFormat::F32
                && range.min_sample_rate() <= wanted_rate
                && range.max_sample_rate() >= wanted_rate
            {
                return Ok(range.with_sample_rate(wanted_rate).config());
            }
        }
    }

    let default = device
        .default_input_config()
        .map_err(|e| CaptureError::Device(e.to_string()))?;
    if default.sample_format() != cpal::SampleFormat::F32 {
        return Err(CaptureError::Device(format!(
            "unsupported sample format {:?}",
            default.sample_format()
        )));
    }
    Ok(default.config())
}

fn map_build_error(e: cpal::BuildStreamError) -> CaptureError {
    match e {
        cpal::BuildStreamError::DeviceNotAvailable => CaptureError::DeviceUnavailable,
        cpal::BuildStreamError::BackendSpecific { err }
            if err.description.to_lowercase().contains("permission") =>
        {
            CaptureError::PermissionDenied
        }
        other => CaptureError::Device(other.to_string()),
    }
}
