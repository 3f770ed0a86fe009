// Shared test doubles: a scripted capture device, counting decoders and
// WAV fixtures.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use oya_speak::audio::{
    AudioDecoder, CaptureConstraints, CaptureDevice, CaptureError, DecodeContext, DecodeError,
    DecodedAudio, DeviceEvent, DeviceStream, StreamControl,
};
use tokio::sync::mpsc;

#[derive(Debug, Default)]
pub struct DeviceCounters {
    pub opens: AtomicUsize,
    pub stop_requests: AtomicUsize,
    pub releases: AtomicUsize,
}

/// Capture device driven by the test
///
/// Chunks are pushed with [`ScriptedDevice::push`]. A stop request is
/// answered with the optional late chunk followed by `Stopped`.
pub struct ScriptedDevice {
    mime_type: String,
    fail_with: Option<fn() -> CaptureError>,
    late_chunk: Option<Vec<u8>>,
    sender: Mutex<Option<mpsc::Sender<DeviceEvent>>>,
    pub counters: Arc<DeviceCounters>,
}

impl ScriptedDevice {
    pub fn new(mime_type: &str) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            fail_with: None,
            late_chunk: None,
            sender: Mutex::new(None),
            counters: Arc::new(DeviceCounters::default()),
        }
    }

    pub fn failing(error: fn() -> CaptureError) -> Self {
        Self {
            fail_with: Some(error),
            ..Self::new("audio/webm")
        }
    }

    /// Deliver `chunk` between the stop request and `Stopped`
    pub fn with_late_chunk(mut self, chunk: &[u8]) -> Self {
        self.late_chunk = Some(chunk.to_vec());
        self
    }

    pub fn push(&self, chunk: &[u8]) {
        let sender = self.sender.lock().unwrap();
        sender
            .as_ref()
            .expect("device not open")
            .try_send(DeviceEvent::Data(chunk.to_vec()))
            .expect("event buffer full");
    }

    /// End the stream from the device side
    pub fn finish(&self) {
        if let Some(sender) = self.sender.lock().unwrap().as_ref() {
            let _ = sender.try_send(DeviceEvent::Stopped);
        }
    }

    pub fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub fn stop_requests(&self) -> usize {
        self.counters.stop_requests.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.counters.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureDevice for ScriptedDevice {
    async fn open(&self, _constraints: &CaptureConstraints) -> Result<DeviceStream, CaptureError> {
        if let Some(error) = self.fail_with {
            return Err(error());
        }
        self.counters.opens.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(64);
        *self.sender.lock().unwrap() = Some(tx.clone());

        Ok(DeviceStream {
            events: rx,
            control: Box::new(ScriptedControl {
                sender: Some(tx),
                late_chunk: self.late_chunk.clone(),
                counters: Arc::clone(&self.counters),
            }),
            mime_type: self.mime_type.clone(),
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct ScriptedControl {
    sender: Option<mpsc::Sender<DeviceEvent>>,
    late_chunk: Option<Vec<u8>>,
    counters: Arc<DeviceCounters>,
}

impl StreamControl for ScriptedControl {
    fn request_stop(&mut self) {
        self.counters.stop_requests.fetch_add(1, Ordering::SeqCst);
        if let Some(sender) = &self.sender {
            if let Some(chunk) = self.late_chunk.take() {
                let _ = sender.try_send(DeviceEvent::Data(chunk));
            }
            let _ = sender.try_send(DeviceEvent::Stopped);
        }
    }

    fn release(&mut self) {
        if self.sender.take().is_some() {
            self.counters.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// What a [`CountingDecoder`] context does
#[derive(Debug, Clone)]
pub enum DecodeBehavior {
    /// Refuse to open a context
    Unavailable,
    /// Open, then fail to decode
    Corrupt,
    /// Return this audio whatever the input
    Fixed(DecodedAudio),
}

/// Decoder double that tracks how many contexts are open
pub struct CountingDecoder {
    behavior: DecodeBehavior,
    pub opened: Arc<AtomicUsize>,
    pub live: Arc<AtomicIsize>,
}

impl CountingDecoder {
    pub fn new(behavior: DecodeBehavior) -> Self {
        Self {
            behavior,
            opened: Arc::new(AtomicUsize::new(0)),
            live: Arc::new(AtomicIsize::new(0)),
        }
    }

    /// Decodes everything to `seconds` of mono 16 kHz silence
    pub fn silence(seconds: usize) -> Self {
        Self::new(DecodeBehavior::Fixed(DecodedAudio {
            sample_rate: 16000,
            channels: vec![vec![0.0; 16000 * seconds]],
        }))
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> isize {
        self.live.load(Ordering::SeqCst)
    }
}

impl AudioDecoder for CountingDecoder {
    fn open(&self) -> Result<Box<dyn DecodeContext>, DecodeError> {
        if let DecodeBehavior::Unavailable = self.behavior {
            return Err(DecodeError::Unavailable("no decoder in test".to_string()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingContext {
            behavior: self.behavior.clone(),
            live: Arc::clone(&self.live),
        }))
    }
}

struct CountingContext {
    behavior: DecodeBehavior,
    live: Arc<AtomicIsize>,
}

impl DecodeContext for CountingContext {
    fn decode(&mut self, _raw: &[u8], _mime_type: &str) -> Result<DecodedAudio, DecodeError> {
        match &self.behavior {
            DecodeBehavior::Fixed(audio) => Ok(audio.clone()),
            _ => Err(DecodeError::Corrupt("test stream is corrupt".to_string())),
        }
    }
}

impl Drop for CountingContext {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Decoder whose context cannot even be opened without panicking
pub struct PanickingDecoder;

impl AudioDecoder for PanickingDecoder {
    fn open(&self) -> Result<Box<dyn DecodeContext>, DecodeError> {
        panic!("decoder crashed");
    }
}

/// 16-bit PCM WAV file holding `samples` (interleaved)
pub fn wav_i16(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &sample in samples {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Read a WAV container back as (spec, samples)
pub fn read_wav(bytes: &[u8]) -> (hound::WavSpec, Vec<i16>) {
    let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
    let spec = reader.spec();
    let samples = reader.samples::<i16>().map(Result::unwrap).collect();
    (spec, samples)
}
