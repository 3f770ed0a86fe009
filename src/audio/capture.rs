use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::clip::{Clip, RawCapture};
use super::device::{CaptureConstraints, CaptureDevice, CaptureError, DeviceEvent, StreamControl};
use super::normalize::WaveformNormalizer;

/// Capture configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Recording stops itself once this many seconds have elapsed
    pub max_duration_secs: u64,
    /// Constraints passed to the device on every start
    pub constraints: CaptureConstraints,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: 30,
            constraints: CaptureConstraints::default(),
        }
    }
}

/// Lifecycle of the capture component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    Idle,
    Recording,
    Finalizing,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    User,
    MaxDuration,
    DeviceEnded,
}

/// A finished session's clip, tagged with the session that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClip {
    pub session_id: Uuid,
    pub clip: Clip,
}

/// Handles owned by `AudioCapture` for the active session
struct ActiveSession {
    id: Uuid,
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

/// Records from a capture device for a bounded duration
///
/// Every finished session produces exactly one [`SessionClip`] on the completion
/// channel returned by [`AudioCapture::new`], whether it was stopped by the
/// caller, by the duration limit or by the device itself.
pub struct AudioCapture {
    device: Arc<dyn CaptureDevice>,
    normalizer: Arc<WaveformNormalizer>,
    config: CaptureConfig,
    phase: Arc<Mutex<CapturePhase>>,
    elapsed_secs: Arc<AtomicU64>,
    session: tokio::sync::Mutex<Option<ActiveSession>>,
    last_session: Mutex<Option<Uuid>>,
    completions: mpsc::UnboundedSender<SessionClip>,
}

impl AudioCapture {
    pub fn new(
        device: Arc<dyn CaptureDevice>,
        normalizer: Arc<WaveformNormalizer>,
        config: CaptureConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SessionClip>) {
        let (completions, completions_rx) = mpsc::unbounded_channel();

        info!(
            "Audio capture initialized: device={}, max duration {}s",
            device.name(),
            config.max_duration_secs
        );

        let capture = Self {
            device,
            normalizer,
            config,
            phase: Arc::new(Mutex::new(CapturePhase::Idle)),
            elapsed_secs: Arc::new(AtomicU64::new(0)),
            session: tokio::sync::Mutex::new(None),
            last_session: Mutex::new(None),
            completions,
        };

        (capture, completions_rx)
    }

    pub fn phase(&self) -> CapturePhase {
        *lock_phase(&self.phase)
    }

    pub fn is_recording(&self) -> bool {
        self.phase() == CapturePhase::Recording
    }

    /// Whole seconds recorded in the current (or last) session
    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_secs.load(Ordering::SeqCst)
    }

    pub fn max_duration_secs(&self) -> u64 {
        self.config.max_duration_secs
    }

    /// Id of the most recently started session
    pub fn session_id(&self) -> Option<Uuid> {
        *self.last_session.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open the device and begin a new capture session
    pub async fn start(&self) -> Result<Uuid, CaptureError> {
        let mut session = self.session.lock().await;

        {
            let mut phase = lock_phase(&self.phase);
            if *phase != CapturePhase::Idle {
                warn!("Capture already active ({:?})", *phase);
                return Err(CaptureError::AlreadyRecording);
            }
            // Reserve the slot while the device opens
            *phase = CapturePhase::Recording;
        }

        // Reap the previous session's task; it has already delivered its clip
        if let Some(previous) = session.take() {
            if let Err(e) = previous.task.await {
                error!("Previous capture session {} panicked: {}", previous.id, e);
            }
        }

        let stream = match self.device.open(&self.config.constraints).await {
            Ok(stream) => stream,
            Err(e) => {
                *lock_phase(&self.phase) = CapturePhase::Idle;
                error!("Failed to open capture device {}: {}", self.device.name(), e);
                return Err(e);
            }
        };

        let id = Uuid::new_v4();
        self.elapsed_secs.store(0, Ordering::SeqCst);
        *self.last_session.lock().unwrap_or_else(|e| e.into_inner()) = Some(id);

        info!(
            "Capture session {} started on {} ({})",
            id,
            self.device.name(),
            stream.mime_type
        );

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = SessionTask {
            id,
            events: stream.events,
            control: stream.control,
            mime_type: stream.mime_type,
            stop_rx,
            max_duration_secs: self.config.max_duration_secs,
            elapsed_secs: Arc::clone(&self.elapsed_secs),
            phase: Arc::clone(&self.phase),
            normalizer: Arc::clone(&self.normalizer),
            completions: self.completions.clone(),
        };

        *session = Some(ActiveSession {
            id,
            stop_tx: Some(stop_tx),
            task: tokio::spawn(task.run()),
        });

        Ok(id)
    }

    /// Stop the active session and wait until its clip has been delivered
    ///
    /// A no-op when nothing is recording. A session that already stopped on
    /// its own is only waited for, never finalized twice.
    pub async fn stop(&self) -> Result<(), CaptureError> {
        let mut session = self.session.lock().await;

        let Some(mut active) = session.take() else {
            debug!("Stop requested while not recording");
            return Ok(());
        };

        if self.is_recording() {
            info!("Stopping capture session {}", active.id);
            if let Some(stop_tx) = active.stop_tx.take() {
                // The task may have started finalizing since the check
                let _ = stop_tx.send(());
            }
        } else {
            debug!("Capture session {} already finalizing", active.id);
        }

        active
            .task
            .await
            .map_err(|e| CaptureError::Finalization(e.to_string()))
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        if let Some(active) = self.session.get_mut().take() {
            // Dropping stop_tx ends the session through the normal path
            drop(active.stop_tx);
            debug!("Capture {} dropped, session will finalize in background", active.id);
        }
    }
}

fn lock_phase(phase: &Mutex<CapturePhase>) -> std::sync::MutexGuard<'_, CapturePhase> {
    phase.lock().unwrap_or_else(|e| e.into_inner())
}

/// Releases the device when finalization ends, however it ends
struct DeviceRelease(Box<dyn StreamControl>);

impl Drop for DeviceRelease {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Returns the component to `Idle` once, on completion or on unwind
struct PhaseReset(Option<Arc<Mutex<CapturePhase>>>);

impl PhaseReset {
    fn finish(mut self) {
        if let Some(phase) = self.0.take() {
            *lock_phase(&phase) = CapturePhase::Idle;
        }
    }
}

impl Drop for PhaseReset {
    fn drop(&mut self) {
        if let Some(phase) = self.0.take() {
            *lock_phase(&phase) = CapturePhase::Idle;
        }
    }
}

/// One capture session, from device open to clip delivery
struct SessionTask {
    id: Uuid,
    events: mpsc::Receiver<DeviceEvent>,
    control: Box<dyn StreamControl>,
    mime_type: String,
    stop_rx: oneshot::Receiver<()>,
    max_duration_secs: u64,
    elapsed_secs: Arc<AtomicU64>,
    phase: Arc<Mutex<CapturePhase>>,
    normalizer: Arc<WaveformNormalizer>,
    completions: mpsc::UnboundedSender<SessionClip>,
}

impl SessionTask {
    /// Record until stopped, then seal and normalize on this task
    ///
    /// Normalization decodes synchronously here. Clips are bounded by
    /// `max_duration_secs` (30 s by default), so the decode is short; longer
    /// limits would call for `spawn_blocking`.
    async fn run(self) {
        let SessionTask {
            id,
            mut events,
            control,
            mime_type,
            mut stop_rx,
            max_duration_secs,
            elapsed_secs,
            phase,
            normalizer,
            completions,
        } = self;

        let reset = PhaseReset(Some(Arc::clone(&phase)));
        let mut device = DeviceRelease(control);
        let mut chunks: Vec<Vec<u8>> = Vec::new();

        let tick = Duration::from_secs(1);
        let mut ticker = interval_at(Instant::now() + tick, tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                _ = &mut stop_rx => break StopReason::User,
                _ = ticker.tick() => {
                    let elapsed = elapsed_secs.fetch_add(1, Ordering::SeqCst) + 1;
                    if elapsed >= max_duration_secs {
                        break StopReason::MaxDuration;
                    }
                }
                event = events.recv() => match event {
                    Some(DeviceEvent::Data(chunk)) => {
                        if !chunk.is_empty() {
                            chunks.push(chunk);
                        }
                    }
                    Some(DeviceEvent::Stopped) | None => break StopReason::DeviceEnded,
                },
            }
        };

        *lock_phase(&phase) = CapturePhase::Finalizing;
        info!(
            "Capture session {} finalizing after {}s ({:?})",
            id,
            elapsed_secs.load(Ordering::SeqCst),
            reason
        );

        if reason != StopReason::DeviceEnded {
            // Chunks racing the stop still belong to this session
            device.0.request_stop();
            while let Some(event) = events.recv().await {
                match event {
                    DeviceEvent::Data(chunk) => {
                        if !chunk.is_empty() {
                            chunks.push(chunk);
                        }
                    }
                    DeviceEvent::Stopped => break,
                }
            }
        }
        drop(device);

        let raw = RawCapture {
            bytes: chunks.concat(),
            mime_type,
        };
        info!(
            "Capture session {} sealed: {} bytes ({})",
            id,
            raw.bytes.len(),
            raw.mime_type
        );

        let clip = normalizer.normalize(raw);
        reset.finish();
        if completions.send(SessionClip { session_id: id, clip }).is_err() {
            warn!("Capture session {} finished but nobody is listening", id);
        }
    }
}
