use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::SampleFormat;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::config::AudioConfig;
use crate::error::RecorderError;

use super::device::resolve_input_device;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Microphone capture backend trait
///
/// The production implementation is cpal; tests drive the pipeline with
/// scripted backends that replay pre-baked frames.
#[async_trait::async_trait]
pub trait CaptureBackend: Send {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames. The
    /// channel closes when the backend stops.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, RecorderError>;

    /// Stop capturing audio and release the hardware stream
    async fn stop(&mut self) -> Result<(), RecorderError>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Creates one backend per recording attempt, bound to a device id.
pub trait CaptureBackendFactory: Send + Sync {
    fn create(
        &self,
        device_id: &str,
        config: &AudioConfig,
    ) -> Result<Box<dyn CaptureBackend>, RecorderError>;
}

/// Factory for the cpal microphone backend.
pub struct CpalFactory;

impl CaptureBackendFactory for CpalFactory {
    fn create(
        &self,
        device_id: &str,
        config: &AudioConfig,
    ) -> Result<Box<dyn CaptureBackend>, RecorderError> {
        Ok(Box::new(CpalBackend::new(device_id, config.clone())))
    }
}

/// cpal-based microphone capture.
///
/// cpal streams are not `Send`, so the stream lives on a dedicated thread
/// that batches samples into a tokio channel and blocks until stopped.
pub struct CpalBackend {
    device_id: String,
    config: AudioConfig,
    worker: Option<Worker>,
}

struct Worker {
    stop_tx: std::sync::mpsc::Sender<()>,
    thread: std::thread::JoinHandle<()>,
}

impl CpalBackend {
    pub fn new(device_id: impl Into<String>, config: AudioConfig) -> Self {
        Self {
            device_id: device_id.into(),
            config,
            worker: None,
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for CpalBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, RecorderError> {
        if self.worker.is_some() {
            return Err(RecorderError::Capture("capture already running".into()));
        }

        let (frame_tx, frame_rx) = mpsc::channel(64);
        let (stop_tx, stop_rx) = std::sync::mpsc::channel();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();

        let device_id = self.device_id.clone();
        let buffer_ms = self.config.buffer_duration_ms;

        let thread = std::thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || capture_thread(device_id, buffer_ms, frame_tx, stop_rx, ready_tx))
            .map_err(|e| RecorderError::Device(format!("failed to spawn capture thread: {e}")))?;

        // The stream comes up on the worker thread; wait for its verdict
        // off the async runtime.
        let ready = tokio::task::spawn_blocking(move || ready_rx.recv())
            .await
            .map_err(|e| RecorderError::Device(format!("capture setup interrupted: {e}")))?
            .map_err(|_| RecorderError::Device("capture thread exited before setup".into()))?;

        match ready {
            Ok(()) => {
                info!("microphone capture started");
                self.worker = Some(Worker { stop_tx, thread });
                Ok(frame_rx)
            }
            Err(e) => Err(e),
        }
    }

    async fn stop(&mut self) -> Result<(), RecorderError> {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            let _ = tokio::task::spawn_blocking(move || worker.thread.join()).await;
            info!("microphone capture stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.worker.is_some()
    }

    fn name(&self) -> &str {
        "cpal"
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            let _ = worker.thread.join();
        }
    }
}

/// Owns the cpal stream for its whole lifetime, then drops it on the stop
/// signal (or when the backend is dropped).
fn capture_thread(
    device_id: String,
    buffer_ms: u64,
    frame_tx: mpsc::Sender<AudioFrame>,
    stop_rx: std::sync::mpsc::Receiver<()>,
    ready_tx: std::sync::mpsc::Sender<Result<(), RecorderError>>,
) {
    let stream = match build_input_stream(&device_id, buffer_ms, frame_tx) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(RecorderError::Device(format!(
            "failed to start input stream: {e}"
        ))));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    // Blocks until stop() sends or the backend is dropped.
    let _ = stop_rx.recv();
    drop(stream);
}

fn build_input_stream(
    device_id: &str,
    buffer_ms: u64,
    frame_tx: mpsc::Sender<AudioFrame>,
) -> Result<cpal::Stream, RecorderError> {
    let device = resolve_input_device(device_id)
        .ok_or_else(|| RecorderError::Device(format!("input device not found: {device_id:?}")))?;

    let supported = device
        .default_input_config()
        .map_err(|e| RecorderError::Device(format!("no supported input config: {e}")))?;

    let sample_format = supported.sample_format();
    let stream_config: cpal::StreamConfig = supported.into();
    let sample_rate = stream_config.sample_rate.0;
    let channels = stream_config.channels;

    info!(
        "opening input stream: {} Hz, {} channels, {:?}",
        sample_rate, channels, sample_format
    );

    let mut batcher = FrameBatcher::new(frame_tx, sample_rate, channels, buffer_ms);
    let err_fn = |err| error!("input stream error: {}", err);

    let stream = match sample_format {
        SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                batcher.push(data.iter().copied());
            },
            err_fn,
            None,
        ),
        SampleFormat::U16 => device.build_input_stream(
            &stream_config,
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                batcher.push(data.iter().map(|&s| (s as i32 - 32768) as i16));
            },
            err_fn,
            None,
        ),
        SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                batcher.push(
                    data.iter()
                        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                );
            },
            err_fn,
            None,
        ),
        other => {
            return Err(RecorderError::Device(format!(
                "unsupported sample format: {other:?}"
            )))
        }
    }
    .map_err(|e| RecorderError::Device(format!("failed to build input stream: {e}")))?;

    Ok(stream)
}

/// Accumulates callback buffers into fixed-duration frames.
struct FrameBatcher {
    tx: mpsc::Sender<AudioFrame>,
    sample_rate: u32,
    channels: u16,
    batch: usize,
    pending: Vec<i16>,
    frames_sent: u64,
}

impl FrameBatcher {
    fn new(tx: mpsc::Sender<AudioFrame>, sample_rate: u32, channels: u16, buffer_ms: u64) -> Self {
        let batch = (sample_rate as u64 * channels as u64 * buffer_ms / 1000).max(1) as usize;
        Self {
            tx,
            sample_rate,
            channels,
            batch,
            pending: Vec::with_capacity(batch),
            frames_sent: 0,
        }
    }

    fn push<I: IntoIterator<Item = i16>>(&mut self, samples: I) {
        self.pending.extend(samples);

        while self.pending.len() >= self.batch {
            let rest = self.pending.split_off(self.batch);
            let samples = std::mem::replace(&mut self.pending, rest);
            let timestamp_ms = self.frames_sent * 1000 / self.sample_rate as u64;
            self.frames_sent += (samples.len() / self.channels.max(1) as usize) as u64;

            // Runs on the realtime audio callback; drop the frame rather
            // than block if the consumer falls behind.
            let _ = self.tx.try_send(AudioFrame {
                samples,
                sample_rate: self.sample_rate,
                channels: self.channels,
                timestamp_ms,
            });
        }
    }
}
