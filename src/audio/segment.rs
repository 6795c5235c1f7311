use std::io::Cursor;
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::AudioConfig;
use crate::error::RecorderError;

use super::backend::{AudioFrame, CaptureBackend};
use super::level::{LevelFrame, LevelMeter, LevelPublisher};

/// Wraps one continuous capture interval into one compressed payload.
///
/// The underlying stream runs from acquire() to release(); segments are
/// armed and closed on top of it. Frames that arrive while no segment is
/// armed (i.e. while the session is paused) are dropped, never recorded.
/// Only whole, closed segments leave this type.
pub struct SegmentEncoder {
    backend: Box<dyn CaptureBackend>,
    shared: Arc<Mutex<PumpState>>,
    pump: Option<JoinHandle<()>>,
    levels_rx: watch::Receiver<LevelFrame>,
    default_rate: u32,
    default_channels: u16,
}

#[derive(Default)]
struct PumpState {
    armed: Option<SegmentBuffer>,
}

struct SegmentBuffer {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
}

impl SegmentEncoder {
    /// Start the backend and the frame pump. The encoder owns the stream
    /// exclusively until release().
    pub async fn acquire(
        mut backend: Box<dyn CaptureBackend>,
        config: &AudioConfig,
    ) -> Result<Self, RecorderError> {
        let frame_rx = backend.start().await?;

        let (level_tx, levels_rx) = watch::channel(LevelFrame::default());
        let shared = Arc::new(Mutex::new(PumpState::default()));
        let pump = tokio::spawn(pump_frames(
            frame_rx,
            Arc::clone(&shared),
            LevelPublisher::new(level_tx),
        ));

        Ok(Self {
            backend,
            shared,
            pump: Some(pump),
            levels_rx,
            default_rate: config.sample_rate,
            default_channels: config.channels,
        })
    }

    /// Arm a fresh segment. Any previously armed samples are discarded.
    pub async fn begin_segment(&self) {
        let mut state = self.shared.lock().await;
        state.armed = Some(SegmentBuffer {
            samples: Vec::new(),
            sample_rate: self.default_rate,
            channels: self.default_channels,
        });
        debug!("segment armed");
    }

    /// Close the armed segment and encode it.
    pub async fn end_segment(&self) -> Result<Vec<u8>, RecorderError> {
        let buffer = self
            .shared
            .lock()
            .await
            .armed
            .take()
            .ok_or_else(|| RecorderError::Capture("no segment in progress".into()))?;

        info!(
            "segment closed: {} samples at {} Hz",
            buffer.samples.len(),
            buffer.sample_rate
        );

        encode_wav(&buffer.samples, buffer.sample_rate, buffer.channels)
    }

    /// A new consumer handle for the amplitude feed.
    pub fn level_meter(&self) -> LevelMeter {
        LevelMeter::new(self.levels_rx.clone())
    }

    /// Stop the backend and wait for the pump to drain. The level feed
    /// closes here too: the meter dies exactly when the stream does.
    pub async fn release(mut self) -> Result<(), RecorderError> {
        self.backend.stop().await?;
        if let Some(pump) = self.pump.take() {
            let _ = pump.await;
        }
        Ok(())
    }
}

impl Drop for SegmentEncoder {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

/// Drains the backend channel: every frame feeds the level meter, armed
/// frames are also collected. Ends when the backend closes the channel.
async fn pump_frames(
    mut frame_rx: mpsc::Receiver<AudioFrame>,
    shared: Arc<Mutex<PumpState>>,
    mut levels: LevelPublisher,
) {
    while let Some(frame) = frame_rx.recv().await {
        levels.publish(&frame.samples);

        let mut state = shared.lock().await;
        if let Some(buffer) = state.armed.as_mut() {
            buffer.sample_rate = frame.sample_rate;
            buffer.channels = frame.channels;
            buffer.samples.extend_from_slice(&frame.samples);
        }
    }
    debug!("frame pump finished");
}

/// Encode interleaved i16 samples as an in-memory WAV payload.
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<u8>, RecorderError> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| RecorderError::Capture(format!("failed to start WAV payload: {e}")))?;

        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| RecorderError::Capture(format!("failed to encode sample: {e}")))?;
        }

        writer
            .finalize()
            .map_err(|e| RecorderError::Capture(format!("failed to finalize WAV payload: {e}")))?;
    }

    Ok(cursor.into_inner())
}
