use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// One amplitude sample for the visualization.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LevelFrame {
    /// Root-mean-square amplitude, 0.0..=1.0
    pub rms: f32,
    /// Peak amplitude, 0.0..=1.0
    pub peak: f32,
}

/// Consumer side of the amplitude feed.
///
/// The sequence ends for good once the capture stream is released; a new
/// recording produces a new meter.
pub struct LevelMeter {
    rx: watch::Receiver<LevelFrame>,
}

impl LevelMeter {
    pub(crate) fn new(rx: watch::Receiver<LevelFrame>) -> Self {
        Self { rx }
    }

    /// Latest published frame.
    pub fn current(&self) -> LevelFrame {
        *self.rx.borrow()
    }

    /// Wait for the next frame. Returns `None` once the stream is gone.
    pub async fn next(&mut self) -> Option<LevelFrame> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow())
    }
}

/// Producer side, driven by the frame pump. Smooths and throttles so the
/// visualization doesn't jitter at the raw frame rate.
pub(crate) struct LevelPublisher {
    tx: watch::Sender<LevelFrame>,
    smoothed: LevelFrame,
    last_update: Instant,
}

const MIN_PUBLISH_INTERVAL: Duration = Duration::from_millis(50);

impl LevelPublisher {
    pub(crate) fn new(tx: watch::Sender<LevelFrame>) -> Self {
        Self {
            tx,
            smoothed: LevelFrame::default(),
            last_update: Instant::now(),
        }
    }

    pub(crate) fn publish(&mut self, samples: &[i16]) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_update);
        if dt < MIN_PUBLISH_INTERVAL {
            return;
        }
        self.last_update = now;

        self.smoothed = smooth(self.smoothed, compute_levels(samples), dt);
        self.tx.send_replace(self.smoothed);
    }
}

/// rms/peak of a buffer of interleaved i16 samples, normalized to 0..=1.
pub fn compute_levels(samples: &[i16]) -> LevelFrame {
    if samples.is_empty() {
        return LevelFrame::default();
    }

    let mut peak = 0.0f32;
    let mut sum_sq = 0.0f32;

    for &s in samples {
        let v = s as f32 / i16::MAX as f32;
        let a = v.abs();
        if a > peak {
            peak = a;
        }
        sum_sq += v * v;
    }

    LevelFrame {
        rms: (sum_sq / samples.len() as f32).sqrt().clamp(0.0, 1.0),
        peak: peak.clamp(0.0, 1.0),
    }
}

/// Exponential smoothing with a 150ms time constant.
pub fn smooth(prev: LevelFrame, next: LevelFrame, dt: Duration) -> LevelFrame {
    let tau = 0.15f32;
    let alpha = 1.0 - (-dt.as_secs_f32() / tau).exp();
    LevelFrame {
        rms: prev.rms + (next.rms - prev.rms) * alpha,
        peak: prev.peak + (next.peak - prev.peak) * alpha,
    }
}
