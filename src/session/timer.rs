use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::status::RecorderEvent;

/// Format an elapsed duration as `mm:ss`, floored to the second.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Wall-clock accounting that excludes paused intervals.
///
/// `accumulated` only grows at a freeze boundary (pause or stop), from the
/// delta since the segment reference point; it never decreases.
#[derive(Debug, Default)]
pub struct Stopwatch {
    accumulated: Duration,
    segment_started_at: Option<Instant>,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reference point for a new recording segment.
    pub fn start_segment(&mut self) {
        self.segment_started_at = Some(Instant::now());
    }

    /// Fold the running segment into the accumulated total and freeze.
    pub fn freeze(&mut self) -> Duration {
        if let Some(started) = self.segment_started_at.take() {
            self.accumulated += started.elapsed();
        }
        self.accumulated
    }

    /// Captured time so far: the frozen total plus the running segment.
    pub fn elapsed(&self) -> Duration {
        match self.segment_started_at {
            Some(started) => self.accumulated + started.elapsed(),
            None => self.accumulated,
        }
    }

    /// The frozen total, excluding any running segment.
    pub fn accumulated(&self) -> Duration {
        self.accumulated
    }

    pub fn is_running(&self) -> bool {
        self.segment_started_at.is_some()
    }
}

/// Emit a timer tick once per second until the task is aborted.
///
/// `base` is the accumulated total at segment start; the ticker adds its
/// own running time on top, so aborting it on pause/stop freezes the
/// display at the right value.
pub(crate) fn spawn_ticker(
    events: broadcast::Sender<RecorderEvent>,
    base: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let started = Instant::now();
        let mut interval = tokio::time::interval_at(
            started + Duration::from_secs(1),
            Duration::from_secs(1),
        );
        loop {
            interval.tick().await;
            let _ = events.send(RecorderEvent::TimerTick(format_elapsed(
                base + started.elapsed(),
            )));
        }
    })
}
