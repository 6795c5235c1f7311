use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::api::{ApiClient, AudioSegment, ChunkUploader, MergeCoordinator, ServerSessionView};
use crate::audio::{CaptureBackendFactory, DeviceCatalog, LevelMeter, SegmentEncoder};
use crate::config::{AudioConfig, Config};
use crate::error::RecorderError;

use super::status::{RecorderEvent, RecordingStatus};
use super::timer::{format_elapsed, spawn_ticker, Stopwatch};

const EVENT_CAPACITY: usize = 64;

/// Orchestrates one recording session: owns the status, the elapsed-time
/// accounting, the exclusive capture handle, and the sequencing of
/// uploads and the merge.
///
/// `start`/`pause`/`resume`/`stop` are no-ops when called from a state
/// where they are not a valid transition. Status is set optimistically
/// before each transition's I/O and rolled back to idle (through a
/// visible error) if that I/O fails irrecoverably.
pub struct RecordingStateMachine {
    session_id: String,
    status: RecordingStatus,
    stopwatch: Stopwatch,
    segment_sequence: u32,
    catalog: DeviceCatalog,
    factory: Box<dyn CaptureBackendFactory>,
    audio_config: AudioConfig,
    device_timeout: Duration,
    client: Arc<ApiClient>,
    encoder: Option<SegmentEncoder>,
    uploader: ChunkUploader,
    merger: MergeCoordinator,
    events: broadcast::Sender<RecorderEvent>,
    ticker: Option<JoinHandle<()>>,
    last_error: Option<String>,
}

impl RecordingStateMachine {
    /// Open a session for recording.
    ///
    /// The initial status derives from the opened projection: `Done` when
    /// a transcript already exists, else `Idle`. A done session never
    /// re-enters recording; open a new session instead.
    pub fn new(
        session_id: impl Into<String>,
        opened: Option<&ServerSessionView>,
        catalog: DeviceCatalog,
        factory: Box<dyn CaptureBackendFactory>,
        config: &Config,
    ) -> Self {
        let session_id = session_id.into();
        let status = match opened {
            Some(view) if view.has_transcript() => RecordingStatus::Done,
            _ => RecordingStatus::Idle,
        };

        let client = Arc::new(ApiClient::new(&config.server.base_url));
        let uploader = ChunkUploader::new(Arc::clone(&client), session_id.clone(), &config.upload);
        let merger = MergeCoordinator::new(Arc::clone(&client));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        info!("opened session {} with status {:?}", session_id, status);

        Self {
            session_id,
            status,
            stopwatch: Stopwatch::new(),
            segment_sequence: 0,
            catalog,
            factory,
            audio_config: config.audio.clone(),
            device_timeout: Duration::from_secs(config.server.device_timeout_secs),
            client,
            encoder: None,
            uploader,
            merger,
            events,
            ticker: None,
            last_error: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn status(&self) -> RecordingStatus {
        self.status
    }

    /// Next sequence index to assign; equals the count of acked segments.
    pub fn segment_sequence(&self) -> u32 {
        self.segment_sequence
    }

    pub fn devices(&self) -> &DeviceCatalog {
        &self.catalog
    }

    /// Change the input device. Only honored while idle.
    pub fn select_device(&mut self, id: &str) -> bool {
        if self.status != RecordingStatus::Idle {
            return false;
        }
        self.catalog.select(id)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Subscribe to status, message, and timer events.
    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.events.subscribe()
    }

    /// Amplitude feed for the active stream, if one is open.
    pub fn level_meter(&self) -> Option<LevelMeter> {
        self.encoder.as_ref().map(|e| e.level_meter())
    }

    /// Current timer value, `mm:ss`. Runs while recording, frozen while
    /// paused.
    pub fn timer_display(&self) -> String {
        format_elapsed(self.stopwatch.elapsed())
    }

    /// Captured milliseconds at the last pause/stop boundary.
    pub fn accumulated_ms(&self) -> u64 {
        self.stopwatch.accumulated().as_millis() as u64
    }

    /// Idle → Recording: acquire the stream, arm the first segment,
    /// start the timer and level meter.
    pub async fn start(&mut self) -> Result<(), RecorderError> {
        if self.status != RecordingStatus::Idle {
            return Ok(());
        }

        self.set_status(RecordingStatus::Recording);
        self.announce("Recording…");

        if self.catalog.is_empty() {
            let err = RecorderError::Device("no audio input devices".into());
            self.fail("Microphone error.", &err).await;
            return Err(err);
        }

        let backend = match self
            .factory
            .create(self.catalog.selected(), &self.audio_config)
        {
            Ok(backend) => backend,
            Err(err) => {
                self.fail("Microphone error.", &err).await;
                return Err(err);
            }
        };

        let acquired = tokio::time::timeout(
            self.device_timeout,
            SegmentEncoder::acquire(backend, &self.audio_config),
        )
        .await
        .unwrap_or_else(|_| Err(RecorderError::Device("device acquisition timed out".into())));

        let encoder = match acquired {
            Ok(encoder) => encoder,
            Err(err) => {
                self.fail("Microphone error.", &err).await;
                return Err(err);
            }
        };

        encoder.begin_segment().await;
        self.encoder = Some(encoder);
        self.stopwatch.start_segment();
        self.restart_ticker();

        Ok(())
    }

    /// Recording → Paused: close the running segment and upload it.
    pub async fn pause(&mut self) -> Result<(), RecorderError> {
        if self.status != RecordingStatus::Recording {
            return Ok(());
        }

        let total = self.stopwatch.freeze();
        self.abort_ticker();
        let _ = self
            .events
            .send(RecorderEvent::TimerTick(format_elapsed(total)));

        self.set_status(RecordingStatus::Paused);
        self.announce("Uploading partial…");

        if let Err(err) = self.flush_segment().await {
            self.fail("Error during processing.", &err).await;
            return Err(err);
        }

        self.announce("Paused.");
        Ok(())
    }

    /// Paused → Recording: arm a new segment and restart the timer from
    /// the frozen reference point.
    pub async fn resume(&mut self) -> Result<(), RecorderError> {
        if self.status != RecordingStatus::Paused {
            return Ok(());
        }

        self.set_status(RecordingStatus::Recording);
        self.announce("Resumed…");

        if let Some(encoder) = self.encoder.as_ref() {
            encoder.begin_segment().await;
        }
        self.stopwatch.start_segment();
        self.restart_ticker();

        Ok(())
    }

    /// Recording/Paused → Transcribing → Done: flush the final segment,
    /// release the stream, wait for every upload to settle, then merge
    /// and refresh.
    pub async fn stop(&mut self) -> Result<(), RecorderError> {
        if !self.status.is_active() {
            return Ok(());
        }
        let was_recording = self.status == RecordingStatus::Recording;

        self.set_status(RecordingStatus::Transcribing);
        self.announce("Finalizing…");
        self.abort_ticker();

        if was_recording {
            let total = self.stopwatch.freeze();
            let _ = self
                .events
                .send(RecorderEvent::TimerTick(format_elapsed(total)));

            if let Err(err) = self.flush_segment().await {
                self.fail("Error during processing.", &err).await;
                return Err(err);
            }
        }

        // The stream and its meter go away before any reassembly begins.
        self.release_stream().await;

        // A pause that halted on an upload failure leaves held segments;
        // everything must be acked before the merge may be requested.
        if let Err(err) = self.uploader.flush().await {
            self.fail("Error during processing.", &err).await;
            return Err(err);
        }

        self.announce("Merging chunks…");
        let outcome = match self.merger.finalize(&self.session_id).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.fail("Error during processing.", &err).await;
                return Err(err);
            }
        };

        if let Some(refresh_err) = &outcome.refresh_error {
            warn!("session view may be stale: {}", refresh_err);
            self.announce("Transcript ready; reopen the session to see it.");
        }

        self.merge_succeeded(outcome.session).await;
        Ok(())
    }

    /// Transcribing → Done, plus best-effort cleanup of the raw audio
    /// once a transcript exists.
    async fn merge_succeeded(&mut self, view: Option<ServerSessionView>) {
        self.set_status(RecordingStatus::Done);
        self.announce("Transcription complete");

        if let Some(view) = view {
            if view.has_transcript() && view.audio_file_path.is_some() {
                if let Err(e) = self.client.delete_audio(&self.session_id).await {
                    // Logged only; the transcript is already safe.
                    warn!("{}", RecorderError::Cleanup(e));
                }
            }
        }
    }

    /// Close the running segment and hand it to the uploader. The
    /// sequence index advances only once the upload is acknowledged.
    async fn flush_segment(&mut self) -> Result<(), RecorderError> {
        let encoder = self
            .encoder
            .as_ref()
            .ok_or_else(|| RecorderError::Capture("no capture stream".into()))?;

        let payload = encoder.end_segment().await?;
        let segment = AudioSegment::new(self.segment_sequence, payload);
        self.uploader.submit(segment).await?;
        self.segment_sequence += 1;
        Ok(())
    }

    /// Fatal-error path: release everything, surface the message, and
    /// settle back to idle through a visible error state.
    async fn fail(&mut self, message: &str, err: &RecorderError) {
        error!("session {} failed: {}", self.session_id, err);
        self.last_error = Some(err.to_string());

        self.abort_ticker();
        self.release_stream().await;

        self.set_status(RecordingStatus::Error);
        self.announce(message);
        self.set_status(RecordingStatus::Idle);
    }

    async fn release_stream(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            if let Err(e) = encoder.release().await {
                warn!("stream release failed: {}", e);
            }
        }
    }

    fn restart_ticker(&mut self) {
        self.abort_ticker();
        self.ticker = Some(spawn_ticker(
            self.events.clone(),
            self.stopwatch.accumulated(),
        ));
    }

    fn abort_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }

    fn set_status(&mut self, status: RecordingStatus) {
        if self.status != status {
            info!("session {}: {:?} -> {:?}", self.session_id, self.status, status);
        }
        self.status = status;
        let _ = self.events.send(RecorderEvent::StatusChanged(status));
    }

    fn announce(&self, message: &str) {
        let _ = self
            .events
            .send(RecorderEvent::StatusMessage(message.to_string()));
    }
}

impl Drop for RecordingStateMachine {
    fn drop(&mut self) {
        self.abort_ticker();
        // The encoder's own drop aborts the pump; the capture backend
        // joins its worker thread when dropped.
    }
}
