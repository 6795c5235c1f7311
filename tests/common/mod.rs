// Shared test harness: scripted capture backends and an in-process mock
// of the session service that records arrival order.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use tokio::sync::mpsc;

use scribe_capture::config::Config;
use scribe_capture::{AudioFrame, CaptureBackend, CaptureBackendFactory, RecorderError};

pub fn test_config(base_url: &str) -> Config {
    let mut config = Config::default();
    config.server.base_url = base_url.to_string();
    config.upload.initial_backoff_ms = 10;
    config
}

pub fn tone_frames(count: usize) -> Vec<AudioFrame> {
    (0..count)
        .map(|i| AudioFrame {
            samples: vec![500i16; 1600],
            sample_rate: 16000,
            channels: 1,
            timestamp_ms: (i * 100) as u64,
        })
        .collect()
}

/// Backend that replays pre-baked frames, then keeps the channel open
/// until stopped.
pub struct ScriptedBackend {
    frames: Vec<AudioFrame>,
    tx: Option<mpsc::Sender<AudioFrame>>,
}

#[async_trait::async_trait]
impl CaptureBackend for ScriptedBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, RecorderError> {
        let (tx, rx) = mpsc::channel(256);
        for frame in self.frames.clone() {
            let _ = tx.try_send(frame);
        }
        self.tx = Some(tx);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), RecorderError> {
        self.tx = None;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.tx.is_some()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[derive(Default)]
pub struct ScriptedFactory {
    pub frames: Vec<AudioFrame>,
}

impl CaptureBackendFactory for ScriptedFactory {
    fn create(
        &self,
        _device_id: &str,
        _config: &scribe_capture::config::AudioConfig,
    ) -> Result<Box<dyn CaptureBackend>, RecorderError> {
        Ok(Box::new(ScriptedBackend {
            frames: self.frames.clone(),
            tx: None,
        }))
    }
}

/// Backend whose frame feed is driven by the test: the sender lands in
/// `slot` once capture starts.
pub struct ManualBackend {
    pub slot: Arc<Mutex<Option<mpsc::Sender<AudioFrame>>>>,
}

#[async_trait::async_trait]
impl CaptureBackend for ManualBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, RecorderError> {
        let (tx, rx) = mpsc::channel(256);
        *self.slot.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), RecorderError> {
        *self.slot.lock().unwrap() = None;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.slot.lock().unwrap().is_some()
    }

    fn name(&self) -> &str {
        "manual"
    }
}

/// Factory whose backends never come up, like a machine with no usable
/// microphone.
pub struct FailingFactory;

impl CaptureBackendFactory for FailingFactory {
    fn create(
        &self,
        _device_id: &str,
        _config: &scribe_capture::config::AudioConfig,
    ) -> Result<Box<dyn CaptureBackend>, RecorderError> {
        Err(RecorderError::Device("no usable microphone".into()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerEvent {
    Chunk { session: String, bytes: usize },
    Merge { session: String },
    Fetch { session: String },
    DeleteAudio { session: String },
}

#[derive(Clone)]
struct MockState {
    events: Arc<Mutex<Vec<ServerEvent>>>,
    fail_uploads: Arc<AtomicU32>,
    fail_fetches: Arc<AtomicU32>,
    session_json: Arc<Mutex<serde_json::Value>>,
}

/// In-process session service double listening on an ephemeral port.
pub struct MockServer {
    pub base_url: String,
    events: Arc<Mutex<Vec<ServerEvent>>>,
    fail_uploads: Arc<AtomicU32>,
    fail_fetches: Arc<AtomicU32>,
    #[allow(dead_code)]
    session_json: Arc<Mutex<serde_json::Value>>,
}

impl MockServer {
    pub async fn spawn() -> Self {
        Self::spawn_with(serde_json::json!({ "session_id": 1 })).await
    }

    pub async fn spawn_with(session_json: serde_json::Value) -> Self {
        let state = MockState {
            events: Arc::new(Mutex::new(Vec::new())),
            fail_uploads: Arc::new(AtomicU32::new(0)),
            fail_fetches: Arc::new(AtomicU32::new(0)),
            session_json: Arc::new(Mutex::new(session_json)),
        };

        let app = Router::new()
            .route("/sessions/:id/chunks", post(upload_chunk))
            .route("/sessions/:id/merge-chunks", post(merge_chunks))
            .route("/sessions/:id/audio", delete(delete_audio))
            .route("/sessions/:id", get(fetch_session))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            events: state.events,
            fail_uploads: state.fail_uploads,
            fail_fetches: state.fail_fetches,
            session_json: state.session_json,
        }
    }

    pub fn events(&self) -> Vec<ServerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn chunk_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, ServerEvent::Chunk { .. }))
            .count()
    }

    pub fn merge_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, ServerEvent::Merge { .. }))
            .count()
    }

    /// Fail the next `n` chunk uploads with a 500.
    pub fn fail_next_uploads(&self, n: u32) {
        self.fail_uploads.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` session fetches with a 500.
    pub fn fail_next_fetches(&self, n: u32) {
        self.fail_fetches.store(n, Ordering::SeqCst);
    }
}

fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

async fn upload_chunk(
    State(state): State<MockState>,
    Path(id): Path<String>,
    body: Bytes,
) -> StatusCode {
    if take_failure(&state.fail_uploads) {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    state.events.lock().unwrap().push(ServerEvent::Chunk {
        session: id,
        bytes: body.len(),
    });
    StatusCode::OK
}

async fn merge_chunks(State(state): State<MockState>, Path(id): Path<String>) -> StatusCode {
    state
        .events
        .lock()
        .unwrap()
        .push(ServerEvent::Merge { session: id });
    StatusCode::OK
}

async fn delete_audio(State(state): State<MockState>, Path(id): Path<String>) -> StatusCode {
    state
        .events
        .lock()
        .unwrap()
        .push(ServerEvent::DeleteAudio { session: id });
    StatusCode::OK
}

async fn fetch_session(
    State(state): State<MockState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if take_failure(&state.fail_fetches) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    state
        .events
        .lock()
        .unwrap()
        .push(ServerEvent::Fetch { session: id });
    let body = state.session_json.lock().unwrap().clone();
    Json(body).into_response()
}
