use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::UploadConfig;
use crate::error::RecorderError;

use super::client::ApiClient;

/// Upload lifecycle of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Pending,
    InFlight,
    Acked,
    Failed,
}

/// One closed recording segment awaiting upload. Held by the uploader
/// until acked, then discarded.
#[derive(Debug)]
pub struct AudioSegment {
    pub sequence: u32,
    pub payload: Vec<u8>,
    pub upload_state: UploadState,
}

impl AudioSegment {
    pub fn new(sequence: u32, payload: Vec<u8>) -> Self {
        Self {
            sequence,
            payload,
            upload_state: UploadState::Pending,
        }
    }
}

/// Order-preserving chunk uploader.
///
/// At most one segment is in flight per session; segment n+1 never starts
/// before n is acknowledged, which is what lets the server reassemble by
/// arrival order. Failures after the bounded retries leave the queue
/// intact so a later flush can pick up where this one halted.
pub struct ChunkUploader {
    client: Arc<ApiClient>,
    session_id: String,
    queue: VecDeque<AudioSegment>,
    max_attempts: u32,
    initial_backoff: Duration,
    acked: u32,
}

impl ChunkUploader {
    pub fn new(client: Arc<ApiClient>, session_id: impl Into<String>, config: &UploadConfig) -> Self {
        Self {
            client,
            session_id: session_id.into(),
            queue: VecDeque::new(),
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            acked: 0,
        }
    }

    /// Enqueue a segment and push the queue as far as it will go.
    pub async fn submit(&mut self, segment: AudioSegment) -> Result<(), RecorderError> {
        self.queue.push_back(segment);
        self.flush().await
    }

    /// Upload queued segments head-first until the queue is empty or a
    /// segment exhausts its retries.
    pub async fn flush(&mut self) -> Result<(), RecorderError> {
        while let Some(front) = self.queue.front_mut() {
            front.upload_state = UploadState::InFlight;
            let sequence = front.sequence;

            let mut attempt = 0;
            let mut delay = self.initial_backoff;
            loop {
                attempt += 1;
                match self
                    .client
                    .upload_chunk(&self.session_id, front.payload.clone())
                    .await
                {
                    Ok(()) => break,
                    Err(source) => {
                        if attempt >= self.max_attempts {
                            front.upload_state = UploadState::Failed;
                            warn!(
                                "chunk {} failed after {} attempts; holding {} queued segment(s)",
                                sequence,
                                attempt,
                                self.queue.len()
                            );
                            return Err(RecorderError::Upload {
                                sequence,
                                attempts: attempt,
                                source,
                            });
                        }
                        warn!(
                            "chunk {} upload attempt {} failed: {}; retrying in {:?}",
                            sequence, attempt, source, delay
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }

            front.upload_state = UploadState::Acked;
            self.acked += 1;
            info!("chunk {} acked", sequence);
            self.queue.pop_front();
        }

        Ok(())
    }

    /// Segments not yet acknowledged.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Acknowledged segments this session.
    pub fn acked(&self) -> u32 {
        self.acked
    }

    /// True once every submitted segment has been acknowledged.
    pub fn all_acked(&self) -> bool {
        self.queue.is_empty()
    }
}
