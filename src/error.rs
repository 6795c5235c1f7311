use thiserror::Error;

/// Failure taxonomy for the recording pipeline.
///
/// The state machine is the single place that maps these onto a resulting
/// status and user-visible message; nothing below it retries silently
/// except the uploader's bounded backoff.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// No usable input device, permission denied, or acquisition timed out.
    #[error("audio input unavailable: {0}")]
    Device(String),

    /// The encoder failed mid-segment; the partial segment is discarded.
    #[error("capture failed: {0}")]
    Capture(String),

    /// A segment upload failed after exhausting retries.
    #[error("chunk {sequence} upload failed after {attempts} attempts: {source}")]
    Upload {
        sequence: u32,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// The server-side merge call failed. Acked chunks remain durable.
    #[error("merge failed for session {session_id}: {source}")]
    Merge {
        session_id: String,
        #[source]
        source: reqwest::Error,
    },

    /// The post-merge projection fetch failed. Non-fatal: the artifact is
    /// already merged, so this surfaces as a stale-UI warning only.
    #[error("session refresh failed: {0}")]
    Refresh(#[source] reqwest::Error),

    /// Best-effort audio deletion failed. Logged, never surfaced.
    #[error("audio cleanup failed: {0}")]
    Cleanup(#[source] reqwest::Error),
}

impl RecorderError {
    /// Whether the error must roll the session back to idle.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RecorderError::Refresh(_) | RecorderError::Cleanup(_))
    }
}
