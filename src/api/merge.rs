use std::sync::Arc;

use tracing::{info, warn};

use crate::error::RecorderError;

use super::client::{ApiClient, ServerSessionView};

/// Result of a finalize pass. A missing session view with a populated
/// `refresh_error` means the merge is durable but the projection is stale.
#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub session: Option<ServerSessionView>,
    pub refresh_error: Option<RecorderError>,
}

/// Requests server-side reassembly once all chunks for a session are
/// acknowledged, then refreshes the session projection.
pub struct MergeCoordinator {
    client: Arc<ApiClient>,
    merged: bool,
}

impl MergeCoordinator {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self {
            client,
            merged: false,
        }
    }

    /// Merge all uploaded chunks and fetch the fresh projection.
    ///
    /// The merge request goes out at most once per coordinator; a repeated
    /// finalize (a retried stop) only re-serves the refresh. Callers must
    /// only invoke this once every segment upload is acknowledged.
    pub async fn finalize(&mut self, session_id: &str) -> Result<MergeOutcome, RecorderError> {
        if self.merged {
            warn!("merge already requested for session {}; skipping", session_id);
        } else {
            self.client
                .merge_chunks(session_id)
                .await
                .map_err(|source| RecorderError::Merge {
                    session_id: session_id.to_string(),
                    source,
                })?;
            self.merged = true;
            info!("merge requested for session {}", session_id);
        }

        match self.client.fetch_session(session_id).await {
            Ok(view) => Ok(MergeOutcome {
                session: Some(view),
                refresh_error: None,
            }),
            Err(e) => {
                warn!("post-merge session refresh failed: {}", e);
                Ok(MergeOutcome {
                    session: None,
                    refresh_error: Some(RecorderError::Refresh(e)),
                })
            }
        }
    }

    pub fn is_merged(&self) -> bool {
        self.merged
    }
}
