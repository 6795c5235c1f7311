use chrono::NaiveDateTime;
use reqwest::multipart;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Read-only projection of a server-side session record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSessionView {
    #[serde(default)]
    pub session_title: Option<String>,
    #[serde(default)]
    pub audio_file_path: Option<String>,
    #[serde(default)]
    pub transcription_text: Option<String>,
    #[serde(default)]
    pub transcription_expires_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}

impl ServerSessionView {
    /// Whether the session already carries a transcript.
    pub fn has_transcript(&self) -> bool {
        self.transcription_text
            .as_deref()
            .map(|t| !t.is_empty())
            .unwrap_or(false)
    }
}

/// HTTP client for the session service.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Upload one audio chunk. The server assigns its position by arrival
    /// order for the session.
    pub async fn upload_chunk(
        &self,
        session_id: &str,
        payload: Vec<u8>,
    ) -> Result<(), reqwest::Error> {
        let size = payload.len();
        let part = multipart::Part::bytes(payload)
            .file_name("chunk.wav")
            .mime_str("audio/wav")?;
        let form = multipart::Form::new().part("file", part);

        self.http
            .post(self.url(&format!("/sessions/{session_id}/chunks")))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        debug!("uploaded chunk: {} bytes", size);
        Ok(())
    }

    /// Concatenate all acked chunks server-side, in arrival order.
    pub async fn merge_chunks(&self, session_id: &str) -> Result<(), reqwest::Error> {
        self.http
            .post(self.url(&format!("/sessions/{session_id}/merge-chunks")))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Remove the raw audio artifact once a transcript exists.
    pub async fn delete_audio(&self, session_id: &str) -> Result<(), reqwest::Error> {
        self.http
            .delete(self.url(&format!("/sessions/{session_id}/audio")))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Fetch the current server projection of a session.
    pub async fn fetch_session(
        &self,
        session_id: &str,
    ) -> Result<ServerSessionView, reqwest::Error> {
        self.http
            .get(self.url(&format!("/sessions/{session_id}")))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}
