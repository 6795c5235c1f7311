use serde::{Deserialize, Serialize};

/// Lifecycle of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingStatus {
    Idle,
    Recording,
    Paused,
    Transcribing,
    Done,
    Error,
}

impl RecordingStatus {
    /// True while audio is being held open (recording or paused).
    pub fn is_active(&self) -> bool {
        matches!(self, RecordingStatus::Recording | RecordingStatus::Paused)
    }

    pub fn label(&self) -> &'static str {
        match self {
            RecordingStatus::Idle => "idle",
            RecordingStatus::Recording => "recording",
            RecordingStatus::Paused => "paused",
            RecordingStatus::Transcribing => "transcribing",
            RecordingStatus::Done => "done",
            RecordingStatus::Error => "error",
        }
    }
}

/// Events published by the state machine.
///
/// Subscribers (UI, CLI) read from the broadcast channel; the machine
/// never depends on them being present.
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    StatusChanged(RecordingStatus),
    StatusMessage(String),
    TimerTick(String),
}
