//! Recording session orchestration
//!
//! This module provides the `RecordingStateMachine` that manages:
//! - the session status lifecycle (idle → recording → paused →
//!   transcribing → done)
//! - elapsed-time accounting across pause/resume cycles
//! - exclusive ownership of the capture stream
//! - ordered chunk upload and the merge handshake

mod machine;
mod status;
mod timer;

pub use machine::RecordingStateMachine;
pub use status::{RecorderEvent, RecordingStatus};
pub use timer::{format_elapsed, Stopwatch};
