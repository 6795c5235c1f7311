pub mod api;
pub mod audio;
pub mod config;
pub mod error;
pub mod session;

pub use api::{ApiClient, AudioSegment, ChunkUploader, MergeCoordinator, ServerSessionView, UploadState};
pub use audio::{
    compute_levels, encode_wav, AudioFrame, CaptureBackend, CaptureBackendFactory, CpalBackend,
    CpalFactory, DeviceCatalog, InputDevice, LevelFrame, LevelMeter, SegmentEncoder,
};
pub use config::Config;
pub use error::RecorderError;
pub use session::{format_elapsed, RecorderEvent, RecordingStateMachine, RecordingStatus};
