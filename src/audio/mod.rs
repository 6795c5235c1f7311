pub mod backend;
pub mod device;
pub mod level;
pub mod segment;

pub use backend::{AudioFrame, CaptureBackend, CaptureBackendFactory, CpalBackend, CpalFactory};
pub use device::{DeviceCatalog, InputDevice};
pub use level::{compute_levels, LevelFrame, LevelMeter};
pub use segment::{encode_wav, SegmentEncoder};
