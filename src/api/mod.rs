//! Session service client
//!
//! This module owns everything that crosses the wire:
//! - multipart chunk upload (`POST /sessions/{id}/chunks`)
//! - server-side reassembly (`POST /sessions/{id}/merge-chunks`)
//! - best-effort audio cleanup (`DELETE /sessions/{id}/audio`)
//! - session projection fetch (`GET /sessions/{id}`)

mod client;
mod merge;
mod uploader;

pub use client::{ApiClient, ServerSessionView};
pub use merge::{MergeCoordinator, MergeOutcome};
pub use uploader::{AudioSegment, ChunkUploader, UploadState};
