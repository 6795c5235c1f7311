// ChunkUploader retry/ordering discipline and the MergeCoordinator
// duplicate-finalize guard, exercised directly against the mock service.

mod common;

use std::sync::Arc;

use common::{MockServer, ServerEvent};
use scribe_capture::config::UploadConfig;
use scribe_capture::{ApiClient, AudioSegment, ChunkUploader, MergeCoordinator, RecorderError};

fn uploader_for(server: &MockServer, session_id: &str) -> ChunkUploader {
    let client = Arc::new(ApiClient::new(&server.base_url));
    let config = UploadConfig {
        max_attempts: 3,
        initial_backoff_ms: 10,
    };
    ChunkUploader::new(client, session_id, &config)
}

#[tokio::test]
async fn segments_upload_in_submission_order() {
    let server = MockServer::spawn().await;
    let mut uploader = uploader_for(&server, "7");

    uploader
        .submit(AudioSegment::new(0, vec![0u8; 64]))
        .await
        .unwrap();
    uploader
        .submit(AudioSegment::new(1, vec![0u8; 4096]))
        .await
        .unwrap();

    assert_eq!(uploader.acked(), 2);
    assert!(uploader.all_acked());

    let sizes: Vec<usize> = server
        .events()
        .iter()
        .filter_map(|e| match e {
            ServerEvent::Chunk { bytes, .. } => Some(*bytes),
            _ => None,
        })
        .collect();
    assert_eq!(sizes.len(), 2);
    // The small first segment arrived before the large second one.
    assert!(sizes[0] < sizes[1]);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_with_backoff() {
    let server = MockServer::spawn().await;
    server.fail_next_uploads(2);
    let mut uploader = uploader_for(&server, "7");

    uploader
        .submit(AudioSegment::new(0, vec![0u8; 64]))
        .await
        .unwrap();

    assert_eq!(uploader.acked(), 1);
    assert_eq!(server.chunk_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_hold_the_queue() {
    let server = MockServer::spawn().await;
    server.fail_next_uploads(u32::MAX);
    let mut uploader = uploader_for(&server, "7");

    let err = uploader
        .submit(AudioSegment::new(0, vec![0u8; 64]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RecorderError::Upload {
            sequence: 0,
            attempts: 3,
            ..
        }
    ));
    assert_eq!(uploader.pending(), 1);

    // A later segment queues behind the failed head; order is preserved.
    let err = uploader
        .submit(AudioSegment::new(1, vec![0u8; 4096]))
        .await
        .unwrap_err();
    assert!(matches!(err, RecorderError::Upload { sequence: 0, .. }));
    assert_eq!(uploader.pending(), 2);
    assert_eq!(server.chunk_count(), 0);

    // Once the server recovers, a flush drains everything in order.
    server.fail_next_uploads(0);
    uploader.flush().await.unwrap();

    assert!(uploader.all_acked());
    assert_eq!(uploader.acked(), 2);

    let sizes: Vec<usize> = server
        .events()
        .iter()
        .filter_map(|e| match e {
            ServerEvent::Chunk { bytes, .. } => Some(*bytes),
            _ => None,
        })
        .collect();
    assert_eq!(sizes.len(), 2);
    assert!(sizes[0] < sizes[1]);
}

#[tokio::test]
async fn finalize_merges_then_refreshes() {
    let server = MockServer::spawn_with(serde_json::json!({
        "session_id": 7,
        "transcription_text": "all done",
    }))
    .await;
    let client = Arc::new(ApiClient::new(&server.base_url));
    let mut coordinator = MergeCoordinator::new(client);

    let outcome = coordinator.finalize("7").await.unwrap();

    assert!(coordinator.is_merged());
    let view = outcome.session.expect("refreshed projection");
    assert!(view.has_transcript());
    assert_eq!(server.merge_count(), 1);
}

#[tokio::test]
async fn duplicate_finalize_sends_no_second_merge() {
    let server = MockServer::spawn().await;
    let client = Arc::new(ApiClient::new(&server.base_url));
    let mut coordinator = MergeCoordinator::new(client);

    coordinator.finalize("7").await.unwrap();
    coordinator.finalize("7").await.unwrap();

    assert_eq!(server.merge_count(), 1);
    let fetches = server
        .events()
        .iter()
        .filter(|e| matches!(e, ServerEvent::Fetch { .. }))
        .count();
    assert_eq!(fetches, 2);
}

#[tokio::test]
async fn merge_failure_leaves_the_coordinator_unlatched() {
    // Point at a closed port: the merge call itself fails.
    let client = Arc::new(ApiClient::new("http://127.0.0.1:9"));
    let mut coordinator = MergeCoordinator::new(client);

    let err = coordinator.finalize("7").await.unwrap_err();
    assert!(matches!(err, RecorderError::Merge { .. }));
    assert!(!coordinator.is_merged());
}

#[tokio::test]
async fn refresh_failure_is_reported_not_fatal() {
    let server = MockServer::spawn().await;
    server.fail_next_fetches(1);
    let client = Arc::new(ApiClient::new(&server.base_url));
    let mut coordinator = MergeCoordinator::new(client);

    let outcome = coordinator.finalize("7").await.unwrap();

    assert!(coordinator.is_merged());
    assert!(outcome.session.is_none());
    assert!(matches!(
        outcome.refresh_error,
        Some(RecorderError::Refresh(_))
    ));
}
