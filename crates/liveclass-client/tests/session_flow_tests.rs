//! Session flow integration tests.
//!
//! Drives the full client (repository, managers, scheduler, recordings)
//! through the real HTTP transport against `FakeBackend`.

// Test code is allowed to use expect/unwrap for assertions
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

use anyhow::Result;
use common::types::{MeetingId, SessionId};
use liveclass_client::models::{ParticipantRole, Recording};
use liveclass_client::participants::AddOutcome;
use liveclass_client::recordings::{ArchiveDestination, FeedState, Playback};
use liveclass_client::scheduler::MeetingState;
use liveclass_client::{ClientConfig, ClientError, LiveClassClient};
use liveclass_test_utils::FakeBackend;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Helpers
// ============================================================================

async fn setup() -> Result<(FakeBackend, LiveClassClient)> {
    let backend = FakeBackend::spawn().await?;
    let client = LiveClassClient::connect(&ClientConfig::new(backend.url()))?;
    Ok((backend, client))
}

fn recording(file_id: &str, file_type: &str) -> Recording {
    Recording {
        meeting_id: MeetingId::from("m-1"),
        file_id: Some(file_id.to_string()),
        file_type: file_type.to_string(),
        recording_start: Some("2025-03-01T10:00:05Z".to_string()),
        recording_end: Some("2025-03-01T10:58:00Z".to_string()),
        download_url: None,
        stream_url: None,
    }
}

// ============================================================================
// End-to-end
// ============================================================================

#[tokio::test]
async fn test_create_schedule_invite_and_archive() -> Result<()> {
    let (_backend, client) = setup().await?;
    let cancel = CancellationToken::new();

    let session = client.repository.create("Algebra 101", None).await?;
    assert_eq!(session.title, "Algebra 101");

    let meeting = client
        .scheduler
        .schedule(&session.id, Some("2025-03-01T10:00:00Z"))
        .await?;
    assert_eq!(
        client.scheduler.state(&session.id),
        MeetingState::Scheduled(meeting.clone())
    );

    let outcome = client
        .participants
        .add_participants(&session.id, "a@x.com,b@y.com", ParticipantRole::Student)
        .await?;
    assert_eq!(outcome.participants().len(), 2);

    let streams = client
        .recordings
        .list_streamable(&session.id, &cancel)
        .await?;
    assert!(streams.is_empty());

    let report = client
        .recordings
        .archive(&session.id, ArchiveDestination::RemoteStorage)
        .await?;
    assert!(report.items.is_empty());

    let loaded = client.repository.load(&session.id, &cancel).await?;
    let emails: Vec<_> = loaded.participants.iter().map(|p| p.email.as_str()).collect();
    assert_eq!(emails, vec!["a@x.com", "b@y.com"]);
    assert_eq!(loaded.meetings, vec![meeting]);
    Ok(())
}

#[tokio::test]
async fn test_remove_then_list_excludes_session() -> Result<()> {
    let (_backend, client) = setup().await?;
    let cancel = CancellationToken::new();
    let keep = client.repository.create("Geometry", None).await?;
    let gone = client
        .repository
        .create("Algebra 101", Some("Linear equations"))
        .await?;

    client.repository.remove(&gone.id).await?;
    let listed = client.repository.list(&cancel).await?;

    assert!(listed.iter().all(|s| s.id != gone.id));
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, keep.id);
    Ok(())
}

#[tokio::test]
async fn test_blank_title_never_reaches_backend() -> Result<()> {
    let (backend, client) = setup().await?;

    let result = client.repository.create("  ", None).await;

    assert!(matches!(result, Err(ClientError::Validation(_))));
    assert_eq!(backend.api().call_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_empty_email_input_never_reaches_backend() -> Result<()> {
    let (backend, client) = setup().await?;
    let session = client.repository.create("Algebra 101", None).await?;
    let before = backend.api().call_count().await;

    let outcome = client
        .participants
        .add_participants(&session.id, " ,, ", ParticipantRole::Student)
        .await?;

    assert_eq!(outcome, AddOutcome::Nothing);
    assert_eq!(backend.api().call_count().await, before);
    Ok(())
}

// ============================================================================
// Error surfacing
// ============================================================================

#[tokio::test]
async fn test_unknown_session_surfaces_not_found() -> Result<()> {
    let (_backend, client) = setup().await?;

    let err = client
        .repository
        .load(&SessionId::from("missing"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::NotFound(_)));
    assert_eq!(err.user_message(), r#"404: {"detail":"Session not found"}"#);
    Ok(())
}

#[tokio::test]
async fn test_backend_failure_leaves_cache_intact() -> Result<()> {
    let (backend, client) = setup().await?;
    let session = client.repository.create("Algebra 101", None).await?;
    client
        .participants
        .add_participants(&session.id, "a@x.com", ParticipantRole::Student)
        .await?;
    let before = client.repository.get(&session.id).unwrap();

    backend
        .api()
        .fail_next(ClientError::Transport {
            status: Some(500),
            body: "Zoom API unavailable".to_string(),
        })
        .await;
    let err = client
        .scheduler
        .schedule(&session.id, Some("2025-03-01T10:00:00Z"))
        .await
        .unwrap_err();

    assert_eq!(
        err.user_message(),
        r#"500: {"detail":"Zoom API unavailable"}"#
    );
    assert_eq!(client.repository.get(&session.id).unwrap(), before);
    Ok(())
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn test_stale_load_does_not_reintroduce_removed_participant() -> Result<()> {
    let (backend, client) = setup().await?;
    let cancel = CancellationToken::new();
    let session = client.repository.create("Algebra 101", None).await?;
    let added = client
        .participants
        .add_participants(&session.id, "a@x.com,b@y.com", ParticipantRole::Student)
        .await?;
    let removed = added.participants()[0].id.clone();
    client.repository.load(&session.id, &cancel).await?;

    backend.api().hold_loads();
    let slow_load = {
        let repository = client.repository.clone();
        let id = session.id.clone();
        tokio::spawn(async move { repository.load(&id, &CancellationToken::new()).await })
    };
    backend.api().wait_for_held_loads(1).await;

    client
        .participants
        .remove_participant(&session.id, &removed)
        .await?;
    backend.api().release_loads();
    slow_load.await??;

    let cached = client.repository.get(&session.id).unwrap();
    assert!(cached.participants.iter().all(|p| p.id != removed));
    assert_eq!(cached.participants.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_fetch_is_aborted() -> Result<()> {
    let (backend, client) = setup().await?;
    let session = client.repository.create("Algebra 101", None).await?;
    let cancel = CancellationToken::new();

    backend.api().hold_loads();
    let pending = {
        let repository = client.repository.clone();
        let id = session.id.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { repository.load(&id, &cancel).await })
    };
    backend.api().wait_for_held_loads(1).await;
    cancel.cancel();

    assert_eq!(pending.await?, Err(ClientError::Aborted));
    backend.api().release_loads();
    Ok(())
}

// ============================================================================
// Scheduling and recordings
// ============================================================================

#[tokio::test]
async fn test_reschedule_keeps_meeting_and_signals_listing() -> Result<()> {
    let (_backend, client) = setup().await?;
    let cancel = CancellationToken::new();
    let session = client.repository.create("Algebra 101", None).await?;
    let mut refresh = client.scheduler.subscribe();

    let first = client
        .scheduler
        .schedule(&session.id, Some("2025-03-01T10:00:00Z"))
        .await?;
    let moved = client
        .scheduler
        .reschedule(&session.id, &first.id, Some("2025-03-08T10:00:00Z"))
        .await?;

    assert_eq!(moved.id, first.id);
    assert_eq!(moved.scheduled_for, "2025-03-08T10:00:00Z");
    assert_eq!(refresh.changed().await, Some(2));

    let listed = client
        .scheduler
        .refresh_meetings(&session.id, &cancel)
        .await?;
    assert_eq!(listed, vec![moved]);
    Ok(())
}

#[tokio::test]
async fn test_overlapping_schedules_keep_one_meeting() -> Result<()> {
    let (backend, client) = setup().await?;
    let session = client.repository.create("Algebra 101", None).await?;

    let (first, second) = tokio::join!(
        client
            .scheduler
            .schedule(&session.id, Some("2025-03-01T10:00:00Z")),
        client
            .scheduler
            .schedule(&session.id, Some("2025-03-02T10:00:00Z"))
    );

    let meeting = first?;
    assert!(matches!(second, Err(ClientError::Validation(_))));
    let calls = backend.api().calls().await;
    assert_eq!(calls, vec!["create_session", "create_meeting"]);
    assert_eq!(client.repository.get(&session.id).unwrap().meetings, vec![meeting]);
    assert!(client.repository.pending(&session.id).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_recordings_are_classified_and_archived_locally() -> Result<()> {
    let (backend, client) = setup().await?;
    let cancel = CancellationToken::new();
    let session = client.repository.create("Algebra 101", None).await?;
    backend
        .api()
        .seed_recordings(
            &session.id,
            vec![
                recording("f-1", "MP4"),
                recording("f-2", "M4A"),
                recording("f-3", "PDF"),
            ],
        )
        .await;

    let streams = client
        .recordings
        .list_streamable(&session.id, &cancel)
        .await?;
    let playback: Vec<_> = streams.iter().map(|r| r.playback).collect();
    assert_eq!(
        playback,
        vec![
            Playback::Video("video/mp4"),
            Playback::Audio("audio/mp4"),
            Playback::Download
        ]
    );

    let report = client
        .recordings
        .archive(&session.id, ArchiveDestination::LocalDisk)
        .await?;
    assert_eq!(report.count(), 3);

    let listing = client
        .recordings
        .list_downloadable(&session.id, &cancel)
        .await?;
    assert_eq!(listing.recordings.len(), 3);
    assert!(listing.archived_blobs.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_streaming_feed_over_http() -> Result<()> {
    let (backend, client) = setup().await?;
    let session = client.repository.create("Algebra 101", None).await?;
    backend
        .api()
        .seed_recordings(&session.id, vec![recording("f-1", "MP4")])
        .await;
    let feed = client.streaming_feed();
    let mut states = feed.subscribe();

    let generation = feed.request(session.id.clone());
    let state = tokio::time::timeout(
        Duration::from_secs(5),
        states.wait_for(|s| matches!(s, FeedState::Ready(_))),
    )
    .await??
    .clone();

    let FeedState::Ready(snapshot) = state else {
        panic!("expected ready state");
    };
    assert_eq!(snapshot.generation, generation);
    assert_eq!(snapshot.recordings.len(), 1);
    assert!(snapshot.recordings[0].recording.stream_url.is_some());
    Ok(())
}
