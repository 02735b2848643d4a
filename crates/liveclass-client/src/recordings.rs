//! Recording coordinator.
//!
//! Three independent modes against one session, none of which touch the
//! cached session:
//!
//! 1. [`RecordingCoordinator::list_downloadable`]: provider recordings with
//!    download links, plus the blobs already archived
//! 2. [`RecordingCoordinator::list_streamable`]: recordings with time-limited
//!    streaming links, classified for playback
//! 3. [`RecordingCoordinator::archive`]: one blocking bulk copy to remote
//!    storage or local disk
//!
//! Recordings are never cached. Streaming links expire, so views that show
//! them re-fetch through a [`StreamingFeed`] instead of keeping results.
//! Failures surface as they came from the backend; there is no retry.

use crate::errors::{ignore_aborted, ClientError};
use crate::models::{Recording, RecordingsListing};
use crate::refresh::RefreshReceiver;
use crate::repository::{PendingChange, SessionRepository};
use crate::transport::cancellable;
use common::types::SessionId;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

// =============================================================================
// Classification
// =============================================================================

/// How a recording can be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "mime", rename_all = "snake_case")]
pub enum Playback {
    /// Inline video with the given container type.
    Video(&'static str),
    /// Inline audio with the given container type.
    Audio(&'static str),
    /// Opaque file; offered as a download, never played inline.
    Download,
}

impl Playback {
    pub fn is_inline(self) -> bool {
        !matches!(self, Playback::Download)
    }
}

/// Classify a recording by its `file_type`, ignoring case.
pub fn classify(file_type: &str) -> Playback {
    match file_type.trim().to_ascii_lowercase().as_str() {
        "mp4" => Playback::Video("video/mp4"),
        "m4a" => Playback::Audio("audio/mp4"),
        "mp3" => Playback::Audio("audio/mp3"),
        "wav" => Playback::Audio("audio/wav"),
        _ => Playback::Download,
    }
}

/// A recording paired with its playback classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedRecording {
    #[serde(flatten)]
    pub recording: Recording,
    pub playback: Playback,
}

impl From<Recording> for ClassifiedRecording {
    fn from(recording: Recording) -> Self {
        let playback = classify(&recording.file_type);
        Self {
            recording,
            playback,
        }
    }
}

// =============================================================================
// Archive
// =============================================================================

/// Where an archive copies recordings to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveDestination {
    RemoteStorage,
    LocalDisk,
}

impl ArchiveDestination {
    pub fn as_str(self) -> &'static str {
        match self {
            ArchiveDestination::RemoteStorage => "remote",
            ArchiveDestination::LocalDisk => "local",
        }
    }
}

impl fmt::Display for ArchiveDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchiveDestination {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remote" | "remote_storage" => Ok(ArchiveDestination::RemoteStorage),
            "local" | "local_disk" => Ok(ArchiveDestination::LocalDisk),
            other => Err(format!(
                "unknown archive destination '{other}' (expected 'remote' or 'local')"
            )),
        }
    }
}

/// Items a completed archive reported as transferred.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchiveReport {
    pub destination: ArchiveDestination,
    pub items: Vec<serde_json::Value>,
}

impl ArchiveReport {
    pub fn count(&self) -> usize {
        self.items.len()
    }
}

// =============================================================================
// Coordinator
// =============================================================================

/// Retrieval and archival of a session's recordings.
#[derive(Debug, Clone)]
pub struct RecordingCoordinator {
    repository: SessionRepository,
}

impl RecordingCoordinator {
    pub fn new(repository: SessionRepository) -> Self {
        Self { repository }
    }

    /// Recordings with download links and the names of archived blobs.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn list_downloadable(
        &self,
        session_id: &SessionId,
        cancel: &CancellationToken,
    ) -> Result<RecordingsListing, ClientError> {
        let api = self.repository.api();
        cancellable(cancel, api.list_recordings(session_id)).await
    }

    /// Recordings with streaming links, classified for playback.
    ///
    /// The links are valid for one rendering only.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn list_streamable(
        &self,
        session_id: &SessionId,
        cancel: &CancellationToken,
    ) -> Result<Vec<ClassifiedRecording>, ClientError> {
        let api = self.repository.api();
        let response = cancellable(cancel, api.stream_urls(session_id)).await?;
        Ok(response
            .recordings_with_streams
            .into_iter()
            .map(ClassifiedRecording::from)
            .collect())
    }

    /// Copy every recording of the session to `destination`.
    ///
    /// Blocks until the backend reports completion. Fails with `Validation`
    /// while another archive of the same session is in flight.
    #[instrument(skip_all, fields(session_id = %session_id, destination = %destination))]
    pub async fn archive(
        &self,
        session_id: &SessionId,
        destination: ArchiveDestination,
    ) -> Result<ArchiveReport, ClientError> {
        let _pending = self
            .repository
            .begin_exclusive(session_id, PendingChange::Archiving)?;
        let api = self.repository.api();

        let items = match destination {
            ArchiveDestination::RemoteStorage => {
                api.store_recordings(session_id).await.map(|r| r.stored)
            }
            ArchiveDestination::LocalDisk => api
                .download_recordings_local(session_id)
                .await
                .map(|r| r.downloaded_files),
        }
        .inspect_err(|e| {
            warn!(target: "liveclass.recordings", error = %e, "Archive failed");
        })?;

        info!(
            target: "liveclass.recordings",
            count = items.len(),
            "Archive completed"
        );
        Ok(ArchiveReport { destination, items })
    }
}

// =============================================================================
// Streaming feed
// =============================================================================

/// Streaming links fetched for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSnapshot {
    pub session_id: SessionId,
    pub generation: u64,
    pub recordings: Vec<ClassifiedRecording>,
}

/// State published by a [`StreamingFeed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedState {
    Idle,
    Loading {
        session_id: SessionId,
        generation: u64,
    },
    Ready(StreamSnapshot),
    Failed {
        session_id: SessionId,
        generation: u64,
        error: ClientError,
    },
}

impl FeedState {
    pub fn generation(&self) -> Option<u64> {
        match self {
            FeedState::Idle => None,
            FeedState::Loading { generation, .. } | FeedState::Failed { generation, .. } => {
                Some(*generation)
            }
            FeedState::Ready(snapshot) => Some(snapshot.generation),
        }
    }
}

/// Owns the re-fetch lifecycle of streaming links.
///
/// Each [`request`](Self::request) cancels the previous fetch and starts a
/// new one; only the latest request can publish. Dropping the feed cancels
/// whatever is in flight.
pub struct StreamingFeed {
    coordinator: RecordingCoordinator,
    state: Arc<watch::Sender<FeedState>>,
    /// Last `Ready` or `Failed` state, restored when a fetch is cancelled.
    settled: Arc<Mutex<FeedState>>,
    generation: Arc<AtomicU64>,
    in_flight: Mutex<Option<CancellationToken>>,
}

impl fmt::Debug for StreamingFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingFeed")
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl StreamingFeed {
    pub fn new(coordinator: RecordingCoordinator) -> Self {
        let (state, _) = watch::channel(FeedState::Idle);
        Self {
            coordinator,
            state: Arc::new(state),
            settled: Arc::new(Mutex::new(FeedState::Idle)),
            generation: Arc::new(AtomicU64::new(0)),
            in_flight: Mutex::new(None),
        }
    }

    /// Subscribe to published states.
    pub fn subscribe(&self) -> watch::Receiver<FeedState> {
        self.state.subscribe()
    }

    /// Latest published state.
    pub fn state(&self) -> FeedState {
        self.state.borrow().clone()
    }

    /// Fetch streaming links for `session_id`, superseding any earlier
    /// request. Returns the generation of this request.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn request(&self, session_id: SessionId) -> u64 {
        let cancel = CancellationToken::new();
        if let Some(previous) = self.lock_in_flight().replace(cancel.clone()) {
            previous.cancel();
        }

        let mut generation = 0;
        self.state.send_modify(|state| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *state = FeedState::Loading {
                session_id: session_id.clone(),
                generation,
            };
        });

        let coordinator = self.coordinator.clone();
        let state = Arc::clone(&self.state);
        let settled = Arc::clone(&self.settled);
        let latest = Arc::clone(&self.generation);
        tokio::spawn(async move {
            let result = coordinator.list_streamable(&session_id, &cancel).await;
            let next = match ignore_aborted(result) {
                Ok(Some(recordings)) => FeedState::Ready(StreamSnapshot {
                    session_id,
                    generation,
                    recordings,
                }),
                Ok(None) => {
                    debug!(target: "liveclass.recordings", generation, "Stream fetch superseded");
                    return;
                }
                Err(error) => FeedState::Failed {
                    session_id,
                    generation,
                    error,
                },
            };
            state.send_if_modified(|current| {
                if latest.load(Ordering::SeqCst) != generation {
                    return false;
                }
                *lock(&settled) = next.clone();
                *current = next;
                true
            });
        });

        generation
    }

    /// Cancel the in-flight fetch, if any.
    ///
    /// A feed left `Loading` goes back to the last `Ready` or `Failed`
    /// state, or `Idle` if nothing has settled yet.
    pub fn cancel(&self) {
        let Some(previous) = self.lock_in_flight().take() else {
            return;
        };
        previous.cancel();

        let settled = lock(&self.settled).clone();
        self.state.send_if_modified(|state| {
            if !matches!(state, FeedState::Loading { .. }) {
                return false;
            }
            self.generation.fetch_add(1, Ordering::SeqCst);
            *state = settled;
            true
        });
    }

    /// Re-request `session_id` now and on every bump of `refresh`.
    ///
    /// The returned task ends when `refresh` closes or the feed is dropped.
    pub fn follow(
        feed: &Arc<StreamingFeed>,
        session_id: SessionId,
        mut refresh: RefreshReceiver,
    ) -> JoinHandle<()> {
        let weak: Weak<StreamingFeed> = Arc::downgrade(feed);
        feed.request(session_id.clone());
        tokio::spawn(async move {
            while refresh.changed().await.is_some() {
                let Some(feed) = weak.upgrade() else {
                    break;
                };
                feed.request(session_id.clone());
            }
        })
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        lock(&self.in_flight)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Drop for StreamingFeed {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::refresh::RefreshSignal;
    use crate::transport::MockSessionApi;
    use common::types::MeetingId;
    use std::time::Duration;

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

    async fn setup() -> (Arc<MockSessionApi>, RecordingCoordinator, SessionId) {
        let api = Arc::new(MockSessionApi::new());
        let repo = SessionRepository::new(api.clone());
        let session = repo.create("Algebra 101", None).await.unwrap();
        (api, RecordingCoordinator::new(repo), session.id)
    }

    async fn wait_for(
        receiver: &mut watch::Receiver<FeedState>,
        done: impl Fn(&FeedState) -> bool,
    ) -> FeedState {
        tokio::time::timeout(Duration::from_secs(2), receiver.wait_for(|s| done(s)))
            .await
            .expect("feed did not settle")
            .expect("feed closed")
            .clone()
    }

    #[test]
    fn test_classification_ignores_case() {
        assert_eq!(classify("MP4"), Playback::Video("video/mp4"));
        assert_eq!(classify("mp4"), Playback::Video("video/mp4"));
        assert_eq!(classify("M4A"), Playback::Audio("audio/mp4"));
        assert_eq!(classify("mp3"), Playback::Audio("audio/mp3"));
        assert_eq!(classify("WAV"), Playback::Audio("audio/wav"));
        assert_eq!(classify("PDF"), Playback::Download);
        assert_eq!(classify(""), Playback::Download);
        assert!(!classify("PDF").is_inline());
    }

    #[test]
    fn test_destination_parsing() {
        assert_eq!(
            "remote".parse::<ArchiveDestination>().unwrap(),
            ArchiveDestination::RemoteStorage
        );
        assert_eq!(
            "LOCAL".parse::<ArchiveDestination>().unwrap(),
            ArchiveDestination::LocalDisk
        );
        assert!("cloud".parse::<ArchiveDestination>().is_err());
    }

    #[tokio::test]
    async fn test_streamable_empty_without_recordings() {
        let (_api, coordinator, id) = setup().await;
        let listed = coordinator
            .list_streamable(&id, &CancellationToken::new())
            .await
            .unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_streamable_classifies_each_recording() {
        let (api, coordinator, id) = setup().await;
        api.seed_recordings(
            &id,
            vec![
                recording("f-1", "MP4"),
                recording("f-2", "M4A"),
                recording("f-3", "TRANSCRIPT"),
            ],
        )
        .await;

        let listed = coordinator
            .list_streamable(&id, &CancellationToken::new())
            .await
            .unwrap();

        let kinds: Vec<_> = listed.iter().map(|r| r.playback).collect();
        assert_eq!(
            kinds,
            vec![
                Playback::Video("video/mp4"),
                Playback::Audio("audio/mp4"),
                Playback::Download
            ]
        );
        assert!(listed[0].recording.stream_url.is_some());
    }

    #[tokio::test]
    async fn test_downloadable_includes_archived_blobs() {
        let (api, coordinator, id) = setup().await;
        api.seed_recordings(&id, vec![recording("f-1", "MP4")]).await;
        coordinator
            .archive(&id, ArchiveDestination::RemoteStorage)
            .await
            .unwrap();

        let listing = coordinator
            .list_downloadable(&id, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(listing.recordings.len(), 1);
        assert!(listing.recordings[0].download_url.is_some());
        assert_eq!(listing.archived_blobs.len(), 1);
    }

    #[tokio::test]
    async fn test_archive_with_no_recordings_reports_nothing() {
        let (_api, coordinator, id) = setup().await;

        let report = coordinator
            .archive(&id, ArchiveDestination::RemoteStorage)
            .await
            .unwrap();

        assert_eq!(report.count(), 0);
        assert_eq!(report.destination, ArchiveDestination::RemoteStorage);
    }

    #[tokio::test]
    async fn test_archive_local_reports_files() {
        let (api, coordinator, id) = setup().await;
        api.seed_recordings(&id, vec![recording("f-1", "MP4"), recording("f-2", "M4A")])
            .await;

        let report = coordinator
            .archive(&id, ArchiveDestination::LocalDisk)
            .await
            .unwrap();

        assert_eq!(report.count(), 2);
        assert_eq!(api.calls().await.last(), Some(&"download_recordings_local"));
    }

    #[tokio::test]
    async fn test_archive_failure_surfaces_status_and_body() {
        let (api, coordinator, id) = setup().await;
        api.fail_next(ClientError::Transport {
            status: Some(500),
            body: r#"{"detail":"Storage unavailable"}"#.to_string(),
        })
        .await;

        let err = coordinator
            .archive(&id, ArchiveDestination::RemoteStorage)
            .await
            .unwrap_err();

        assert_eq!(err.user_message(), r#"500: {"detail":"Storage unavailable"}"#);
    }

    #[tokio::test]
    async fn test_feed_publishes_latest_snapshot() {
        let (api, coordinator, id) = setup().await;
        api.seed_recordings(&id, vec![recording("f-1", "MP4")]).await;
        let feed = StreamingFeed::new(coordinator);
        let mut receiver = feed.subscribe();

        let generation = feed.request(id.clone());
        let state = wait_for(&mut receiver, |s| matches!(s, FeedState::Ready(_))).await;

        let FeedState::Ready(snapshot) = state else {
            panic!("expected ready state");
        };
        assert_eq!(snapshot.generation, generation);
        assert_eq!(snapshot.session_id, id);
        assert_eq!(snapshot.recordings.len(), 1);
    }

    #[tokio::test]
    async fn test_feed_publishes_failures() {
        let (api, coordinator, id) = setup().await;
        api.fail_next(ClientError::NotFound("Session not found".to_string()))
            .await;
        let feed = StreamingFeed::new(coordinator);
        let mut receiver = feed.subscribe();

        feed.request(id);
        let state = wait_for(&mut receiver, |s| matches!(s, FeedState::Failed { .. })).await;

        assert!(matches!(
            state,
            FeedState::Failed {
                error: ClientError::NotFound(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_feed_follows_refresh_signal() {
        let (_api, coordinator, id) = setup().await;
        let feed = Arc::new(StreamingFeed::new(coordinator));
        let mut receiver = feed.subscribe();
        let signal = RefreshSignal::new();

        let follower = StreamingFeed::follow(&feed, id.clone(), signal.subscribe());
        wait_for(&mut receiver, |s| {
            s.generation() == Some(1) && matches!(s, FeedState::Ready(_))
        })
        .await;

        signal.trigger();
        let state = wait_for(&mut receiver, |s| {
            s.generation() == Some(2) && matches!(s, FeedState::Ready(_))
        })
        .await;
        assert_eq!(state.generation(), Some(2));

        drop(signal);
        tokio::time::timeout(Duration::from_secs(2), follower)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_superseded_request_never_publishes() {
        let (api, coordinator, first) = setup().await;
        let second = coordinator
            .repository
            .create("Geometry", None)
            .await
            .unwrap()
            .id;
        let feed = StreamingFeed::new(coordinator);
        let mut receiver = feed.subscribe();

        feed.request(first);
        let latest = feed.request(second.clone());
        let state = wait_for(&mut receiver, |s| matches!(s, FeedState::Ready(_))).await;

        let FeedState::Ready(snapshot) = state else {
            panic!("expected ready state");
        };
        assert_eq!(snapshot.generation, latest);
        assert_eq!(snapshot.session_id, second);
        assert!(api.call_count().await >= 3);
    }

    #[tokio::test]
    async fn test_cancel_restores_last_settled_state() {
        let (api, coordinator, id) = setup().await;
        api.seed_recordings(&id, vec![recording("f-1", "MP4")]).await;
        let feed = StreamingFeed::new(coordinator);
        let mut receiver = feed.subscribe();

        feed.request(id.clone());
        feed.cancel();
        assert_eq!(feed.state(), FeedState::Idle);

        let settled = feed.request(id.clone());
        wait_for(&mut receiver, |s| {
            s.generation() == Some(settled) && matches!(s, FeedState::Ready(_))
        })
        .await;

        feed.request(id.clone());
        assert!(matches!(feed.state(), FeedState::Loading { .. }));
        feed.cancel();
        assert_eq!(feed.state().generation(), Some(settled));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let state = feed.state();
        assert!(matches!(state, FeedState::Ready(_)));
        assert_eq!(state.generation(), Some(settled));
    }
}
