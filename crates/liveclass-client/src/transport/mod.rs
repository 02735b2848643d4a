//! Backend transport.
//!
//! [`SessionApi`] is the seam between the orchestration layer and the
//! backend REST surface. [`http::HttpTransport`] talks to a real backend;
//! [`mock::MockSessionApi`] is an in-memory stand-in for tests.
//!
//! The transport holds no state beyond its HTTP client. Every non-success
//! response is normalized into a [`ClientError`].

pub mod http;
pub mod mock;

pub use http::HttpTransport;
pub use mock::MockSessionApi;

use crate::errors::ClientError;
use crate::models::{
    AddParticipantsRequest, CreateSessionRequest, InviteResponse, LocalDownloadResponse, Meeting,
    Participant, RecordingsListing, ScheduleMeetingRequest, Session, StoreRecordingsResponse,
    StreamUrlsResponse,
};
use crate::observability::metrics;
use common::types::{MeetingId, ParticipantId, SessionId};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Typed calls against the backend REST surface.
#[async_trait::async_trait]
pub trait SessionApi: Send + Sync {
    /// `GET /sessions`
    async fn list_sessions(&self) -> Result<Vec<Session>, ClientError>;

    /// `GET /sessions/{id}`
    async fn get_session(&self, session_id: &SessionId) -> Result<Session, ClientError>;

    /// `POST /sessions`
    async fn create_session(&self, request: &CreateSessionRequest)
        -> Result<Session, ClientError>;

    /// `DELETE /sessions/{id}`
    async fn delete_session(&self, session_id: &SessionId) -> Result<(), ClientError>;

    /// `POST /sessions/{id}/participants`
    async fn add_participants(
        &self,
        session_id: &SessionId,
        request: &AddParticipantsRequest,
    ) -> Result<Vec<Participant>, ClientError>;

    /// `DELETE /sessions/{id}/participants/{pid}`
    async fn remove_participant(
        &self,
        session_id: &SessionId,
        participant_id: &ParticipantId,
    ) -> Result<(), ClientError>;

    /// `POST /sessions/{id}/send-invites`
    async fn send_invites(&self, session_id: &SessionId) -> Result<InviteResponse, ClientError>;

    /// `POST /sessions/{id}/meetings`
    async fn create_meeting(
        &self,
        session_id: &SessionId,
        request: &ScheduleMeetingRequest,
    ) -> Result<Meeting, ClientError>;

    /// `PATCH /sessions/{id}/meetings/{mid}`
    async fn update_meeting(
        &self,
        session_id: &SessionId,
        meeting_id: &MeetingId,
        request: &ScheduleMeetingRequest,
    ) -> Result<Meeting, ClientError>;

    /// `GET /sessions/{id}/meetings`
    async fn list_meetings(&self, session_id: &SessionId) -> Result<Vec<Meeting>, ClientError>;

    /// `GET /sessions/{id}/recordings`
    async fn list_recordings(
        &self,
        session_id: &SessionId,
    ) -> Result<RecordingsListing, ClientError>;

    /// `GET /sessions/{id}/recordings/stream_urls`
    async fn stream_urls(&self, session_id: &SessionId)
        -> Result<StreamUrlsResponse, ClientError>;

    /// `POST /sessions/{id}/store-recordings`
    async fn store_recordings(
        &self,
        session_id: &SessionId,
    ) -> Result<StoreRecordingsResponse, ClientError>;

    /// `POST /sessions/{id}/download-recordings-local`
    async fn download_recordings_local(
        &self,
        session_id: &SessionId,
    ) -> Result<LocalDownloadResponse, ClientError>;
}

/// Run a fetch until it completes or `cancel` fires.
///
/// A cancelled fetch resolves to [`ClientError::Aborted`] and its eventual
/// response is dropped. Cancellation wins when both are ready.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fetch: F) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, ClientError>>,
{
    if cancel.is_cancelled() {
        metrics::record_aborted_fetch();
        return Err(ClientError::Aborted);
    }

    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            debug!(target: "liveclass.transport", "Fetch cancelled by caller");
            metrics::record_aborted_fetch();
            Err(ClientError::Aborted)
        }
        result = fetch => result,
    }
}
