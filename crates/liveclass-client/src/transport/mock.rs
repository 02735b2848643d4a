//! In-memory [`SessionApi`] for tests.
//!
//! Mirrors the backend's observable behavior closely enough for the
//! orchestration layer: ids are issued on create, unknown sessions are
//! `NotFound`, and the archive endpoints report one item per seeded
//! recording.
//!
//! Two hooks exist for tests:
//!
//! - [`MockSessionApi::fail_next`] queues an error for the next call
//! - [`MockSessionApi::hold_loads`] lets `get_session` read its snapshot but
//!   withholds the response until [`MockSessionApi::release_loads`], which
//!   reproduces a slow full-session fetch racing a faster mutation

use super::SessionApi;
use crate::errors::ClientError;
use crate::models::{
    AddParticipantsRequest, CreateSessionRequest, InviteResponse, LocalDownloadResponse, Meeting,
    Participant, Recording, RecordingsListing, ScheduleMeetingRequest, Session,
    StoreRecordingsResponse, StreamUrlsResponse,
};
use chrono::DateTime;
use common::types::{MeetingId, ParticipantId, SessionId};
use std::collections::{HashMap, VecDeque};
use tokio::sync::{watch, Mutex};

/// 2025-01-01T00:00:00Z; mock creation times count up from here.
const MOCK_EPOCH_SECS: i64 = 1_735_689_600;

/// First provider-style meeting number issued by the mock.
const MOCK_MEETING_BASE: u64 = 85_000_000_000;

#[derive(Default)]
struct MockState {
    sessions: Vec<Session>,
    recordings: HashMap<SessionId, Vec<Recording>>,
    archived: HashMap<SessionId, Vec<String>>,
    next_id: u64,
    fail_next: VecDeque<ClientError>,
    calls: Vec<&'static str>,
}

impl MockState {
    /// Record a call and pop a queued failure, if any.
    fn record(&mut self, call: &'static str) -> Result<(), ClientError> {
        self.calls.push(call);
        match self.fail_next.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn session_mut(&mut self, session_id: &SessionId) -> Result<&mut Session, ClientError> {
        self.sessions
            .iter_mut()
            .find(|s| &s.id == session_id)
            .ok_or_else(session_not_found)
    }

    fn session(&self, session_id: &SessionId) -> Result<&Session, ClientError> {
        self.sessions
            .iter()
            .find(|s| &s.id == session_id)
            .ok_or_else(session_not_found)
    }

    fn seeded(&self, session_id: &SessionId) -> Vec<Recording> {
        self.recordings.get(session_id).cloned().unwrap_or_default()
    }
}

fn session_not_found() -> ClientError {
    ClientError::NotFound("Session not found".to_string())
}

fn mock_timestamp(offset_secs: u64) -> String {
    let secs = MOCK_EPOCH_SECS.saturating_add(i64::try_from(offset_secs).unwrap_or(i64::MAX));
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string())
        .unwrap_or_default()
}

fn archive_name(recording: &Recording) -> String {
    let file_id = recording.file_id.as_deref().unwrap_or("unknown");
    format!("{}/{}.{}", recording.meeting_id, file_id, recording.extension())
}

/// In-memory backend.
pub struct MockSessionApi {
    state: Mutex<MockState>,
    /// `true` while `get_session` responses may be delivered.
    gate: watch::Sender<bool>,
    /// Number of `get_session` calls currently withheld.
    held: watch::Sender<usize>,
}

impl Default for MockSessionApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSessionApi {
    /// Create an empty backend.
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        let (held, _) = watch::channel(0);
        Self {
            state: Mutex::new(MockState::default()),
            gate,
            held,
        }
    }

    /// Insert a session as if it had been created earlier.
    pub async fn insert_session(&self, session: Session) {
        let mut state = self.state.lock().await;
        state.sessions.retain(|s| s.id != session.id);
        state.sessions.push(session);
    }

    /// Provider recordings the backend will report for a session.
    pub async fn seed_recordings(&self, session_id: &SessionId, recordings: Vec<Recording>) {
        self.state
            .lock()
            .await
            .recordings
            .insert(session_id.clone(), recordings);
    }

    /// Fail the next call with `error`. Calls queue up in order.
    pub async fn fail_next(&self, error: ClientError) {
        self.state.lock().await.fail_next.push_back(error);
    }

    /// Names of the calls received so far, in order.
    pub async fn calls(&self) -> Vec<&'static str> {
        self.state.lock().await.calls.clone()
    }

    /// Number of calls received so far.
    pub async fn call_count(&self) -> usize {
        self.state.lock().await.calls.len()
    }

    /// Withhold `get_session` responses until [`Self::release_loads`].
    pub fn hold_loads(&self) {
        self.gate.send_replace(false);
    }

    /// Deliver every withheld `get_session` response.
    pub fn release_loads(&self) {
        self.gate.send_replace(true);
    }

    /// Wait until at least `count` `get_session` calls are being withheld.
    pub async fn wait_for_held_loads(&self, count: usize) {
        let mut rx = self.held.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|held| *held >= count).await;
    }

    async fn wait_for_gate(&self) {
        if *self.gate.borrow() {
            return;
        }
        self.held.send_modify(|held| *held += 1);
        let mut rx = self.gate.subscribe();
        let _ = rx.wait_for(|open| *open).await;
        self.held.send_modify(|held| *held = held.saturating_sub(1));
    }
}

#[async_trait::async_trait]
impl SessionApi for MockSessionApi {
    async fn list_sessions(&self) -> Result<Vec<Session>, ClientError> {
        let mut state = self.state.lock().await;
        state.record("list_sessions")?;
        Ok(state
            .sessions
            .iter()
            .map(|s| Session {
                participants: Vec::new(),
                meetings: Vec::new(),
                ..s.clone()
            })
            .collect())
    }

    async fn get_session(&self, session_id: &SessionId) -> Result<Session, ClientError> {
        let snapshot = {
            let mut state = self.state.lock().await;
            state.record("get_session")?;
            state.session(session_id).cloned()
        };
        self.wait_for_gate().await;
        snapshot
    }

    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<Session, ClientError> {
        let mut state = self.state.lock().await;
        state.record("create_session")?;
        let n = state.next_id();
        let session = Session {
            id: SessionId::new(format!("session-{n}")),
            title: request.title.clone(),
            description: request.description.clone(),
            created_at: mock_timestamp(n),
            participants: Vec::new(),
            meetings: Vec::new(),
        };
        state.sessions.push(session.clone());
        Ok(session)
    }

    async fn delete_session(&self, session_id: &SessionId) -> Result<(), ClientError> {
        let mut state = self.state.lock().await;
        state.record("delete_session")?;
        state.session(session_id)?;
        state.sessions.retain(|s| &s.id != session_id);
        state.recordings.remove(session_id);
        state.archived.remove(session_id);
        Ok(())
    }

    async fn add_participants(
        &self,
        session_id: &SessionId,
        request: &AddParticipantsRequest,
    ) -> Result<Vec<Participant>, ClientError> {
        let mut state = self.state.lock().await;
        state.record("add_participants")?;
        state.session(session_id)?;

        let mut created = Vec::with_capacity(request.emails.len());
        for email in &request.emails {
            let n = state.next_id();
            created.push(Participant {
                id: ParticipantId::new(format!("participant-{n}")),
                email: email.clone(),
                role: request.role,
            });
        }
        state
            .session_mut(session_id)?
            .participants
            .extend(created.iter().cloned());
        Ok(created)
    }

    async fn remove_participant(
        &self,
        session_id: &SessionId,
        participant_id: &ParticipantId,
    ) -> Result<(), ClientError> {
        let mut state = self.state.lock().await;
        state.record("remove_participant")?;
        let session = state.session_mut(session_id)?;
        let before = session.participants.len();
        session.participants.retain(|p| &p.id != participant_id);
        if session.participants.len() == before {
            return Err(ClientError::NotFound("Participant not found".to_string()));
        }
        Ok(())
    }

    async fn send_invites(&self, session_id: &SessionId) -> Result<InviteResponse, ClientError> {
        let mut state = self.state.lock().await;
        state.record("send_invites")?;
        let count = state.session(session_id)?.participants.len();
        Ok(InviteResponse {
            detail: format!("Invitations sent to {count} participants"),
        })
    }

    async fn create_meeting(
        &self,
        session_id: &SessionId,
        request: &ScheduleMeetingRequest,
    ) -> Result<Meeting, ClientError> {
        let mut state = self.state.lock().await;
        state.record("create_meeting")?;
        state.session(session_id)?;
        let n = state.next_id();
        let number = MOCK_MEETING_BASE + n;
        let meeting = Meeting {
            id: MeetingId::new(number.to_string()),
            join_url: format!("https://zoom.example/j/{number}?v={n}"),
            scheduled_for: request.scheduled_for.clone(),
        };
        state.session_mut(session_id)?.meetings.push(meeting.clone());
        Ok(meeting)
    }

    async fn update_meeting(
        &self,
        session_id: &SessionId,
        meeting_id: &MeetingId,
        request: &ScheduleMeetingRequest,
    ) -> Result<Meeting, ClientError> {
        let mut state = self.state.lock().await;
        state.record("update_meeting")?;
        let n = state.next_id();
        let meeting = state
            .session_mut(session_id)?
            .meetings
            .iter_mut()
            .find(|m| &m.id == meeting_id)
            .ok_or_else(|| ClientError::NotFound("Meeting not found".to_string()))?;
        meeting.scheduled_for = request.scheduled_for.clone();
        meeting.join_url = format!("https://zoom.example/j/{meeting_id}?v={n}");
        Ok(meeting.clone())
    }

    async fn list_meetings(&self, session_id: &SessionId) -> Result<Vec<Meeting>, ClientError> {
        let mut state = self.state.lock().await;
        state.record("list_meetings")?;
        Ok(state.session(session_id)?.meetings.clone())
    }

    async fn list_recordings(
        &self,
        session_id: &SessionId,
    ) -> Result<RecordingsListing, ClientError> {
        let mut state = self.state.lock().await;
        state.record("list_recordings")?;
        state.session(session_id)?;
        let recordings = state
            .seeded(session_id)
            .into_iter()
            .map(|r| Recording {
                download_url: Some(format!(
                    "https://zoom.example/rec/download/{}",
                    r.file_id.as_deref().unwrap_or("unknown")
                )),
                stream_url: None,
                ..r
            })
            .collect();
        Ok(RecordingsListing {
            recordings,
            archived_blobs: state.archived.get(session_id).cloned().unwrap_or_default(),
        })
    }

    async fn stream_urls(
        &self,
        session_id: &SessionId,
    ) -> Result<StreamUrlsResponse, ClientError> {
        let mut state = self.state.lock().await;
        state.record("stream_urls")?;
        state.session(session_id)?;
        let recordings_with_streams = state
            .seeded(session_id)
            .into_iter()
            .map(|r| Recording {
                stream_url: Some(format!(
                    "https://stream.example/{session_id}/{}?expires=3600",
                    archive_name(&r)
                )),
                download_url: None,
                ..r
            })
            .collect();
        Ok(StreamUrlsResponse {
            recordings_with_streams,
        })
    }

    async fn store_recordings(
        &self,
        session_id: &SessionId,
    ) -> Result<StoreRecordingsResponse, ClientError> {
        let mut state = self.state.lock().await;
        state.record("store_recordings")?;
        state.session(session_id)?;

        let mut stored = Vec::new();
        let mut blobs = Vec::new();
        for recording in state.seeded(session_id) {
            let blob_path = format!("{session_id}/{}", archive_name(&recording));
            stored.push(serde_json::json!({
                "meeting_id": recording.meeting_id,
                "file_id": recording.file_id,
                "blob_path": blob_path,
                "file_size": 0,
            }));
            blobs.push(blob_path);
        }
        state
            .archived
            .entry(session_id.clone())
            .or_default()
            .extend(blobs);
        Ok(StoreRecordingsResponse { stored })
    }

    async fn download_recordings_local(
        &self,
        session_id: &SessionId,
    ) -> Result<LocalDownloadResponse, ClientError> {
        let mut state = self.state.lock().await;
        state.record("download_recordings_local")?;
        state.session(session_id)?;
        let downloaded_files = state
            .seeded(session_id)
            .iter()
            .map(|r| {
                serde_json::Value::String(format!("recordings/{session_id}/{}", archive_name(r)))
            })
            .collect();
        Ok(LocalDownloadResponse { downloaded_files })
    }
}
