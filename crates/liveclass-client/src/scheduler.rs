//! Meeting scheduler.
//!
//! A session is either [`MeetingState::Unscheduled`] (no meetings) or
//! [`MeetingState::Scheduled`] with exactly one meeting. The scheduler never
//! creates a second meeting: scheduling a session that already has one
//! updates the existing meeting instead.
//!
//! If the backend ever reports more than one meeting for a session, the first
//! is treated as canonical and the rest are ignored (with a warning).
//!
//! Every successful schedule bumps a [`RefreshSignal`] so meeting listings
//! know to re-fetch.

use crate::errors::ClientError;
use crate::models::{parse_timestamp, Meeting, ScheduleMeetingRequest};
use crate::refresh::{RefreshReceiver, RefreshSignal};
use crate::repository::{PendingChange, SessionRepository};
use crate::transport::cancellable;
use common::types::{MeetingId, SessionId};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Scheduling state of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeetingState {
    Unscheduled,
    Scheduled(Meeting),
}

impl MeetingState {
    /// Derive the state from a session's meetings collection.
    pub fn from_meetings(session_id: &SessionId, meetings: &[Meeting]) -> Self {
        if meetings.len() > 1 {
            warn!(
                target: "liveclass.scheduler",
                session_id = %session_id,
                count = meetings.len(),
                "Session has more than one meeting, using the first"
            );
        }
        match meetings.first() {
            Some(meeting) => MeetingState::Scheduled(meeting.clone()),
            None => MeetingState::Unscheduled,
        }
    }

    pub fn meeting(&self) -> Option<&Meeting> {
        match self {
            MeetingState::Unscheduled => None,
            MeetingState::Scheduled(meeting) => Some(meeting),
        }
    }
}

/// Schedules and reschedules the meeting of sessions held in a repository.
#[derive(Debug, Clone)]
pub struct MeetingScheduler {
    repository: SessionRepository,
    refresh: RefreshSignal,
}

impl MeetingScheduler {
    pub fn new(repository: SessionRepository) -> Self {
        Self {
            repository,
            refresh: RefreshSignal::new(),
        }
    }

    /// Receiver bumped after every successful schedule or reschedule.
    pub fn subscribe(&self) -> RefreshReceiver {
        self.refresh.subscribe()
    }

    /// Current state of a session, as cached.
    ///
    /// A session that has not been loaded is reported as unscheduled.
    pub fn state(&self, session_id: &SessionId) -> MeetingState {
        self.repository
            .get(session_id)
            .map_or(MeetingState::Unscheduled, |session| {
                MeetingState::from_meetings(session_id, &session.meetings)
            })
    }

    /// Schedule the session's meeting at `scheduled_for`.
    ///
    /// Creates a meeting when the session is unscheduled; otherwise updates
    /// the existing one. Fails with `Validation` while another schedule or
    /// reschedule of the same session is in flight.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn schedule(
        &self,
        session_id: &SessionId,
        scheduled_for: Option<&str>,
    ) -> Result<Meeting, ClientError> {
        let scheduled_for = require_timestamp(scheduled_for)?;
        let _pending = self
            .repository
            .begin_exclusive(session_id, PendingChange::Scheduling)?;

        if let MeetingState::Scheduled(existing) = self.state(session_id) {
            return self.update(session_id, &existing.id, scheduled_for).await;
        }

        let request = ScheduleMeetingRequest {
            scheduled_for: scheduled_for.to_string(),
        };
        let meeting = self
            .repository
            .api()
            .create_meeting(session_id, &request)
            .await
            .inspect_err(|e| {
                warn!(target: "liveclass.scheduler", error = %e, "Failed to schedule meeting");
            })?;

        self.repository.merge_meeting(session_id, &meeting);
        self.refresh.trigger();
        info!(
            target: "liveclass.scheduler",
            meeting_id = %meeting.id,
            scheduled_for = %meeting.scheduled_for,
            "Meeting scheduled"
        );
        Ok(meeting)
    }

    /// Move the session's existing meeting to `scheduled_for`.
    ///
    /// `meeting_id` must be the cached meeting when the session is loaded.
    /// Shares the in-flight exclusion of [`schedule`](Self::schedule).
    #[instrument(skip_all, fields(session_id = %session_id, meeting_id = %meeting_id))]
    pub async fn reschedule(
        &self,
        session_id: &SessionId,
        meeting_id: &MeetingId,
        scheduled_for: Option<&str>,
    ) -> Result<Meeting, ClientError> {
        let scheduled_for = require_timestamp(scheduled_for)?;
        let _pending = self
            .repository
            .begin_exclusive(session_id, PendingChange::Scheduling)?;

        if let MeetingState::Scheduled(existing) = self.state(session_id) {
            if &existing.id != meeting_id {
                return Err(ClientError::Validation(format!(
                    "Meeting {meeting_id} is not the meeting of this session"
                )));
            }
        }

        self.update(session_id, meeting_id, scheduled_for).await
    }

    /// Re-fetch the session's meetings and replace the cached collection.
    ///
    /// A listing overtaken by a schedule or a newer load is discarded in
    /// favor of the cached meetings.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn refresh_meetings(
        &self,
        session_id: &SessionId,
        cancel: &CancellationToken,
    ) -> Result<Vec<Meeting>, ClientError> {
        let ticket = self.repository.next_sequence();
        let api = self.repository.api();
        let meetings = cancellable(cancel, api.list_meetings(session_id)).await?;
        Ok(self.repository.apply_meetings(session_id, ticket, meetings))
    }

    /// Caller holds the session's `Scheduling` guard.
    async fn update(
        &self,
        session_id: &SessionId,
        meeting_id: &MeetingId,
        scheduled_for: &str,
    ) -> Result<Meeting, ClientError> {
        let request = ScheduleMeetingRequest {
            scheduled_for: scheduled_for.to_string(),
        };
        let meeting = self
            .repository
            .api()
            .update_meeting(session_id, meeting_id, &request)
            .await
            .inspect_err(|e| {
                warn!(target: "liveclass.scheduler", error = %e, "Failed to reschedule meeting");
            })?;

        self.repository.merge_meeting(session_id, &meeting);
        self.refresh.trigger();
        info!(
            target: "liveclass.scheduler",
            meeting_id = %meeting.id,
            scheduled_for = %meeting.scheduled_for,
            "Meeting rescheduled"
        );
        Ok(meeting)
    }
}

fn require_timestamp(value: Option<&str>) -> Result<&str, ClientError> {
    let value = value.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(ClientError::Validation(
            "A meeting time is required".to_string(),
        ));
    }
    if parse_timestamp(value).is_none() {
        return Err(ClientError::Validation(format!(
            "Invalid meeting time '{value}'"
        )));
    }
    Ok(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::transport::{MockSessionApi, SessionApi};
    use std::sync::Arc;

    const START: &str = "2025-03-01T10:00:00Z";
    const LATER: &str = "2025-03-08T10:00:00Z";

    async fn setup() -> (Arc<MockSessionApi>, SessionRepository, MeetingScheduler, SessionId) {
        let api = Arc::new(MockSessionApi::new());
        let repo = SessionRepository::new(api.clone());
        let session = repo.create("Algebra 101", None).await.unwrap();
        let scheduler = MeetingScheduler::new(repo.clone());
        (api, repo, scheduler, session.id)
    }

    #[tokio::test]
    async fn test_schedule_requires_timestamp() {
        let (api, _repo, scheduler, id) = setup().await;
        let before = api.call_count().await;

        assert!(matches!(
            scheduler.schedule(&id, None).await,
            Err(ClientError::Validation(_))
        ));
        assert!(matches!(
            scheduler.schedule(&id, Some("  ")).await,
            Err(ClientError::Validation(_))
        ));
        assert!(matches!(
            scheduler.schedule(&id, Some("tomorrow-ish")).await,
            Err(ClientError::Validation(_))
        ));
        assert_eq!(api.call_count().await, before);
    }

    #[tokio::test]
    async fn test_schedule_then_reschedule_keeps_meeting_id() {
        let (_api, repo, scheduler, id) = setup().await;
        assert_eq!(scheduler.state(&id), MeetingState::Unscheduled);

        let scheduled = scheduler.schedule(&id, Some(START)).await.unwrap();
        assert_eq!(
            scheduler.state(&id),
            MeetingState::Scheduled(scheduled.clone())
        );

        let moved = scheduler
            .reschedule(&id, &scheduled.id, Some(LATER))
            .await
            .unwrap();

        assert_eq!(moved.id, scheduled.id);
        assert_eq!(moved.scheduled_for, LATER);
        assert_ne!(moved.join_url, scheduled.join_url);
        let cached = repo.get(&id).unwrap();
        assert_eq!(cached.meetings, vec![moved]);
    }

    #[tokio::test]
    async fn test_second_schedule_updates_instead_of_creating() {
        let (api, repo, scheduler, id) = setup().await;

        let first = scheduler.schedule(&id, Some(START)).await.unwrap();
        let second = scheduler.schedule(&id, Some(LATER)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(repo.get(&id).unwrap().meetings.len(), 1);
        let calls = api.calls().await;
        assert_eq!(calls.iter().filter(|c| **c == "create_meeting").count(), 1);
        assert_eq!(calls.iter().filter(|c| **c == "update_meeting").count(), 1);
    }

    #[tokio::test]
    async fn test_reschedule_rejects_foreign_meeting_id() {
        let (_api, _repo, scheduler, id) = setup().await;
        scheduler.schedule(&id, Some(START)).await.unwrap();

        let result = scheduler
            .reschedule(&id, &MeetingId::from("someone-else"), Some(LATER))
            .await;
        assert!(matches!(result, Err(ClientError::Validation(_))));
    }

    #[tokio::test]
    async fn test_failed_schedule_leaves_state_unscheduled() {
        let (api, _repo, scheduler, id) = setup().await;
        let mut refresh = scheduler.subscribe();
        api.fail_next(ClientError::Transport {
            status: Some(502),
            body: "provider unavailable".to_string(),
        })
        .await;

        assert!(scheduler.schedule(&id, Some(START)).await.is_err());
        assert_eq!(scheduler.state(&id), MeetingState::Unscheduled);
        assert_eq!(refresh.current(), 0);

        scheduler.schedule(&id, Some(START)).await.unwrap();
        assert_eq!(refresh.changed().await, Some(1));
    }

    #[tokio::test]
    async fn test_multiple_meetings_pick_first() {
        let (api, repo, scheduler, id) = setup().await;
        let request = ScheduleMeetingRequest {
            scheduled_for: START.to_string(),
        };
        let first = api.create_meeting(&id, &request).await.unwrap();
        api.create_meeting(&id, &request).await.unwrap();

        let meetings = scheduler
            .refresh_meetings(&id, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(meetings.len(), 2);
        assert_eq!(repo.get(&id).unwrap().meetings.len(), 2);
        assert_eq!(scheduler.state(&id), MeetingState::Scheduled(first));
    }

    #[tokio::test]
    async fn test_refresh_meetings_overtaken_by_schedule_is_discarded() {
        let (api, repo, scheduler, id) = setup().await;
        let api_for_listing = Arc::clone(&api);

        let ticket = repo.next_sequence();
        let stale = api_for_listing.list_meetings(&id).await.unwrap();
        let scheduled = scheduler.schedule(&id, Some(START)).await.unwrap();

        let applied = repo.apply_meetings(&id, ticket, stale);

        assert_eq!(applied, vec![scheduled.clone()]);
        assert_eq!(repo.get(&id).unwrap().meetings, vec![scheduled]);
    }

    #[tokio::test]
    async fn test_overlapping_schedules_create_one_meeting() {
        let (api, repo, scheduler, id) = setup().await;

        let (first, second) = tokio::join!(
            scheduler.schedule(&id, Some(START)),
            scheduler.schedule(&id, Some(LATER))
        );

        assert!(first.is_ok() || second.is_ok());
        let calls = api.calls().await;
        assert_eq!(calls.iter().filter(|c| **c == "create_meeting").count(), 1);
        assert_eq!(repo.get(&id).unwrap().meetings.len(), 1);
        assert_eq!(api.list_meetings(&id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_schedule_rejected_while_scheduling_in_flight() {
        let (api, repo, scheduler, id) = setup().await;
        let guard = repo
            .begin_exclusive(&id, PendingChange::Scheduling)
            .unwrap();
        let before = api.call_count().await;

        assert!(matches!(
            scheduler.schedule(&id, Some(START)).await,
            Err(ClientError::Validation(_))
        ));
        assert!(matches!(
            scheduler
                .reschedule(&id, &MeetingId::from("m-1"), Some(LATER))
                .await,
            Err(ClientError::Validation(_))
        ));
        assert_eq!(api.call_count().await, before);

        drop(guard);
        scheduler.schedule(&id, Some(START)).await.unwrap();
        assert!(repo.pending(&id).is_empty());
    }

    #[test]
    fn test_state_from_empty_meetings() {
        let state = MeetingState::from_meetings(&SessionId::from("s-1"), &[]);
        assert_eq!(state, MeetingState::Unscheduled);
        assert!(state.meeting().is_none());
    }
}
