//! Participant manager.
//!
//! Adds and removes participants against a session. Every cache change
//! happens after the backend confirmed it; while a call is in flight the
//! repository carries a [`PendingChange`] for it instead.

use crate::errors::ClientError;
use crate::models::{AddParticipantsRequest, Participant, ParticipantRole};
use crate::repository::{PendingChange, SessionRepository};
use common::types::{ParticipantId, SessionId};
use tracing::{info, instrument, warn};

/// Result of an add request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// The input held no addresses; the backend was not called.
    Nothing,
    /// The participants the backend created.
    Added(Vec<Participant>),
}

impl AddOutcome {
    /// Participants created by this call.
    pub fn participants(&self) -> &[Participant] {
        match self {
            AddOutcome::Nothing => &[],
            AddOutcome::Added(participants) => participants,
        }
    }
}

/// Split a raw comma-separated address list.
///
/// Tokens are trimmed, empty tokens dropped, and repeats removed keeping the
/// first occurrence.
pub fn normalize_emails(raw: &str) -> Vec<String> {
    let mut emails: Vec<String> = Vec::new();
    for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if !emails.iter().any(|e| e == token) {
            emails.push(token.to_string());
        }
    }
    emails
}

/// Orchestrates participant changes for sessions held in a repository.
#[derive(Debug, Clone)]
pub struct ParticipantManager {
    repository: SessionRepository,
}

impl ParticipantManager {
    pub fn new(repository: SessionRepository) -> Self {
        Self { repository }
    }

    /// Add every address in `emails_raw` with `role`.
    ///
    /// One batch call is made. A batch the backend partially rejects is
    /// passed through as it answered; nothing is reconciled per address.
    #[instrument(skip_all, fields(session_id = %session_id, role = %role))]
    pub async fn add_participants(
        &self,
        session_id: &SessionId,
        emails_raw: &str,
        role: ParticipantRole,
    ) -> Result<AddOutcome, ClientError> {
        let emails = normalize_emails(emails_raw);
        if emails.is_empty() {
            return Ok(AddOutcome::Nothing);
        }

        let _pending = self
            .repository
            .begin(session_id, PendingChange::AddingParticipants);
        let request = AddParticipantsRequest { emails, role };
        let created = self
            .repository
            .api()
            .add_participants(session_id, &request)
            .await
            .inspect_err(|e| {
                warn!(
                    target: "liveclass.participants",
                    error = %e,
                    "Failed to add participants"
                );
            })?;

        self.repository.merge_participants(session_id, &created);
        info!(
            target: "liveclass.participants",
            requested = request.emails.len(),
            added = created.len(),
            "Participants added"
        );
        Ok(AddOutcome::Added(created))
    }

    /// Remove one participant. The cache changes only after the backend
    /// confirmed the removal.
    #[instrument(skip_all, fields(session_id = %session_id, participant_id = %participant_id))]
    pub async fn remove_participant(
        &self,
        session_id: &SessionId,
        participant_id: &ParticipantId,
    ) -> Result<(), ClientError> {
        let _pending = self.repository.begin(
            session_id,
            PendingChange::RemovingParticipant(participant_id.clone()),
        );
        self.repository
            .api()
            .remove_participant(session_id, participant_id)
            .await
            .inspect_err(|e| {
                warn!(
                    target: "liveclass.participants",
                    error = %e,
                    "Failed to remove participant"
                );
            })?;

        self.repository.forget_participant(session_id, participant_id);
        info!(target: "liveclass.participants", "Participant removed");
        Ok(())
    }

    /// Ask the backend to e-mail every participant their join details.
    ///
    /// Returns the backend's confirmation text.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn send_invites(&self, session_id: &SessionId) -> Result<String, ClientError> {
        let response = self.repository.api().send_invites(session_id).await?;
        info!(target: "liveclass.participants", detail = %response.detail, "Invitations sent");
        Ok(response.detail)
    }
}

/// The text a user is composing for an add request.
///
/// The buffer is cleared only when the add succeeds, so a failed request
/// leaves the input in place for another attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InviteDraft {
    pub emails: String,
    pub role: ParticipantRole,
}

impl InviteDraft {
    pub fn new(emails: impl Into<String>, role: ParticipantRole) -> Self {
        Self {
            emails: emails.into(),
            role,
        }
    }

    /// Submit the draft through `manager`.
    pub async fn submit(
        &mut self,
        manager: &ParticipantManager,
        session_id: &SessionId,
    ) -> Result<AddOutcome, ClientError> {
        let outcome = manager
            .add_participants(session_id, &self.emails, self.role)
            .await?;
        if matches!(outcome, AddOutcome::Added(_)) {
            self.emails.clear();
        }
        Ok(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::transport::MockSessionApi;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    async fn setup() -> (Arc<MockSessionApi>, SessionRepository, ParticipantManager, SessionId) {
        let api = Arc::new(MockSessionApi::new());
        let repo = SessionRepository::new(api.clone());
        let session = repo.create("Algebra 101", None).await.unwrap();
        let manager = ParticipantManager::new(repo.clone());
        (api, repo, manager, session.id)
    }

    #[test]
    fn test_normalize_emails() {
        assert_eq!(
            normalize_emails(" a@x.com , b@y.com ,, "),
            vec!["a@x.com", "b@y.com"]
        );
        assert_eq!(normalize_emails("a@x.com,a@x.com"), vec!["a@x.com"]);
        assert!(normalize_emails(" , ,").is_empty());
        assert!(normalize_emails("").is_empty());
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_call() {
        let (api, _repo, manager, id) = setup().await;
        let before = api.call_count().await;

        let outcome = manager
            .add_participants(&id, " ,, ", ParticipantRole::Student)
            .await
            .unwrap();

        assert_eq!(outcome, AddOutcome::Nothing);
        assert_eq!(api.call_count().await, before);
    }

    #[tokio::test]
    async fn test_add_appends_to_cache_in_order() {
        let (_api, repo, manager, id) = setup().await;

        manager
            .add_participants(&id, "a@x.com", ParticipantRole::Teacher)
            .await
            .unwrap();
        let outcome = manager
            .add_participants(&id, " b@y.com , c@z.com ", ParticipantRole::Student)
            .await
            .unwrap();

        assert_eq!(outcome.participants().len(), 2);
        let cached = repo.get(&id).unwrap();
        let emails: Vec<_> = cached.participants.iter().map(|p| p.email.as_str()).collect();
        assert_eq!(emails, vec!["a@x.com", "b@y.com", "c@z.com"]);
        assert_eq!(cached.participants[0].role, ParticipantRole::Teacher);
        assert!(repo.pending(&id).is_empty());
    }

    #[tokio::test]
    async fn test_failed_add_leaves_cache_untouched() {
        let (api, repo, manager, id) = setup().await;
        let before = repo.get(&id).unwrap();
        api.fail_next(ClientError::Transport {
            status: Some(500),
            body: "provider down".to_string(),
        })
        .await;

        let result = manager
            .add_participants(&id, "a@x.com", ParticipantRole::Student)
            .await;

        assert!(matches!(
            result,
            Err(ClientError::Transport {
                status: Some(500),
                ..
            })
        ));
        assert_eq!(repo.get(&id).unwrap(), before);
        assert!(repo.pending(&id).is_empty());
    }

    #[tokio::test]
    async fn test_remove_updates_cache_after_confirmation() {
        let (_api, repo, manager, id) = setup().await;
        let added = manager
            .add_participants(&id, "a@x.com,b@y.com", ParticipantRole::Student)
            .await
            .unwrap();
        let target = added.participants()[0].id.clone();

        manager.remove_participant(&id, &target).await.unwrap();

        let cached = repo.get(&id).unwrap();
        assert_eq!(cached.participants.len(), 1);
        assert!(cached.participants.iter().all(|p| p.id != target));
    }

    #[tokio::test]
    async fn test_failed_remove_keeps_participant() {
        let (api, repo, manager, id) = setup().await;
        let added = manager
            .add_participants(&id, "a@x.com", ParticipantRole::Student)
            .await
            .unwrap();
        let target = added.participants()[0].id.clone();
        api.fail_next(ClientError::Transport {
            status: Some(503),
            body: String::new(),
        })
        .await;

        assert!(manager.remove_participant(&id, &target).await.is_err());
        assert_eq!(repo.get(&id).unwrap().participants.len(), 1);
    }

    #[tokio::test]
    async fn test_removing_twice_propagates_backend_error() {
        let (_api, repo, manager, id) = setup().await;
        let added = manager
            .add_participants(&id, "a@x.com", ParticipantRole::Student)
            .await
            .unwrap();
        let target = added.participants()[0].id.clone();

        manager.remove_participant(&id, &target).await.unwrap();
        let second = manager.remove_participant(&id, &target).await;

        assert!(matches!(second, Err(ClientError::NotFound(_))));
        assert!(repo.get(&id).unwrap().participants.is_empty());
    }

    #[tokio::test]
    async fn test_send_invites_returns_detail() {
        let (_api, _repo, manager, id) = setup().await;
        manager
            .add_participants(&id, "a@x.com,b@y.com", ParticipantRole::Student)
            .await
            .unwrap();

        let detail = manager.send_invites(&id).await.unwrap();
        assert_eq!(detail, "Invitations sent to 2 participants");
    }

    #[tokio::test]
    async fn test_draft_clears_only_on_success() {
        let (api, repo, manager, id) = setup().await;
        let mut draft = InviteDraft::new("a@x.com, b@y.com", ParticipantRole::Student);

        api.fail_next(ClientError::network("connection reset")).await;
        assert!(draft.submit(&manager, &id).await.is_err());
        assert_eq!(draft.emails, "a@x.com, b@y.com");

        draft.submit(&manager, &id).await.unwrap();
        assert!(draft.emails.is_empty());

        let loaded = repo.load(&id, &CancellationToken::new()).await.unwrap();
        assert_eq!(loaded.participants.len(), 2);
        assert!(api.calls().await.contains(&"get_session"));
    }
}
