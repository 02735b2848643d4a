//! Session repository: the owned cache of session aggregates.
//!
//! The repository is the only component that writes cached session state.
//! Managers and the scheduler call the backend themselves and hand the
//! confirmed result to one of the merge helpers here; nobody else keeps a
//! copy across calls.
//!
//! # Stale loads
//!
//! A full-session load can be overtaken by a faster mutation. Every load
//! takes a ticket from a monotonic sequence before it starts; every cache
//! mutation stamps the session with a fresh sequence number. When a load
//! resolves, it is applied only if no mutation (and no newer load) has
//! stamped the session since its ticket was issued. Otherwise it is
//! discarded and the cached entry is returned unchanged.
//!
//! Listings are fenced the same way: a listing fetched before a create or
//! delete gets those changes replayed onto it, and a listing older than the
//! one already applied is dropped.
//!
//! # Observers
//!
//! Every applied change bumps a revision counter; [`SessionRepository::subscribe`]
//! hands out receivers so a view can re-read snapshots on change.
//!
//! # Pending changes
//!
//! The cache only ever holds confirmed data. A caller that wants to render
//! an in-flight mutation registers a [`PendingChange`] for the duration of
//! the call; the returned [`PendingGuard`] clears it on drop.

use crate::errors::ClientError;
use crate::models::{parse_timestamp, CreateSessionRequest, Meeting, Participant, Session};
use crate::refresh::{RefreshReceiver, RefreshSignal};
use crate::transport::{cancellable, SessionApi};
use common::types::{ParticipantId, SessionId};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Attempts a load makes when it is overtaken before anything was cached.
const LOAD_ATTEMPTS: u32 = 2;

/// An in-flight mutation against a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingChange {
    AddingParticipants,
    RemovingParticipant(ParticipantId),
    Scheduling,
    Archiving,
}

/// A create or delete applied to the listing under a sequence number.
enum ListingChange {
    Created(Session),
    Removed,
}

#[derive(Default)]
struct CacheState {
    /// Full aggregates, one per session id.
    entries: HashMap<SessionId, Session>,
    /// Sequence number of the last change applied per session. Kept after
    /// an entry is removed so late loads for it are still discarded.
    versions: HashMap<SessionId, u64>,
    /// Summary listing, newest first.
    listing: Vec<Session>,
    /// Ticket of the listing fetch last applied.
    listing_ticket: u64,
    /// Creates and deletes newer than `listing_ticket`, by session.
    listing_changes: HashMap<SessionId, (u64, ListingChange)>,
    pending: HashMap<SessionId, Vec<PendingChange>>,
}

impl CacheState {
    fn is_stale(&self, session_id: &SessionId, ticket: u64) -> bool {
        self.versions
            .get(session_id)
            .is_some_and(|version| *version > ticket)
    }
}

struct Inner {
    api: Arc<dyn SessionApi>,
    cache: RwLock<CacheState>,
    sequence: AtomicU64,
    revision: RefreshSignal,
}

/// Shared handle to the session cache.
///
/// Cloning the handle shares the cache; every component that needs session
/// state is given a clone.
#[derive(Clone)]
pub struct SessionRepository {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.read();
        f.debug_struct("SessionRepository")
            .field("cached_sessions", &cache.entries.len())
            .field("listing", &cache.listing.len())
            .field("revision", &self.inner.revision.current())
            .finish()
    }
}

impl SessionRepository {
    /// Create an empty repository over `api`.
    pub fn new(api: Arc<dyn SessionApi>) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                cache: RwLock::new(CacheState::default()),
                sequence: AtomicU64::new(0),
                revision: RefreshSignal::new(),
            }),
        }
    }

    /// The backend this repository is bound to.
    pub fn api(&self) -> Arc<dyn SessionApi> {
        Arc::clone(&self.inner.api)
    }

    /// Subscribe to cache changes.
    pub fn subscribe(&self) -> RefreshReceiver {
        self.inner.revision.subscribe()
    }

    /// Number of changes applied so far.
    pub fn revision(&self) -> u64 {
        self.inner.revision.current()
    }

    /// Snapshot of the cached full session, if loaded.
    pub fn get(&self, session_id: &SessionId) -> Option<Session> {
        self.read().entries.get(session_id).cloned()
    }

    /// Snapshot of the cached summary listing, newest first.
    pub fn sessions(&self) -> Vec<Session> {
        self.read().listing.clone()
    }

    /// Mutations currently in flight for a session.
    pub fn pending(&self, session_id: &SessionId) -> Vec<PendingChange> {
        self.read()
            .pending
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    // -------------------------------------------------------------------------
    // Remote operations
    // -------------------------------------------------------------------------

    /// Fetch the full session graph and replace the cached entry.
    ///
    /// A load overtaken by a mutation is discarded; the cached entry is
    /// returned instead. With nothing cached to return, the fetch is retried
    /// once under a fresh ticket.
    ///
    /// # Errors
    ///
    /// Besides backend errors, resolves to [`ClientError::Aborted`] when
    /// `cancel` fires, and also when the retry is overtaken as well. In the
    /// latter case the session is still changing under concurrent
    /// mutations; callers treat it like a cancelled view and load again.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn load(
        &self,
        session_id: &SessionId,
        cancel: &CancellationToken,
    ) -> Result<Session, ClientError> {
        for attempt in 1..=LOAD_ATTEMPTS {
            let ticket = self.next_sequence();
            let session = cancellable(cancel, self.inner.api.get_session(session_id)).await?;
            if let Some(session) = self.apply_load(session_id, ticket, session) {
                return Ok(session);
            }
            debug!(
                target: "liveclass.repository",
                session_id = %session_id,
                attempt,
                "Load overtaken with nothing cached"
            );
        }
        Err(ClientError::Aborted)
    }

    /// Fetch the summary listing and cache it newest first.
    ///
    /// Creates and deletes that complete while the fetch is in flight are
    /// kept.
    #[instrument(skip_all)]
    pub async fn list(&self, cancel: &CancellationToken) -> Result<Vec<Session>, ClientError> {
        let ticket = self.next_sequence();
        let sessions = cancellable(cancel, self.inner.api.list_sessions()).await?;
        Ok(self.apply_listing(ticket, sessions))
    }

    /// Create a session. The title must be non-empty after trimming.
    #[instrument(skip_all)]
    pub async fn create(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Result<Session, ClientError> {
        if title.trim().is_empty() {
            return Err(ClientError::Validation("Title is required".to_string()));
        }

        let request = CreateSessionRequest {
            title: title.to_string(),
            description: description.map(str::to_string),
        };
        let session = self.inner.api.create_session(&request).await?;

        {
            let mut cache = self.write();
            let version = self.next_sequence();
            cache.versions.insert(session.id.clone(), version);
            cache.listing_changes.insert(
                session.id.clone(),
                (version, ListingChange::Created(session.clone())),
            );
            cache.listing.retain(|s| s.id != session.id);
            cache.listing.insert(0, session.clone());
            cache.entries.insert(session.id.clone(), session.clone());
        }
        self.inner.revision.trigger();

        info!(
            target: "liveclass.repository",
            session_id = %session.id,
            "Session created"
        );
        Ok(session)
    }

    /// Delete a session. Unconditional once requested.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn remove(&self, session_id: &SessionId) -> Result<(), ClientError> {
        self.inner.api.delete_session(session_id).await?;

        {
            let mut cache = self.write();
            let version = self.next_sequence();
            cache.versions.insert(session_id.clone(), version);
            cache
                .listing_changes
                .insert(session_id.clone(), (version, ListingChange::Removed));
            cache.entries.remove(session_id);
            cache.listing.retain(|s| &s.id != session_id);
        }
        self.inner.revision.trigger();

        info!(
            target: "liveclass.repository",
            session_id = %session_id,
            "Session deleted"
        );
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Merge helpers (confirmed results only)
    // -------------------------------------------------------------------------

    /// Append confirmed participants, replacing any with the same id in place.
    pub fn merge_participants(&self, session_id: &SessionId, participants: &[Participant]) {
        self.mutate(session_id, |session| {
            for participant in participants {
                match session
                    .participants
                    .iter_mut()
                    .find(|p| p.id == participant.id)
                {
                    Some(existing) => existing.clone_from(participant),
                    None => session.participants.push(participant.clone()),
                }
            }
        });
    }

    /// Drop a participant whose removal the backend confirmed.
    pub fn forget_participant(&self, session_id: &SessionId, participant_id: &ParticipantId) {
        self.mutate(session_id, |session| {
            session.participants.retain(|p| &p.id != participant_id);
        });
    }

    /// Replace the meeting with the same id in place, or append it.
    pub fn merge_meeting(&self, session_id: &SessionId, meeting: &Meeting) {
        self.mutate(session_id, |session| {
            match session.meetings.iter_mut().find(|m| m.id == meeting.id) {
                Some(existing) => existing.clone_from(meeting),
                None => session.meetings.push(meeting.clone()),
            }
        });
    }

    /// Take a ticket for a fetch whose result will replace cached state.
    pub(crate) fn next_sequence(&self) -> u64 {
        self.inner.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Replace the cached meetings with a listing fetched under `ticket`.
    ///
    /// Returns the cached meetings after the call, whether or not the
    /// listing was applied.
    pub(crate) fn apply_meetings(
        &self,
        session_id: &SessionId,
        ticket: u64,
        meetings: Vec<Meeting>,
    ) -> Vec<Meeting> {
        let applied = {
            let mut cache = self.write();
            if cache.is_stale(session_id, ticket) {
                warn!(
                    target: "liveclass.repository",
                    session_id = %session_id,
                    "Discarding stale meeting listing"
                );
                return cache
                    .entries
                    .get(session_id)
                    .map(|s| s.meetings.clone())
                    .unwrap_or_default();
            }
            match cache.entries.get_mut(session_id) {
                Some(session) => {
                    session.meetings = meetings.clone();
                    cache.versions.insert(session_id.clone(), ticket);
                    true
                }
                None => false,
            }
        };
        if applied {
            self.inner.revision.trigger();
        }
        meetings
    }

    /// Replace the cached listing with one fetched under `ticket`.
    ///
    /// Returns the cached listing after the call.
    pub(crate) fn apply_listing(&self, ticket: u64, mut sessions: Vec<Session>) -> Vec<Session> {
        {
            let mut cache = self.write();
            if ticket < cache.listing_ticket {
                warn!(
                    target: "liveclass.repository",
                    ticket,
                    "Discarding stale session listing"
                );
                return cache.listing.clone();
            }
            for (session_id, (version, change)) in &cache.listing_changes {
                if *version < ticket {
                    continue;
                }
                match change {
                    ListingChange::Created(session) => {
                        if !sessions.iter().any(|s| &s.id == session_id) {
                            sessions.push(session.clone());
                        }
                    }
                    ListingChange::Removed => sessions.retain(|s| &s.id != session_id),
                }
            }
            sessions.sort_by_key(|s| Reverse(parse_timestamp(&s.created_at)));

            cache.listing_changes.retain(|_, (version, _)| *version > ticket);
            cache.listing_ticket = ticket;
            cache.listing.clone_from(&sessions);
        }
        self.inner.revision.trigger();
        sessions
    }

    // -------------------------------------------------------------------------
    // Pending state
    // -------------------------------------------------------------------------

    /// Mark `change` as in flight until the guard is dropped.
    pub fn begin(&self, session_id: &SessionId, change: PendingChange) -> PendingGuard {
        self.write()
            .pending
            .entry(session_id.clone())
            .or_default()
            .push(change.clone());
        self.inner.revision.trigger();
        PendingGuard {
            repository: self.clone(),
            session_id: session_id.clone(),
            change,
        }
    }

    /// Like [`begin`](Self::begin), but fails with `Validation` if the same
    /// change is already in flight for the session.
    pub fn begin_exclusive(
        &self,
        session_id: &SessionId,
        change: PendingChange,
    ) -> Result<PendingGuard, ClientError> {
        {
            let mut cache = self.write();
            let pending = cache.pending.entry(session_id.clone()).or_default();
            if pending.contains(&change) {
                return Err(ClientError::Validation(format!(
                    "{} already in progress for this session",
                    describe(&change)
                )));
            }
            pending.push(change.clone());
        }
        self.inner.revision.trigger();
        Ok(PendingGuard {
            repository: self.clone(),
            session_id: session_id.clone(),
            change,
        })
    }

    fn finish(&self, session_id: &SessionId, change: &PendingChange) {
        {
            let mut cache = self.write();
            if let Some(pending) = cache.pending.get_mut(session_id) {
                if let Some(index) = pending.iter().position(|c| c == change) {
                    pending.remove(index);
                }
                if pending.is_empty() {
                    cache.pending.remove(session_id);
                }
            }
        }
        self.inner.revision.trigger();
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// Apply a load fetched under `ticket`. `None` when the load is stale
    /// and nothing is cached.
    fn apply_load(&self, session_id: &SessionId, ticket: u64, session: Session) -> Option<Session> {
        {
            let mut cache = self.write();
            if cache.is_stale(session_id, ticket) {
                warn!(
                    target: "liveclass.repository",
                    session_id = %session_id,
                    ticket,
                    "Discarding stale session load"
                );
                return cache.entries.get(session_id).cloned();
            }
            cache.versions.insert(session_id.clone(), ticket);
            cache.entries.insert(session_id.clone(), session.clone());
        }
        self.inner.revision.trigger();
        Some(session)
    }

    /// Stamp the session and apply `change` to its cached entry, if any.
    fn mutate(&self, session_id: &SessionId, change: impl FnOnce(&mut Session)) {
        {
            let mut cache = self.write();
            let version = self.next_sequence();
            cache.versions.insert(session_id.clone(), version);
            if let Some(session) = cache.entries.get_mut(session_id) {
                change(session);
            }
        }
        self.inner.revision.trigger();
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheState> {
        self.inner
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.inner
            .cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn describe(change: &PendingChange) -> &'static str {
    match change {
        PendingChange::AddingParticipants => "Adding participants",
        PendingChange::RemovingParticipant(_) => "Removing this participant",
        PendingChange::Scheduling => "Scheduling",
        PendingChange::Archiving => "An archive",
    }
}

/// Clears a [`PendingChange`] when dropped.
#[must_use = "the pending change is cleared as soon as the guard is dropped"]
pub struct PendingGuard {
    repository: SessionRepository,
    session_id: SessionId,
    change: PendingChange,
}

impl std::fmt::Debug for PendingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingGuard")
            .field("session_id", &self.session_id)
            .field("change", &self.change)
            .finish()
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.repository.finish(&self.session_id, &self.change);
    }
}
