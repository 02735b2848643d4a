//! One handle bundling the repository and the components built on it.

use crate::config::ClientConfig;
use crate::errors::ClientError;
use crate::participants::ParticipantManager;
use crate::recordings::{RecordingCoordinator, StreamingFeed};
use crate::repository::SessionRepository;
use crate::scheduler::MeetingScheduler;
use crate::transport::{HttpTransport, SessionApi};
use std::sync::Arc;

/// The session repository and every component sharing it.
#[derive(Debug, Clone)]
pub struct LiveClassClient {
    pub repository: SessionRepository,
    pub participants: ParticipantManager,
    pub scheduler: MeetingScheduler,
    pub recordings: RecordingCoordinator,
}

impl LiveClassClient {
    /// Wire every component over `api`.
    pub fn new(api: Arc<dyn SessionApi>) -> Self {
        let repository = SessionRepository::new(api);
        Self {
            participants: ParticipantManager::new(repository.clone()),
            scheduler: MeetingScheduler::new(repository.clone()),
            recordings: RecordingCoordinator::new(repository.clone()),
            repository,
        }
    }

    /// Wire every component over an HTTP transport built from `config`.
    pub fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::new(Arc::new(transport)))
    }

    /// A streaming feed over this client's recordings coordinator.
    pub fn streaming_feed(&self) -> StreamingFeed {
        StreamingFeed::new(self.recordings.clone())
    }
}
