//! HTTP implementation of [`SessionApi`].
//!
//! One request per call, no retries. Non-success responses become
//! [`ClientError::NotFound`] (404) or [`ClientError::Transport`] (anything
//! else) carrying the status and a sanitized copy of the body. Timeouts come
//! from [`ClientConfig`]; the transport adds none of its own.

use super::SessionApi;
use crate::config::ClientConfig;
use crate::errors::ClientError;
use crate::models::{
    AddParticipantsRequest, CreateSessionRequest, InviteResponse, LocalDownloadResponse, Meeting,
    Participant, RecordingsListing, ScheduleMeetingRequest, Session, StoreRecordingsResponse,
    StreamUrlsResponse,
};
use crate::observability::metrics;
use common::secret::{bearer_header, SecretString};
use common::types::{MeetingId, ParticipantId, SessionId};
use regex::Regex;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::LazyLock;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Maximum length for error body in error messages.
const MAX_ERROR_BODY_LEN: usize = 256;

/// Regex pattern for JWT tokens (header.payload.signature).
static JWT_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"eyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+(?:\.[A-Za-z0-9_-]*)?").ok()
});

/// Regex pattern for Bearer tokens in text.
static BEARER_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)bearer\s+[A-Za-z0-9._~+/=-]+").ok());

/// Regex pattern for provider access tokens embedded in recording links.
static ACCESS_TOKEN_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)((?:download_)?access_token=)[^&\s\x22]+").ok()
});

/// Sanitize an error response body before it is placed in an error.
///
/// Removes bearer tokens, JWTs and `access_token=` query values, then
/// truncates to `MAX_ERROR_BODY_LEN` characters.
fn sanitize_error_body(body: &str) -> String {
    let mut sanitized = body.to_string();
    if let Some(pattern) = BEARER_PATTERN.as_ref() {
        sanitized = pattern
            .replace_all(&sanitized, "[BEARER_REDACTED]")
            .into_owned();
    }
    if let Some(pattern) = JWT_PATTERN.as_ref() {
        sanitized = pattern.replace_all(&sanitized, "[JWT_REDACTED]").into_owned();
    }
    if let Some(pattern) = ACCESS_TOKEN_PATTERN.as_ref() {
        sanitized = pattern
            .replace_all(&sanitized, "${1}[REDACTED]")
            .into_owned();
    }

    match sanitized.char_indices().nth(MAX_ERROR_BODY_LEN) {
        Some((cut, _)) => {
            sanitized.truncate(cut);
            sanitized.push_str("...[truncated]");
            sanitized
        }
        None => sanitized,
    }
}

/// Client for the session backend.
pub struct HttpTransport {
    base_url: String,
    http_client: Client,
    api_token: Option<SecretString>,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Create a transport from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Transport` if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let http_client = Client::builder()
            .timeout(config.http_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ClientError::network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            http_client,
            api_token: config.api_token.clone(),
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.http_client.request(method, url);
        match &self.api_token {
            Some(token) => builder.header("Authorization", bearer_header(token)),
            None => builder,
        }
    }

    /// Send a request and normalize a non-success status into an error.
    async fn execute(
        &self,
        method: &Method,
        path: &str,
        builder: RequestBuilder,
    ) -> Result<Response, ClientError> {
        let start = Instant::now();
        debug!(target: "liveclass.transport", method = %method, path = %path, "Sending request");

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    target: "liveclass.transport",
                    method = %method,
                    path = %path,
                    error = %e,
                    "Request failed"
                );
                metrics::record_backend_request(method.as_str(), path, None, start.elapsed());
                return Err(ClientError::network(e.to_string()));
            }
        };

        let status = response.status();
        metrics::record_backend_request(
            method.as_str(),
            path,
            Some(status.as_u16()),
            start.elapsed(),
        );

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let body = sanitize_error_body(&body);
        warn!(
            target: "liveclass.transport",
            method = %method,
            path = %path,
            status = status.as_u16(),
            "Backend returned non-success status"
        );

        if status == StatusCode::NOT_FOUND {
            Err(ClientError::NotFound(body))
        } else {
            Err(ClientError::Transport {
                status: Some(status.as_u16()),
                body,
            })
        }
    }

    /// Execute and parse a JSON body.
    async fn json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        builder: RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = self.execute(&method, path, builder).await?;
        response.json().await.map_err(|e| {
            warn!(
                target: "liveclass.transport",
                path = %path,
                error = %e,
                "Failed to decode response body"
            );
            ClientError::network(format!("Invalid response body: {e}"))
        })
    }

    /// Execute and discard the body (204/empty responses).
    async fn empty(
        &self,
        method: Method,
        path: &str,
        builder: RequestBuilder,
    ) -> Result<(), ClientError> {
        self.execute(&method, path, builder).await.map(|_| ())
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.json(Method::GET, path, self.request(Method::GET, path))
            .await
    }

    async fn post_empty_body<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.json(Method::POST, path, self.request(Method::POST, path))
            .await
    }
}

#[async_trait::async_trait]
impl SessionApi for HttpTransport {
    #[instrument(skip_all)]
    async fn list_sessions(&self) -> Result<Vec<Session>, ClientError> {
        self.get("/sessions").await
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    async fn get_session(&self, session_id: &SessionId) -> Result<Session, ClientError> {
        self.get(&format!("/sessions/{session_id}")).await
    }

    #[instrument(skip_all)]
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<Session, ClientError> {
        let path = "/sessions";
        let builder = self.request(Method::POST, path).json(request);
        self.json(Method::POST, path, builder).await
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    async fn delete_session(&self, session_id: &SessionId) -> Result<(), ClientError> {
        let path = format!("/sessions/{session_id}");
        self.empty(Method::DELETE, &path, self.request(Method::DELETE, &path))
            .await
    }

    #[instrument(skip_all, fields(session_id = %session_id, count = request.emails.len()))]
    async fn add_participants(
        &self,
        session_id: &SessionId,
        request: &AddParticipantsRequest,
    ) -> Result<Vec<Participant>, ClientError> {
        let path = format!("/sessions/{session_id}/participants");
        let builder = self.request(Method::POST, &path).json(request);
        self.json(Method::POST, &path, builder).await
    }

    #[instrument(skip_all, fields(session_id = %session_id, participant_id = %participant_id))]
    async fn remove_participant(
        &self,
        session_id: &SessionId,
        participant_id: &ParticipantId,
    ) -> Result<(), ClientError> {
        let path = format!("/sessions/{session_id}/participants/{participant_id}");
        self.empty(Method::DELETE, &path, self.request(Method::DELETE, &path))
            .await
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    async fn send_invites(&self, session_id: &SessionId) -> Result<InviteResponse, ClientError> {
        self.post_empty_body(&format!("/sessions/{session_id}/send-invites"))
            .await
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    async fn create_meeting(
        &self,
        session_id: &SessionId,
        request: &ScheduleMeetingRequest,
    ) -> Result<Meeting, ClientError> {
        let path = format!("/sessions/{session_id}/meetings");
        let builder = self.request(Method::POST, &path).json(request);
        self.json(Method::POST, &path, builder).await
    }

    #[instrument(skip_all, fields(session_id = %session_id, meeting_id = %meeting_id))]
    async fn update_meeting(
        &self,
        session_id: &SessionId,
        meeting_id: &MeetingId,
        request: &ScheduleMeetingRequest,
    ) -> Result<Meeting, ClientError> {
        let path = format!("/sessions/{session_id}/meetings/{meeting_id}");
        let builder = self.request(Method::PATCH, &path).json(request);
        self.json(Method::PATCH, &path, builder).await
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    async fn list_meetings(&self, session_id: &SessionId) -> Result<Vec<Meeting>, ClientError> {
        self.get(&format!("/sessions/{session_id}/meetings")).await
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    async fn list_recordings(
        &self,
        session_id: &SessionId,
    ) -> Result<RecordingsListing, ClientError> {
        self.get(&format!("/sessions/{session_id}/recordings")).await
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    async fn stream_urls(
        &self,
        session_id: &SessionId,
    ) -> Result<StreamUrlsResponse, ClientError> {
        self.get(&format!("/sessions/{session_id}/recordings/stream_urls"))
            .await
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    async fn store_recordings(
        &self,
        session_id: &SessionId,
    ) -> Result<StoreRecordingsResponse, ClientError> {
        self.post_empty_body(&format!("/sessions/{session_id}/store-recordings"))
            .await
    }

    #[instrument(skip_all, fields(session_id = %session_id))]
    async fn download_recordings_local(
        &self,
        session_id: &SessionId,
    ) -> Result<LocalDownloadResponse, ClientError> {
        self.post_empty_body(&format!(
            "/sessions/{session_id}/download-recordings-local"
        ))
        .await
    }
}
