//! Fake backend for integration tests.
//!
//! Serves the session REST surface over real HTTP, backed by a
//! [`MockSessionApi`]. Errors are rendered the way the backend renders them:
//! the status code plus a `{"detail": ...}` JSON body.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use common::types::{MeetingId, ParticipantId, SessionId};
use liveclass_client::errors::ClientError;
use liveclass_client::models::{
    AddParticipantsRequest, CreateSessionRequest, InviteResponse, LocalDownloadResponse, Meeting,
    Participant, RecordingsListing, ScheduleMeetingRequest, Session, StoreRecordingsResponse,
    StreamUrlsResponse,
};
use liveclass_client::transport::{MockSessionApi, SessionApi};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

type Api = Arc<MockSessionApi>;

/// A backend error rendered as an HTTP response.
struct ApiError(ClientError);

impl From<ClientError> for ApiError {
    fn from(error: ClientError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self.0 {
            ClientError::NotFound(detail) => (StatusCode::NOT_FOUND, detail),
            ClientError::Validation(detail) => (StatusCode::UNPROCESSABLE_ENTITY, detail),
            ClientError::Transport { status, body } => (
                status
                    .and_then(|s| StatusCode::from_u16(s).ok())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                body,
            ),
            ClientError::Aborted => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Request aborted".to_string(),
            ),
        };
        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Fake backend server for integration tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_create_session() -> anyhow::Result<()> {
///     let backend = FakeBackend::spawn().await?;
///
///     let response = reqwest::Client::new()
///         .post(format!("{}/sessions", backend.url()))
///         .json(&serde_json::json!({ "title": "Algebra 101" }))
///         .send()
///         .await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct FakeBackend {
    addr: SocketAddr,
    api: Api,
    _handle: JoinHandle<()>,
}

impl FakeBackend {
    /// Spawn a backend with an empty store.
    ///
    /// The server binds to a random available port (127.0.0.1:0).
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with(Arc::new(MockSessionApi::new())).await
    }

    /// Spawn a backend serving `api`.
    pub async fn spawn_with(api: Arc<MockSessionApi>) -> Result<Self, anyhow::Error> {
        let app = build_routes(Arc::clone(&api));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind fake backend: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Fake backend error: {}", e);
            }
        });

        Ok(Self {
            addr,
            api,
            _handle: handle,
        })
    }

    /// Get the base URL of the fake backend.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The in-memory store behind the server, for seeding and inspection.
    pub fn api(&self) -> &MockSessionApi {
        &self.api
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self._handle.abort();
    }
}

fn build_routes(api: Api) -> Router {
    Router::new()
        .route("/sessions", get(list_sessions).post(create_session))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .route("/sessions/:id/participants", post(add_participants))
        .route(
            "/sessions/:id/participants/:pid",
            delete(remove_participant),
        )
        .route("/sessions/:id/send-invites", post(send_invites))
        .route(
            "/sessions/:id/meetings",
            get(list_meetings).post(create_meeting),
        )
        .route("/sessions/:id/meetings/:mid", patch(update_meeting))
        .route("/sessions/:id/recordings", get(list_recordings))
        .route("/sessions/:id/recordings/stream_urls", get(stream_urls))
        .route("/sessions/:id/store-recordings", post(store_recordings))
        .route(
            "/sessions/:id/download-recordings-local",
            post(download_recordings_local),
        )
        .with_state(api)
}

async fn list_sessions(State(api): State<Api>) -> ApiResult<Vec<Session>> {
    Ok(Json(api.list_sessions().await?))
}

async fn get_session(State(api): State<Api>, Path(id): Path<String>) -> ApiResult<Session> {
    Ok(Json(api.get_session(&SessionId::new(id)).await?))
}

async fn create_session(
    State(api): State<Api>,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<Session> {
    if request.title.trim().is_empty() {
        return Err(ClientError::Validation("Title is required".to_string()).into());
    }
    Ok(Json(api.create_session(&request).await?))
}

async fn delete_session(
    State(api): State<Api>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    api.delete_session(&SessionId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_participants(
    State(api): State<Api>,
    Path(id): Path<String>,
    Json(request): Json<AddParticipantsRequest>,
) -> ApiResult<Vec<Participant>> {
    Ok(Json(
        api.add_participants(&SessionId::new(id), &request).await?,
    ))
}

async fn remove_participant(
    State(api): State<Api>,
    Path((id, pid)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    api.remove_participant(&SessionId::new(id), &ParticipantId::new(pid))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn send_invites(State(api): State<Api>, Path(id): Path<String>) -> ApiResult<InviteResponse> {
    Ok(Json(api.send_invites(&SessionId::new(id)).await?))
}

async fn list_meetings(State(api): State<Api>, Path(id): Path<String>) -> ApiResult<Vec<Meeting>> {
    Ok(Json(api.list_meetings(&SessionId::new(id)).await?))
}

async fn create_meeting(
    State(api): State<Api>,
    Path(id): Path<String>,
    Json(request): Json<ScheduleMeetingRequest>,
) -> ApiResult<Meeting> {
    Ok(Json(
        api.create_meeting(&SessionId::new(id), &request).await?,
    ))
}

async fn update_meeting(
    State(api): State<Api>,
    Path((id, mid)): Path<(String, String)>,
    Json(request): Json<ScheduleMeetingRequest>,
) -> ApiResult<Meeting> {
    Ok(Json(
        api.update_meeting(&SessionId::new(id), &MeetingId::new(mid), &request)
            .await?,
    ))
}

async fn list_recordings(
    State(api): State<Api>,
    Path(id): Path<String>,
) -> ApiResult<RecordingsListing> {
    Ok(Json(api.list_recordings(&SessionId::new(id)).await?))
}

async fn stream_urls(
    State(api): State<Api>,
    Path(id): Path<String>,
) -> ApiResult<StreamUrlsResponse> {
    Ok(Json(api.stream_urls(&SessionId::new(id)).await?))
}

async fn store_recordings(
    State(api): State<Api>,
    Path(id): Path<String>,
) -> ApiResult<StoreRecordingsResponse> {
    Ok(Json(api.store_recordings(&SessionId::new(id)).await?))
}

async fn download_recordings_local(
    State(api): State<Api>,
    Path(id): Path<String>,
) -> ApiResult<LocalDownloadResponse> {
    Ok(Json(
        api.download_recordings_local(&SessionId::new(id)).await?,
    ))
}
