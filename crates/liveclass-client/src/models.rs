//! Data models for the session aggregate and the backend's request and
//! response bodies.
//!
//! Timestamps are carried as the backend's ISO 8601 strings. They are only
//! parsed (see [`parse_timestamp`]) where an ordering or a rendering needs a
//! real time value.

use chrono::{DateTime, NaiveDateTime, Utc};
use common::types::{MeetingId, ParticipantId, SessionId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A class or course: the top-level aggregate.
///
/// Summary listings (`GET /sessions`) may leave `participants` and
/// `meetings` empty; only a full load populates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub meetings: Vec<Meeting>,
}

/// Role of a participant within a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    #[default]
    Student,
    Teacher,
    Assistant,
    /// Any role this client does not know about.
    #[serde(other)]
    Other,
}

impl ParticipantRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ParticipantRole::Student => "student",
            ParticipantRole::Teacher => "teacher",
            ParticipantRole::Assistant => "assistant",
            ParticipantRole::Other => "other",
        }
    }
}

impl fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParticipantRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(ParticipantRole::Student),
            "teacher" => Ok(ParticipantRole::Teacher),
            "assistant" => Ok(ParticipantRole::Assistant),
            other => Err(format!("unknown participant role '{other}'")),
        }
    }
}

/// An invited person attached to exactly one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub email: String,
    #[serde(default)]
    pub role: ParticipantRole,
}

/// A video-conference instance tied to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: MeetingId,
    /// Provider-issued join link. Opaque; may change on reschedule.
    pub join_url: String,
    pub scheduled_for: String,
}

/// A media asset produced by a past meeting.
///
/// Recordings are never cached: their links are short-lived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recording {
    pub meeting_id: MeetingId,
    /// Absent for some asset types.
    #[serde(default, alias = "id")]
    pub file_id: Option<String>,
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub recording_start: Option<String>,
    #[serde(default)]
    pub recording_end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
}

/// The link a recording was delivered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingLink<'a> {
    /// Long-lived download link.
    Download(&'a str),
    /// Time-limited streaming link.
    Stream(&'a str),
}

impl Recording {
    /// The recording's link, preferring the streaming link when both are set.
    pub fn link(&self) -> Option<RecordingLink<'_>> {
        match (&self.stream_url, &self.download_url) {
            (Some(url), _) => Some(RecordingLink::Stream(url)),
            (None, Some(url)) => Some(RecordingLink::Download(url)),
            (None, None) => None,
        }
    }

    /// Lower-cased file extension derived from `file_type`.
    pub fn extension(&self) -> String {
        self.file_type.trim().to_ascii_lowercase()
    }
}

// =============================================================================
// Request bodies
// =============================================================================

/// `POST /sessions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// `POST /sessions/{id}/participants`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddParticipantsRequest {
    pub emails: Vec<String>,
    #[serde(default)]
    pub role: ParticipantRole,
}

/// `POST /sessions/{id}/meetings` and `PATCH /sessions/{id}/meetings/{mid}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleMeetingRequest {
    pub scheduled_for: String,
}

// =============================================================================
// Response bodies
// =============================================================================

/// `GET /sessions/{id}/recordings`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingsListing {
    /// Provider-hosted recordings with download links.
    #[serde(default)]
    pub recordings: Vec<Recording>,
    /// Names of blobs already archived to remote storage.
    #[serde(default, rename = "azure_blobs")]
    pub archived_blobs: Vec<String>,
}

/// `GET /sessions/{id}/recordings/stream_urls`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamUrlsResponse {
    #[serde(default)]
    pub recordings_with_streams: Vec<Recording>,
}

/// `POST /sessions/{id}/store-recordings`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreRecordingsResponse {
    #[serde(default)]
    pub stored: Vec<serde_json::Value>,
}

/// `POST /sessions/{id}/download-recordings-local`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalDownloadResponse {
    #[serde(default)]
    pub downloaded_files: Vec<serde_json::Value>,
}

/// `POST /sessions/{id}/send-invites`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteResponse {
    pub detail: String,
}

// =============================================================================
// Timestamps
// =============================================================================

/// Parse a backend timestamp.
///
/// Accepts RFC 3339 (`2025-03-01T10:00:00Z`) and the offset-less form the
/// backend emits for naive datetimes (`2025-03-01T10:00:00`, optionally with
/// fractional seconds), which is read as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}
