//! Client error types.
//!
//! Every operation in this crate fails with one of four kinds:
//!
//! - `Validation`: a client-side precondition failed; the backend was not called
//! - `NotFound`: the backend reported that the entity does not exist (404)
//! - `Transport`: any other non-success status, or a network-level failure
//! - `Aborted`: the caller cancelled an in-flight fetch
//!
//! `Aborted` is never shown to a user. Callers drop it with
//! [`ignore_aborted`] at the point where they cancelled.

use thiserror::Error;

/// Client error type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// `status` is `None` when no HTTP response was received or its body
    /// could not be decoded.
    #[error("Request failed{}: {body}", status_suffix(.status))]
    Transport { status: Option<u16>, body: String },

    #[error("Request aborted")]
    Aborted,
}

impl ClientError {
    /// Build a `Transport` error for a failure that produced no HTTP status.
    pub fn network(message: impl Into<String>) -> Self {
        ClientError::Transport {
            status: None,
            body: message.into(),
        }
    }

    /// Returns true if this error only records a cancellation.
    pub fn is_aborted(&self) -> bool {
        matches!(self, ClientError::Aborted)
    }

    /// Returns the HTTP status code carried by this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClientError::NotFound(_) => Some(404),
            ClientError::Transport { status, .. } => *status,
            ClientError::Validation(_) | ClientError::Aborted => None,
        }
    }

    /// The single human-readable message shown for a failed operation.
    ///
    /// Includes the status code and the (sanitized) body text where
    /// available.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Validation(reason) => reason.clone(),
            ClientError::NotFound(body) => format!("404: {}", body_or_default(body, "Not found")),
            ClientError::Transport {
                status: Some(status),
                body,
            } => format!("{status}: {}", body_or_default(body, "Request failed")),
            ClientError::Transport { status: None, body } => {
                format!("Network error: {}", body_or_default(body, "request failed"))
            }
            ClientError::Aborted => "Request cancelled".to_string(),
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" with status {s}")).unwrap_or_default()
}

fn body_or_default<'a>(body: &'a str, default: &'a str) -> &'a str {
    if body.trim().is_empty() {
        default
    } else {
        body
    }
}

/// Swallow a cancellation.
///
/// Returns `Ok(None)` for `Aborted`, passes every other outcome through.
pub fn ignore_aborted<T>(result: Result<T, ClientError>) -> Result<Option<T>, ClientError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ClientError::Aborted) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ClientError::NotFound("x".into()).status_code(), Some(404));
        assert_eq!(
            ClientError::Transport {
                status: Some(502),
                body: String::new()
            }
            .status_code(),
            Some(502)
        );
        assert_eq!(ClientError::network("reset").status_code(), None);
        assert_eq!(ClientError::Validation("x".into()).status_code(), None);
        assert_eq!(ClientError::Aborted.status_code(), None);
    }

    #[test]
    fn test_user_message_includes_status_and_body() {
        let err = ClientError::Transport {
            status: Some(500),
            body: r#"{"detail":"Zoom API unavailable"}"#.to_string(),
        };
        assert_eq!(
            err.user_message(),
            r#"500: {"detail":"Zoom API unavailable"}"#
        );
    }

    #[test]
    fn test_user_message_falls_back_when_body_empty() {
        let err = ClientError::Transport {
            status: Some(503),
            body: "  ".to_string(),
        };
        assert_eq!(err.user_message(), "503: Request failed");

        let err = ClientError::NotFound(String::new());
        assert_eq!(err.user_message(), "404: Not found");
    }

    #[test]
    fn test_display_formats() {
        let err = ClientError::Transport {
            status: Some(422),
            body: "bad email".to_string(),
        };
        assert_eq!(err.to_string(), "Request failed with status 422: bad email");
        assert_eq!(
            ClientError::network("connection refused").to_string(),
            "Request failed: connection refused"
        );
    }

    #[test]
    fn test_ignore_aborted() {
        assert_eq!(ignore_aborted(Ok::<_, ClientError>(3)).unwrap(), Some(3));
        assert_eq!(
            ignore_aborted::<u8>(Err(ClientError::Aborted)).unwrap(),
            None
        );
        assert!(ignore_aborted::<u8>(Err(ClientError::NotFound("s".into()))).is_err());
    }

    #[test]
    fn test_is_aborted() {
        assert!(ClientError::Aborted.is_aborted());
        assert!(!ClientError::network("x").is_aborted());
    }
}
