//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types. The backend bearer token is the only
//! secret the client handles; it is held as a [`SecretString`] from the
//! moment it is read out of the environment until it is written into an
//! `Authorization` header.
//!
//! ```rust
//! use common::secret::{bearer_header, SecretString};
//!
//! let token = SecretString::from("abc123");
//! assert_eq!(format!("{token:?}").contains("abc123"), false);
//! assert_eq!(bearer_header(&token), "Bearer abc123");
//! ```

pub use secrecy::{ExposeSecret, SecretString};

/// Render an `Authorization` header value for a bearer token.
///
/// The returned string contains the raw token and must not be logged.
#[must_use]
pub fn bearer_header(token: &SecretString) -> String {
    format!("Bearer {}", token.expose_secret())
}
