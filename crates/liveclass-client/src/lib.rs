//! Live Classes session client.
//!
//! Client-side orchestration for live-class sessions: an organizer creates
//! a session, invites participants, schedules its meeting with the
//! conferencing provider, and later retrieves or archives the recordings.
//!
//! # Architecture
//!
//! ```text
//! participants / scheduler / recordings -> transport -> backend
//!                  |
//!                  v
//!             repository (cache, single writer)
//! ```
//!
//! Components call the backend through [`transport::SessionApi`] and hand
//! confirmed results to the [`repository::SessionRepository`], which every
//! caller re-reads. Fetches take a cancellation token; an abandoned fetch
//! resolves to [`errors::ClientError::Aborted`] and is dropped silently.
//!
//! # Modules
//!
//! - `config` - Client configuration from environment
//! - `errors` - The client error taxonomy
//! - `models` - Session aggregate and wire bodies
//! - `transport` - Backend REST surface (HTTP and in-memory)
//! - `repository` - Session cache with stale-load protection
//! - `participants` - Participant add/remove
//! - `scheduler` - Single-meeting scheduling state machine
//! - `recordings` - Recording listing, streaming and archive
//! - `calendar` - iCalendar export
//! - `observability` - Metrics

pub mod calendar;
pub mod client;
pub mod config;
pub mod errors;
pub mod models;
pub mod observability;
pub mod participants;
pub mod recordings;
pub mod refresh;
pub mod repository;
pub mod scheduler;
pub mod transport;

pub use client::LiveClassClient;
pub use config::ClientConfig;
pub use errors::{ignore_aborted, ClientError};
