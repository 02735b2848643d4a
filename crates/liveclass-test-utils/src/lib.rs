//! # Live Classes Test Utilities
//!
//! Shared test utilities for the session client.
//!
//! This crate provides:
//! - Fake backend (`FakeBackend`): the REST surface served over HTTP from an
//!   in-memory store, for integration tests of the real HTTP transport
//!
//! ## Usage
//!
//! ```rust,ignore
//! use liveclass_test_utils::FakeBackend;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let backend = FakeBackend::spawn().await?;
//!     let client = LiveClassClient::connect(&ClientConfig::new(backend.url()))?;
//!
//!     let session = client.repository.create("Algebra 101", None).await?;
//!     assert_eq!(backend.api().call_count().await, 1);
//!     Ok(())
//! }
//! ```

pub mod fake_backend;

// Re-export commonly used items
pub use fake_backend::*;
