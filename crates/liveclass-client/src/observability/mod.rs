//! Observability helpers for the client.
//!
//! The library only records through the `metrics` facade; installing a
//! recorder or exporter is left to the embedding application.

pub mod metrics;
