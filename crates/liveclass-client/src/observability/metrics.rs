//! Metrics definitions for backend calls.
//!
//! All metrics follow Prometheus naming conventions:
//! - `liveclass_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! - `method`: the handful of verbs the backend surface uses
//! - `endpoint`: the fixed REST surface with ids replaced by `{id}`
//! - `status`: `success` or `error`

use metrics::{counter, histogram};
use std::time::Duration;

/// Record one completed backend call.
///
/// Metric: `liveclass_backend_requests_total`, `liveclass_backend_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
///
/// `status_code` is `None` when no response was received.
pub fn record_backend_request(
    method: &str,
    path: &str,
    status_code: Option<u16>,
    duration: Duration,
) {
    let endpoint = normalize_endpoint(path);
    let status = categorize_status_code(status_code);

    histogram!("liveclass_backend_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => endpoint.clone()
    )
    .record(duration.as_secs_f64());

    counter!("liveclass_backend_requests_total",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status" => status
    )
    .increment(1);
}

/// Record a fetch abandoned by its caller.
///
/// Metric: `liveclass_fetches_aborted_total`
pub fn record_aborted_fetch() {
    counter!("liveclass_fetches_aborted_total").increment(1);
}

fn categorize_status_code(status_code: Option<u16>) -> &'static str {
    match status_code {
        Some(200..=299) => "success",
        _ => "error",
    }
}

/// Normalize a request path to bound label cardinality.
///
/// Segments following `sessions`, `participants` and `meetings` are ids.
fn normalize_endpoint(path: &str) -> String {
    let mut normalized = Vec::new();
    let mut previous = "";

    for segment in path.trim_start_matches('/').split('/') {
        let is_id = matches!(previous, "sessions" | "participants" | "meetings")
            && !segment.is_empty();
        normalized.push(if is_id { "{id}" } else { segment });
        previous = segment;
    }

    let normalized = format!("/{}", normalized.join("/"));
    if is_known_endpoint(&normalized) {
        normalized
    } else {
        "/other".to_string()
    }
}

fn is_known_endpoint(endpoint: &str) -> bool {
    matches!(
        endpoint,
        "/sessions"
            | "/sessions/{id}"
            | "/sessions/{id}/participants"
            | "/sessions/{id}/participants/{id}"
            | "/sessions/{id}/send-invites"
            | "/sessions/{id}/meetings"
            | "/sessions/{id}/meetings/{id}"
            | "/sessions/{id}/recordings"
            | "/sessions/{id}/recordings/stream_urls"
            | "/sessions/{id}/store-recordings"
            | "/sessions/{id}/download-recordings-local"
    )
}
