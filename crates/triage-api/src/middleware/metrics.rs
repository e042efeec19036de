//! # Prometheus Metrics
//!
//! Installs the global `metrics` recorder backed by the Prometheus
//! exporter. HTTP-level metrics are recorded in middleware; dispatch
//! counters (`triage_dispatches_*`, `triage_pages_*`) are emitted by the
//! coordinator and notifier and rendered through the same handle.

use std::sync::OnceLock;
use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// HTTP request duration histogram.
pub const HTTP_REQUEST_DURATION: &str = "triage_http_request_duration_seconds";

/// HTTP request counter.
pub const HTTP_REQUESTS_TOTAL: &str = "triage_http_requests_total";

const UNMATCHED_ENDPOINT: &str = "unmatched";

static PROMETHEUS_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the Prometheus recorder once per process.
///
/// Returns `None` if another recorder was already installed; metrics are
/// then silently dropped rather than failing startup.
pub fn init_metrics() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                describe_histogram!(HTTP_REQUEST_DURATION, "Duration of HTTP requests in seconds");
                describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests");
                describe_counter!("triage_messages_total", "Inbound messages by priority");
                describe_counter!("triage_dispatches_created_total", "Dispatch records created");
                describe_counter!("triage_dispatches_claimed_total", "Dispatches claimed");
                describe_counter!("triage_dispatches_escalated_total", "Escalation hops");
                describe_counter!("triage_dispatches_expired_total", "Dispatches expired");
                describe_counter!("triage_pages_sent_total", "Technician pages delivered");
                describe_counter!("triage_pages_failed_total", "Technician pages abandoned");
                tracing::info!("Prometheus metrics recorder initialized");
                Some(handle)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install Prometheus recorder");
                None
            }
        })
        .clone()
}

fn endpoint_label<B>(request: &Request<B>) -> String {
    request.extensions().get::<MatchedPath>().map_or_else(
        || UNMATCHED_ENDPOINT.to_string(),
        |path| path.as_str().to_string(),
    )
}

/// Record `triage_http_requests_total` and
/// `triage_http_request_duration_seconds` labelled by matched route,
/// method and status class.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let path = endpoint_label(&request);
    let method = request.method().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let labels = [
        ("endpoint", path.clone()),
        ("method", method.clone()),
        ("status_class", status_class(response.status()).to_string()),
    ];
    histogram!(HTTP_REQUEST_DURATION, &labels).record(duration);
    counter!(HTTP_REQUESTS_TOTAL, &labels).increment(1);

    if duration > 1.0 {
        tracing::warn!(
            endpoint = %path,
            method = %method,
            status = response.status().as_u16(),
            duration_secs = duration,
            "slow request"
        );
    }

    response
}

fn status_class(status: StatusCode) -> &'static str {
    match status.as_u16() {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

/// GET /metrics: Prometheus text exposition.
pub async fn render() -> Response {
    match PROMETHEUS_HANDLE.get().and_then(Option::as_ref) {
        Some(handle) => (
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classes() {
        assert_eq!(status_class(StatusCode::OK), "2xx");
        assert_eq!(status_class(StatusCode::UNPROCESSABLE_ENTITY), "4xx");
        assert_eq!(status_class(StatusCode::SERVICE_UNAVAILABLE), "5xx");
    }

    #[test]
    fn unmatched_requests_get_fallback_label() {
        let request = Request::builder()
            .uri("/nowhere")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(endpoint_label(&request), UNMATCHED_ENDPOINT);
    }
}
