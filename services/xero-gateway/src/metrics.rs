//! Prometheus metrics exposition
//!
//! Metrics rendered on `/metrics`:
//!
//! - `gateway_requests_total` (counter): labels `route`, `status`
//! - `gateway_request_duration_seconds` (histogram): label `route`
//! - `xero_webhook_events_total` (counter): label `result`
//! - `xero_token_refresh_total` (counter, recorded by the session crate): label `outcome`

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Instant;

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Bucket boundaries for request latency. Most of a request's time is the
/// Xero round-trips, so the range runs up to the 30s outbound timeout.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

fn builder() -> PrometheusBuilder {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("gateway_request_duration_seconds".to_string()),
            DURATION_BUCKETS,
        )
        .expect("failed to set histogram buckets")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> PrometheusHandle {
    builder()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a completed request against its matched route template.
pub fn record_request(route: &str, status: u16, duration_secs: f64) {
    metrics::counter!("gateway_requests_total", "route" => route.to_string(), "status" => status.to_string())
        .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "route" => route.to_string())
        .record(duration_secs);
}

/// Record a webhook delivery as `accepted` or `rejected`.
pub fn record_webhook(accepted: bool) {
    let result = if accepted { "accepted" } else { "rejected" };
    metrics::counter!("xero_webhook_events_total", "result" => result).increment(1);
}

/// In-process counters reported by `/health` and used to observe draining
/// at shutdown.
#[derive(Clone, Debug)]
pub struct ServiceMetrics {
    pub requests_total: Arc<AtomicU64>,
    /// Responses with a 5xx status
    pub errors_total: Arc<AtomicU64>,
    pub in_flight: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_request("/xero/contacts", 200, 0.05);
        record_webhook(false);
    }

    /// Isolated recorder; `install_recorder()` can only run once per process.
    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = builder().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn record_request_increments_counter_and_histogram() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request("/xero/contacts", 200, 0.042);
        record_request("/xero/overpayment", 401, 0.8);

        let output = handle.render();
        assert!(output.contains("gateway_requests_total"));
        assert!(output.contains("route=\"/xero/contacts\""));
        assert!(output.contains("status=\"401\""));
        assert!(
            output.contains("gateway_request_duration_seconds_bucket"),
            "histogram must render _bucket lines"
        );
        assert!(output.contains("le=\"30\""), "30s bucket must exist");
    }

    #[test]
    fn record_webhook_labels_result() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_webhook(true);
        record_webhook(false);

        let output = handle.render();
        assert!(output.contains("xero_webhook_events_total"));
        assert!(output.contains("result=\"accepted\""));
        assert!(output.contains("result=\"rejected\""));
    }
}
