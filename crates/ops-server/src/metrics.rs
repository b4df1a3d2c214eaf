//! Metrics and observability
//!
//! Prometheus-compatible counters collected by a middleware layer. Counters
//! are coarse on purpose; per-endpoint detail lives in the trace layer.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, info_span, Instrument};

// requests_by_class slots
const CLASS_2XX: usize = 0;
const CLASS_4XX: usize = 1;
const CLASS_5XX: usize = 2;

/// Process-wide request counters. All writes are relaxed atomics; exports
/// read through [`Metrics::snapshot`] so the two formats can never disagree
/// about field names.
pub struct Metrics {
    requests_total: AtomicU64,
    requests_by_class: [AtomicU64; 3],
    request_duration_ms: AtomicU64,
    in_flight: AtomicU64,
    started: Instant,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot {
    pub requests_total: u64,
    pub requests_2xx: u64,
    pub requests_4xx: u64,
    pub requests_5xx: u64,
    pub request_duration_ms: u64,
    pub in_flight: u64,
    pub uptime_seconds: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            requests_by_class: [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)],
            request_duration_ms: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Count a finished request. 1xx and 3xx land in the total only.
    pub fn record_request(&self, status: StatusCode, duration_ms: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.request_duration_ms
            .fetch_add(duration_ms, Ordering::Relaxed);

        if let Some(slot) = class_slot(status) {
            self.requests_by_class[slot].fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn request_started(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_2xx: self.requests_by_class[CLASS_2XX].load(Ordering::Relaxed),
            requests_4xx: self.requests_by_class[CLASS_4XX].load(Ordering::Relaxed),
            requests_5xx: self.requests_by_class[CLASS_5XX].load(Ordering::Relaxed),
            request_duration_ms: self.request_duration_ms.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            uptime_seconds: self.started.elapsed().as_secs(),
        }
    }

    /// Render the counters in Prometheus text exposition format.
    pub fn export_prometheus(&self) -> String {
        let s = self.snapshot();
        let mut out = String::new();

        emit(
            &mut out,
            "http_requests_total",
            "counter",
            "Total number of HTTP requests",
            s.requests_total,
        );

        // one metric, labelled per status class
        let _ = writeln!(
            out,
            "# HELP http_requests_by_status HTTP requests by status class"
        );
        let _ = writeln!(out, "# TYPE http_requests_by_status counter");
        for (label, value) in [
            ("2xx", s.requests_2xx),
            ("4xx", s.requests_4xx),
            ("5xx", s.requests_5xx),
        ] {
            let _ = writeln!(out, "http_requests_by_status{{status=\"{label}\"}} {value}");
        }

        emit(
            &mut out,
            "http_request_duration_ms_total",
            "counter",
            "Total HTTP request duration in milliseconds",
            s.request_duration_ms,
        );
        emit(
            &mut out,
            "in_flight_requests",
            "gauge",
            "Requests currently being served",
            s.in_flight,
        );
        emit(
            &mut out,
            "uptime_seconds",
            "gauge",
            "Server uptime in seconds",
            s.uptime_seconds,
        );

        out
    }

    pub fn export_json(&self) -> serde_json::Value {
        let s = self.snapshot();
        serde_json::json!({
            "http": {
                "requests_total": s.requests_total,
                "requests_2xx": s.requests_2xx,
                "requests_4xx": s.requests_4xx,
                "requests_5xx": s.requests_5xx,
                "request_duration_ms_total": s.request_duration_ms,
                "in_flight": s.in_flight,
            },
            "uptime_seconds": s.uptime_seconds,
        })
    }
}

fn class_slot(status: StatusCode) -> Option<usize> {
    match status.as_u16() {
        200..=299 => Some(CLASS_2XX),
        400..=499 => Some(CLASS_4XX),
        500..=599 => Some(CLASS_5XX),
        _ => None,
    }
}

fn emit(out: &mut String, name: &str, kind: &str, help: &str, value: u64) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
    let _ = writeln!(out, "{name} {value}");
}

/// Layer that counts every request and logs its outcome.
pub async fn metrics_middleware(
    State(metrics): State<Arc<Metrics>>,
    request: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().path().to_string();

    metrics.request_started();

    let response = next
        .run(request)
        .instrument(info_span!("http_request", %method, %uri))
        .await;

    let duration = start.elapsed();
    let status = response.status();

    debug!(
        method = %method,
        uri = %uri,
        status = %status,
        duration_ms = %duration.as_millis(),
        "request completed"
    );

    metrics.record_request(status, duration.as_millis() as u64);
    metrics.request_finished();

    response
}

/// Handler for /metrics (Prometheus format)
pub async fn prometheus_metrics(State(metrics): State<Arc<Metrics>>) -> String {
    metrics.export_prometheus()
}

/// Handler for /metrics.json
pub async fn json_metrics(State(metrics): State<Arc<Metrics>>) -> axum::Json<serde_json::Value> {
    axum::Json(metrics.export_json())
}
