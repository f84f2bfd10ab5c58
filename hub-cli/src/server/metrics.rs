use std::sync::OnceLock;
use std::time::Instant;

use axum::extract::MatchedPath;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use hub_registry::{RecordKind, ScanError, ScanReport};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

/// Global metrics registry
static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// All application metrics
pub struct Metrics {
    // Catalog scans
    pub scans_total: IntCounterVec,
    pub scan_duration: HistogramVec,
    pub records_total: IntGaugeVec,
    pub skipped_files_total: IntCounterVec,

    // HTTP request metrics
    pub http_requests_total: IntCounterVec,
    pub http_request_duration: HistogramVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

impl Metrics {
    fn new(registry: &Registry) -> Self {
        // ── Catalog scan metrics ─────────────────────────────────────
        let scans_total = IntCounterVec::new(
            Opts::new("hub_scans_total", "Directory scans by kind and outcome"),
            &["kind", "outcome"],
        )
        .expect("failed to create scans_total metric");

        let scan_duration = HistogramVec::new(
            HistogramOpts::new("hub_scan_duration_seconds", "Duration of a full directory scan")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["kind"],
        )
        .expect("failed to create scan_duration metric");

        let records_total = IntGaugeVec::new(
            Opts::new("hub_records_total", "Records in the current snapshot"),
            &["kind"],
        )
        .expect("failed to create records_total metric");

        let skipped_files_total = IntCounterVec::new(
            Opts::new(
                "hub_skipped_files_total",
                "Files skipped during scans because they were unreadable or invalid",
            ),
            &["kind"],
        )
        .expect("failed to create skipped_files_total metric");

        // ── HTTP request metrics ──────────────────────────────────────
        let http_requests_total = IntCounterVec::new(
            Opts::new("hub_http_requests_total", "Total number of HTTP requests"),
            &["method", "path", "status"],
        )
        .expect("failed to create http_requests_total metric");

        let http_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "hub_http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
            &["method", "path"],
        )
        .expect("failed to create http_request_duration metric");

        registry.register(Box::new(scans_total.clone())).expect("register scans_total");
        registry.register(Box::new(scan_duration.clone())).expect("register scan_duration");
        registry.register(Box::new(records_total.clone())).expect("register records_total");
        registry
            .register(Box::new(skipped_files_total.clone()))
            .expect("register skipped_files_total");
        registry
            .register(Box::new(http_requests_total.clone()))
            .expect("register http_requests_total");
        registry
            .register(Box::new(http_request_duration.clone()))
            .expect("register http_request_duration");

        Self {
            scans_total,
            scan_duration,
            records_total,
            skipped_files_total,
            http_requests_total,
            http_request_duration,
        }
    }
}

/// Get the global metrics instance, initializing on first call
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let registry = REGISTRY.get_or_init(Registry::new);
        Metrics::new(registry)
    })
}

/// Scan observer handed to the catalog.
pub fn record_scan(kind: RecordKind, result: Result<&ScanReport, &ScanError>) {
    let m = metrics();
    let kind = kind.as_str();
    match result {
        Ok(report) => {
            m.scans_total.with_label_values(&[kind, "ok"]).inc();
            m.scan_duration
                .with_label_values(&[kind])
                .observe(report.elapsed.as_secs_f64());
            m.records_total
                .with_label_values(&[kind])
                .set(report.files_loaded.saturating_sub(report.duplicates) as i64);
            m.skipped_files_total
                .with_label_values(&[kind])
                .inc_by(report.skipped.len() as u64);
        }
        Err(_) => {
            m.scans_total.with_label_values(&[kind, "error"]).inc();
        }
    }
}

/// Axum handler for GET /metrics, in Prometheus text format
pub async fn handle_metrics() -> Response {
    // Ensure all metric collectors are registered on first call.
    let _ = metrics();
    let registry = REGISTRY.get_or_init(Registry::new);
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Axum middleware that records HTTP request count and duration.
pub async fn track_metrics(request: Request<axum::body::Body>, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let start = Instant::now();
    let response = next.run(request).await;
    let elapsed = start.elapsed().as_secs_f64();

    let status = response.status().as_u16().to_string();
    let m = metrics();
    m.http_requests_total
        .with_label_values(&[&method, &path, &status])
        .inc();
    m.http_request_duration
        .with_label_values(&[&method, &path])
        .observe(elapsed);

    response
}
