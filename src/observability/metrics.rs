use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

// Declare the static OnceCell to hold the Metrics.
static METRICS_INSTANCE: OnceCell<Arc<Metrics>> = OnceCell::const_new();

/// Asynchronously initializes and gets a reference to the process-wide `Metrics`.
pub async fn get_metrics() -> &'static Arc<Metrics> {
    METRICS_INSTANCE
        .get_or_init(|| async {
            info!("Initializing Metrics ...");
            Metrics::new()
        })
        .await
}

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Issuer metrics
    pub issuer_fetch_requests: IntCounterVec,
    pub issuer_fetch_failures: IntCounterVec,

    // Refresh metrics
    pub refresh_cycles: IntCounterVec,
    pub refresh_duration: Histogram,

    // Sink metrics
    pub token_file_write_failures: IntCounter,

    pub up: IntGauge,

    // === Service resource metrics ===
    pub process_memory_usage: IntGauge,
    pub process_virtual_memory: IntGauge,
}

impl Metrics {
    fn new() -> Arc<Self> {
        let registry = Registry::new();

        let metrics: Arc<Metrics> = Arc::new(Self {
            // Issuer
            issuer_fetch_requests: IntCounterVec::new(Opts::new("issuer_fetch_requests_total", "Total token fetch attempts by token type"), &["type"]).unwrap(),
            issuer_fetch_failures: IntCounterVec::new(Opts::new("issuer_fetch_failures_total", "Token fetch failures by token type"), &["type"]).unwrap(),

            // Refresh
            refresh_cycles: IntCounterVec::new(Opts::new("token_refresh_cycles_total", "Refresh cycles by result"), &["result"]).unwrap(),
            refresh_duration: Histogram::with_opts(HistogramOpts::new("token_refresh_duration_seconds", "Refresh cycle duration seconds").buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])).unwrap(),

            // Sink
            token_file_write_failures: IntCounter::new("token_file_write_failures_total", "Failed token file writes").unwrap(),

            up: IntGauge::new("up", "1 if token server is serving").unwrap(),
            process_memory_usage: IntGauge::new("process_memory_usage_bytes", "Resident memory used by this process").unwrap(),
            process_virtual_memory: IntGauge::new("process_virtual_memory_bytes", "Virtual memory used by this process").unwrap(),

            registry,
        });

        // Register all metrics in the registry
        let reg = &metrics.registry;
        reg.register(Box::new(metrics.issuer_fetch_requests.clone())).unwrap();
        reg.register(Box::new(metrics.issuer_fetch_failures.clone())).unwrap();
        reg.register(Box::new(metrics.refresh_cycles.clone())).unwrap();
        reg.register(Box::new(metrics.refresh_duration.clone())).unwrap();
        reg.register(Box::new(metrics.token_file_write_failures.clone())).unwrap();
        reg.register(Box::new(metrics.up.clone())).unwrap();
        reg.register(Box::new(metrics.process_memory_usage.clone())).unwrap();
        reg.register(Box::new(metrics.process_virtual_memory.clone())).unwrap();

        metrics
    }
}
