//! Prometheus metrics for the object store.
//!
//! All metrics follow the naming convention: `os_<area>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: requests served and rejected, by operation
//! - **Gauge**: block population per state, pool and region bytes
//! - **Histogram**: control-plane request latency

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, CounterVec, Encoder, Gauge, GaugeVec, Histogram, HistogramOpts,
    HistogramVec, Opts, Registry, TextEncoder,
};
use shared_types::StoreStats;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // CONTROL-PLANE REQUESTS
    // =========================================================================

    /// Requests handled, by operation
    pub static ref REQUESTS: CounterVec = CounterVec::new(
        Opts::new("os_control_requests_total", "Control-plane requests handled"),
        &["operation"]
    ).expect("metric creation failed");

    /// Requests rejected, by operation and error kind
    pub static ref REJECTIONS: CounterVec = CounterVec::new(
        Opts::new("os_control_rejections_total", "Control-plane requests rejected"),
        &["operation", "kind"]
    ).expect("metric creation failed");

    /// Time spent applying one request inside the server task
    pub static ref REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "os_control_request_duration_seconds",
            "Time spent applying a control-plane request"
        ).buckets(exponential_buckets(0.000_001, 2.0, 20).expect("bucket layout")),
        &["operation"]
    ).expect("metric creation failed");

    // =========================================================================
    // BLOCK POPULATION
    // =========================================================================

    /// Blocks per lifecycle state
    pub static ref BLOCKS: GaugeVec = GaugeVec::new(
        Opts::new("os_registry_blocks", "Blocks per lifecycle state"),
        &["state"]
    ).expect("metric creation failed");

    /// Outstanding read handles
    pub static ref ACTIVE_READERS: Gauge = Gauge::new(
        "os_registry_active_readers",
        "Read handles issued and not yet released"
    ).expect("metric creation failed");

    /// Capacity of all regions
    pub static ref REGION_BYTES: Gauge = Gauge::new(
        "os_pool_region_bytes",
        "Capacity of every allocated shared-memory region"
    ).expect("metric creation failed");

    /// Capacity waiting in the reuse pool
    pub static ref POOLED_BYTES: Gauge = Gauge::new(
        "os_pool_pooled_bytes",
        "Capacity of Zombie blocks awaiting reuse"
    ).expect("metric creation failed");

    // =========================================================================
    // DIRECTORY
    // =========================================================================

    /// Named objects
    pub static ref OBJECTS: Gauge = Gauge::new(
        "os_directory_objects",
        "Named objects in the directory"
    ).expect("metric creation failed");

    /// Live queue entries
    pub static ref QUEUED_ENTRIES: Gauge = Gauge::new(
        "os_directory_queued_entries",
        "Live entries across all queues"
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry.
///
/// Calling it again is harmless.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(REQUESTS.clone()),
        Box::new(REJECTIONS.clone()),
        Box::new(REQUEST_DURATION.clone()),
        Box::new(BLOCKS.clone()),
        Box::new(ACTIVE_READERS.clone()),
        Box::new(REGION_BYTES.clone()),
        Box::new(POOLED_BYTES.clone()),
        Box::new(OBJECTS.clone()),
        Box::new(QUEUED_ENTRIES.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Records the outcome of one request. Duration is recorded separately by
/// `request_timer`.
pub fn record_request(operation: &str, rejection: Option<&str>) {
    REQUESTS.with_label_values(&[operation]).inc();
    if let Some(kind) = rejection {
        REJECTIONS.with_label_values(&[operation, kind]).inc();
    }
}

/// Publishes a stats snapshot to the gauges.
pub fn record_stats(stats: &StoreStats) {
    BLOCKS.with_label_values(&["write"]).set(stats.write_blocks as f64);
    BLOCKS.with_label_values(&["idle"]).set(stats.idle_blocks as f64);
    BLOCKS.with_label_values(&["busy"]).set(stats.busy_blocks as f64);
    BLOCKS.with_label_values(&["zombie"]).set(stats.zombie_blocks as f64);
    ACTIVE_READERS.set(stats.active_readers as f64);
    REGION_BYTES.set(stats.region_bytes as f64);
    POOLED_BYTES.set(stats.pooled_bytes as f64);
    OBJECTS.set(stats.objects as f64);
    QUEUED_ENTRIES.set(stats.queued_entries as f64);
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

/// Times one request into `REQUEST_DURATION` until dropped.
pub fn request_timer(operation: &str) -> HistogramTimer {
    HistogramTimer::new(&REQUEST_DURATION.with_label_values(&[operation]))
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}
