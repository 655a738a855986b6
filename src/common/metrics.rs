//! Prometheus-compatible metrics
//!
//! Atomic counters, gauges and latency histograms, plus a global registry
//! covering protocol rounds and HTTP endpoints.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Histogram bucket boundaries for latency measurements (in milliseconds)
const LATENCY_BUCKETS: [f64; 11] = [
    1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0,
];

/// A simple histogram implementation for latency tracking
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<AtomicU64>,
    boundaries: Vec<f64>,
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    /// Create a new histogram with default latency buckets
    pub fn new() -> Self {
        Self::with_buckets(&LATENCY_BUCKETS)
    }

    /// Create a histogram with custom bucket boundaries
    pub fn with_buckets(boundaries: &[f64]) -> Self {
        let mut buckets = Vec::with_capacity(boundaries.len() + 1);
        for _ in 0..=boundaries.len() {
            buckets.push(AtomicU64::new(0));
        }
        Self {
            buckets,
            boundaries: boundaries.to_vec(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Record a value in the histogram
    pub fn observe(&self, value: f64) {
        // Find the bucket
        let mut bucket_idx = self.boundaries.len();
        for (i, &boundary) in self.boundaries.iter().enumerate() {
            if value <= boundary {
                bucket_idx = i;
                break;
            }
        }

        self.buckets[bucket_idx].fetch_add(1, Ordering::Relaxed);
        self.sum
            .fetch_add((value * 1000.0) as u64, Ordering::Relaxed); // Store as microseconds for precision
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get histogram data for Prometheus format
    pub fn get_buckets(&self) -> Vec<(f64, u64)> {
        let mut cumulative = 0u64;
        let mut result = Vec::with_capacity(self.boundaries.len() + 1);

        for (i, &boundary) in self.boundaries.iter().enumerate() {
            cumulative += self.buckets[i].load(Ordering::Relaxed);
            result.push((boundary, cumulative));
        }

        // +Inf bucket
        cumulative += self.buckets[self.boundaries.len()].load(Ordering::Relaxed);
        result.push((f64::INFINITY, cumulative));

        result
    }

    /// Get sum of all observed values
    pub fn sum(&self) -> f64 {
        self.sum.load(Ordering::Relaxed) as f64 / 1000.0 // Convert back from microseconds
    }

    /// Get count of observations
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter for tracking request counts
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Gauge for tracking current values
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn set(&self, v: u64) {
        self.value.store(v, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Endpoint metrics
#[derive(Debug)]
pub struct EndpointMetrics {
    pub requests_total: Counter,
    pub requests_success: Counter,
    pub requests_error: Counter,
    pub latency: Histogram,
}

impl EndpointMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: Counter::new(),
            requests_success: Counter::new(),
            requests_error: Counter::new(),
            latency: Histogram::new(),
        }
    }
}

impl Default for EndpointMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Global metrics registry
#[derive(Debug)]
pub struct MetricsRegistry {
    /// Per-endpoint metrics
    endpoints: Mutex<HashMap<String, Arc<EndpointMetrics>>>,

    /// Protocol counters
    pub rounds_started: Counter,
    pub rounds_committed: Counter,
    pub prepare_conflicts: Counter,
    pub accept_conflicts: Counter,
    pub quorum_failures: Counter,
    pub identity_reads: Counter,
    pub fast_forwards: Counter,

    /// Round latency, prepare through accept
    pub round_latency: Histogram,

    /// Membership gauges
    pub preparers: Gauge,
    pub accepters: Gauge,

    /// Start time for uptime calculation
    start_time: Instant,
}

impl MetricsRegistry {
    /// Create a new metrics registry
    pub fn new() -> Self {
        Self {
            endpoints: Mutex::new(HashMap::new()),
            rounds_started: Counter::new(),
            rounds_committed: Counter::new(),
            prepare_conflicts: Counter::new(),
            accept_conflicts: Counter::new(),
            quorum_failures: Counter::new(),
            identity_reads: Counter::new(),
            fast_forwards: Counter::new(),
            round_latency: Histogram::new(),
            preparers: Gauge::new(),
            accepters: Gauge::new(),
            start_time: Instant::now(),
        }
    }

    /// Get or create metrics for an endpoint
    pub fn endpoint(&self, path: &str) -> Arc<EndpointMetrics> {
        let mut endpoints = self.endpoints.lock().unwrap_or_else(PoisonError::into_inner);
        endpoints
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(EndpointMetrics::new()))
            .clone()
    }

    /// Record a request
    pub fn record_request(&self, path: &str, duration: Duration, success: bool) {
        let endpoint = self.endpoint(path);

        endpoint.requests_total.inc();
        endpoint.latency.observe(duration.as_secs_f64() * 1000.0);

        if success {
            endpoint.requests_success.inc();
        } else {
            endpoint.requests_error.inc();
        }
    }

    /// Record a finished round
    pub fn record_round(&self, duration: Duration) {
        self.rounds_committed.inc();
        self.round_latency.observe(duration.as_secs_f64() * 1000.0);
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-compatible metrics output
    pub fn to_prometheus(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();

        let counters = [
            ("rounds_started_total", "Rounds started", &self.rounds_started),
            ("rounds_committed_total", "Rounds whose accept phase reached a majority", &self.rounds_committed),
            ("prepare_conflicts_total", "Prepare phases lost to a higher ballot", &self.prepare_conflicts),
            ("accept_conflicts_total", "Accept phases lost to a higher ballot", &self.accept_conflicts),
            ("quorum_failures_total", "Phases that did not hear from a majority", &self.quorum_failures),
            ("identity_reads_total", "Prepare-only reads", &self.identity_reads),
            ("fast_forwards_total", "Fast-forward recoveries", &self.fast_forwards),
        ];
        for (name, help, counter) in counters {
            let _ = writeln!(out, "# HELP minicas_{} {}", name, help);
            let _ = writeln!(out, "# TYPE minicas_{} counter", name);
            let _ = writeln!(out, "minicas_{} {}", name, counter.get());
        }

        for (name, gauge) in [("preparers", &self.preparers), ("accepters", &self.accepters)] {
            let _ = writeln!(out, "# HELP minicas_{} Current {} count", name, name);
            let _ = writeln!(out, "# TYPE minicas_{} gauge", name);
            let _ = writeln!(out, "minicas_{} {}", name, gauge.get());
        }

        out.push_str("# HELP minicas_uptime_seconds Server uptime in seconds\n");
        out.push_str("# TYPE minicas_uptime_seconds gauge\n");
        let _ = writeln!(out, "minicas_uptime_seconds {}", self.uptime_seconds());

        out.push_str("# HELP minicas_round_duration_ms Round duration in milliseconds\n");
        out.push_str("# TYPE minicas_round_duration_ms histogram\n");
        write_histogram(&mut out, "minicas_round_duration_ms", "", &self.round_latency);

        // Per-endpoint metrics
        let endpoints = self.endpoints.lock().unwrap_or_else(PoisonError::into_inner);

        out.push_str("# HELP minicas_endpoint_requests_total Requests per endpoint\n");
        out.push_str("# TYPE minicas_endpoint_requests_total counter\n");
        for (path, metrics) in endpoints.iter() {
            let _ = writeln!(
                out,
                "minicas_endpoint_requests_total{{path=\"{}\"}} {}",
                path,
                metrics.requests_total.get()
            );
        }

        out.push_str("# HELP minicas_endpoint_errors_total Errors per endpoint\n");
        out.push_str("# TYPE minicas_endpoint_errors_total counter\n");
        for (path, metrics) in endpoints.iter() {
            let _ = writeln!(
                out,
                "minicas_endpoint_errors_total{{path=\"{}\"}} {}",
                path,
                metrics.requests_error.get()
            );
        }

        out.push_str("# HELP minicas_request_duration_ms Request duration in milliseconds\n");
        out.push_str("# TYPE minicas_request_duration_ms histogram\n");
        for (path, metrics) in endpoints.iter() {
            let label = format!("path=\"{}\",", path);
            write_histogram(&mut out, "minicas_request_duration_ms", &label, &metrics.latency);
        }

        out
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn write_histogram(out: &mut String, name: &str, labels: &str, histogram: &Histogram) {
    use std::fmt::Write;
    for (le, count) in histogram.get_buckets() {
        if le.is_infinite() {
            let _ = writeln!(out, "{}_bucket{{{}le=\"+Inf\"}} {}", name, labels, count);
        } else {
            let _ = writeln!(out, "{}_bucket{{{}le=\"{}\"}} {}", name, labels, le, count);
        }
    }
    let labels = labels.trim_end_matches(',');
    if labels.is_empty() {
        let _ = writeln!(out, "{}_sum {}", name, histogram.sum());
        let _ = writeln!(out, "{}_count {}", name, histogram.count());
    } else {
        let _ = writeln!(out, "{}_sum{{{}}} {}", name, labels, histogram.sum());
        let _ = writeln!(out, "{}_count{{{}}} {}", name, labels, histogram.count());
    }
}

/// Global metrics instance
pub static METRICS: once_cell::sync::Lazy<MetricsRegistry> =
    once_cell::sync::Lazy::new(MetricsRegistry::new);
