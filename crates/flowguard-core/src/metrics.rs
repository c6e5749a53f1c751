//! Process-wide atomic counters for flowguard observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (the handler does this once per invocation).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    records_classified: AtomicU64,
    violations_detected: AtomicU64,
    resources_remediated: AtomicU64,
    remediation_failures: AtomicU64,
    snapshots_created: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            records_classified: AtomicU64::new(0),
            violations_detected: AtomicU64::new(0),
            resources_remediated: AtomicU64::new(0),
            remediation_failures: AtomicU64::new(0),
            snapshots_created: AtomicU64::new(0),
        }
    }

    pub fn inc_records_classified(&self) {
        self.records_classified.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "records_classified", "counter incremented");
    }

    pub fn inc_violations(&self) {
        self.violations_detected.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "violations_detected", "counter incremented");
    }

    pub fn inc_remediated(&self) {
        self.resources_remediated.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "resources_remediated", "counter incremented");
    }

    pub fn inc_failures(&self) {
        self.remediation_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "remediation_failures", "counter incremented");
    }

    pub fn add_snapshots(&self, n: u64) {
        self.snapshots_created.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "snapshots_created", n, "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            records_classified = self.records_classified(),
            violations_detected = self.violations_detected(),
            resources_remediated = self.resources_remediated(),
            remediation_failures = self.remediation_failures(),
            snapshots_created = self.snapshots_created(),
        );
    }

    pub fn records_classified(&self) -> u64 {
        self.records_classified.load(Ordering::Relaxed)
    }

    pub fn violations_detected(&self) -> u64 {
        self.violations_detected.load(Ordering::Relaxed)
    }

    pub fn resources_remediated(&self) -> u64 {
        self.resources_remediated.load(Ordering::Relaxed)
    }

    pub fn remediation_failures(&self) -> u64 {
        self.remediation_failures.load(Ordering::Relaxed)
    }

    pub fn snapshots_created(&self) -> u64 {
        self.snapshots_created.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.records_classified.store(0, Ordering::Relaxed);
        self.violations_detected.store(0, Ordering::Relaxed);
        self.resources_remediated.store(0, Ordering::Relaxed);
        self.remediation_failures.store(0, Ordering::Relaxed);
        self.snapshots_created.store(0, Ordering::Relaxed);
    }
}
