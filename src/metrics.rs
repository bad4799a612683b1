//! Prometheus metrics for the verification workflow.
//!
//! One process-wide registry; counters are recorded by the reconciler, the
//! background refresher and the startup gate.
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use prometheus_client::encoding::{EncodeLabelSet, text::encode};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::Duration;

/// Global metrics registry instance
pub static METRICS: Lazy<Arc<MetricsCollector>> = Lazy::new(|| Arc::new(MetricsCollector::new()));

/// Labels for save attempts
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct SaveLabels {
    /// "saved", "reassigned", "failed" or "rejected"
    pub outcome: String,
    /// Error category for failures, empty otherwise
    pub category: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    pub outcome: String,
}

pub struct MetricsCollector {
    registry: RwLock<Registry>,

    /// Save attempts by outcome
    pub saves_total: Family<SaveLabels, Counter>,

    /// Round trip of the update call in seconds
    pub save_duration_seconds: Histogram,

    /// Background refreshes by outcome ("applied", "failed")
    pub refreshes_total: Family<OutcomeLabels, Counter>,

    /// Startup gate decisions ("active", "killed", "skipped")
    pub startup_gate_total: Family<OutcomeLabels, Counter>,

    /// Rows currently held in the sheet cache
    pub cached_rows: Gauge,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let saves_total = Family::<SaveLabels, Counter>::default();
        registry.register(
            "verifier_saves_total",
            "Save attempts by outcome",
            saves_total.clone(),
        );

        // Buckets: 100ms .. ~100s; the update call routinely takes seconds.
        let save_duration_seconds = Histogram::new(exponential_buckets(0.1, 2.0, 11));
        registry.register(
            "verifier_save_duration_seconds",
            "Update round trip in seconds",
            save_duration_seconds.clone(),
        );

        let refreshes_total = Family::<OutcomeLabels, Counter>::default();
        registry.register(
            "verifier_refreshes_total",
            "Background sheet refreshes by outcome",
            refreshes_total.clone(),
        );

        let startup_gate_total = Family::<OutcomeLabels, Counter>::default();
        registry.register(
            "verifier_startup_gate_total",
            "Feature flag decisions at startup",
            startup_gate_total.clone(),
        );

        let cached_rows = Gauge::default();
        registry.register(
            "verifier_cached_rows",
            "Rows held in the sheet cache",
            cached_rows.clone(),
        );

        Self {
            registry: RwLock::new(registry),
            saves_total,
            save_duration_seconds,
            refreshes_total,
            startup_gate_total,
            cached_rows,
        }
    }

    /// Encode metrics in Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        let registry = self.registry.read();
        if let Err(error) = encode(&mut buffer, &registry) {
            tracing::warn!(%error, "failed to encode metrics");
        }
        buffer
    }

    pub fn record_save(&self, reassigned: bool, duration: Duration) {
        let outcome = if reassigned { "reassigned" } else { "saved" };
        self.saves_total
            .get_or_create(&SaveLabels {
                outcome: outcome.to_string(),
                category: String::new(),
            })
            .inc();
        self.save_duration_seconds.observe(duration.as_secs_f64());
    }

    pub fn record_save_failure(&self, category: &str, duration: Duration) {
        self.saves_total
            .get_or_create(&SaveLabels {
                outcome: "failed".to_string(),
                category: category.to_string(),
            })
            .inc();
        self.save_duration_seconds.observe(duration.as_secs_f64());
    }

    /// A save refused locally (validation or another save in flight).
    pub fn record_save_rejected(&self, category: &str) {
        self.saves_total
            .get_or_create(&SaveLabels {
                outcome: "rejected".to_string(),
                category: category.to_string(),
            })
            .inc();
    }

    pub fn save_count(&self, outcome: &str, category: &str) -> u64 {
        self.saves_total
            .get_or_create(&SaveLabels {
                outcome: outcome.to_string(),
                category: category.to_string(),
            })
            .get()
    }

    pub fn record_refresh(&self, applied: bool) {
        let outcome = if applied { "applied" } else { "failed" };
        self.refreshes_total
            .get_or_create(&OutcomeLabels {
                outcome: outcome.to_string(),
            })
            .inc();
    }

    pub fn refresh_count(&self, outcome: &str) -> u64 {
        self.refreshes_total
            .get_or_create(&OutcomeLabels {
                outcome: outcome.to_string(),
            })
            .get()
    }

    pub fn record_gate(&self, decision: &str) {
        self.startup_gate_total
            .get_or_create(&OutcomeLabels {
                outcome: decision.to_string(),
            })
            .inc();
    }

    pub fn gate_count(&self, decision: &str) -> u64 {
        self.startup_gate_total
            .get_or_create(&OutcomeLabels {
                outcome: decision.to_string(),
            })
            .get()
    }

    pub fn set_cached_rows(&self, rows: usize) {
        self.cached_rows.set(rows as i64);
    }
}
