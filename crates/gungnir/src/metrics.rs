//! Dispatch metrics.
//!
//! The constants defined in this module are the names of metrics that the
//! dispatch layer maintains via [`metrics`] crate interfaces.  Nothing is
//! recorded unless `gungnir.metrics.enabled` is set.

use crate::context::TaskContext;
use ::metrics::{describe_counter, describe_gauge, Unit as MetricUnit};
use gungnir_types::config::Config;

/// Number of tuples delivered to an operator by a dispatcher.
pub const DISPATCH_COUNT: &str = "dispatch.count";

/// Number of live per-key operator instances held by a grouping dispatcher.
pub const PER_KEY_INSTANCES: &str = "grouping.per_key_instances";

/// Number of rows drained from window storage.
pub const WINDOW_EVICTED_ROWS: &str = "window.evicted_rows";

/// Creates the appropriate metric name for this metric.
pub(crate) fn metric_name(name: &str) -> String {
    format!("gungnir_{name}")
}

/// A metric of type `Counter`.
#[derive(Clone)]
pub(crate) struct Counter(metrics::Counter);

impl Counter {
    /// Initializes a counter labelled with the task's worker index and task
    /// id in addition to `labels`.
    pub(crate) fn new(name: &str, context: &TaskContext, mut labels: Vec<(String, String)>) -> Self {
        labels.extend(context.metric_labels());
        Self(metrics::counter!(metric_name(name), &labels[..]))
    }

    pub(crate) fn noop() -> Self {
        Self(metrics::Counter::noop())
    }

    pub(crate) fn increment(&self, value: u64) {
        self.0.increment(value)
    }
}

/// A metric of type `Gauge`.
#[derive(Clone)]
pub(crate) struct Gauge(metrics::Gauge);

impl Gauge {
    pub(crate) fn new(name: &str, context: &TaskContext, mut labels: Vec<(String, String)>) -> Self {
        labels.extend(context.metric_labels());
        Self(metrics::gauge!(metric_name(name), &labels[..]))
    }

    pub(crate) fn noop() -> Self {
        Self(metrics::Gauge::noop())
    }

    pub(crate) fn set(&self, value: f64) {
        self.0.set(value)
    }
}

/// Registration hook run once when a task starts, before any tuple is
/// dispatched.
pub trait MetricsHook: Send {
    fn register_metrics(&mut self, config: &Config, context: &TaskContext);
}

/// Describes the metrics recorded by the dispatch layer itself.
#[derive(Debug, Default)]
pub struct DispatchMetrics;

impl MetricsHook for DispatchMetrics {
    fn register_metrics(&mut self, _config: &Config, _context: &TaskContext) {
        describe_counter!(
            metric_name(DISPATCH_COUNT),
            MetricUnit::Count,
            "Tuples delivered to an operator"
        );
        describe_gauge!(
            metric_name(PER_KEY_INSTANCES),
            MetricUnit::Count,
            "Live per-key operator instances"
        );
        describe_counter!(
            metric_name(WINDOW_EVICTED_ROWS),
            MetricUnit::Count,
            "Rows drained from window storage"
        );
    }
}
