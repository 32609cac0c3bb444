//! Well-known configuration keys and their defaults.

/// Enables metric registration and per-target dispatch counters.
pub const METRICS_ENABLED: &str = "gungnir.metrics.enabled";

/// Reporting interval, in seconds, handed to the metrics exporter.
pub const METRICS_INTERVAL_SECS: &str = "gungnir.metrics.interval.secs";

/// Maximum number of per-key operator instances kept by a grouping
/// dispatcher.  Unset means unbounded.
pub const GROUPING_MAX_KEYS: &str = "gungnir.grouping.max_keys";

/// Name of the topology a task belongs to.
pub const TOPOLOGY_NAME: &str = "gungnir.topology.name";

pub const DEFAULT_METRICS_INTERVAL_SECS: u64 = 60;
