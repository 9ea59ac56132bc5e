//! Domain types for targets, samples, and stored metric rows.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Open label set attached to every sample of a target.
pub type Labels = BTreeMap<String, String>;

/// A monitored workload, identified by name and namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub namespace: String,
    /// Fixed labels copied onto each sample.
    #[serde(default)]
    pub labels: Labels,
}

impl Target {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            labels: Labels::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// `{namespace}/{name}`, used in log fields.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

impl Default for Target {
    /// The demo workload shipped in `demos/leaky-app`.
    fn default() -> Self {
        Target::new("leaky-app", "healx").with_label("app", "leaky-app")
    }
}

/// The two quantities measured per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Memory,
    Cpu,
}

impl MetricKind {
    /// Insert order for a sample's rows.
    pub const ALL: [MetricKind; 2] = [MetricKind::Memory, MetricKind::Cpu];

    /// Value of the `metric_name` column.
    ///
    /// The memory row keeps its historical `memory_usage_mb` name even
    /// though the value is in bytes; downstream readers query by it.
    pub fn metric_name(self) -> &'static str {
        match self {
            MetricKind::Memory => "memory_usage_mb",
            MetricKind::Cpu => "cpu_usage",
        }
    }

    pub fn from_metric_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.metric_name() == name)
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Memory => f.write_str("memory"),
            MetricKind::Cpu => f.write_str("CPU"),
        }
    }
}

/// One tick's reading for a single target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub target_name: String,
    pub namespace: String,
    pub timestamp: DateTime<Utc>,
    /// Resident memory in bytes.
    pub memory_bytes: f64,
    /// CPU usage in fractional cores.
    pub cpu_cores: f64,
    pub labels: Labels,
}

impl Sample {
    pub fn new(target: &Target, timestamp: DateTime<Utc>, memory_bytes: f64, cpu_cores: f64) -> Self {
        Self {
            target_name: target.name.clone(),
            namespace: target.namespace.clone(),
            timestamp,
            memory_bytes,
            cpu_cores,
            labels: target.labels.clone(),
        }
    }

    pub fn value_of(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::Memory => self.memory_bytes,
            MetricKind::Cpu => self.cpu_cores,
        }
    }

    /// Expand into one row per [`MetricKind`], all sharing the same
    /// identity, timestamp, and serialized labels.
    pub fn rows(&self, labels: &str) -> [StoredMetricRow; 2] {
        MetricKind::ALL.map(|kind| StoredMetricRow {
            target_name: self.target_name.clone(),
            namespace: self.namespace.clone(),
            metric_name: kind.metric_name().to_string(),
            metric_value: self.value_of(kind),
            timestamp: self.timestamp,
            labels: labels.to_string(),
        })
    }
}

/// A single point of a time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub metric_type: String,
}

/// A row of the `metrics` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMetricRow {
    pub target_name: String,
    pub namespace: String,
    pub metric_name: String,
    pub metric_value: f64,
    pub timestamp: DateTime<Utc>,
    /// JSON-encoded label map.
    pub labels: String,
}
