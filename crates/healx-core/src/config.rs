//! healx.toml configuration parser.
//!
//! Every field has a default, so an absent or empty file yields a working
//! configuration that polls the demo workload on a local Prometheus and
//! writes to a local Postgres.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use crate::types::Target;

/// Default instant query for memory; `{target}` and `{namespace}` are substituted.
pub const DEFAULT_MEMORY_QUERY: &str =
    r#"container_memory_usage_mb_bytes{pod="{target}", namespace="{namespace}"}"#;

/// Default instant query for CPU.
pub const DEFAULT_CPU_QUERY: &str =
    r#"rate(container_cpu_usage_seconds_total{pod="{target}", namespace="{namespace}"}[5m])"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealxConfig {
    pub backend: BackendConfig,
    pub storage: StorageConfig,
    pub collector: CollectorConfig,
    pub targets: Vec<Target>,
}

impl Default for HealxConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            storage: StorageConfig::default(),
            collector: CollectorConfig::default(),
            targets: vec![Target::default()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Prometheus base URL, e.g. `http://localhost:9090`.
    pub url: String,
    /// Transport timeout for a single HTTP exchange.
    pub timeout: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9090".to_string(),
            timeout: "10s".to_string(),
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> anyhow::Result<Duration> {
        parse_duration("backend.timeout", &self.timeout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    /// Process-local rows, lost on exit. For local runs without a database.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Full connection string; takes precedence over the discrete fields.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub sslmode: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub max_lifetime: String,
    pub idle_timeout: String,
    pub acquire_timeout: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Postgres,
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            user: "healx_user".to_string(),
            password: "healx_pass_dev_only".to_string(),
            dbname: "healx".to_string(),
            sslmode: "disable".to_string(),
            max_connections: 25,
            min_connections: 5,
            max_lifetime: "5m".to_string(),
            idle_timeout: "10m".to_string(),
            acquire_timeout: "5s".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn max_lifetime(&self) -> anyhow::Result<Duration> {
        parse_duration("storage.max_lifetime", &self.max_lifetime)
    }

    pub fn idle_timeout(&self) -> anyhow::Result<Duration> {
        parse_duration("storage.idle_timeout", &self.idle_timeout)
    }

    pub fn acquire_timeout(&self) -> anyhow::Result<Duration> {
        parse_duration("storage.acquire_timeout", &self.acquire_timeout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub interval: String,
    /// Deadline for each backend query within a tick.
    pub query_timeout: String,
    pub memory_query: String,
    pub cpu_query: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval: "30s".to_string(),
            query_timeout: "5s".to_string(),
            memory_query: DEFAULT_MEMORY_QUERY.to_string(),
            cpu_query: DEFAULT_CPU_QUERY.to_string(),
        }
    }
}

impl CollectorConfig {
    pub fn interval(&self) -> anyhow::Result<Duration> {
        parse_duration("collector.interval", &self.interval)
    }

    pub fn query_timeout(&self) -> anyhow::Result<Duration> {
        parse_duration("collector.query_timeout", &self.query_timeout)
    }
}

impl HealxConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: HealxConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject configurations the collector cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.targets.is_empty() {
            bail!("at least one [[targets]] entry is required");
        }
        let mut seen = HashSet::new();
        for target in &self.targets {
            if target.name.is_empty() || target.namespace.is_empty() {
                bail!("target name and namespace must be non-empty");
            }
            if !seen.insert((&target.name, &target.namespace)) {
                bail!("duplicate target {}", target.key());
            }
        }
        if self.collector.interval()?.is_zero() {
            bail!("collector.interval must be greater than zero");
        }
        if self.collector.query_timeout()?.is_zero() {
            bail!("collector.query_timeout must be greater than zero");
        }
        self.backend.timeout()?;
        self.storage.max_lifetime()?;
        self.storage.idle_timeout()?;
        self.storage.acquire_timeout()?;
        if self.storage.min_connections > self.storage.max_connections {
            bail!("storage.min_connections exceeds storage.max_connections");
        }
        Ok(())
    }
}

/// Parse a human duration such as "30s", "5m", or "500ms".
pub fn parse_duration(field: &str, value: &str) -> anyhow::Result<Duration> {
    humantime::parse_duration(value.trim())
        .with_context(|| format!("invalid duration for {field}: {value:?}"))
}
