//! Collector: polls the metrics backend on a fixed interval and persists
//! one sample per target per tick.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use healx_core::{HealxConfig, MetricKind, Sample, Target};
use healx_core::config::{DEFAULT_CPU_QUERY, DEFAULT_MEMORY_QUERY};
use healx_query::{MetricsSource, QueryError};
use healx_store::MetricsStore;

use crate::error::CollectError;

/// Where the loop is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting for the next tick or for shutdown.
    Idle,
    /// A tick is in flight.
    Collecting,
    /// Terminal; the store has been closed.
    Stopped,
}

/// Outcome counts for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub collected: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub interval: Duration,
    /// Deadline for each backend query.
    pub query_timeout: Duration,
    /// Collected in order on every tick.
    pub targets: Vec<Target>,
    pub memory_query: String,
    pub cpu_query: String,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            query_timeout: Duration::from_secs(5),
            targets: vec![Target::default()],
            memory_query: DEFAULT_MEMORY_QUERY.to_string(),
            cpu_query: DEFAULT_CPU_QUERY.to_string(),
        }
    }
}

impl CollectorSettings {
    pub fn from_config(config: &HealxConfig) -> anyhow::Result<Self> {
        Ok(Self {
            interval: config.collector.interval()?,
            query_timeout: config.collector.query_timeout()?,
            targets: config.targets.clone(),
            memory_query: config.collector.memory_query.clone(),
            cpu_query: config.collector.cpu_query.clone(),
        })
    }

    fn template(&self, kind: MetricKind) -> &str {
        match kind {
            MetricKind::Memory => &self.memory_query,
            MetricKind::Cpu => &self.cpu_query,
        }
    }
}

/// Single-worker collection loop over a metrics source and a store.
pub struct Collector<Q, S> {
    source: Q,
    store: S,
    settings: CollectorSettings,
    state: watch::Sender<LoopState>,
}

impl<Q: MetricsSource, S: MetricsStore> Collector<Q, S> {
    pub fn new(source: Q, store: S, settings: CollectorSettings) -> Self {
        let (state, _) = watch::channel(LoopState::Idle);
        Self {
            source,
            store,
            settings,
            state,
        }
    }

    pub fn settings(&self) -> &CollectorSettings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    /// Watch loop state transitions.
    pub fn subscribe(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    async fn query(&self, target: &Target, kind: MetricKind) -> Result<f64, CollectError> {
        let timeout = self.settings.query_timeout;
        let query = self
            .source
            .query_scalar(target, self.settings.template(kind), Utc::now());

        let result = match tokio::time::timeout(timeout, query).await {
            Ok(result) => result,
            Err(_) => Err(QueryError::Timeout(timeout)),
        };
        result.map_err(|source| CollectError::Query { kind, source })
    }

    /// Query both metrics for one target and persist them as one sample.
    ///
    /// Nothing is saved unless both queries succeed.
    pub async fn collect_target(&self, target: &Target) -> Result<Sample, CollectError> {
        let memory = self.query(target, MetricKind::Memory).await?;
        let cpu = self.query(target, MetricKind::Cpu).await?;

        let sample = Sample::new(target, Utc::now(), memory, cpu);
        self.store.save_sample(&sample).await?;

        info!(
            target_name = %target.name,
            namespace = %target.namespace,
            memory_bytes = memory,
            cpu_cores = cpu,
            "collected metrics for {}: memory={:.2} bytes, cpu={:.4} cores",
            target.name,
            memory,
            cpu
        );
        Ok(sample)
    }

    /// Collect every configured target once. Failures are logged, not returned.
    pub async fn tick(&self) -> TickReport {
        let started = Instant::now();
        let mut report = TickReport::default();

        for target in &self.settings.targets {
            match self.collect_target(target).await {
                Ok(_) => report.collected += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(
                        target_name = %target.name,
                        namespace = %target.namespace,
                        error = %e,
                        "error collecting metrics"
                    );
                }
            }
        }

        debug!(
            collected = report.collected,
            failed = report.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tick complete"
        );
        report
    }

    /// Run ticks every `interval` until `shutdown` flips to `true` or its
    /// sender is dropped, then close the store.
    ///
    /// The first tick fires one full interval after start. A tick that
    /// overruns delays the next one rather than overlapping it.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.settings.interval.as_secs(),
            targets = self.settings.targets.len(),
            "metrics collector started"
        );

        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.settings.interval, self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        debug!("shutdown sender dropped");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.state.send_replace(LoopState::Collecting);
                    self.tick().await;
                    self.state.send_replace(LoopState::Idle);
                }
            }
        }

        info!("received shutdown signal, stopping collector");
        self.state.send_replace(LoopState::Stopped);
        self.store.close().await;
        info!("metrics collector stopped");
    }
}
