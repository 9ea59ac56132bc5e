//! Subcommand implementations.

use std::path::Path;

use anyhow::{Context, bail};
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::watch;
use tracing::{info, warn};

use healx_collector::{Collector, CollectorSettings};
use healx_core::config::{StorageBackend, parse_duration};
use healx_core::{DataPoint, HealxConfig};
use healx_query::{MetricsSource, PrometheusClient};
use healx_store::{MemoryMetricsStore, MetricsStore, PgMetricsStore};

use crate::{RunArgs, StorageArg};

/// Environment variable that overrides the storage connection string.
pub const DATABASE_URL_ENV: &str = "HEALX_DATABASE_URL";

pub fn load_config(path: Option<&Path>) -> anyhow::Result<HealxConfig> {
    match path {
        Some(path) => {
            let config = HealxConfig::from_file(path)?;
            info!(path = %path.display(), "config loaded");
            Ok(config)
        }
        None => Ok(HealxConfig::default()),
    }
}

/// Layer the environment and then the CLI flags over the file config.
fn apply_overrides(
    config: &mut HealxConfig,
    args: &RunArgs,
    env_database_url: Option<String>,
) -> anyhow::Result<()> {
    if let Some(url) = env_database_url.filter(|u| !u.is_empty()) {
        config.storage.url = Some(url);
    }
    if let Some(url) = &args.database_url {
        config.storage.url = Some(url.clone());
    }
    if let Some(url) = &args.backend_url {
        config.backend.url = url.clone();
    }
    if let Some(storage) = args.storage {
        config.storage.backend = match storage {
            StorageArg::Postgres => StorageBackend::Postgres,
            StorageArg::Memory => StorageBackend::Memory,
        };
    }
    if let Some(interval) = &args.interval {
        config.collector.interval = interval.clone();
    }
    config.validate()
}

pub async fn run(mut config: HealxConfig, args: RunArgs) -> anyhow::Result<()> {
    apply_overrides(&mut config, &args, std::env::var(DATABASE_URL_ENV).ok())?;

    let settings = CollectorSettings::from_config(&config)?;
    let client = PrometheusClient::new(&config.backend).context("invalid metrics backend URL")?;
    info!(backend = %client.base_url(), targets = settings.targets.len(), "healxd starting");

    match config.storage.backend {
        StorageBackend::Postgres => {
            let store = PgMetricsStore::connect(&config.storage)
                .await
                .context("failed to connect to database")?;
            run_collector(client, store, settings).await
        }
        StorageBackend::Memory => {
            warn!("memory storage selected, samples are discarded on exit");
            run_collector(client, MemoryMetricsStore::new(), settings).await
        }
    }
}

async fn run_collector<Q, S>(source: Q, store: S, settings: CollectorSettings) -> anyhow::Result<()>
where
    Q: MetricsSource + 'static,
    S: MetricsStore + 'static,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let collector = Collector::new(source, store, settings);
    let handle = tokio::spawn(collector.run(shutdown_rx));

    let signal = shutdown_signal().await;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    handle.await.context("collector task failed")?;
    info!("healxd stopped");
    signal
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .context("failed to install Ctrl-C handler")
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?
            .recv()
            .await;
        Ok::<(), anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<anyhow::Result<()>>();

    tokio::select! {
        result = ctrl_c => result,
        result = terminate => result,
    }
}

pub async fn history(
    config: HealxConfig,
    target: &str,
    namespace: &str,
    metric: &str,
    hours_back: i64,
) -> anyhow::Result<()> {
    let mut config = config;
    if let Some(url) = std::env::var(DATABASE_URL_ENV).ok().filter(|u| !u.is_empty()) {
        config.storage.url = Some(url);
    }
    let since = lookback(Utc::now(), TimeDelta::try_hours(hours_back), "--hours-back", hours_back)?;

    match config.storage.backend {
        StorageBackend::Postgres => {
            let store = PgMetricsStore::connect(&config.storage)
                .await
                .context("failed to connect to database")?;
            print_history(&store, target, namespace, metric, since).await
        }
        StorageBackend::Memory => {
            warn!("memory storage holds no history across processes");
            print_history(&MemoryMetricsStore::new(), target, namespace, metric, since).await
        }
    }
}

async fn print_history<S: MetricsStore>(
    store: &S,
    target: &str,
    namespace: &str,
    metric: &str,
    since: DateTime<Utc>,
) -> anyhow::Result<()> {
    let result = store.query_range(target, namespace, metric, since).await;
    store.close().await;

    let points = result.with_context(|| format!("reading {metric} for {namespace}/{target}"))?;
    info!(points = points.len(), "history loaded");
    print!("{}", format_points(&points));
    Ok(())
}

pub async fn range(
    config: HealxConfig,
    query: &str,
    minutes: i64,
    step: &str,
    backend_url: Option<String>,
) -> anyhow::Result<()> {
    let mut backend = config.backend;
    if let Some(url) = backend_url {
        backend.url = url;
    }
    let step = parse_duration("--step", step)?;
    let client = PrometheusClient::new(&backend).context("invalid metrics backend URL")?;

    let end = Utc::now();
    let start = lookback(end, TimeDelta::try_minutes(minutes), "--minutes", minutes)?;
    let points = client
        .query_range(query, start, end, step)
        .await
        .with_context(|| format!("range query {query:?}"))?;

    print!("{}", format_points(&points));
    Ok(())
}

/// `now` minus a positive look-back window; `delta` is `None` when the
/// flag value did not fit a `TimeDelta`.
fn lookback(
    now: DateTime<Utc>,
    delta: Option<TimeDelta>,
    flag: &str,
    value: i64,
) -> anyhow::Result<DateTime<Utc>> {
    if value <= 0 {
        bail!("{flag} must be positive, got {value}");
    }
    match delta.and_then(|d| now.checked_sub_signed(d)) {
        Some(start) => Ok(start),
        None => bail!("{flag} {value} is out of range"),
    }
}

/// One tab-separated `timestamp value` line per point.
fn format_points(points: &[DataPoint]) -> String {
    points
        .iter()
        .map(|p| format!("{}\t{}\n", p.timestamp.to_rfc3339(), p.value))
        .collect()
}
