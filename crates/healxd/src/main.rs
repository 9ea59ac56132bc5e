//! healxd: the healx metrics collector daemon.
//!
//! Polls Prometheus for each configured target's memory and CPU usage on a
//! fixed interval and appends the samples to PostgreSQL.
//!
//! # Usage
//!
//! ```text
//! healxd run --config healx.toml
//! healxd history --target leaky-app --namespace healx --metric memory_usage_mb
//! healxd range --query 'container_memory_usage_mb_bytes{pod="leaky-app"}' --minutes 30
//! ```

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

const DEFAULT_LOG_FILTER: &str = "info,healxd=debug,healx=debug";

#[derive(Parser, Debug)]
#[command(name = "healxd", about = "healx metrics collector")]
struct Cli {
    /// Path to healx.toml. Built-in defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the collection loop until SIGINT or SIGTERM.
    Run(RunArgs),

    /// Print stored points for one target and metric.
    History {
        #[arg(long)]
        target: String,

        #[arg(long)]
        namespace: String,

        /// Stored metric name: memory_usage_mb or cpu_usage.
        #[arg(long)]
        metric: String,

        #[arg(long, default_value = "24", value_parser = clap::value_parser!(i64).range(1..))]
        hours_back: i64,
    },

    /// Run a range query against the metrics backend and print the points.
    Range {
        #[arg(long)]
        query: String,

        /// How far back the range starts.
        #[arg(long, default_value = "60", value_parser = clap::value_parser!(i64).range(1..))]
        minutes: i64,

        /// Resolution step, e.g. "15s" or "1m".
        #[arg(long, default_value = "15s")]
        step: String,

        /// Override the backend URL from the config.
        #[arg(long)]
        backend_url: Option<String>,
    },
}

#[derive(clap::Args, Debug, Default)]
struct RunArgs {
    /// Override the Prometheus base URL.
    #[arg(long)]
    backend_url: Option<String>,

    /// Override the PostgreSQL connection string.
    #[arg(long)]
    database_url: Option<String>,

    /// Override the storage backend.
    #[arg(long, value_enum)]
    storage: Option<StorageArg>,

    /// Override the collection interval, e.g. "30s".
    #[arg(long)]
    interval: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum StorageArg {
    Postgres,
    Memory,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Run(args) => commands::run(config, args).await,
        Command::History {
            target,
            namespace,
            metric,
            hours_back,
        } => commands::history(config, &target, &namespace, &metric, hours_back).await,
        Command::Range {
            query,
            minutes,
            step,
            backend_url,
        } => commands::range(config, &query, minutes, &step, backend_url).await,
    }
}
