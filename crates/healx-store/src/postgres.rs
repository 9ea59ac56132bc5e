//! PostgreSQL backend for the metrics store.
//!
//! Connections come from a bounded sqlx pool that recycles connections
//! after `max_lifetime`. A sample's two inserts share one transaction, so
//! a failure on either row leaves no trace of the sample.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use tracing::{debug, info};

use healx_core::config::StorageConfig;
use healx_core::{DataPoint, Sample};

use crate::error::{StoreError, StoreResult};
use crate::schema::{INSERT_METRIC, PING, SELECT_RANGE};
use crate::store::{MetricsStore, serialize_labels};

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// Sort a sqlx error into connection trouble versus a failed statement.
fn classify(e: sqlx::Error, statement: fn(String) -> StoreError) -> StoreError {
    match e {
        sqlx::Error::PoolClosed => StoreError::Closed,
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
            StoreError::Connect(e.to_string())
        }
        other => statement(other.to_string()),
    }
}

/// Metrics store over a shared `PgPool`; clones share the pool.
#[derive(Clone)]
pub struct PgMetricsStore {
    pool: PgPool,
}

impl PgMetricsStore {
    /// Build the pool from config and verify the database answers.
    pub async fn connect(config: &StorageConfig) -> StoreResult<Self> {
        let options = connect_options(config)?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .max_lifetime(config.max_lifetime().map_err(map_err!(Config))?)
            .idle_timeout(config.idle_timeout().map_err(map_err!(Config))?)
            .acquire_timeout(config.acquire_timeout().map_err(map_err!(Config))?)
            .connect_with(options)
            .await
            .map_err(map_err!(Connect))?;

        sqlx::query(PING)
            .execute(&pool)
            .await
            .map_err(map_err!(Connect))?;

        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "metrics store connected"
        );
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl MetricsStore for PgMetricsStore {
    async fn save_sample(&self, sample: &Sample) -> StoreResult<()> {
        let labels = serialize_labels(sample)?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| classify(e, StoreError::Write))?;

        for row in sample.rows(&labels) {
            sqlx::query(INSERT_METRIC)
                .bind(row.target_name.as_str())
                .bind(row.namespace.as_str())
                .bind(row.metric_name.as_str())
                .bind(row.metric_value)
                .bind(row.timestamp)
                .bind(row.labels.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| match classify(e, StoreError::Write) {
                    StoreError::Write(msg) => {
                        StoreError::Write(format!("saving {}: {msg}", row.metric_name))
                    }
                    other => other,
                })?;
        }

        // Dropping an uncommitted transaction rolls it back.
        tx.commit()
            .await
            .map_err(|e| classify(e, StoreError::Write))?;

        debug!(
            target_name = %sample.target_name,
            namespace = %sample.namespace,
            timestamp = %sample.timestamp,
            "sample stored"
        );
        Ok(())
    }

    async fn query_range(
        &self,
        target_name: &str,
        namespace: &str,
        metric_name: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<DataPoint>> {
        let rows: Vec<(f64, DateTime<Utc>)> = sqlx::query_as(SELECT_RANGE)
            .bind(target_name)
            .bind(namespace)
            .bind(metric_name)
            .bind(since)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| classify(e, StoreError::Read))?;

        Ok(rows
            .into_iter()
            .map(|(value, timestamp)| DataPoint {
                timestamp,
                value,
                metric_type: metric_name.to_string(),
            })
            .collect())
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("metrics store closed");
    }
}

fn connect_options(config: &StorageConfig) -> StoreResult<PgConnectOptions> {
    if let Some(url) = &config.url {
        return PgConnectOptions::from_str(url).map_err(map_err!(Config));
    }
    let ssl_mode = PgSslMode::from_str(&config.sslmode).map_err(map_err!(Config))?;
    Ok(PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.dbname)
        .ssl_mode(ssl_mode))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_from_discrete_fields() {
        let options = connect_options(&StorageConfig::default()).unwrap();
        assert_eq!(options.get_host(), "localhost");
        assert_eq!(options.get_port(), 5432);
        assert_eq!(options.get_username(), "healx_user");
        assert_eq!(options.get_database(), Some("healx"));
    }

    #[test]
    fn url_takes_precedence() {
        let config = StorageConfig {
            url: Some("postgres://other:pw@db.internal:6543/metrics".to_string()),
            ..StorageConfig::default()
        };
        let options = connect_options(&config).unwrap();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_database(), Some("metrics"));
    }

    #[test]
    fn bad_sslmode_is_config_error() {
        let config = StorageConfig {
            sslmode: "sometimes".to_string(),
            ..StorageConfig::default()
        };
        assert!(matches!(connect_options(&config), Err(StoreError::Config(_))));
    }

    #[test]
    fn pool_errors_classify_as_connection_trouble() {
        assert!(matches!(
            classify(sqlx::Error::PoolTimedOut, StoreError::Write),
            StoreError::Connect(_)
        ));
        assert!(matches!(
            classify(sqlx::Error::PoolClosed, StoreError::Read),
            StoreError::Closed
        ));
        assert!(matches!(
            classify(sqlx::Error::RowNotFound, StoreError::Read),
            StoreError::Read(_)
        ));
    }
}
