//! SQL for the `metrics` table.
//!
//! The table is provisioned by operators; healx only inserts and selects.
//! [`CREATE_METRICS_TABLE`] documents the expected shape and is what the
//! integration tests provision.

pub const CREATE_METRICS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS metrics (
    id           BIGSERIAL PRIMARY KEY,
    target_name  TEXT NOT NULL,
    namespace    TEXT NOT NULL,
    metric_name  TEXT NOT NULL,
    metric_value DOUBLE PRECISION NOT NULL,
    timestamp    TIMESTAMPTZ NOT NULL,
    labels       TEXT NOT NULL
)"#;

/// One row per metric kind; bound once per row of a sample.
pub const INSERT_METRIC: &str = "INSERT INTO metrics \
    (target_name, namespace, metric_name, metric_value, timestamp, labels) \
    VALUES ($1, $2, $3, $4, $5, $6)";

pub const SELECT_RANGE: &str = "SELECT metric_value, timestamp FROM metrics \
    WHERE target_name = $1 AND namespace = $2 AND metric_name = $3 AND timestamp >= $4 \
    ORDER BY timestamp ASC";

pub const PING: &str = "SELECT 1";
