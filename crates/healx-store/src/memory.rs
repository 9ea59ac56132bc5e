//! In-memory backend for the metrics store.
//!
//! Holds rows in a `Vec` behind an async lock. Clones share the same rows,
//! so a test can keep a handle while the collector owns another.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use healx_core::{DataPoint, Sample, StoredMetricRow};

use crate::error::{StoreError, StoreResult};
use crate::store::{MetricsStore, serialize_labels};

#[derive(Clone, Default)]
pub struct MemoryMetricsStore {
    rows: Arc<RwLock<Vec<StoredMetricRow>>>,
    fail_writes: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    close_calls: Arc<AtomicUsize>,
}

impl MemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `save_sample` fail with a write error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// All persisted rows in insertion order.
    pub async fn rows(&self) -> Vec<StoredMetricRow> {
        self.rows.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// How many times `close` has been called.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl MetricsStore for MemoryMetricsStore {
    async fn save_sample(&self, sample: &Sample) -> StoreResult<()> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        let labels = serialize_labels(sample)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Write("injected write failure".to_string()));
        }

        // Both rows go in under one lock acquisition.
        self.rows.write().await.extend(sample.rows(&labels));
        debug!(
            target_name = %sample.target_name,
            namespace = %sample.namespace,
            "sample stored in memory"
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
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        let rows = self.rows.read().await;
        let mut points: Vec<DataPoint> = rows
            .iter()
            .filter(|r| {
                r.target_name == target_name
                    && r.namespace == namespace
                    && r.metric_name == metric_name
                    && r.timestamp >= since
            })
            .map(|r| DataPoint {
                timestamp: r.timestamp,
                value: r.metric_value,
                metric_type: metric_name.to_string(),
            })
            .collect();
        points.sort_by_key(|p| p.timestamp);
        Ok(points)
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use healx_core::{MetricKind, Target};

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn save_writes_exactly_two_rows() {
        let store = MemoryMetricsStore::new();
        let sample = Sample::new(&Target::default(), at(0), 104_857_600.0, 0.25);

        store.save_sample(&sample).await.unwrap();

        let rows = store.rows().await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].metric_name, "memory_usage_mb");
        assert_eq!(rows[0].metric_value, 104_857_600.0);
        assert_eq!(rows[1].metric_name, "cpu_usage");
        assert_eq!(rows[1].metric_value, 0.25);
        assert_eq!(rows[0].timestamp, rows[1].timestamp);
        assert_eq!(rows[0].labels, rows[1].labels);
        assert_eq!(rows[0].labels, r#"{"app":"leaky-app"}"#);
    }

    #[tokio::test]
    async fn failed_write_persists_nothing() {
        let store = MemoryMetricsStore::new();
        store.fail_writes(true);

        let sample = Sample::new(&Target::default(), at(0), 1.0, 0.1);
        assert!(matches!(store.save_sample(&sample).await, Err(StoreError::Write(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn query_range_filters_and_orders() {
        let store = MemoryMetricsStore::new();
        let app = Target::default();
        let other = Target::new("other", "healx");

        // Insert out of order to prove sorting.
        for secs in [60, 0, 30, 90] {
            store
                .save_sample(&Sample::new(&app, at(secs), secs as f64, 0.5))
                .await
                .unwrap();
        }
        store
            .save_sample(&Sample::new(&other, at(45), 999.0, 0.9))
            .await
            .unwrap();

        let name = MetricKind::Memory.metric_name();
        let points = store
            .query_range("leaky-app", "healx", name, at(30))
            .await
            .unwrap();

        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![30.0, 60.0, 90.0]);
        assert!(points.iter().all(|p| p.metric_type == name));
        assert!(points.iter().all(|p| p.timestamp >= at(30)));
    }

    #[tokio::test]
    async fn query_range_only_returns_requested_metric() {
        let store = MemoryMetricsStore::new();
        store
            .save_sample(&Sample::new(&Target::default(), at(0), 100.0, 0.25))
            .await
            .unwrap();

        let cpu = store
            .query_range("leaky-app", "healx", "cpu_usage", at(0) - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(cpu.len(), 1);
        assert_eq!(cpu[0].value, 0.25);
        assert_eq!(cpu[0].metric_type, "cpu_usage");
    }

    #[tokio::test]
    async fn closed_store_rejects_operations() {
        let store = MemoryMetricsStore::new();
        store.close().await;

        assert!(store.is_closed());
        assert_eq!(store.close_calls(), 1);
        let sample = Sample::new(&Target::default(), at(0), 1.0, 0.1);
        assert!(matches!(store.save_sample(&sample).await, Err(StoreError::Closed)));
    }
}
