//! The `MetricsStore` trait.

use std::future::Future;

use chrono::{DateTime, Utc};

use healx_core::{DataPoint, Sample};

use crate::error::{StoreError, StoreResult};

pub trait MetricsStore: Send + Sync {
    /// Persist both rows of `sample`, or neither.
    fn save_sample(&self, sample: &Sample) -> impl Future<Output = StoreResult<()>> + Send;

    /// Points for one target and metric with `timestamp >= since`, oldest first.
    fn query_range(
        &self,
        target_name: &str,
        namespace: &str,
        metric_name: &str,
        since: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<Vec<DataPoint>>> + Send;

    /// Release connections. Later calls fail with [`StoreError::Closed`].
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Encode a sample's label map the way it is stored in the `labels` column.
pub fn serialize_labels(sample: &Sample) -> StoreResult<String> {
    serde_json::to_string(&sample.labels).map_err(|e| StoreError::Serialize(e.to_string()))
}
