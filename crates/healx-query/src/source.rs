//! The seam between the collection loop and a metrics backend.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use healx_core::{DataPoint, Target};

use crate::error::QueryResult;

/// A backend that can answer point-in-time and range queries.
pub trait MetricsSource: Send + Sync {
    /// Render `template` for `target`, evaluate it at `time`, and return
    /// the first result's value. Empty or non-vector results are `NoData`.
    fn query_scalar(
        &self,
        target: &Target,
        template: &str,
        time: DateTime<Utc>,
    ) -> impl Future<Output = QueryResult<f64>> + Send;

    /// Evaluate `query` over a range and return the first series in
    /// ascending time order. Empty or non-matrix results are `NoData`.
    fn query_range(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> impl Future<Output = QueryResult<Vec<DataPoint>>> + Send;
}

impl<T: MetricsSource> MetricsSource for Arc<T> {
    fn query_scalar(
        &self,
        target: &Target,
        template: &str,
        time: DateTime<Utc>,
    ) -> impl Future<Output = QueryResult<f64>> + Send {
        (**self).query_scalar(target, template, time)
    }

    fn query_range(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> impl Future<Output = QueryResult<Vec<DataPoint>>> + Send {
        (**self).query_range(query, start, end, step)
    }
}
