//! Per-tick error context.

use thiserror::Error;

use healx_core::MetricKind;
use healx_query::QueryError;
use healx_store::StoreError;

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("error querying {kind}: {source}")]
    Query {
        kind: MetricKind,
        #[source]
        source: QueryError,
    },

    #[error("error saving metrics: {0}")]
    Store(#[from] StoreError),
}
