//! healx-query: client for the Prometheus HTTP query API.
//!
//! Issues instant queries (one value per series) and range queries
//! (ordered series of values) and maps the typed results into healx
//! domain values.
//!
//! # Architecture
//!
//! ```text
//! MetricsSource (trait)
//!   └── PrometheusClient
//!         ├── query_scalar() → GET /api/v1/query        → first vector value
//!         └── query_range()  → GET /api/v1/query_range  → first matrix series
//! ```
//!
//! The client keeps no state across calls beyond its pooled connections,
//! and never retries: a failed call surfaces as a [`QueryError`].

pub mod client;
pub mod error;
pub mod response;
pub mod source;

pub use client::{PrometheusClient, render_query};
pub use error::{QueryError, QueryResult};
pub use source::MetricsSource;
