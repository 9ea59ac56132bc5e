//! healx-store: persistence for collected samples.
//!
//! A [`Sample`](healx_core::Sample) is written as two rows of the `metrics`
//! table (memory and CPU) inside one transaction, and read back as ordered
//! [`DataPoint`](healx_core::DataPoint) series.
//!
//! # Backends
//!
//! ```text
//! MetricsStore (trait)
//!   ├── PgMetricsStore      ← sqlx PgPool, production
//!   └── MemoryMetricsStore  ← Vec of rows, tests and database-less runs
//! ```
//!
//! The store is append-only: nothing here updates or deletes a row.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod schema;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryMetricsStore;
pub use postgres::PgMetricsStore;
pub use store::MetricsStore;
