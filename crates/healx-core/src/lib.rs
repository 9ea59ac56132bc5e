//! healx-core: shared domain types and configuration for healx.
//!
//! Every other crate in the workspace speaks in these types: a [`Target`]
//! names the workload being watched, a [`Sample`] is one tick's reading
//! for it, and a [`StoredMetricRow`] is what lands in the metrics table.

pub mod config;
pub mod types;

pub use config::HealxConfig;
pub use types::*;
