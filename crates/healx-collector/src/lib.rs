//! healx-collector: the poll-fetch-persist loop.
//!
//! On every tick the collector asks the metrics backend for each
//! configured target's memory and CPU, builds a [`Sample`](healx_core::Sample),
//! and hands it to the store.
//!
//! # Architecture
//!
//! ```text
//! Collector<Q: MetricsSource, S: MetricsStore>
//!   ├── collect_target() → query memory, query CPU, save_sample()
//!   ├── tick()           → collect_target() for every target, log failures
//!   └── run()            → interval loop until shutdown, then close the store
//! ```
//!
//! # Loop states
//!
//! ```text
//! Idle ──timer──▶ Collecting ──tick done──▶ Idle
//! Idle ──shutdown──▶ Stopped
//! ```
//!
//! Shutdown is only observed between ticks; an in-flight tick always runs
//! to completion. A failed tick is logged and the loop keeps going; the
//! next tick is the only retry.

pub mod collector;
pub mod error;

pub use collector::{Collector, CollectorSettings, LoopState, TickReport};
pub use error::CollectError;
