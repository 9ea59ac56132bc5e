//! leaky-app: a workload whose memory only grows.
//!
//! Gives the collector something worth watching: every `/load` request and
//! every background tick pins another buffer that is never released.
//!
//! ```text
//! GET /health   → "OK"
//! GET /metrics  → memory_usage_mb_bytes, goroutines_count (text exposition)
//! GET /load     → leak 10 MiB, report the total
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::routing::get;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::info;

const MIB: usize = 1024 * 1024;

/// Bytes leaked per `/load` request.
pub const LOAD_LEAK_BYTES: usize = 10 * MIB;

/// Bytes leaked per background tick.
pub const BACKGROUND_LEAK_BYTES: usize = 5 * MIB;

pub const BACKGROUND_LEAK_INTERVAL: Duration = Duration::from_secs(30);

const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Buffers that are held until the process exits.
pub struct LeakState {
    buffers: Mutex<Vec<Vec<u8>>>,
    system: Mutex<System>,
    pid: Pid,
}

impl Default for LeakState {
    fn default() -> Self {
        Self::new()
    }
}

impl LeakState {
    pub fn new() -> Self {
        Self {
            buffers: Mutex::new(Vec::new()),
            system: Mutex::new(System::new()),
            pid: Pid::from(std::process::id() as usize),
        }
    }

    fn buffers(&self) -> MutexGuard<'_, Vec<Vec<u8>>> {
        self.buffers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pin `bytes` more and return the total leaked so far.
    pub fn leak(&self, bytes: usize) -> usize {
        // Non-zero fill so the pages are actually touched.
        let buffer = vec![0xA5u8; bytes];
        let mut buffers = self.buffers();
        buffers.push(buffer);
        buffers.iter().map(Vec::len).sum()
    }

    pub fn leaked_bytes(&self) -> usize {
        self.buffers().iter().map(Vec::len).sum()
    }

    pub fn leaked_mb(&self) -> usize {
        self.leaked_bytes() / MIB
    }

    /// Resident set size of this process, or 0 if it cannot be read.
    pub fn resident_bytes(&self) -> u64 {
        let mut system = self.system.lock().unwrap_or_else(|e| e.into_inner());
        system.refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        system.process(self.pid).map(|p| p.memory()).unwrap_or(0)
    }
}

pub fn build_router(state: Arc<LeakState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/load", get(load))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn metrics(State(state): State<Arc<LeakState>>) -> impl IntoResponse {
    let tasks = tokio::runtime::Handle::current().metrics().num_alive_tasks();
    let body = render_metrics(state.resident_bytes(), tasks);
    ([(CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)], body)
}

async fn load(State(state): State<Arc<LeakState>>) -> String {
    let total = state.leak(LOAD_LEAK_BYTES) / MIB;
    info!(total_leaked_mb = total, "load request leaked memory");
    format!("Added 10MB to memory leak. Total leaked: {total} MB")
}

/// Render the two gauges in Prometheus text exposition format.
pub fn render_metrics(resident_bytes: u64, tasks: usize) -> String {
    let mut out = String::new();

    out.push_str("# HELP memory_usage_mb_bytes Resident memory of the process in bytes.\n");
    out.push_str("# TYPE memory_usage_mb_bytes gauge\n");
    out.push_str(&format!("memory_usage_mb_bytes {resident_bytes}\n"));

    out.push_str("# HELP goroutines_count Number of alive runtime tasks.\n");
    out.push_str("# TYPE goroutines_count gauge\n");
    out.push_str(&format!("goroutines_count {tasks}\n"));

    out
}

/// Leak `bytes` every `interval` until `shutdown` flips to `true`.
pub async fn leak_loop(
    state: Arc<LeakState>,
    interval: Duration,
    bytes: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let total = state.leak(bytes);
                info!(
                    total_leaked_mb = total / MIB,
                    resident_bytes = state.resident_bytes(),
                    "background leak"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leak_accumulates() {
        let state = LeakState::new();
        assert_eq!(state.leaked_bytes(), 0);
        assert_eq!(state.leak(MIB), MIB);
        assert_eq!(state.leak(2 * MIB), 3 * MIB);
        assert_eq!(state.leaked_mb(), 3);
    }

    #[test]
    fn resident_memory_is_reported() {
        let state = LeakState::new();
        assert!(state.resident_bytes() > 0);
    }

    #[test]
    fn exposition_has_help_and_type_lines() {
        let text = render_metrics(104_857_600, 7);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "# HELP memory_usage_mb_bytes Resident memory of the process in bytes.",
                "# TYPE memory_usage_mb_bytes gauge",
                "memory_usage_mb_bytes 104857600",
                "# HELP goroutines_count Number of alive runtime tasks.",
                "# TYPE goroutines_count gauge",
                "goroutines_count 7",
            ]
        );
    }
}
