//! Collector wired to a real PrometheusClient and the in-memory store,
//! with an axum server standing in for Prometheus.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::sync::watch;

use healx_collector::{CollectError, Collector, CollectorSettings, LoopState, TickReport};
use healx_core::Target;
use healx_query::PrometheusClient;
use healx_store::{MemoryMetricsStore, MetricsStore};

/// Answers memory queries with `memory` and everything else with `cpu`.
/// `None` answers with an empty vector.
#[derive(Clone)]
struct FakeProm {
    memory: Option<&'static str>,
    cpu: Option<&'static str>,
    delay: Duration,
    queries: Arc<Mutex<Vec<String>>>,
}

impl FakeProm {
    fn new(memory: Option<&'static str>, cpu: Option<&'static str>) -> Self {
        Self {
            memory,
            cpu,
            delay: Duration::ZERO,
            queries: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

async fn answer(
    State(fake): State<FakeProm>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let query = params.get("query").cloned().unwrap_or_default();
    fake.queries.lock().unwrap().push(query.clone());
    if !fake.delay.is_zero() {
        tokio::time::sleep(fake.delay).await;
    }

    let value = if query.contains("memory") { fake.memory } else { fake.cpu };
    let result = match value {
        Some(v) => format!(r#"[{{"metric":{{"pod":"leaky-app"}},"value":[1700000000,"{v}"]}}]"#),
        None => "[]".to_string(),
    };
    let body = format!(r#"{{"status":"success","data":{{"resultType":"vector","result":{result}}}}}"#);
    ([(CONTENT_TYPE, "application/json")], body)
}

async fn start(fake: FakeProm) -> PrometheusClient {
    let router = Router::new()
        .route("/api/v1/query", get(answer))
        .with_state(fake);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    PrometheusClient::with_timeout(&format!("http://{addr}"), Duration::from_secs(2)).unwrap()
}

fn settings(interval: Duration) -> CollectorSettings {
    CollectorSettings {
        interval,
        query_timeout: Duration::from_secs(2),
        ..CollectorSettings::default()
    }
}

#[tokio::test]
async fn healthy_backend_persists_memory_and_cpu_rows() {
    let fake = FakeProm::new(Some("104857600"), Some("0.25"));
    let queries = fake.queries.clone();
    let client = start(fake).await;
    let store = MemoryMetricsStore::new();
    let collector = Collector::new(client, store.clone(), settings(Duration::from_secs(30)));

    let report = collector.tick().await;
    assert_eq!(report, TickReport { collected: 1, failed: 0 });

    let mut rows = store.rows().await;
    rows.sort_by(|a, b| a.metric_name.cmp(&b.metric_name));
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].metric_name, "cpu_usage");
    assert_eq!(rows[0].metric_value, 0.25);
    assert_eq!(rows[1].metric_name, "memory_usage_mb");
    assert_eq!(rows[1].metric_value, 104_857_600.0);
    for row in &rows {
        assert_eq!(row.target_name, "leaky-app");
        assert_eq!(row.namespace, "healx");
        assert_eq!(row.labels, r#"{"app":"leaky-app"}"#);
    }
    assert_eq!(rows[0].timestamp, rows[1].timestamp);

    // Memory is queried before CPU, with the target substituted in.
    let queries = queries.lock().unwrap().clone();
    assert_eq!(queries.len(), 2);
    assert!(queries[0].contains("container_memory_usage_mb_bytes"));
    assert!(queries[0].contains(r#"pod="leaky-app""#));
    assert!(queries[1].contains("container_cpu_usage_seconds_total"));
}

#[tokio::test]
async fn empty_memory_result_persists_nothing() {
    let client = start(FakeProm::new(None, Some("0.25"))).await;
    let store = MemoryMetricsStore::new();
    let collector = Collector::new(client, store.clone(), settings(Duration::from_secs(30)));

    let err = collector.collect_target(&Target::default()).await.unwrap_err();
    assert!(matches!(err, CollectError::Query { .. }));
    assert!(err.to_string().contains("no data found"));
    assert!(store.is_empty().await);

    let report = collector.tick().await;
    assert_eq!(report, TickReport { collected: 0, failed: 1 });
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn empty_cpu_result_persists_nothing() {
    let client = start(FakeProm::new(Some("1024"), None)).await;
    let store = MemoryMetricsStore::new();
    let collector = Collector::new(client, store.clone(), settings(Duration::from_secs(30)));

    let err = collector.collect_target(&Target::default()).await.unwrap_err();
    assert_eq!(err.to_string(), "error querying CPU: no data found");
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn loop_collects_repeatedly_then_closes_store() {
    let client = start(FakeProm::new(Some("2048"), Some("0.5"))).await;
    let store = MemoryMetricsStore::new();
    let collector = Collector::new(client, store.clone(), settings(Duration::from_millis(100)));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(collector.run(shutdown_rx));
    tokio::time::sleep(Duration::from_millis(350)).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    let rows = store.len().await;
    assert!(rows >= 4, "expected at least two ticks, got {rows} rows");
    assert_eq!(rows % 2, 0);
    assert_eq!(store.close_calls(), 1);
}

#[tokio::test]
async fn shutdown_before_first_tick_writes_nothing() {
    let client = start(FakeProm::new(Some("2048"), Some("0.5"))).await;
    let store = MemoryMetricsStore::new();
    let collector = Collector::new(client, store.clone(), settings(Duration::from_secs(30)));
    let mut states = collector.subscribe();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(collector.run(shutdown_rx));
    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop should stop promptly")
        .unwrap();

    assert_eq!(*states.borrow_and_update(), LoopState::Stopped);
    assert!(store.is_empty().await);
    assert_eq!(store.close_calls(), 1);
}

#[tokio::test]
async fn shutdown_waits_for_in_flight_tick() {
    let mut fake = FakeProm::new(Some("2048"), Some("0.5"));
    fake.delay = Duration::from_millis(200);
    let client = start(fake).await;
    let store = MemoryMetricsStore::new();
    let collector = Collector::new(client, store.clone(), settings(Duration::from_millis(50)));
    let mut states = collector.subscribe();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(collector.run(shutdown_rx));
    states.wait_for(|s| *s == LoopState::Collecting).await.unwrap();
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    assert_eq!(store.len().await, 2);
    assert_eq!(store.close_calls(), 1);
}

#[tokio::test]
async fn store_failures_do_not_stop_the_loop() {
    let fake = FakeProm::new(Some("2048"), Some("0.5"));
    let queries = fake.queries.clone();
    let client = start(fake).await;
    let store = MemoryMetricsStore::new();
    store.fail_writes(true);
    let collector = Collector::new(client, store.clone(), settings(Duration::from_millis(100)));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(collector.run(shutdown_rx));
    tokio::time::sleep(Duration::from_millis(350)).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    assert!(store.is_empty().await);
    // Every tick still queried the backend.
    assert!(queries.lock().unwrap().len() >= 4);
    assert!(store.is_closed());
    assert!(store.query_range("leaky-app", "healx", "cpu_usage", chrono::Utc::now()).await.is_err());
}

/// Log sink shared between the subscriber and the test body.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn empty_result_is_logged_as_no_data() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    // The test runtime is single-threaded, so a thread-local default sees
    // every event the tick emits.
    let _guard = tracing::subscriber::set_default(subscriber);

    let client = start(FakeProm::new(None, Some("0.25"))).await;
    let store = MemoryMetricsStore::new();
    let collector = Collector::new(client, store.clone(), settings(Duration::from_secs(30)));

    let report = collector.tick().await;
    assert_eq!(report, TickReport { collected: 0, failed: 1 });
    assert!(store.is_empty().await);

    let output = logs.contents();
    let line = output
        .lines()
        .find(|l| l.contains("error collecting metrics"))
        .unwrap_or_else(|| panic!("no error line in captured logs:\n{output}"));
    assert!(line.contains("ERROR"));
    assert!(line.contains("no data found"));
    assert!(line.contains("error querying memory"));
    assert!(line.contains("target_name=leaky-app"));
}
