//! HTTP client for the Prometheus query API.
//!
//! Built on a pooled hyper client that speaks plain HTTP or HTTPS (rustls,
//! webpki roots). Each call is a single GET; the whole exchange (connect,
//! request, body) is bounded by the configured timeout.

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::{ACCEPT, USER_AGENT};
use http::{Method, Request, Uri};
use http_body_util::{BodyExt, Empty};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tracing::debug;

use healx_core::config::BackendConfig;
use healx_core::{DataPoint, Target};

use crate::error::{QueryError, QueryResult};
use crate::response::{QueryData, decode_response};
use crate::source::MetricsSource;

const INSTANT_QUERY_PATH: &str = "/api/v1/query";
const RANGE_QUERY_PATH: &str = "/api/v1/query_range";

/// Idle pooled connections are dropped after this long.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Stateless Prometheus client; cheap to clone.
#[derive(Clone)]
pub struct PrometheusClient {
    client: Client<HttpsConnector<HttpConnector>, Empty<Bytes>>,
    /// Base URL without a trailing slash, e.g. `http://localhost:9090`.
    base: String,
    timeout: Duration,
}

impl PrometheusClient {
    /// Build a client from backend config, validating the URL up front.
    pub fn new(config: &BackendConfig) -> QueryResult<Self> {
        let timeout = config
            .timeout()
            .map_err(|e| QueryError::Config(e.to_string()))?;
        Self::with_timeout(&config.url, timeout)
    }

    pub fn with_timeout(url: &str, timeout: Duration) -> QueryResult<Self> {
        let base = url.trim().trim_end_matches('/').to_string();
        let uri: Uri = base
            .parse()
            .map_err(|e| QueryError::InvalidUrl(format!("{url}: {e}")))?;
        match uri.scheme_str() {
            Some("http" | "https") => {}
            Some(other) => {
                return Err(QueryError::InvalidUrl(format!(
                    "{url}: unsupported scheme {other:?}, expected http or https"
                )));
            }
            None => return Err(QueryError::InvalidUrl(format!("{url}: missing scheme"))),
        }
        if uri.authority().is_none() {
            return Err(QueryError::InvalidUrl(format!("{url}: missing host")));
        }

        let connector = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
            .map_err(|e| QueryError::Config(format!("tls setup: {e}")))?
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .build(connector);

        Ok(Self {
            client,
            base,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// Run an instant query evaluated at `time`.
    pub async fn instant(&self, query: &str, time: DateTime<Utc>) -> QueryResult<QueryData> {
        self.get(INSTANT_QUERY_PATH, &[("query", query.to_string()), ("time", format_time(time))])
            .await
    }

    /// Run a range query over `[start, end]` at `step` resolution.
    pub async fn range(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> QueryResult<QueryData> {
        if step.is_zero() {
            return Err(QueryError::InvalidRange("step must be greater than zero".to_string()));
        }
        if end < start {
            return Err(QueryError::InvalidRange(format!("end {end} is before start {start}")));
        }
        self.get(
            RANGE_QUERY_PATH,
            &[
                ("query", query.to_string()),
                ("start", format_time(start)),
                ("end", format_time(end)),
                ("step", step.as_secs_f64().to_string()),
            ],
        )
        .await
    }

    async fn get(&self, path: &str, params: &[(&str, String)]) -> QueryResult<QueryData> {
        let uri = build_uri(&self.base, path, params)?;
        let req = Request::builder()
            .method(Method::GET)
            .uri(uri.clone())
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, concat!("healx/", env!("CARGO_PKG_VERSION")))
            .body(Empty::<Bytes>::new())
            .map_err(|e| QueryError::Transport(e.to_string()))?;

        let exchange = async {
            let resp = self
                .client
                .request(req)
                .await
                .map_err(|e| QueryError::Transport(e.to_string()))?;
            let status = resp.status();
            let body = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| QueryError::Transport(e.to_string()))?
                .to_bytes();
            Ok::<_, QueryError>((status, body))
        };

        let (status, body) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| QueryError::Timeout(self.timeout))??;

        debug!(%uri, %status, bytes = body.len(), "prometheus query completed");
        decode_response(status, &body)
    }
}

impl MetricsSource for PrometheusClient {
    async fn query_scalar(
        &self,
        target: &Target,
        template: &str,
        time: DateTime<Utc>,
    ) -> QueryResult<f64> {
        let query = render_query(template, target);
        match self.instant(&query, time).await? {
            QueryData::Vector(samples) => match samples.first() {
                Some(sample) => sample.value.value(),
                None => Err(QueryError::NoData),
            },
            other => {
                debug!(result_type = other.result_type(), %query, "expected vector result");
                Err(QueryError::NoData)
            }
        }
    }

    async fn query_range(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> QueryResult<Vec<DataPoint>> {
        let series = match self.range(query, start, end, step).await? {
            QueryData::Matrix(series) => series,
            other => {
                debug!(result_type = other.result_type(), %query, "expected matrix result");
                return Err(QueryError::NoData);
            }
        };
        let Some(first) = series.into_iter().next() else {
            return Err(QueryError::NoData);
        };

        let metric_type = first.metric.get("__name__").cloned().unwrap_or_default();
        let mut points = first
            .values
            .iter()
            .map(|pair| -> QueryResult<DataPoint> {
                Ok(DataPoint {
                    timestamp: pair.timestamp()?,
                    value: pair.value()?,
                    metric_type: metric_type.clone(),
                })
            })
            .collect::<QueryResult<Vec<_>>>()?;
        points.sort_by_key(|p| p.timestamp);
        Ok(points)
    }
}

/// Substitute `{target}` and `{namespace}` in a query template.
pub fn render_query(template: &str, target: &Target) -> String {
    template
        .replace("{target}", &target.name)
        .replace("{namespace}", &target.namespace)
}

fn build_uri(base: &str, path: &str, params: &[(&str, String)]) -> QueryResult<Uri> {
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
        .finish();
    format!("{base}{path}?{query}")
        .parse()
        .map_err(|e| QueryError::InvalidUrl(format!("{base}{path}: {e}")))
}

/// Unix seconds with millisecond precision, as Prometheus expects.
fn format_time(time: DateTime<Utc>) -> String {
    format!("{:.3}", time.timestamp_millis() as f64 / 1000.0)
}
