//! Prometheus HTTP API response envelope.
//!
//! ```json
//! {"status":"success","data":{"resultType":"vector","result":[...]},"warnings":[...]}
//! {"status":"error","errorType":"bad_data","error":"parse error ..."}
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::Deserialize;
use tracing::warn;

use crate::error::{QueryError, QueryResult};

/// Error bodies longer than this are cut before landing in a `QueryError`.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    #[serde(default)]
    pub data: Option<QueryData>,
    #[serde(rename = "errorType", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Typed query result, discriminated by `resultType`.
#[derive(Debug, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
pub enum QueryData {
    Vector(Vec<InstantSample>),
    Matrix(Vec<RangeSeries>),
    Scalar(SamplePair),
    String(SamplePair),
}

impl QueryData {
    pub fn result_type(&self) -> &'static str {
        match self {
            QueryData::Vector(_) => "vector",
            QueryData::Matrix(_) => "matrix",
            QueryData::Scalar(_) => "scalar",
            QueryData::String(_) => "string",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InstantSample {
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    pub value: SamplePair,
}

#[derive(Debug, Deserialize)]
pub struct RangeSeries {
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    #[serde(default)]
    pub values: Vec<SamplePair>,
}

/// `[<unix seconds>, "<value>"]`. Values are strings so `NaN` and `+Inf` survive JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct SamplePair(pub f64, pub String);

impl SamplePair {
    pub fn value(&self) -> QueryResult<f64> {
        self.1
            .parse::<f64>()
            .map_err(|e| QueryError::Decode(format!("sample value {:?}: {e}", self.1)))
    }

    pub fn timestamp(&self) -> QueryResult<DateTime<Utc>> {
        DateTime::from_timestamp_millis((self.0 * 1000.0).round() as i64)
            .ok_or_else(|| QueryError::Decode(format!("sample timestamp {} out of range", self.0)))
    }
}

/// Turn a raw HTTP exchange into query data, surfacing warnings as logs.
pub fn decode_response(status: StatusCode, body: &[u8]) -> QueryResult<QueryData> {
    let parsed: ApiResponse = match serde_json::from_slice(body) {
        Ok(parsed) => parsed,
        Err(e) if status.is_success() => return Err(QueryError::Decode(e.to_string())),
        Err(_) => {
            return Err(QueryError::Status {
                status: status.as_u16(),
                body: truncate(body),
            });
        }
    };

    for warning in &parsed.warnings {
        warn!(%warning, "prometheus returned a warning");
    }

    if parsed.status == "error" {
        return Err(QueryError::Backend {
            error_type: parsed.error_type.unwrap_or_else(|| "unknown".to_string()),
            message: parsed.error.unwrap_or_default(),
        });
    }
    if !status.is_success() {
        return Err(QueryError::Status {
            status: status.as_u16(),
            body: truncate(body),
        });
    }

    parsed
        .data
        .ok_or_else(|| QueryError::Decode("success response without data".to_string()))
}

fn truncate(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    match text.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.into_owned(),
    }
}
