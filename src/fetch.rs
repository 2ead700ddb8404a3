//! Raw telemetry retrieval.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::output::sanitize_time;

/// Name of the query the telemetry service exposes per-vehicle data under.
const QUERY_IDENTIFY: &str = "sci_vin_detail_data_out";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// One fetch request: a subject (vehicle VIN), a time window written as
/// `YYYY-MM-DD HH:MM:SS`, and a data type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    pub subject: String,
    pub start: String,
    pub end: String,
    pub data_type: String,
}

pub trait DataFetcher {
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<Value>>;
}

/// Split `YYYY-MM-DD HH:MM:SS` into its date and time parts.
fn split_datetime(value: &str) -> Result<(&str, &str)> {
    match value.trim().split_once(' ') {
        Some((date, time)) if !date.is_empty() && !time.trim().is_empty() => {
            Ok((date, time.trim()))
        }
        _ => bail!("expected 'YYYY-MM-DD HH:MM:SS', got '{}'", value),
    }
}

/// Build the query body the telemetry service expects.
pub fn request_body(request: &FetchRequest) -> Result<Value> {
    let (start_date, start_time) = split_datetime(&request.start)?;
    let (end_date, end_time) = split_datetime(&request.end)?;
    Ok(json!({
        "identify": QUERY_IDENTIFY,
        "param": {
            "type": request.data_type,
            "start_date": start_date,
            "start_time": start_time,
            "end_date": end_date,
            "end_time": end_time,
            "vin": request.subject,
        }
    }))
}

#[derive(Debug, Deserialize, Serialize)]
struct QueryResponse {
    #[serde(default)]
    data: Option<Vec<Value>>,
}

/// Fetches records from the telemetry query service over HTTP.
pub struct HttpFetcher {
    client: Client,
    endpoint: String,
}

impl HttpFetcher {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(HttpFetcher {
            client,
            endpoint: endpoint.into(),
        })
    }
}

impl DataFetcher for HttpFetcher {
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<Value>> {
        let body = request_body(request)?;
        tracing::debug!("POST {} {}", self.endpoint, body);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .with_context(|| format!("Request to {} failed", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            bail!(
                "HTTP {} from {}: {}",
                status,
                self.endpoint,
                response.text().unwrap_or_default()
            );
        }

        let parsed: QueryResponse = response
            .json()
            .context("Failed to decode query response")?;
        Ok(parsed.data.unwrap_or_default())
    }
}

/// Read a JSON file of records. An object is one record, an array is many.
pub fn load_json_records(path: &Path) -> Result<Vec<Value>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(match value {
        Value::Array(items) => items,
        other => vec![other],
    })
}

/// Serves previously downloaded data from a directory, one file per request
/// named `<subject>_<type>_<start>_<end>.json`.
pub struct FileFetcher {
    dir: PathBuf,
}

impl FileFetcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileFetcher { dir: dir.into() }
    }

    pub fn path_for(&self, request: &FetchRequest) -> PathBuf {
        self.dir.join(format!(
            "{}_{}_{}_{}.json",
            request.subject,
            request.data_type,
            sanitize_time(&request.start),
            sanitize_time(&request.end)
        ))
    }
}

impl DataFetcher for FileFetcher {
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<Value>> {
        load_json_records(&self.path_for(request))
    }
}
