//! Flickr `flickr.photos.search` client.
//!
//! Implements [`SearchApi`] over the Flickr REST endpoint. Each call is a
//! single `GET`; retries live in [`crate::retry`], not here.
//!
//! Failure classification:
//! - HTTP 429 or 5xx → transient
//! - network error or timeout → transient
//! - other HTTP 4xx → rejected
//! - `{"stat": "fail"}` → rejected (bad key, invalid parameter)
//! - body that is not the expected JSON shape → malformed (treated as transient)

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use geoharvest_core::api::{SearchApi, SearchPage, SearchRequest};
use geoharvest_core::models::Record;
use geoharvest_core::{HarvestError, Result};
use serde_json::Value;
use std::time::Duration;

use crate::config::ApiConfig;

const SEARCH_METHOD: &str = "flickr.photos.search";
const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct FlickrApi {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl FlickrApi {
    /// Build a client from the `[api]` section, reading the key from the
    /// environment variable it names.
    pub fn from_config(config: &ApiConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow!("{} not set", config.api_key_env))?;
        Self::new(&config.endpoint, api_key, config.timeout_secs)
    }

    pub fn new(endpoint: &str, api_key: String, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key,
        })
    }

    fn query_params(&self, request: &SearchRequest<'_>) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = vec![
            ("method".into(), SEARCH_METHOD.into()),
            ("api_key".into(), self.api_key.clone()),
            ("format".into(), "json".into()),
            ("nojsoncallback".into(), "1".into()),
            ("bbox".into(), request.bbox.to_query_param()),
            (
                "min_taken_date".into(),
                request.window.start.format(DATE_FORMAT).to_string(),
            ),
            (
                "max_taken_date".into(),
                request.window.end.format(DATE_FORMAT).to_string(),
            ),
            ("page".into(), request.page.to_string()),
            ("per_page".into(), request.page_size.to_string()),
        ];
        for (key, value) in request.filters.iter() {
            params.push((key.to_string(), value.to_string()));
        }
        params
    }
}

#[async_trait]
impl SearchApi for FlickrApi {
    fn name(&self) -> &str {
        "flickr"
    }

    async fn search(&self, request: &SearchRequest<'_>) -> Result<SearchPage> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&self.query_params(request))
            .send()
            .await
            .map_err(|e| HarvestError::transient(format!("request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| HarvestError::malformed(format!("invalid JSON body: {}", e)))?;
        parse_search_response(&json)
    }
}

/// Map a non-success HTTP status to an error. Rate limiting and server
/// errors are worth retrying; any other status means the request itself
/// is wrong.
pub fn status_error(status: reqwest::StatusCode, body: &str) -> HarvestError {
    let msg = format!("Flickr API error {}: {}", status, body);
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        HarvestError::transient(msg)
    } else {
        HarvestError::rejected(msg)
    }
}

/// Parse a `flickr.photos.search` JSON response body.
pub fn parse_search_response(json: &Value) -> Result<SearchPage> {
    match json.get("stat").and_then(|s| s.as_str()) {
        Some("ok") => {}
        Some("fail") => {
            let code = json.get("code").map(|c| c.to_string()).unwrap_or_default();
            let message = json
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("no message");
            return Err(HarvestError::rejected(format!(
                "Flickr stat=fail (code {}): {}",
                code, message
            )));
        }
        _ => return Err(HarvestError::malformed("missing or unknown stat")),
    }

    let photos = json
        .get("photos")
        .ok_or_else(|| HarvestError::malformed("missing photos object"))?;

    let total = match photos.get("total") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
    .ok_or_else(|| HarvestError::malformed("missing or non-numeric photos.total"))?;

    let rows = match photos.get("photo") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                Record::from_value(item.clone())
                    .ok_or_else(|| HarvestError::malformed("photo entry is not an object"))
            })
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
        Some(_) => return Err(HarvestError::malformed("photos.photo is not an array")),
    };

    Ok(SearchPage { total, rows })
}
