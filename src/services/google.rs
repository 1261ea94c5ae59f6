//! Image search backed by the Google Custom Search JSON API.

use super::{check_status, http_client, ImageSearch};
use crate::error::{ScriptError, ServiceError};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Environment variable holding the Custom Search API key.
pub const API_KEY_VAR: &str = "GOOGLE_SEARCH_API_KEY";

/// Environment variable holding the programmable search engine id (`cx`).
pub const ENGINE_ID_VAR: &str = "GOOGLE_SEARCH_ENGINE_ID";

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";

/// The API never returns more than 10 results per request.
const MAX_RESULTS: usize = 10;

pub struct GoogleImageSearch {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    engine_id: String,
    timeout_secs: u64,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    link: String,
}

impl GoogleImageSearch {
    pub fn new(
        api_key: impl Into<String>,
        engine_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        Self::with_base_url(DEFAULT_BASE_URL, api_key, engine_id, timeout)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        engine_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            engine_id: engine_id.into(),
            timeout_secs: timeout.as_secs(),
        })
    }

    /// Build from `GOOGLE_SEARCH_API_KEY` and `GOOGLE_SEARCH_ENGINE_ID`.
    pub fn from_env(timeout: Duration) -> Result<Self, ScriptError> {
        let api_key = require_env(API_KEY_VAR)?;
        let engine_id = require_env(ENGINE_ID_VAR)?;
        Self::new(api_key, engine_id, timeout).map_err(|e| ScriptError::Internal(e.to_string()))
    }
}

fn require_env(var: &str) -> Result<String, ScriptError> {
    match std::env::var(var) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(ScriptError::MissingCredentials {
            service: "Google Custom Search".into(),
            var: var.into(),
        }),
    }
}

#[async_trait]
impl ImageSearch for GoogleImageSearch {
    async fn search_images(&self, query: &str, limit: usize) -> Result<Vec<String>, ServiceError> {
        let limit = limit.clamp(1, MAX_RESULTS);
        let url = format!("{}/customsearch/v1", self.base_url);
        let num = limit.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
                ("searchType", "image"),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ServiceError::from_reqwest(e, self.timeout_secs))?;

        let body: SearchResponse = check_status(response)?
            .json()
            .await
            .map_err(|e| ServiceError::from_reqwest(e, self.timeout_secs))?;

        let links: Vec<String> = body.items.into_iter().map(|item| item.link).take(limit).collect();
        debug!("Image search '{}': {} results", query, links.len());
        Ok(links)
    }
}
