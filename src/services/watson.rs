//! Keyword extraction backed by IBM Watson Natural Language Understanding.
//!
//! Only the `keywords` feature is requested. Watson returns keywords sorted
//! by relevance; that order is kept as-is.

use super::{check_status, http_client, KeywordExtractor};
use crate::error::{ScriptError, ServiceError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// API version pinned for the `analyze` endpoint.
pub const NLU_API_VERSION: &str = "2018-04-05";

/// Environment variable holding the NLU API key.
pub const API_KEY_VAR: &str = "WATSON_NLU_API_KEY";

/// Environment variable holding the NLU service instance URL.
pub const URL_VAR: &str = "WATSON_NLU_URL";

pub struct WatsonKeywordExtractor {
    client: reqwest::Client,
    service_url: String,
    api_key: String,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    text: &'a str,
    features: Features,
}

#[derive(Serialize)]
struct Features {
    keywords: KeywordOptions,
}

#[derive(Serialize, Default)]
struct KeywordOptions {}

#[derive(Deserialize)]
struct AnalyzeResponse {
    #[serde(default)]
    keywords: Vec<Keyword>,
}

#[derive(Deserialize)]
struct Keyword {
    text: String,
}

impl WatsonKeywordExtractor {
    pub fn new(
        service_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            client: http_client(timeout)?,
            service_url: service_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout_secs: timeout.as_secs(),
        })
    }

    /// Build from `WATSON_NLU_API_KEY` and `WATSON_NLU_URL`.
    pub fn from_env(timeout: Duration) -> Result<Self, ScriptError> {
        let api_key = require_env(API_KEY_VAR)?;
        let url = require_env(URL_VAR)?;
        Self::new(url, api_key, timeout).map_err(|e| ScriptError::Internal(e.to_string()))
    }
}

fn require_env(var: &str) -> Result<String, ScriptError> {
    match std::env::var(var) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(ScriptError::MissingCredentials {
            service: "Watson NLU".into(),
            var: var.into(),
        }),
    }
}

#[async_trait]
impl KeywordExtractor for WatsonKeywordExtractor {
    async fn extract_keywords(&self, text: &str) -> Result<Vec<String>, ServiceError> {
        let url = format!("{}/v1/analyze", self.service_url);
        let request = AnalyzeRequest {
            text,
            features: Features {
                keywords: KeywordOptions::default(),
            },
        };

        let response = self
            .client
            .post(&url)
            .query(&[("version", NLU_API_VERSION)])
            .basic_auth("apikey", Some(&self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| ServiceError::from_reqwest(e, self.timeout_secs))?;

        let body: AnalyzeResponse = check_status(response)?
            .json()
            .await
            .map_err(|e| ServiceError::from_reqwest(e, self.timeout_secs))?;

        let keywords: Vec<String> = body.keywords.into_iter().map(|k| k.text).collect();
        debug!("Watson returned {} keywords", keywords.len());
        Ok(keywords)
    }
}
