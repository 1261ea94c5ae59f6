//! Article source backed by the MediaWiki API.
//!
//! Requests the plain-text extract of the whole page (`explaintext=1`),
//! following redirects so that e.g. "Rio" resolves to the canonical title.
//! Plain-text extracts keep section headings as `== Heading ==` lines; the
//! sanitizer removes them.

use super::{check_status, http_client, ArticleSource};
use crate::error::ServiceError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// Fetches article text from a Wikipedia language edition.
pub struct WikipediaSource {
    client: reqwest::Client,
    base_url: String,
    timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    query: Option<QueryPages>,
}

#[derive(Debug, Deserialize)]
struct QueryPages {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    title: String,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    invalid: bool,
    extract: Option<String>,
}

impl WikipediaSource {
    /// Source for the `language` edition, e.g. `en` or `pt`.
    pub fn new(language: &str, timeout: Duration) -> Result<Self, ServiceError> {
        Self::with_base_url(format!("https://{language}.wikipedia.org"), timeout)
    }

    /// Source for an arbitrary MediaWiki installation (or a mock server).
    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout_secs: timeout.as_secs(),
        })
    }
}

#[async_trait]
impl ArticleSource for WikipediaSource {
    async fn fetch_article(&self, topic: &str) -> Result<String, ServiceError> {
        let url = format!("{}/w/api.php", self.base_url);
        info!("Fetching article '{}' from {}", topic, self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("formatversion", "2"),
                ("prop", "extracts"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("titles", topic),
            ])
            .send()
            .await
            .map_err(|e| ServiceError::from_reqwest(e, self.timeout_secs))?;

        let body: QueryResponse = check_status(response)?
            .json()
            .await
            .map_err(|e| ServiceError::from_reqwest(e, self.timeout_secs))?;

        let page = body
            .query
            .and_then(|q| q.pages.into_iter().next())
            .ok_or_else(|| ServiceError::InvalidResponse("response has no pages".into()))?;

        if page.missing || page.invalid {
            return Err(ServiceError::NotFound {
                what: format!("article '{}'", page.title),
            });
        }

        let extract = page.extract.unwrap_or_default();
        if extract.trim().is_empty() {
            return Err(ServiceError::NotFound {
                what: format!("text of article '{}'", page.title),
            });
        }

        debug!("Article '{}': {} bytes", page.title, extract.len());
        Ok(extract)
    }
}
