//! External collaborators of the pipeline.
//!
//! The stages only know these traits. Each has one HTTP implementation in
//! a submodule; tests substitute in-memory fakes.
//!
//! | Trait | Implementation | Backend |
//! |-------|----------------|---------|
//! | [`ArticleSource`] | [`wikipedia::WikipediaSource`] | MediaWiki plain-text extracts |
//! | [`KeywordExtractor`] | [`watson::WatsonKeywordExtractor`] | Watson NLU keyword analysis |
//! | [`KeywordExtractor`] | [`llm::LlmKeywordExtractor`] | any `edgequake-llm` provider |
//! | [`ImageSearch`] | [`google::GoogleImageSearch`] | Google Custom Search (images) |
//! | [`ImageDownloader`] | [`download::HttpImageDownloader`] | plain HTTP GET |

pub mod download;
pub mod google;
pub mod llm;
pub mod watson;
pub mod wikipedia;

use crate::error::ServiceError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Fetches the raw article text for a topic.
#[async_trait]
pub trait ArticleSource: Send + Sync {
    async fn fetch_article(&self, topic: &str) -> Result<String, ServiceError>;
}

/// Extracts keywords from a piece of text, most relevant first.
#[async_trait]
pub trait KeywordExtractor: Send + Sync {
    async fn extract_keywords(&self, text: &str) -> Result<Vec<String>, ServiceError>;
}

/// Searches images for a query. An empty result is not an error.
#[async_trait]
pub trait ImageSearch: Send + Sync {
    async fn search_images(&self, query: &str, limit: usize) -> Result<Vec<String>, ServiceError>;
}

/// Downloads one image.
#[async_trait]
pub trait ImageDownloader: Send + Sync {
    /// Download `url` to `destination`.
    ///
    /// `destination` has no extension; the implementation picks one from the
    /// downloaded content and returns the final path.
    async fn download(&self, url: &str, destination: &Path) -> Result<PathBuf, ServiceError>;
}

/// The collaborators one run needs.
#[derive(Clone)]
pub struct Services {
    pub articles: Arc<dyn ArticleSource>,
    pub keywords: Arc<dyn KeywordExtractor>,
    pub images: Arc<dyn ImageSearch>,
    pub downloader: Arc<dyn ImageDownloader>,
}

/// Shared reqwest client with a per-request timeout.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, ServiceError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("edgequake-videoscript/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ServiceError::Transport(e.to_string()))
}

/// Turn a non-success status into [`ServiceError::Status`].
pub(crate) fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ServiceError::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        })
    }
}
