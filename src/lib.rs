//! # edgequake-videoscript
//!
//! Turn a search term into an illustrated video script: an encyclopedia
//! article reduced to a bounded list of clean sentences, each annotated with
//! keywords and backed by one locally downloaded, deduplicated image.
//!
//! ## Pipeline Overview
//!
//! ```text
//! search term
//!  │
//!  ├─ 1. Fetch     raw article text (Wikipedia)
//!  ├─ 2. Sanitize  drop headings, blank lines, parentheticals
//!  ├─ 3. Segment   sentences, capped at maximumSentences
//!  ├─ 4. Keywords  per sentence (Watson NLU or any LLM)     ── save
//!  ├─ 5. Search    image candidates per sentence (Google)
//!  └─ 6. Download  first usable candidate, never a URL twice ── save
//! ```
//!
//! Every external service sits behind a trait in [`services`], so the
//! pipeline runs equally against the HTTP implementations or test fakes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_videoscript::services::{
//!     download::HttpImageDownloader, google::GoogleImageSearch,
//!     watson::WatsonKeywordExtractor, wikipedia::WikipediaSource,
//! };
//! use edgequake_videoscript::{run_pipeline, ContentDocument, JsonFileStore, ScriptConfig, Services};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ScriptConfig::default();
//!     let services = Services {
//!         articles: Arc::new(WikipediaSource::new("en", config.api_timeout())?),
//!         keywords: Arc::new(WatsonKeywordExtractor::from_env(config.api_timeout())?),
//!         images: Arc::new(GoogleImageSearch::from_env(config.api_timeout())?),
//!         downloader: Arc::new(HttpImageDownloader::new(config.download_timeout())?),
//!     };
//!     let store = JsonFileStore::new("content/content.json");
//!
//!     let doc = ContentDocument::new("Rio de Janeiro", 7);
//!     let output = run_pipeline(doc, &services, &store, &config).await?;
//!     eprintln!("{}/{} sentences illustrated", output.stats.downloaded, output.stats.sentences);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `videoscript` binary (clap + anyhow + indicatif + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod run;
pub mod services;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ScriptConfig, ScriptConfigBuilder};
pub use document::{ContentDocument, DownloadLedger, Sentence, Stage};
pub use error::{CandidateError, ScriptError, ServiceError};
pub use pipeline::images::{CandidateAttempt, CandidateOutcome, SentenceDownload};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use run::{resume, run_image_stages, run_pipeline, run_text_stages, RunOutput, RunStats};
pub use services::{ArticleSource, ImageDownloader, ImageSearch, KeywordExtractor, Services};
pub use store::{DocumentStore, JsonFileStore, MemoryStore};
