//! Error types for the edgequake-videoscript library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`ScriptError`] is **fatal**: the run cannot proceed (article not found,
//!   keyword service down, a stage invoked out of order). Returned as
//!   `Err(ScriptError)` from the orchestrator and every stage function.
//!
//! * [`ServiceError`] is what an external collaborator reports. The pipeline
//!   wraps it in a [`ScriptError`] when the failing call is load-bearing, or
//!   downgrades it to a [`CandidateError`] when only one image candidate is
//!   affected.
//!
//! * [`CandidateError`] is **non-fatal**: one image candidate could not be
//!   downloaded. Stored inside [`crate::pipeline::images::CandidateOutcome`]
//!   so the caller can inspect every attempt after the run.

use crate::document::Stage;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-videoscript library.
#[derive(Debug, Error)]
pub enum ScriptError {
    // ── Stage errors ──────────────────────────────────────────────────────
    /// A stage was invoked before its prerequisite stage completed.
    #[error("Cannot run stage '{stage}': requires '{required}' but document is at '{found}'")]
    StageOrder {
        stage: Stage,
        required: Stage,
        found: Stage,
    },

    /// The article source failed for the search term.
    #[error("Failed to fetch article for '{topic}': {source}")]
    ArticleFetch {
        topic: String,
        #[source]
        source: ServiceError,
    },

    /// The keyword service failed for one sentence; keywords are load-bearing
    /// for the image search so the whole run stops.
    #[error("Keyword extraction failed for sentence {sentence}: {source}")]
    KeywordExtraction {
        sentence: usize,
        #[source]
        source: ServiceError,
    },

    /// The image search service failed for one sentence.
    #[error("Image search failed for sentence {sentence} (query '{query}'): {source}")]
    ImageSearch {
        sentence: usize,
        query: String,
        #[source]
        source: ServiceError,
    },

    // ── Store errors ──────────────────────────────────────────────────────
    /// The state file could not be read or written.
    #[error("Document store I/O failed at '{path}': {source}")]
    StoreIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The store holds something that is not a valid document.
    #[error("Saved document{} is corrupt: {detail}", .path.as_ref().map(|p| format!(" at '{}'", p.display())).unwrap_or_default())]
    StoreFormat { path: Option<PathBuf>, detail: String },

    /// `load()` was called on a store that has never been saved to.
    #[error("No saved document found{}", .path.as_ref().map(|p| format!(" at '{}'", p.display())).unwrap_or_default())]
    NoSavedDocument { path: Option<PathBuf> },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A collaborator needs a credential that is not set.
    #[error("{service} is not configured: set {var}")]
    MissingCredentials { service: String, var: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScriptError {
    /// The pipeline stage that raised the error, when there is one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ScriptError::StageOrder { stage, .. } => Some(*stage),
            ScriptError::ArticleFetch { .. } => Some(Stage::Fetched),
            ScriptError::KeywordExtraction { .. } => Some(Stage::KeywordsExtracted),
            ScriptError::ImageSearch { .. } => Some(Stage::ImagesResolved),
            _ => None,
        }
    }
}

/// A failure reported by an external collaborator.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The requested resource does not exist (unknown article, 404).
    #[error("not found: {what}")]
    NotFound { what: String },

    /// The service answered with a non-success HTTP status.
    #[error("HTTP {status} from '{url}'")]
    Status { status: u16, url: String },

    /// Connection, TLS or body-read failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The call did not finish within the configured timeout.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Writing a downloaded file failed.
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ServiceError {
    /// Map a reqwest error, keeping timeouts distinguishable.
    pub fn from_reqwest(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            ServiceError::Timeout { secs: timeout_secs }
        } else if err.is_decode() {
            ServiceError::InvalidResponse(err.to_string())
        } else {
            ServiceError::Transport(err.to_string())
        }
    }
}

/// A non-fatal error for a single image candidate.
///
/// The download phase records it and moves on to the next candidate.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum CandidateError {
    /// Download failed (transport, HTTP status, not an image, write error).
    #[error("Sentence {sentence}: download of '{url}' failed: {detail}")]
    DownloadFailed {
        sentence: usize,
        url: String,
        detail: String,
    },

    /// Download timed out.
    #[error("Sentence {sentence}: download of '{url}' timed out after {secs}s")]
    Timeout {
        sentence: usize,
        url: String,
        secs: u64,
    },
}

impl CandidateError {
    /// Downgrade a collaborator failure to a per-candidate error.
    pub fn from_service(sentence: usize, url: &str, err: ServiceError) -> Self {
        match err {
            ServiceError::Timeout { secs } => CandidateError::Timeout {
                sentence,
                url: url.to_string(),
                secs,
            },
            other => CandidateError::DownloadFailed {
                sentence,
                url: url.to_string(),
                detail: other.to_string(),
            },
        }
    }
}
