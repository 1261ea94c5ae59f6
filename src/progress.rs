//! Progress-callback trait for stage and per-sentence pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::ScriptConfigBuilder::progress_callback`] to receive
//! events as the pipeline walks the document: stage boundaries, keywords per
//! sentence, image candidates per sentence, and the outcome of every
//! download attempt.
//!
//! Recoverable image failures are reported here (and logged) but never
//! propagated, so a callback is the place to surface them to a user.
//!
//! # Example
//!
//! ```rust
//! use edgequake_videoscript::{PipelineProgressCallback, ScriptConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct FailureCounter {
//!     failed: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for FailureCounter {
//!     fn on_image_failed(&self, sentence: usize, url: &str, error: &str) {
//!         self.failed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("sentence {sentence}: {url} failed: {error}");
//!     }
//! }
//!
//! let counter = Arc::new(FailureCounter { failed: AtomicUsize::new(0) });
//!
//! let config = ScriptConfig::builder()
//!     .progress_callback(counter as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::document::Stage;
use crate::run::RunStats;
use std::path::Path;
use std::sync::Arc;

/// Called by the pipeline as it processes the document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Events arrive in document order.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called when a stage starts.
    ///
    /// # Arguments
    /// * `stage`: the stage about to run
    /// * `units`: sentences the stage will visit (0 for whole-text stages)
    fn on_stage_start(&self, stage: Stage, units: usize) {
        let _ = (stage, units);
    }

    /// Called when a stage completes successfully.
    fn on_stage_complete(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called after a sentence received its keywords.
    fn on_sentence_keywords(&self, sentence: usize, total: usize, keywords: &[String]) {
        let _ = (sentence, total, keywords);
    }

    /// Called after a sentence received its image candidates.
    fn on_sentence_candidates(&self, sentence: usize, total: usize, query: &str, candidates: usize) {
        let _ = (sentence, total, query, candidates);
    }

    /// Called when a candidate downloads successfully.
    fn on_image_downloaded(&self, sentence: usize, url: &str, path: &Path) {
        let _ = (sentence, url, path);
    }

    /// Called when a candidate is skipped because an earlier sentence
    /// already downloaded it.
    fn on_image_duplicate(&self, sentence: usize, url: &str) {
        let _ = (sentence, url);
    }

    /// Called when a candidate download fails.
    fn on_image_failed(&self, sentence: usize, url: &str, error: &str) {
        let _ = (sentence, url, error);
    }

    /// Called when a sentence exhausted its candidates without an image.
    fn on_sentence_without_image(&self, sentence: usize) {
        let _ = sentence;
    }

    /// Called once after the image stages complete.
    fn on_run_complete(&self, stats: &RunStats) {
        let _ = stats;
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ScriptConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
