//! The content document: the single mutable unit of work of one run.
//!
//! A [`ContentDocument`] is created once per run from a search term and a
//! sentence cap, then threaded by `&mut` reference through every stage. All
//! fields are declared upfront; the ones produced by later stages stay empty
//! (or `None`) until their stage runs. [`Stage`] records the last completed
//! stage so preconditions can be checked and a persisted document resumed.
//!
//! The JSON shape (camelCase field names) is what [`crate::store`] persists.

use crate::error::ScriptError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stages in execution order.
///
/// The derived ordering is the execution order, so `a < b` means `a` runs
/// before `b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Document exists with a search term and a sentence cap.
    #[default]
    Created,
    /// `sourceContentOriginal` is populated.
    Fetched,
    /// `sourceContentSanitized` is populated.
    Sanitized,
    /// `sentences` is populated and capped.
    Segmented,
    /// Every sentence has its keywords.
    KeywordsExtracted,
    /// Every sentence has its image candidates and search query.
    ImagesResolved,
    /// The download phase has run; `downloadedImages` is final.
    ImagesDownloaded,
}

impl Stage {
    /// Short, stable name used in logs and error messages.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Created => "create",
            Stage::Fetched => "fetch",
            Stage::Sanitized => "sanitize",
            Stage::Segmented => "segment",
            Stage::KeywordsExtracted => "keywords",
            Stage::ImagesResolved => "image-search",
            Stage::ImagesDownloaded => "image-download",
        }
    }

    /// The stage that must have completed before this one can run.
    pub fn prerequisite(self) -> Option<Stage> {
        match self {
            Stage::Created => None,
            Stage::Fetched => Some(Stage::Created),
            Stage::Sanitized => Some(Stage::Fetched),
            Stage::Segmented => Some(Stage::Sanitized),
            Stage::KeywordsExtracted => Some(Stage::Segmented),
            Stage::ImagesResolved => Some(Stage::KeywordsExtracted),
            Stage::ImagesDownloaded => Some(Stage::ImagesResolved),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One sentence of the script with its enrichment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sentence {
    /// Sentence text, as produced by the segmenter.
    pub text: String,
    /// Keywords in the order the keyword service returned them.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Candidate image URLs in the order the image search returned them.
    #[serde(default)]
    pub images: Vec<String>,
    /// The exact query used to obtain `images`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_search_query: Option<String>,
    /// The candidate the download phase fetched for this sentence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloaded_image: Option<String>,
}

impl Sentence {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// URL of the image downloaded for this sentence, if any.
    ///
    /// A candidate skipped as a duplicate belongs to an earlier sentence and
    /// is never reported here.
    pub fn downloaded_image(&self) -> Option<&str> {
        self.downloaded_image.as_deref()
    }
}

/// Run-scoped set of successfully downloaded image URLs.
///
/// Keeps insertion order so the persisted document reads in download order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadLedger(Vec<String>);

impl DownloadLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.0.iter().any(|u| u == url)
    }

    /// Insert `url` unless it is already present. Returns `true` if inserted.
    pub fn insert(&mut self, url: impl Into<String>) -> bool {
        let url = url.into();
        if self.contains(&url) {
            return false;
        }
        self.0.push(url);
        true
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// State of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentDocument {
    search_term: String,
    maximum_sentences: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_content_original: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_content_sanitized: Option<String>,
    #[serde(default)]
    sentences: Vec<Sentence>,
    #[serde(default)]
    downloaded_images: DownloadLedger,
    #[serde(default)]
    stage: Stage,
}

impl ContentDocument {
    /// Create a fresh document for `search_term`, capped at `maximum_sentences`.
    pub fn new(search_term: impl Into<String>, maximum_sentences: usize) -> Self {
        Self {
            search_term: search_term.into(),
            maximum_sentences,
            source_content_original: None,
            source_content_sanitized: None,
            sentences: Vec::new(),
            downloaded_images: DownloadLedger::new(),
            stage: Stage::Created,
        }
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn maximum_sentences(&self) -> usize {
        self.maximum_sentences
    }

    pub fn source_content_original(&self) -> Option<&str> {
        self.source_content_original.as_deref()
    }

    pub fn source_content_sanitized(&self) -> Option<&str> {
        self.source_content_sanitized.as_deref()
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    pub fn downloaded_images(&self) -> &DownloadLedger {
        &self.downloaded_images
    }

    /// Last completed stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Fail with [`ScriptError::StageOrder`] unless `stage` may run now.
    ///
    /// Every stage runs exactly once, right after its prerequisite. The
    /// download phase is the exception: it may be re-run, since it resets
    /// the ledger on entry.
    pub fn require_ready_for(&self, stage: Stage) -> Result<(), ScriptError> {
        let Some(required) = stage.prerequisite() else {
            return Ok(());
        };
        let ready = self.stage == required
            || (stage == Stage::ImagesDownloaded && self.stage == Stage::ImagesDownloaded);
        if ready {
            Ok(())
        } else {
            Err(ScriptError::StageOrder {
                stage,
                required,
                found: self.stage,
            })
        }
    }

    /// Check the invariants a loaded document must satisfy before it can be
    /// resumed. Returns a description of the first violation.
    ///
    /// - `sentences` holds at most `maximumSentences` entries.
    /// - `downloadedImages` has no repeated URL.
    /// - Every field produced by a completed stage is populated.
    /// - A sentence's downloaded image is one of its candidates and is in
    ///   the ledger.
    pub fn validate(&self) -> Result<(), String> {
        if self.sentences.len() > self.maximum_sentences {
            return Err(format!(
                "{} sentences exceed maximumSentences {}",
                self.sentences.len(),
                self.maximum_sentences
            ));
        }

        let mut seen = std::collections::HashSet::new();
        if let Some(url) = self.downloaded_images.iter().find(|url| !seen.insert(*url)) {
            return Err(format!("downloadedImages lists '{url}' more than once"));
        }

        if self.stage >= Stage::Fetched && self.source_content_original.is_none() {
            return Err(format!("stage '{}' without sourceContentOriginal", self.stage));
        }
        if self.stage >= Stage::Sanitized && self.source_content_sanitized.is_none() {
            return Err(format!("stage '{}' without sourceContentSanitized", self.stage));
        }
        if self.stage < Stage::Segmented && !self.sentences.is_empty() {
            return Err(format!("stage '{}' with sentences", self.stage));
        }
        if self.stage < Stage::ImagesDownloaded && !self.downloaded_images.is_empty() {
            return Err(format!("stage '{}' with downloadedImages", self.stage));
        }

        for (idx, sentence) in self.sentences.iter().enumerate() {
            if self.stage >= Stage::ImagesResolved && sentence.google_search_query.is_none() {
                return Err(format!("sentence {idx} has no googleSearchQuery"));
            }
            if let Some(ref url) = sentence.downloaded_image {
                if !sentence.images.contains(url) || !self.downloaded_images.contains(url) {
                    return Err(format!(
                        "sentence {idx} downloadedImage '{url}' is not a recorded download"
                    ));
                }
            }
        }
        Ok(())
    }

    // ── Stage mutators (crate-internal) ──────────────────────────────────

    pub(crate) fn set_source_content_original(&mut self, text: String) {
        self.source_content_original = Some(text);
        self.stage = Stage::Fetched;
    }

    pub(crate) fn set_source_content_sanitized(&mut self, text: String) {
        self.source_content_sanitized = Some(text);
        self.stage = Stage::Sanitized;
    }

    pub(crate) fn set_sentences(&mut self, mut sentences: Vec<Sentence>) {
        sentences.truncate(self.maximum_sentences);
        self.sentences = sentences;
        self.stage = Stage::Segmented;
    }

    pub(crate) fn sentences_mut(&mut self) -> &mut [Sentence] {
        &mut self.sentences
    }

    pub(crate) fn downloaded_images_mut(&mut self) -> &mut DownloadLedger {
        &mut self.downloaded_images
    }

    pub(crate) fn mark_completed(&mut self, stage: Stage) {
        self.stage = stage;
    }

    /// Build a document that already went through the text stages.
    #[cfg(test)]
    pub(crate) fn with_sentences(search_term: &str, sentences: Vec<Sentence>) -> Self {
        let mut doc = Self::new(search_term, sentences.len());
        doc.set_source_content_original(String::new());
        doc.set_source_content_sanitized(String::new());
        doc.set_sentences(sentences);
        doc.mark_completed(Stage::KeywordsExtracted);
        doc
    }
}
