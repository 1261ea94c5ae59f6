//! Image resolution: candidate search, then deduplicated download.
//!
//! ```text
//! search phase    sentence ──query──▶ ImageSearch ──▶ sentence.images (≤ limit)
//! download phase  for each sentence, candidates in order:
//!                   in ledger?  → Duplicate, next
//!                   download ok → Downloaded, ledger += url, stop
//!                   failure     → Failed, next
//! ```
//!
//! Only the search phase can fail the run. Download failures and duplicates
//! are recorded as [`CandidateOutcome`]s and logged; a sentence that runs out
//! of candidates simply has no image.

use crate::config::ScriptConfig;
use crate::document::{ContentDocument, DownloadLedger, Sentence, Stage};
use crate::error::{CandidateError, ScriptError, ServiceError};
use crate::services::{ImageDownloader, ImageSearch};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// What happened to one image candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CandidateOutcome {
    /// Written to `path`; the URL is now in the ledger.
    Downloaded { path: PathBuf },
    /// An earlier sentence already downloaded this URL.
    Duplicate,
    /// The download failed; the next candidate is tried.
    Failed { error: CandidateError },
}

/// One candidate the download phase looked at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateAttempt {
    pub url: String,
    #[serde(flatten)]
    pub outcome: CandidateOutcome,
}

/// Every attempt made for one sentence, in candidate order.
///
/// Candidates after the downloaded one are never attempted and do not
/// appear here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentenceDownload {
    pub sentence: usize,
    pub attempts: Vec<CandidateAttempt>,
}

impl SentenceDownload {
    /// The attempt that produced the sentence's image, if any.
    pub fn downloaded(&self) -> Option<&CandidateAttempt> {
        self.attempts
            .iter()
            .find(|a| matches!(a.outcome, CandidateOutcome::Downloaded { .. }))
    }

    /// Path of the downloaded image, if any.
    pub fn downloaded_path(&self) -> Option<&Path> {
        self.attempts.iter().find_map(|a| match &a.outcome {
            CandidateOutcome::Downloaded { path } => Some(path.as_path()),
            _ => None,
        })
    }

    pub fn duplicates(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.outcome == CandidateOutcome::Duplicate)
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &CandidateError> {
        self.attempts.iter().filter_map(|a| match &a.outcome {
            CandidateOutcome::Failed { error } => Some(error),
            _ => None,
        })
    }
}

/// Image query for a sentence: the search term plus its first keyword.
///
/// Later keywords are never used; a blank first keyword yields the bare term.
pub fn build_query(search_term: &str, sentence: &Sentence) -> String {
    match sentence.keywords.first().map(|k| k.trim()) {
        Some(keyword) if !keyword.is_empty() => format!("{search_term} {keyword}"),
        _ => search_term.to_string(),
    }
}

// ── Search phase ─────────────────────────────────────────────────────────────

/// Fill `images` and `google_search_query` of every sentence.
pub async fn resolve_image_candidates(
    doc: &mut ContentDocument,
    search: &dyn ImageSearch,
    config: &ScriptConfig,
) -> Result<(), ScriptError> {
    doc.require_ready_for(Stage::ImagesResolved)?;

    let total = doc.sentences().len();
    let limit = config.images_per_sentence;
    let timeout = config.api_timeout();
    let search_term = doc.search_term().to_string();

    info!("Searching images for {} sentences", total);
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_start(Stage::ImagesResolved, total);
    }

    for (idx, sentence) in doc.sentences_mut().iter_mut().enumerate() {
        let query = build_query(&search_term, sentence);
        let result = match tokio::time::timeout(timeout, search.search_images(&query, limit)).await {
            Ok(r) => r,
            Err(_) => Err(ServiceError::Timeout {
                secs: timeout.as_secs(),
            }),
        };
        let mut images = result.map_err(|source| ScriptError::ImageSearch {
            sentence: idx,
            query: query.clone(),
            source,
        })?;
        images.truncate(limit);

        debug!("Sentence {}: query '{}' → {} candidates", idx, query, images.len());
        if let Some(ref cb) = config.progress_callback {
            cb.on_sentence_candidates(idx, total, &query, images.len());
        }
        sentence.images = images;
        sentence.google_search_query = Some(query);
    }

    doc.mark_completed(Stage::ImagesResolved);
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_complete(Stage::ImagesResolved);
    }
    Ok(())
}

// ── Download phase ───────────────────────────────────────────────────────────

/// Download at most one image per sentence, never the same URL twice.
///
/// The ledger is reset on entry, so re-running the phase on the same
/// document starts over.
pub async fn download_all_images(
    doc: &mut ContentDocument,
    downloader: &dyn ImageDownloader,
    config: &ScriptConfig,
) -> Result<Vec<SentenceDownload>, ScriptError> {
    doc.require_ready_for(Stage::ImagesDownloaded)?;
    doc.downloaded_images_mut().clear();
    for sentence in doc.sentences_mut() {
        sentence.downloaded_image = None;
    }

    let total = doc.sentences().len();
    let timeout = config.download_timeout();
    info!("Downloading images for {} sentences", total);
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_start(Stage::ImagesDownloaded, total);
    }

    let mut report = Vec::with_capacity(total);
    for idx in 0..total {
        let candidates = doc.sentences()[idx].images.clone();
        let destination = config.content_dir.join(format!("{idx}-original"));
        let mut attempts = Vec::with_capacity(candidates.len());

        for url in candidates {
            let outcome = try_candidate(
                doc.downloaded_images(),
                downloader,
                idx,
                &url,
                &destination,
                timeout,
            )
            .await;

            match &outcome {
                CandidateOutcome::Downloaded { path } => {
                    info!("Sentence {}: downloaded {} → {}", idx, url, path.display());
                    if let Some(ref cb) = config.progress_callback {
                        cb.on_image_downloaded(idx, &url, path);
                    }
                }
                CandidateOutcome::Duplicate => {
                    debug!("Sentence {}: {} already downloaded, trying next", idx, url);
                    if let Some(ref cb) = config.progress_callback {
                        cb.on_image_duplicate(idx, &url);
                    }
                }
                CandidateOutcome::Failed { error } => {
                    warn!("{}", error);
                    if let Some(ref cb) = config.progress_callback {
                        cb.on_image_failed(idx, &url, &error.to_string());
                    }
                }
            }

            let done = matches!(outcome, CandidateOutcome::Downloaded { .. });
            if done {
                doc.downloaded_images_mut().insert(url.clone());
                doc.sentences_mut()[idx].downloaded_image = Some(url.clone());
            }
            attempts.push(CandidateAttempt { url, outcome });
            if done {
                break;
            }
        }

        let entry = SentenceDownload {
            sentence: idx,
            attempts,
        };
        if entry.downloaded().is_none() {
            warn!("Sentence {}: no image downloaded", idx);
            if let Some(ref cb) = config.progress_callback {
                cb.on_sentence_without_image(idx);
            }
        }
        report.push(entry);
    }

    doc.mark_completed(Stage::ImagesDownloaded);
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_complete(Stage::ImagesDownloaded);
    }
    Ok(report)
}

async fn try_candidate(
    ledger: &DownloadLedger,
    downloader: &dyn ImageDownloader,
    idx: usize,
    url: &str,
    destination: &Path,
    timeout: Duration,
) -> CandidateOutcome {
    if ledger.contains(url) {
        return CandidateOutcome::Duplicate;
    }
    match tokio::time::timeout(timeout, downloader.download(url, destination)).await {
        Ok(Ok(path)) => CandidateOutcome::Downloaded { path },
        Ok(Err(e)) => CandidateOutcome::Failed {
            error: CandidateError::from_service(idx, url, e),
        },
        Err(_) => CandidateOutcome::Failed {
            error: CandidateError::Timeout {
                sentence: idx,
                url: url.to_string(),
                secs: timeout.as_secs(),
            },
        },
    }
}
