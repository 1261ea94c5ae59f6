//! Orchestration of a full run.
//!
//! ```text
//! fetch ─▶ sanitize ─▶ segment ─▶ keywords ─▶ [save] ─▶ search ─▶ download ─▶ [save]
//! ```
//!
//! Stages already recorded as completed on the document are skipped, so the
//! same entry points drive a fresh run and a resumed one. A fatal error
//! returns before the next checkpoint; the store keeps whatever was saved
//! last.

use crate::config::ScriptConfig;
use crate::document::{ContentDocument, Stage};
use crate::error::{ScriptError, ServiceError};
use crate::pipeline::images::{self, SentenceDownload};
use crate::pipeline::{keywords, sanitize, segment};
use crate::services::{ArticleSource, Services};
use crate::store::DocumentStore;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info};

/// Counters and timings for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub sentences: usize,
    pub keywords: usize,
    pub candidates: usize,
    pub downloaded: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub sentences_without_image: usize,
    pub text_duration_ms: u64,
    pub image_duration_ms: u64,
    pub total_duration_ms: u64,
}

impl RunStats {
    fn collect(document: &ContentDocument, downloads: &[SentenceDownload]) -> Self {
        let sentences = document.sentences();
        Self {
            sentences: sentences.len(),
            keywords: sentences.iter().map(|s| s.keywords.len()).sum(),
            candidates: sentences.iter().map(|s| s.images.len()).sum(),
            downloaded: downloads.iter().filter(|d| d.downloaded().is_some()).count(),
            duplicates: downloads.iter().map(SentenceDownload::duplicates).sum(),
            failed: downloads.iter().map(|d| d.failures().count()).sum(),
            sentences_without_image: downloads.iter().filter(|d| d.downloaded().is_none()).count(),
            ..Default::default()
        }
    }
}

/// Result of [`run_pipeline`].
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub document: ContentDocument,
    /// Per-sentence download report. Empty when the download phase did not
    /// run in this call.
    pub downloads: Vec<SentenceDownload>,
    pub stats: RunStats,
}

/// Run every stage that `doc` has not completed yet, saving at both
/// checkpoints.
pub async fn run_pipeline(
    mut doc: ContentDocument,
    services: &Services,
    store: &dyn DocumentStore,
    config: &ScriptConfig,
) -> Result<RunOutput, ScriptError> {
    let total_start = Instant::now();
    info!(
        "Starting run for '{}' (max {} sentences, at stage '{}')",
        doc.search_term(),
        doc.maximum_sentences(),
        doc.stage()
    );

    let mut text_duration_ms = 0;
    if doc.stage() < Stage::KeywordsExtracted {
        let start = Instant::now();
        run_text_stages(&mut doc, services, config).await?;
        store.save(&doc).await?;
        text_duration_ms = start.elapsed().as_millis() as u64;
        info!("Text stages complete: {} sentences", doc.sentences().len());
    }

    let mut image_duration_ms = 0;
    let mut downloads = Vec::new();
    if doc.stage() < Stage::ImagesDownloaded {
        let start = Instant::now();
        downloads = run_image_stages(&mut doc, services, config).await?;
        store.save(&doc).await?;
        image_duration_ms = start.elapsed().as_millis() as u64;
    } else {
        info!("Document already complete; nothing to do");
    }

    let stats = RunStats {
        text_duration_ms,
        image_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        ..RunStats::collect(&doc, &downloads)
    };

    info!(
        "Run complete: {}/{} sentences illustrated, {}ms total",
        stats.downloaded, stats.sentences, stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(&stats);
    }

    Ok(RunOutput {
        document: doc,
        downloads,
        stats,
    })
}

/// Load the saved document and continue it with [`run_pipeline`].
pub async fn resume(
    store: &dyn DocumentStore,
    services: &Services,
    config: &ScriptConfig,
) -> Result<RunOutput, ScriptError> {
    let doc = store.load().await?;
    info!("Resuming '{}' from stage '{}'", doc.search_term(), doc.stage());
    run_pipeline(doc, services, store, config).await
}

/// Fetch, sanitize, segment and enrich keywords, skipping completed stages.
pub async fn run_text_stages(
    doc: &mut ContentDocument,
    services: &Services,
    config: &ScriptConfig,
) -> Result<(), ScriptError> {
    if doc.stage() < Stage::Fetched {
        fetch_article(doc, services.articles.as_ref(), config).await?;
    }
    if doc.stage() < Stage::Sanitized {
        sanitize_article(doc, config)?;
    }
    if doc.stage() < Stage::Segmented {
        segment_article(doc, config)?;
    }
    if doc.stage() < Stage::KeywordsExtracted {
        keywords::enrich_keywords(doc, &services.keywords, config).await?;
    }
    Ok(())
}

/// Search candidates and download images, skipping completed stages.
pub async fn run_image_stages(
    doc: &mut ContentDocument,
    services: &Services,
    config: &ScriptConfig,
) -> Result<Vec<SentenceDownload>, ScriptError> {
    if doc.stage() < Stage::ImagesResolved {
        images::resolve_image_candidates(doc, services.images.as_ref(), config).await?;
    }
    images::download_all_images(doc, services.downloader.as_ref(), config).await
}

/// Store the raw article for the document's search term.
pub async fn fetch_article(
    doc: &mut ContentDocument,
    source: &dyn ArticleSource,
    config: &ScriptConfig,
) -> Result<(), ScriptError> {
    doc.require_ready_for(Stage::Fetched)?;
    stage_start(config, Stage::Fetched);

    let topic = doc.search_term().to_string();
    let timeout = config.api_timeout();
    let result = match tokio::time::timeout(timeout, source.fetch_article(&topic)).await {
        Ok(r) => r,
        Err(_) => Err(ServiceError::Timeout {
            secs: timeout.as_secs(),
        }),
    };
    let raw = result.map_err(|source| ScriptError::ArticleFetch {
        topic: topic.clone(),
        source,
    })?;

    info!("Fetched article for '{}' ({} bytes)", topic, raw.len());
    doc.set_source_content_original(raw);
    stage_complete(config, Stage::Fetched);
    Ok(())
}

/// Derive `sourceContentSanitized` from the raw article.
pub fn sanitize_article(doc: &mut ContentDocument, config: &ScriptConfig) -> Result<(), ScriptError> {
    doc.require_ready_for(Stage::Sanitized)?;
    stage_start(config, Stage::Sanitized);

    let clean = sanitize::sanitize(doc.source_content_original().unwrap_or_default());
    debug!("Sanitized article: {} bytes", clean.len());
    doc.set_source_content_sanitized(clean);

    stage_complete(config, Stage::Sanitized);
    Ok(())
}

/// Split the sanitized article into at most `maximumSentences` sentences.
pub fn segment_article(doc: &mut ContentDocument, config: &ScriptConfig) -> Result<(), ScriptError> {
    doc.require_ready_for(Stage::Segmented)?;
    stage_start(config, Stage::Segmented);

    let sentences = segment::segment(
        doc.source_content_sanitized().unwrap_or_default(),
        doc.maximum_sentences(),
    );
    debug!("Segmented into {} sentences", sentences.len());
    doc.set_sentences(sentences);

    stage_complete(config, Stage::Segmented);
    Ok(())
}

fn stage_start(config: &ScriptConfig, stage: Stage) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_start(stage, 0);
    }
}

fn stage_complete(config: &ScriptConfig, stage: Stage) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_complete(stage);
    }
}
