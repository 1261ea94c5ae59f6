//! Keyword enrichment: attach extracted keywords to every sentence.
//!
//! Sentences are processed in document order, one call at a time by
//! default. With `keyword_concurrency > 1` up to that many calls are in
//! flight, but results are consumed through an order-preserving buffer, so
//! assignment and progress events still follow document order.
//!
//! Any failure is fatal: the image query is built from the keywords, so a
//! sentence without its keyword call cannot be searched faithfully.

use crate::config::ScriptConfig;
use crate::document::{ContentDocument, Stage};
use crate::error::{ScriptError, ServiceError};
use crate::services::KeywordExtractor;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Run the keyword stage over every sentence of `doc`.
pub async fn enrich_keywords(
    doc: &mut ContentDocument,
    extractor: &Arc<dyn KeywordExtractor>,
    config: &ScriptConfig,
) -> Result<(), ScriptError> {
    doc.require_ready_for(Stage::KeywordsExtracted)?;

    let total = doc.sentences().len();
    info!("Extracting keywords for {} sentences", total);
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_start(Stage::KeywordsExtracted, total);
    }

    if config.keyword_concurrency <= 1 {
        enrich_sequential(doc, extractor, config).await?;
    } else {
        enrich_concurrent(doc, extractor, config).await?;
    }

    doc.mark_completed(Stage::KeywordsExtracted);
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_complete(Stage::KeywordsExtracted);
    }
    Ok(())
}

async fn enrich_sequential(
    doc: &mut ContentDocument,
    extractor: &Arc<dyn KeywordExtractor>,
    config: &ScriptConfig,
) -> Result<(), ScriptError> {
    let total = doc.sentences().len();
    let timeout = config.api_timeout();

    for (idx, sentence) in doc.sentences_mut().iter_mut().enumerate() {
        sentence.keywords = extract_one(extractor.as_ref(), idx, &sentence.text, timeout).await?;
        debug!("Sentence {}: keywords {:?}", idx, sentence.keywords);
        if let Some(ref cb) = config.progress_callback {
            cb.on_sentence_keywords(idx, total, &sentence.keywords);
        }
    }
    Ok(())
}

async fn enrich_concurrent(
    doc: &mut ContentDocument,
    extractor: &Arc<dyn KeywordExtractor>,
    config: &ScriptConfig,
) -> Result<(), ScriptError> {
    let total = doc.sentences().len();
    let timeout = config.api_timeout();
    let texts: Vec<String> = doc.sentences().iter().map(|s| s.text.clone()).collect();

    let mut results = stream::iter(texts.into_iter().enumerate().map(|(idx, text)| {
        let extractor = Arc::clone(extractor);
        async move {
            let keywords = extract_one(extractor.as_ref(), idx, &text, timeout).await;
            (idx, keywords)
        }
    }))
    .buffered(config.keyword_concurrency);

    let sentences = doc.sentences_mut();
    while let Some((idx, keywords)) = results.next().await {
        let sentence = &mut sentences[idx];
        sentence.keywords = keywords?;
        debug!("Sentence {}: keywords {:?}", idx, sentence.keywords);
        if let Some(ref cb) = config.progress_callback {
            cb.on_sentence_keywords(idx, total, &sentence.keywords);
        }
    }
    Ok(())
}

async fn extract_one(
    extractor: &dyn KeywordExtractor,
    idx: usize,
    text: &str,
    timeout: Duration,
) -> Result<Vec<String>, ScriptError> {
    let result = match tokio::time::timeout(timeout, extractor.extract_keywords(text)).await {
        Ok(r) => r,
        Err(_) => Err(ServiceError::Timeout {
            secs: timeout.as_secs(),
        }),
    };
    result.map_err(|source| ScriptError::KeywordExtraction {
        sentence: idx,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Sentence;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns the words of the sentence, longest first, and records calls.
    struct WordExtractor {
        calls: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
        delay_first_ms: u64,
    }

    impl WordExtractor {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on: None,
                delay_first_ms: 0,
            }
        }
    }

    #[async_trait]
    impl KeywordExtractor for WordExtractor {
        async fn extract_keywords(&self, text: &str) -> Result<Vec<String>, ServiceError> {
            let first = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(text.to_string());
                calls.len() == 1
            };
            if first && self.delay_first_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_first_ms)).await;
            }
            if self.fail_on == Some(text) {
                return Err(ServiceError::Status {
                    status: 500,
                    url: "https://nlu.test/v1/analyze".into(),
                });
            }
            let mut words: Vec<String> = text
                .split_whitespace()
                .map(|w| w.trim_matches('.').to_string())
                .collect();
            words.sort_by(|a, b| b.len().cmp(&a.len()));
            Ok(words)
        }
    }

    fn doc(texts: &[&str]) -> ContentDocument {
        let mut doc = ContentDocument::new("Rio", texts.len());
        doc.set_source_content_original(String::new());
        doc.set_source_content_sanitized(String::new());
        doc.set_sentences(texts.iter().map(|t| Sentence::new(*t)).collect());
        doc
    }

    #[tokio::test]
    async fn assigns_keywords_in_document_order() {
        let mut d = doc(&["Rio is a city.", "Samba is music."]);
        let ex = Arc::new(WordExtractor::new());
        let dyn_ex: Arc<dyn KeywordExtractor> = ex.clone();

        enrich_keywords(&mut d, &dyn_ex, &ScriptConfig::default())
            .await
            .expect("enrich");

        assert_eq!(d.stage(), Stage::KeywordsExtracted);
        assert_eq!(d.sentences()[0].keywords[0], "city");
        assert_eq!(d.sentences()[1].keywords[0], "Samba");
        assert_eq!(
            *ex.calls.lock().unwrap(),
            vec!["Rio is a city.".to_string(), "Samba is music.".to_string()]
        );
    }

    #[tokio::test]
    async fn failure_is_fatal_and_names_sentence() {
        let mut d = doc(&["Fine.", "Broken.", "Never reached."]);
        let mut ex = WordExtractor::new();
        ex.fail_on = Some("Broken.");
        let ex = Arc::new(ex);
        let dyn_ex: Arc<dyn KeywordExtractor> = ex.clone();

        let err = enrich_keywords(&mut d, &dyn_ex, &ScriptConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ScriptError::KeywordExtraction { sentence: 1, .. }), "got {err:?}");
        assert_eq!(d.stage(), Stage::Segmented);
        assert_eq!(ex.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn zero_sentences_is_a_no_op() {
        let mut d = doc(&[]);
        let ex: Arc<dyn KeywordExtractor> = Arc::new(WordExtractor::new());
        enrich_keywords(&mut d, &ex, &ScriptConfig::default())
            .await
            .expect("no-op");
        assert_eq!(d.stage(), Stage::KeywordsExtracted);
    }

    #[tokio::test]
    async fn requires_segmentation_first() {
        let mut d = ContentDocument::new("Rio", 3);
        let ex: Arc<dyn KeywordExtractor> = Arc::new(WordExtractor::new());
        let err = enrich_keywords(&mut d, &ex, &ScriptConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ScriptError::StageOrder { .. }));
    }

    #[tokio::test]
    async fn concurrent_mode_preserves_order() {
        let mut d = doc(&["Alpha one.", "Beta two.", "Gamma three."]);
        let mut ex = WordExtractor::new();
        ex.delay_first_ms = 50;
        let dyn_ex: Arc<dyn KeywordExtractor> = Arc::new(ex);
        let config = ScriptConfig::builder()
            .keyword_concurrency(3)
            .build()
            .unwrap();

        enrich_keywords(&mut d, &dyn_ex, &config).await.expect("enrich");

        let firsts: Vec<&str> = d.sentences().iter().map(|s| s.keywords[0].as_str()).collect();
        assert_eq!(firsts, vec!["Alpha", "Beta", "Gamma"]);
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        struct Slow;
        #[async_trait]
        impl KeywordExtractor for Slow {
            async fn extract_keywords(&self, _text: &str) -> Result<Vec<String>, ServiceError> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(vec![])
            }
        }

        let mut d = doc(&["Anything."]);
        let ex: Arc<dyn KeywordExtractor> = Arc::new(Slow);
        let config = ScriptConfig::builder().api_timeout_secs(1).build().unwrap();

        let err = enrich_keywords(&mut d, &ex, &config).await.unwrap_err();
        match err {
            ScriptError::KeywordExtraction { source, .. } => {
                assert!(matches!(source, ServiceError::Timeout { secs: 1 }))
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
