//! Integration tests for the full pipeline.
//!
//! The orchestrator runs against in-memory collaborators and a
//! [`MemoryStore`], except for the last test which wires the real HTTP
//! collaborators to a wiremock server and persists to a JSON file.

use async_trait::async_trait;
use edgequake_videoscript::services::{
    download::HttpImageDownloader, google::GoogleImageSearch, wikipedia::WikipediaSource,
};
use edgequake_videoscript::{
    resume, run_pipeline, ArticleSource, ContentDocument, DocumentStore, ImageDownloader,
    ImageSearch, JsonFileStore, KeywordExtractor, MemoryStore, PipelineProgressCallback,
    ScriptConfig, ScriptError, ServiceError, Services, Stage,
};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const RIO_RAW: &str = "Rio de Janeiro (pronounced [ʁi.u]) is a city.\n\n== See also ==\nRio";

// ── Fakes ────────────────────────────────────────────────────────────────────

struct FakeArticles(String);

#[async_trait]
impl ArticleSource for FakeArticles {
    async fn fetch_article(&self, _topic: &str) -> Result<String, ServiceError> {
        Ok(self.0.clone())
    }
}

/// Canned keywords per sentence text; unknown text gets no keywords.
#[derive(Default)]
struct FakeKeywords {
    by_text: HashMap<String, Vec<String>>,
    fail: bool,
    calls: AtomicUsize,
}

impl FakeKeywords {
    fn with(pairs: &[(&str, &[&str])]) -> Self {
        Self {
            by_text: pairs
                .iter()
                .map(|(t, kws)| (t.to_string(), kws.iter().map(|k| k.to_string()).collect()))
                .collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl KeywordExtractor for FakeKeywords {
    async fn extract_keywords(&self, text: &str) -> Result<Vec<String>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ServiceError::Status {
                status: 503,
                url: "https://nlu.test/v1/analyze".into(),
            });
        }
        Ok(self.by_text.get(text).cloned().unwrap_or_default())
    }
}

/// Canned results per query; `fail` turns every call into an error.
#[derive(Default)]
struct FakeSearch {
    by_query: HashMap<String, Vec<String>>,
    fail: bool,
    queries: Mutex<Vec<String>>,
}

impl FakeSearch {
    fn with(pairs: &[(&str, &[&str])]) -> Self {
        Self {
            by_query: pairs
                .iter()
                .map(|(q, urls)| (q.to_string(), urls.iter().map(|u| u.to_string()).collect()))
                .collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ImageSearch for FakeSearch {
    async fn search_images(&self, query: &str, _limit: usize) -> Result<Vec<String>, ServiceError> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.fail {
            return Err(ServiceError::Transport("connection refused".into()));
        }
        Ok(self.by_query.get(query).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
struct FakeDownloader {
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeDownloader {
    fn failing(urls: &[&str]) -> Self {
        Self {
            failing: urls.iter().map(|u| u.to_string()).collect(),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageDownloader for FakeDownloader {
    async fn download(&self, url: &str, destination: &Path) -> Result<PathBuf, ServiceError> {
        self.calls.lock().unwrap().push(url.to_string());
        if self.failing.contains(url) {
            return Err(ServiceError::Status {
                status: 404,
                url: url.to_string(),
            });
        }
        Ok(destination.with_extension("jpg"))
    }
}

#[derive(Default)]
struct RecordingCallback {
    events: Mutex<Vec<String>>,
}

impl PipelineProgressCallback for RecordingCallback {
    fn on_stage_start(&self, stage: Stage, _units: usize) {
        self.events.lock().unwrap().push(format!("start {stage}"));
    }

    fn on_sentence_keywords(&self, sentence: usize, _total: usize, _keywords: &[String]) {
        self.events.lock().unwrap().push(format!("keywords {sentence}"));
    }

    fn on_image_duplicate(&self, sentence: usize, url: &str) {
        self.events.lock().unwrap().push(format!("duplicate {sentence} {url}"));
    }

    fn on_image_downloaded(&self, sentence: usize, url: &str, _path: &Path) {
        self.events.lock().unwrap().push(format!("downloaded {sentence} {url}"));
    }
}

struct Fixture {
    keywords: Arc<FakeKeywords>,
    search: Arc<FakeSearch>,
    downloader: Arc<FakeDownloader>,
}

impl Fixture {
    fn rio() -> Self {
        Self {
            keywords: Arc::new(FakeKeywords::with(&[(
                "Rio de Janeiro is a city.",
                &["city", "Brazil"],
            )])),
            search: Arc::new(FakeSearch::with(&[
                ("Rio de Janeiro city", &["u1", "u2"]),
                ("Rio de Janeiro", &["u1", "u3"]),
            ])),
            downloader: Arc::new(FakeDownloader::default()),
        }
    }

    fn services(&self, raw: &str) -> Services {
        Services {
            articles: Arc::new(FakeArticles(raw.to_string())),
            keywords: self.keywords.clone(),
            images: self.search.clone(),
            downloader: self.downloader.clone(),
        }
    }
}

fn config() -> ScriptConfig {
    ScriptConfig::builder().content_dir("content").build().unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn reference_run_produces_deduplicated_script() {
    let fx = Fixture::rio();
    let store = MemoryStore::new();
    let recorder = Arc::new(RecordingCallback::default());
    let config = ScriptConfig::builder()
        .content_dir("content")
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    let doc = ContentDocument::new("Rio de Janeiro", 5);
    let output = run_pipeline(doc, &fx.services(RIO_RAW), &store, &config)
        .await
        .expect("run");

    let doc = &output.document;
    assert_eq!(doc.stage(), Stage::ImagesDownloaded);
    assert_eq!(doc.source_content_sanitized(), Some("Rio de Janeiro is a city. Rio"));

    let s = doc.sentences();
    assert_eq!(s.len(), 2);
    assert_eq!(s[0].text, "Rio de Janeiro is a city.");
    assert_eq!(s[0].keywords, vec!["city", "Brazil"]);
    assert_eq!(s[0].google_search_query.as_deref(), Some("Rio de Janeiro city"));
    assert_eq!(s[1].text, "Rio");
    assert!(s[1].keywords.is_empty());
    assert_eq!(s[1].google_search_query.as_deref(), Some("Rio de Janeiro"));

    assert_eq!(doc.downloaded_images().iter().collect::<Vec<_>>(), vec!["u1", "u3"]);
    assert_eq!(s[0].downloaded_image(), Some("u1"));
    assert_eq!(s[1].downloaded_image(), Some("u3"));
    assert_eq!(fx.downloader.calls(), vec!["u1", "u3"]);
    assert_eq!(
        output.downloads[1].downloaded_path(),
        Some(Path::new("content/1-original.jpg"))
    );

    assert_eq!(output.stats.sentences, 2);
    assert_eq!(output.stats.downloaded, 2);
    assert_eq!(output.stats.duplicates, 1);
    assert_eq!(output.stats.sentences_without_image, 0);

    assert_eq!(store.save_count(), 2);
    assert_eq!(store.snapshot().as_ref(), Some(doc));

    let events = recorder.events.lock().unwrap().clone();
    let keyword_events: Vec<&String> = events.iter().filter(|e| e.starts_with("keywords")).collect();
    assert_eq!(keyword_events, vec!["keywords 0", "keywords 1"]);
    assert!(events.contains(&"duplicate 1 u1".to_string()));
    assert!(events.contains(&"downloaded 1 u3".to_string()));
    let first_download = events.iter().position(|e| e == "start image-download").unwrap();
    let last_keywords = events.iter().rposition(|e| e.starts_with("keywords")).unwrap();
    assert!(last_keywords < first_download);
}

#[tokio::test]
async fn keyword_failure_aborts_before_first_save() {
    let mut fx = Fixture::rio();
    fx.keywords = Arc::new(FakeKeywords {
        fail: true,
        ..Default::default()
    });
    let store = MemoryStore::new();

    let err = run_pipeline(
        ContentDocument::new("Rio de Janeiro", 5),
        &fx.services(RIO_RAW),
        &store,
        &config(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ScriptError::KeywordExtraction { sentence: 0, .. }), "got {err:?}");
    assert_eq!(err.stage(), Some(Stage::KeywordsExtracted));
    assert_eq!(store.save_count(), 0);
    assert!(fx.search.queries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn image_search_failure_keeps_text_checkpoint() {
    let mut fx = Fixture::rio();
    fx.search = Arc::new(FakeSearch {
        fail: true,
        ..Default::default()
    });
    let store = MemoryStore::new();

    let err = run_pipeline(
        ContentDocument::new("Rio de Janeiro", 5),
        &fx.services(RIO_RAW),
        &store,
        &config(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ScriptError::ImageSearch { .. }), "got {err:?}");
    assert_eq!(store.save_count(), 1);
    let saved = store.snapshot().expect("text checkpoint saved");
    assert_eq!(saved.stage(), Stage::KeywordsExtracted);
    assert_eq!(saved.sentences()[0].keywords, vec!["city", "Brazil"]);
    assert!(fx.downloader.calls().is_empty());
}

#[tokio::test]
async fn resume_continues_from_saved_stage() {
    let mut failing = Fixture::rio();
    failing.search = Arc::new(FakeSearch {
        fail: true,
        ..Default::default()
    });
    let store = MemoryStore::new();
    run_pipeline(
        ContentDocument::new("Rio de Janeiro", 5),
        &failing.services(RIO_RAW),
        &store,
        &config(),
    )
    .await
    .unwrap_err();

    let fx = Fixture::rio();
    let output = resume(&store, &fx.services("unused article"), &config())
        .await
        .expect("resume");

    assert_eq!(fx.keywords.calls.load(Ordering::SeqCst), 0);
    assert_eq!(output.document.source_content_original(), Some(RIO_RAW));
    assert_eq!(output.document.stage(), Stage::ImagesDownloaded);
    assert_eq!(
        output.document.downloaded_images().iter().collect::<Vec<_>>(),
        vec!["u1", "u3"]
    );
    assert_eq!(store.save_count(), 2);
}

#[tokio::test]
async fn resume_without_saved_document_fails() {
    let fx = Fixture::rio();
    let err = resume(&MemoryStore::new(), &fx.services(RIO_RAW), &config())
        .await
        .unwrap_err();
    assert!(matches!(err, ScriptError::NoSavedDocument { .. }), "got {err:?}");
}

#[tokio::test]
async fn sentence_without_usable_candidate_is_not_fatal() {
    let mut fx = Fixture::rio();
    fx.downloader = Arc::new(FakeDownloader::failing(&["u1", "u2"]));
    let store = MemoryStore::new();

    let output = run_pipeline(
        ContentDocument::new("Rio de Janeiro", 5),
        &fx.services(RIO_RAW),
        &store,
        &config(),
    )
    .await
    .expect("run");

    // Sentence 0 loses both candidates; sentence 1 retries u1 (not in the
    // ledger, so not a duplicate), then falls back to u3.
    assert_eq!(fx.downloader.calls(), vec!["u1", "u2", "u1", "u3"]);
    assert!(output.downloads[0].downloaded().is_none());
    assert_eq!(output.downloads[0].failures().count(), 2);
    assert_eq!(output.document.downloaded_images().iter().collect::<Vec<_>>(), vec!["u3"]);
    assert_eq!(output.stats.sentences_without_image, 1);
    assert_eq!(output.stats.failed, 3);
    assert_eq!(store.save_count(), 2);
}

#[tokio::test]
async fn zero_sentence_cap_still_completes() {
    let fx = Fixture::rio();
    let store = MemoryStore::new();

    let output = run_pipeline(
        ContentDocument::new("Rio de Janeiro", 0),
        &fx.services(RIO_RAW),
        &store,
        &config(),
    )
    .await
    .expect("run");

    assert!(output.document.sentences().is_empty());
    assert!(output.document.downloaded_images().is_empty());
    assert_eq!(fx.keywords.calls.load(Ordering::SeqCst), 0);
    assert!(fx.search.queries.lock().unwrap().is_empty());
    assert_eq!(store.save_count(), 2);
}

#[tokio::test]
async fn cap_limits_enrichment_calls() {
    let fx = Fixture::rio();
    let store = MemoryStore::new();
    let raw = "One is first. Two is second. Three is third. Four is fourth.";

    let output = run_pipeline(ContentDocument::new("Numbers", 2), &fx.services(raw), &store, &config())
        .await
        .expect("run");

    assert_eq!(output.document.sentences().len(), 2);
    assert_eq!(fx.keywords.calls.load(Ordering::SeqCst), 2);
    assert_eq!(fx.search.queries.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn completed_document_is_left_alone() {
    let fx = Fixture::rio();
    let store = MemoryStore::new();
    let first = run_pipeline(
        ContentDocument::new("Rio de Janeiro", 5),
        &fx.services(RIO_RAW),
        &store,
        &config(),
    )
    .await
    .expect("run");

    let again = resume(&store, &fx.services(RIO_RAW), &config())
        .await
        .expect("resume");

    assert_eq!(again.document, first.document);
    assert!(again.downloads.is_empty());
    assert_eq!(store.save_count(), 2);
    assert_eq!(fx.downloader.calls().len(), 2);
}

// ── HTTP collaborators against a mock server ─────────────────────────────────

fn png_bytes() -> Vec<u8> {
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([200, 30, 30, 255])));
    let mut buf = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut buf), ImageFormat::Png)
        .expect("encode png");
    buf
}

#[tokio::test]
async fn http_collaborators_and_json_store() {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .and(query_param("titles", "Rio de Janeiro"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "query": { "pages": [ { "title": "Rio de Janeiro", "extract": RIO_RAW } ] }
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/customsearch/v1"))
        .and(query_param("q", "Rio de Janeiro city"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [ { "link": format!("{base}/page.html") }, { "link": format!("{base}/a.png") } ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/customsearch/v1"))
        .and(query_param("q", "Rio de Janeiro"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [ { "link": format!("{base}/a.png") }, { "link": format!("{base}/b.png") } ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not an image</html>"))
        .mount(&server)
        .await;

    for image_path in ["/a.png", "/b.png"] {
        Mock::given(method("GET"))
            .and(path(image_path))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes()))
            .mount(&server)
            .await;
    }

    let dir = tempfile::tempdir().expect("tempdir");
    let content_dir = dir.path().join("content");
    let config = ScriptConfig::builder()
        .content_dir(&content_dir)
        .build()
        .unwrap();
    let timeout = Duration::from_secs(5);
    let services = Services {
        articles: Arc::new(WikipediaSource::with_base_url(&base, timeout).unwrap()),
        keywords: Arc::new(FakeKeywords::with(&[(
            "Rio de Janeiro is a city.",
            &["city"],
        )])),
        images: Arc::new(GoogleImageSearch::with_base_url(&base, "key", "cx", timeout).unwrap()),
        downloader: Arc::new(HttpImageDownloader::new(timeout).unwrap()),
    };
    let store = JsonFileStore::new(content_dir.join("content.json"));

    let output = run_pipeline(ContentDocument::new("Rio de Janeiro", 5), &services, &store, &config)
        .await
        .expect("run");

    assert!(content_dir.join("0-original.png").exists());
    assert!(content_dir.join("1-original.png").exists());
    assert_eq!(output.downloads[0].failures().count(), 1);
    assert_eq!(output.downloads[1].duplicates(), 1);

    let saved = store.load().await.expect("load");
    assert_eq!(saved, output.document);
    let ledger: Vec<&str> = saved.downloaded_images().iter().collect();
    assert_eq!(ledger, vec![format!("{base}/a.png"), format!("{base}/b.png")]);

    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
    assert_eq!(raw["searchTerm"], "Rio de Janeiro");
    assert_eq!(raw["sentences"][0]["googleSearchQuery"], "Rio de Janeiro city");
    assert_eq!(raw["stage"], "images_downloaded");
}
