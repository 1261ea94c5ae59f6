//! Configuration types for a script-generation run.
//!
//! All pipeline behaviour is controlled through [`ScriptConfig`], built via
//! its [`ScriptConfigBuilder`]. The document itself carries the run's search
//! term and sentence cap; the config only holds knobs that shape *how* the
//! stages talk to their collaborators.

use crate::error::ScriptError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a pipeline run.
///
/// Built via [`ScriptConfig::builder()`] or using [`ScriptConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_videoscript::ScriptConfig;
///
/// let config = ScriptConfig::builder()
///     .content_dir("content")
///     .images_per_sentence(2)
///     .api_timeout_secs(30)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ScriptConfig {
    /// Directory downloaded images are written to. Default: `content`.
    ///
    /// Files are named `{sentence_index}-original.<ext>`.
    pub content_dir: PathBuf,

    /// Image candidates requested per sentence. Default: 2.
    ///
    /// The second candidate is the fallback when the first is already used
    /// by an earlier sentence or fails to download.
    pub images_per_sentence: usize,

    /// Per-call timeout for article fetch, keyword extraction and image
    /// search, in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Per-candidate download timeout in seconds. Default: 30.
    pub download_timeout_secs: u64,

    /// Keyword-extraction calls in flight at once. Default: 1 (sequential).
    ///
    /// Results are always assigned in document order whatever the value.
    pub keyword_concurrency: usize,

    /// Retry attempts for LLM-backed keyword extraction. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Encyclopedia language edition, e.g. `en`, `pt`. Default: `en`.
    pub language: String,

    /// Receives stage and per-sentence events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            content_dir: PathBuf::from("content"),
            images_per_sentence: 2,
            api_timeout_secs: 60,
            download_timeout_secs: 30,
            keyword_concurrency: 1,
            max_retries: 3,
            retry_backoff_ms: 500,
            language: "en".to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ScriptConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptConfig")
            .field("content_dir", &self.content_dir)
            .field("images_per_sentence", &self.images_per_sentence)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("keyword_concurrency", &self.keyword_concurrency)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("language", &self.language)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgressCallback>"),
            )
            .finish()
    }
}

impl ScriptConfig {
    /// Create a new builder for `ScriptConfig`.
    pub fn builder() -> ScriptConfigBuilder {
        ScriptConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

/// Builder for [`ScriptConfig`].
#[derive(Debug)]
pub struct ScriptConfigBuilder {
    config: ScriptConfig,
}

impl ScriptConfigBuilder {
    pub fn content_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.content_dir = dir.into();
        self
    }

    pub fn images_per_sentence(mut self, n: usize) -> Self {
        self.config.images_per_sentence = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn keyword_concurrency(mut self, n: usize) -> Self {
        self.config.keyword_concurrency = n.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.config.language = lang.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ScriptConfig, ScriptError> {
        let c = &self.config;
        if c.images_per_sentence == 0 {
            return Err(ScriptError::InvalidConfig(
                "images per sentence must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 || c.download_timeout_secs == 0 {
            return Err(ScriptError::InvalidConfig(
                "timeouts must be ≥ 1 second".into(),
            ));
        }
        if c.language.is_empty() || !c.language.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-') {
            return Err(ScriptError::InvalidConfig(format!(
                "invalid language code '{}'",
                c.language
            )));
        }
        Ok(self.config)
    }
}
