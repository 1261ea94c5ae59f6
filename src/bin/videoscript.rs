//! CLI binary for edgequake-videoscript.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ScriptConfig`, wires the HTTP collaborators and prints results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_videoscript::services::{
    download::HttpImageDownloader, google::GoogleImageSearch, llm, llm::LlmKeywordExtractor,
    watson::WatsonKeywordExtractor, wikipedia::WikipediaSource,
};
use edgequake_videoscript::{
    resume, run_pipeline, ContentDocument, JsonFileStore, KeywordExtractor, PipelineProgressCallback,
    ProgressCallback, RunOutput, RunStats, ScriptConfig, Services, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner for whole-text stages, counted bar for per-sentence stages, and
/// one log line per sentence event above the bar.
struct CliProgressCallback {
    bar: ProgressBar,
    image_failures: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(spinner_style());
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            image_failures: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, prefix: &str, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} sentences  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_style(style);
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_prefix(prefix.to_string());
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICKS)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let cut: String = s.chars().take(max - 1).collect();
        format!("{cut}\u{2026}")
    } else {
        s.to_string()
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage, units: usize) {
        match stage {
            Stage::KeywordsExtracted => self.activate_bar("Keywords", units),
            Stage::ImagesResolved => self.activate_bar("Searching", units),
            Stage::ImagesDownloaded => self.activate_bar("Downloading", units),
            other => {
                self.bar.set_style(spinner_style());
                self.bar.set_prefix("Text");
                self.bar.set_message(format!("{other}…"));
            }
        }
    }

    fn on_stage_complete(&self, stage: Stage) {
        if matches!(stage, Stage::Fetched | Stage::Sanitized | Stage::Segmented) {
            return;
        }
        self.bar
            .println(format!("{} {}", cyan("◆"), bold(&format!("{stage} done"))));
    }

    fn on_sentence_keywords(&self, sentence: usize, total: usize, keywords: &[String]) {
        self.bar.println(format!(
            "  {} Sentence {:>2}/{:<2}  {}",
            green("✓"),
            sentence + 1,
            total,
            dim(&truncate(&keywords.join(", "), 70)),
        ));
        self.bar.inc(1);
    }

    fn on_sentence_candidates(&self, sentence: usize, total: usize, query: &str, candidates: usize) {
        self.bar.println(format!(
            "  {} Sentence {:>2}/{:<2}  {} candidates for {}",
            green("✓"),
            sentence + 1,
            total,
            candidates,
            dim(&format!("\"{query}\"")),
        ));
        self.bar.inc(1);
    }

    fn on_image_downloaded(&self, sentence: usize, _url: &str, path: &Path) {
        self.bar.println(format!(
            "  {} Sentence {:>2}  {}",
            green("✓"),
            sentence + 1,
            dim(&path.display().to_string()),
        ));
        self.bar.inc(1);
    }

    fn on_image_duplicate(&self, sentence: usize, url: &str) {
        self.bar.println(format!(
            "  {} Sentence {:>2}  already used: {}",
            cyan("↺"),
            sentence + 1,
            dim(&truncate(url, 70)),
        ));
    }

    fn on_image_failed(&self, sentence: usize, _url: &str, error: &str) {
        self.image_failures.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} Sentence {:>2}  {}",
            red("✗"),
            sentence + 1,
            red(&truncate(error, 90)),
        ));
    }

    fn on_sentence_without_image(&self, sentence: usize) {
        self.bar.println(format!(
            "  {} Sentence {:>2}  no usable image",
            red("✘"),
            sentence + 1,
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, stats: &RunStats) {
        self.bar.finish_and_clear();
        let icon = if stats.sentences_without_image == 0 {
            green("✔")
        } else {
            cyan("⚠")
        };
        eprintln!(
            "{} {}/{} sentences illustrated  ({} failed downloads, {} duplicates skipped)",
            icon,
            bold(&stats.downloaded.to_string()),
            stats.sentences,
            self.image_failures.load(Ordering::SeqCst),
            stats.duplicates,
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Seven sentences about a topic, Watson NLU keywords
  videoscript "Rio de Janeiro"

  # Shorter script, keywords from an LLM instead of Watson
  videoscript --max-sentences 4 --keywords llm --model gpt-4.1-mini "Lisbon"

  # Portuguese article, images into ./media
  videoscript --language pt --content-dir media "Lisboa"

  # Continue the last run after a failure (reads the state file)
  videoscript --resume

  # Machine-readable output
  videoscript --json "Ada Lovelace" > run.json

ENVIRONMENT VARIABLES:
  GOOGLE_SEARCH_API_KEY    Google Custom Search API key
  GOOGLE_SEARCH_ENGINE_ID  Programmable search engine id (cx), image search enabled
  WATSON_NLU_API_KEY       Watson Natural Language Understanding API key
  WATSON_NLU_URL           Watson NLU service URL
  OPENAI_API_KEY           With --keywords llm (or ANTHROPIC_API_KEY, GEMINI_API_KEY, ...)
  EDGEQUAKE_LLM_PROVIDER   Override provider for --keywords llm
  EDGEQUAKE_MODEL          Override model for --keywords llm
  RUST_LOG                 Override log filter
"#;

/// Turn a search term into an illustrated video script.
#[derive(Parser, Debug)]
#[command(
    name = "videoscript",
    version,
    about = "Turn a search term into an illustrated video script",
    long_about = "Fetch the encyclopedia article for a search term, reduce it to a few clean \
sentences, extract keywords for each sentence and download one distinct image per sentence. \
The document is saved after the text stages and after the image stages.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Topic to build the script about. Prompted for when omitted.
    search_term: Option<String>,

    /// Maximum number of sentences kept from the article.
    #[arg(short = 'n', long, env = "VIDEOSCRIPT_MAX_SENTENCES", default_value_t = 7)]
    max_sentences: usize,

    /// Continue the document saved in the state file.
    #[arg(long, conflicts_with = "search_term")]
    resume: bool,

    /// Where the document is saved.
    #[arg(long, env = "VIDEOSCRIPT_STATE_FILE", default_value = "content/content.json")]
    state_file: PathBuf,

    /// Directory downloaded images are written to.
    #[arg(long, env = "VIDEOSCRIPT_CONTENT_DIR", default_value = "content")]
    content_dir: PathBuf,

    /// Keyword backend.
    #[arg(long, env = "VIDEOSCRIPT_KEYWORDS", value_enum, default_value = "watson")]
    keywords: KeywordBackend,

    /// LLM provider for `--keywords llm`: openai, anthropic, gemini, ollama, ...
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// LLM model for `--keywords llm`. Default: gpt-4.1-nano.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Encyclopedia language edition (en, pt, fr, ...).
    #[arg(long, env = "VIDEOSCRIPT_LANGUAGE", default_value = "en")]
    language: String,

    /// Image candidates requested per sentence.
    #[arg(long, env = "VIDEOSCRIPT_IMAGES_PER_SENTENCE", default_value_t = 2,
          value_parser = clap::value_parser!(u64).range(1..=10))]
    images_per_sentence: u64,

    /// Keyword calls in flight at once (results keep document order).
    #[arg(long, env = "VIDEOSCRIPT_KEYWORD_CONCURRENCY", default_value_t = 1)]
    keyword_concurrency: usize,

    /// Retries per sentence for `--keywords llm`.
    #[arg(long, env = "VIDEOSCRIPT_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Timeout for article, keyword and image-search calls, in seconds.
    #[arg(long, env = "VIDEOSCRIPT_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Timeout per image download, in seconds.
    #[arg(long, env = "VIDEOSCRIPT_DOWNLOAD_TIMEOUT", default_value_t = 30)]
    download_timeout: u64,

    /// Print the full run output (document, download report, stats) as JSON.
    #[arg(long, env = "VIDEOSCRIPT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "VIDEOSCRIPT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "VIDEOSCRIPT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "VIDEOSCRIPT_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum KeywordBackend {
    /// IBM Watson Natural Language Understanding.
    Watson,
    /// Any provider supported by edgequake-llm.
    Llm,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; verbose always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config and collaborators ───────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let services = build_services(&cli, &config)?;
    let store = JsonFileStore::new(&cli.state_file);

    // ── Run ──────────────────────────────────────────────────────────────
    let output = if cli.resume {
        resume(&store, &services, &config)
            .await
            .context("Resume failed")?
    } else {
        let term = match cli.search_term.clone() {
            Some(t) => t,
            None => prompt_search_term()?,
        };
        let doc = ContentDocument::new(term.trim(), cli.max_sentences);
        run_pipeline(doc, &services, &store, &config)
            .await
            .context("Run failed")?
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&output, store.path());
    }

    Ok(())
}

/// Map CLI args to `ScriptConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ScriptConfig> {
    let mut builder = ScriptConfig::builder()
        .content_dir(&cli.content_dir)
        .images_per_sentence(cli.images_per_sentence as usize)
        .keyword_concurrency(cli.keyword_concurrency)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout)
        .language(cli.language.clone());

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Instantiate the HTTP collaborators, failing early on missing credentials.
fn build_services(cli: &Cli, config: &ScriptConfig) -> Result<Services> {
    let api_timeout = config.api_timeout();

    let keywords: Arc<dyn KeywordExtractor> = match cli.keywords {
        KeywordBackend::Watson => Arc::new(
            WatsonKeywordExtractor::from_env(api_timeout).context("Keyword backend unavailable")?,
        ),
        KeywordBackend::Llm => {
            let provider = llm::resolve_provider(cli.provider.as_deref(), cli.model.as_deref())
                .context("Keyword backend unavailable")?;
            Arc::new(
                LlmKeywordExtractor::new(provider)
                    .with_retries(config.max_retries, config.retry_backoff_ms),
            )
        }
    };

    Ok(Services {
        articles: Arc::new(
            WikipediaSource::new(&config.language, api_timeout)
                .context("Failed to build article client")?,
        ),
        keywords,
        images: Arc::new(GoogleImageSearch::from_env(api_timeout).context("Image search unavailable")?),
        downloader: Arc::new(
            HttpImageDownloader::new(config.download_timeout())
                .context("Failed to build download client")?,
        ),
    })
}

/// Ask for a search term on stdin.
fn prompt_search_term() -> Result<String> {
    eprint!("Type a search term: ");
    io::stderr().flush().ok();

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read search term")?;
    let term = line.trim().to_string();
    if term.is_empty() {
        bail!("A search term is required");
    }
    Ok(term)
}

fn print_summary(output: &RunOutput, state_file: &Path) {
    let doc = &output.document;
    println!("{}", bold(doc.search_term()));
    for (idx, sentence) in doc.sentences().iter().enumerate() {
        println!("\n{} {}", cyan(&format!("[{}]", idx + 1)), sentence.text);
        if !sentence.keywords.is_empty() {
            println!("    {}", dim(&format!("keywords: {}", sentence.keywords.join(", "))));
        }
        match sentence.downloaded_image() {
            Some(url) => println!("    {}", dim(&format!("image: {url}"))),
            None => println!("    {}", red("no image")),
        }
    }

    let s = &output.stats;
    eprintln!(
        "\n{}  {}/{} sentences illustrated  {}ms  →  {}",
        if s.sentences_without_image == 0 { green("✔") } else { cyan("⚠") },
        s.downloaded,
        s.sentences,
        s.total_duration_ms,
        bold(&state_file.display().to_string()),
    );
}
