//! Keyword extraction through any `edgequake-llm` provider.
//!
//! An alternative to Watson NLU for users who already have an LLM API key.
//! The model is asked for one keyword per line (see [`crate::prompts`]) and
//! the reply is normalised by [`parse_keywords`].
//!
//! ## Retry Strategy
//!
//! LLM APIs return transient 429 / 503 errors under load. Each call is
//! retried with exponential backoff (`retry_backoff_ms * 2^attempt`, capped at
//! [`MAX_BACKOFF_MS`]). Once retries are exhausted the error is returned, and the keyword stage treats
//! it as fatal.

use super::KeywordExtractor;
use crate::error::{ScriptError, ServiceError};
use crate::prompts::{keyword_request, KEYWORD_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Model used when a provider is named without a model.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Upper bound on a single retry delay.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Delay before retry `attempt` (1-based).
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    2u64.checked_pow(attempt.saturating_sub(1))
        .map_or(u64::MAX, |factor| base_ms.saturating_mul(factor))
        .min(MAX_BACKOFF_MS)
}

pub struct LlmKeywordExtractor {
    provider: Arc<dyn LLMProvider>,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl LlmKeywordExtractor {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }

    pub fn with_retries(mut self, max_retries: u32, retry_backoff_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff_ms = retry_backoff_ms;
        self
    }
}

#[async_trait]
impl KeywordExtractor for LlmKeywordExtractor {
    async fn extract_keywords(&self, text: &str) -> Result<Vec<String>, ServiceError> {
        let messages = vec![
            ChatMessage::system(KEYWORD_SYSTEM_PROMPT),
            ChatMessage::user(&keyword_request(text)),
        ];
        let options = build_options();

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!(
                    "Keyword extraction: retry {}/{} after {}ms",
                    attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(&messages, Some(&options)).await {
                Ok(response) => {
                    debug!(
                        "Keyword extraction: {} input tokens, {} output tokens",
                        response.prompt_tokens, response.completion_tokens
                    );
                    return Ok(parse_keywords(&response.content));
                }
                Err(e) => {
                    let err_msg = format!("{}", e);
                    warn!("Keyword extraction: attempt {} failed: {}", attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
            }
        }

        Err(ServiceError::Transport(format!(
            "LLM call failed after {} retries: {}",
            self.max_retries,
            last_err.unwrap_or_else(|| "Unknown error".to_string())
        )))
    }
}

/// Low temperature keeps the keyword list stable across runs.
fn build_options() -> CompletionOptions {
    CompletionOptions {
        temperature: Some(0.0),
        max_tokens: Some(128),
        ..Default::default()
    }
}

/// Normalise an LLM reply into a keyword list.
///
/// Strips bullets, numbering and surrounding quotes, drops blank lines and
/// case-insensitive duplicates, and keeps the reply's order.
pub fn parse_keywords(reply: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    reply
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("```"))
        .map(|line| {
            strip_list_marker(line)
                .trim()
                .trim_matches(['"', '\'', '`'])
                .trim()
                .to_string()
        })
        .filter(|kw| !kw.is_empty())
        .filter(|kw| seen.insert(kw.to_lowercase()))
        .collect()
}

/// Remove a leading `-`, `*`, `•`, `1.` or `1)` marker.
fn strip_list_marker(line: &str) -> &str {
    let line = line.trim_start_matches(['-', '*', '•']).trim_start();
    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return rest;
        }
    }
    line
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Named provider + model**: `provider_name` (e.g. `"openai"`) with
///    `model` or [`DEFAULT_MODEL`]; the factory reads the matching API key.
/// 2. **Environment pair**: `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
/// 3. **Full auto-detection**: `ProviderFactory::from_env`.
pub fn resolve_provider(
    provider_name: Option<&str>,
    model: Option<&str>,
) -> Result<Arc<dyn LLMProvider>, ScriptError> {
    if let Some(name) = provider_name {
        return create_provider(name, model.unwrap_or(DEFAULT_MODEL));
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ScriptError::MissingCredentials {
            service: "LLM provider".to_string(),
            var: format!("OPENAI_API_KEY, ANTHROPIC_API_KEY or EDGEQUAKE_LLM_PROVIDER ({e})"),
        })?;

    Ok(llm_provider)
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ScriptError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ScriptError::MissingCredentials {
            service: format!("LLM provider '{provider_name}'"),
            var: format!("its API key ({e})"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff_ms(500, 1), 500);
        assert_eq!(backoff_ms(500, 2), 1_000);
        assert_eq!(backoff_ms(500, 4), 4_000);
        assert_eq!(backoff_ms(500, 20), MAX_BACKOFF_MS);
        assert_eq!(backoff_ms(500, 64), MAX_BACKOFF_MS);
        assert_eq!(backoff_ms(u64::MAX, 3), MAX_BACKOFF_MS);
        assert_eq!(backoff_ms(500, u32::MAX), MAX_BACKOFF_MS);
    }

    #[test]
    fn build_options_are_deterministic() {
        let opts = build_options();
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(128));
    }

    #[test]
    fn parse_plain_lines() {
        assert_eq!(
            parse_keywords("Rio de Janeiro\ncity\n"),
            vec!["Rio de Janeiro", "city"]
        );
    }

    #[test]
    fn parse_strips_bullets_and_numbers() {
        let reply = "1. Rio de Janeiro\n2) Brazil\n- beaches\n* \"Carnival\"\n";
        assert_eq!(
            parse_keywords(reply),
            vec!["Rio de Janeiro", "Brazil", "beaches", "Carnival"]
        );
    }

    #[test]
    fn parse_drops_blanks_fences_and_duplicates() {
        let reply = "```\ncity\n\nCity\nharbour\n```";
        assert_eq!(parse_keywords(reply), vec!["city", "harbour"]);
    }

    #[test]
    fn parse_keeps_leading_numbers_that_are_not_markers() {
        assert_eq!(
            parse_keywords("2016 Summer Olympics\n3D printing"),
            vec!["2016 Summer Olympics", "3D printing"]
        );
    }

    #[test]
    fn parse_empty_reply() {
        assert!(parse_keywords("").is_empty());
        assert!(parse_keywords("\n  \n").is_empty());
    }
}
