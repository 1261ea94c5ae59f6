//! Prompts for LLM-backed keyword extraction.
//!
//! Kept apart from [`crate::services::llm`] so the wording can change without
//! touching the retry logic, and so tests can inspect it directly.

/// System prompt asking for one keyword per line.
///
/// Mirrors what a keyword-analysis service returns: short noun phrases taken
/// from the sentence, most relevant first.
pub const KEYWORD_SYSTEM_PROMPT: &str = r#"You extract keywords from a single sentence.

Rules:
1. Return between 1 and 8 keywords, most relevant first.
2. Each keyword is a short noun phrase copied from the sentence (proper nouns keep their capitalisation).
3. Output one keyword per line.
4. Do NOT number the lines, add bullets, quotes or commentary.
5. If the sentence has no meaningful keyword, output nothing."#;

/// Build the user message for one sentence.
pub fn keyword_request(sentence: &str) -> String {
    format!("Sentence:\n\"\"\"{}\"\"\"", sentence)
}
