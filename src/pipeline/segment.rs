//! Segmentation: split sanitized prose into a capped list of sentences.
//!
//! Boundary detection sits behind [`SentenceBoundaryDetector`] so it can be
//! swapped for a language-specific implementation. The default
//! [`RuleBasedDetector`] splits at `.`, `!` or `?` (together with any
//! trailing punctuation and closing quotes/brackets) when the mark is
//! followed by whitespace and then an uppercase letter, a digit, an opening
//! quote/bracket, or the end of the text. It does not split after:
//!
//! - common English abbreviations (`Mr.`, `Dr.`, `e.g.`, `U.S.`, `Jan.`, ...),
//! - single-letter initials (`J. R. R. Tolkien`),
//! - a mark not followed by whitespace (`3.14`, `example.com`, `U.S.A.`).

use crate::document::Sentence;
use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Abbreviations that do not end a sentence, lowercase, without the final dot.
static ABBREVIATIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "mt", "ft", "vs", "etc", "e.g", "i.e",
        "cf", "al", "approx", "ca", "c", "inc", "ltd", "co", "corp", "dept", "est", "fig", "vol",
        "gen", "gov", "lt", "col", "sgt", "capt", "cmdr", "adm", "rev", "hon", "pres", "sen",
        "rep", "jan", "feb", "mar", "apr", "jun", "jul", "aug", "sep", "sept", "oct", "nov",
        "dec", "u.s", "u.k", "u.n", "a.m", "p.m", "b.c", "a.d", "no",
    ]
    .into_iter()
    .collect()
});

const TERMINALS: &[char] = &['.', '!', '?'];
const CLOSERS: &[char] = &['"', '\'', ')', ']', '}', '”', '’', '»'];
const OPENERS: &[char] = &['"', '\'', '(', '[', '{', '“', '‘', '«'];

/// Splits prose into sentence strings.
pub trait SentenceBoundaryDetector: Send + Sync {
    fn split(&self, text: &str) -> Vec<String>;
}

/// Punctuation-and-abbreviation rules for English prose.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedDetector;

impl SentenceBoundaryDetector for RuleBasedDetector {
    fn split(&self, text: &str) -> Vec<String> {
        split_sentences(text)
    }
}

/// Segment `clean` with the default detector and keep the first `max`.
pub fn segment(clean: &str, max: usize) -> Vec<Sentence> {
    segment_with(&RuleBasedDetector, clean, max)
}

/// Segment `clean` with `detector` and keep the first `max`.
///
/// Fewer than `max` sentences is not an error; empty input yields an
/// empty list.
pub fn segment_with(detector: &dyn SentenceBoundaryDetector, clean: &str, max: usize) -> Vec<Sentence> {
    if max == 0 || clean.trim().is_empty() {
        return Vec::new();
    }
    detector
        .split(clean)
        .into_iter()
        .take(max)
        .map(Sentence::new)
        .collect()
}

/// Split `text` into trimmed, non-empty sentences in text order.
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let byte_at = |idx: usize| chars.get(idx).map_or(text.len(), |&(b, _)| b);

    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < chars.len() {
        let ch = chars[i].1;
        if !TERMINALS.contains(&ch) {
            i += 1;
            continue;
        }

        // Absorb "?!", "...", and closing quotes/brackets after the mark.
        let mut j = i + 1;
        while j < chars.len() && (TERMINALS.contains(&chars[j].1) || CLOSERS.contains(&chars[j].1)) {
            j += 1;
        }

        let single_dot = ch == '.' && !chars[i + 1..j].iter().any(|&(_, c)| TERMINALS.contains(&c));
        let preceding = &text[start..byte_at(i)];

        if is_boundary(&chars[j..], preceding, single_dot) {
            push_trimmed(&mut sentences, &text[start..byte_at(j)]);
            start = byte_at(j);
        }
        i = j;
    }

    push_trimmed(&mut sentences, &text[start..]);
    sentences
}

fn is_boundary(rest: &[(usize, char)], preceding: &str, single_dot: bool) -> bool {
    match rest.first() {
        None => return true,
        Some(&(_, c)) if !c.is_whitespace() => return false,
        _ => {}
    }

    let Some(&(_, next)) = rest.iter().find(|(_, c)| !c.is_whitespace()) else {
        return true;
    };

    if single_dot && ends_with_abbreviation(preceding) {
        return false;
    }

    next.is_uppercase() || next.is_ascii_digit() || OPENERS.contains(&next)
}

fn ends_with_abbreviation(preceding: &str) -> bool {
    let Some(word) = preceding.split_whitespace().last() else {
        return false;
    };
    let word = word.trim_start_matches(OPENERS);
    if word.is_empty() {
        return false;
    }
    if is_initial(word) {
        return true;
    }
    ABBREVIATIONS.contains(word.to_lowercase().as_str())
}

fn is_initial(word: &str) -> bool {
    let mut chars = word.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_uppercase())
}

fn push_trimmed(sentences: &mut Vec<String>, fragment: &str) {
    let trimmed = fragment.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
}
