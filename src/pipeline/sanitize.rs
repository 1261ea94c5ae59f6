//! Sanitization: strip structural noise from raw article text.
//!
//! Encyclopedia plain-text extracts are line-oriented: section headings as
//! `== Heading ==`, blank separator lines, and parenthetical annotations
//! (pronunciations, dates, alternative names) in the running text. The
//! segmenter expects flat prose, so three deterministic rules run in order:
//!
//! 1. Drop blank lines and heading lines; join the rest with single spaces.
//! 2. Remove parenthetical spans (balanced, one level of nesting per pass,
//!    repeated until none remain).
//! 3. Collapse runs of spaces left behind by the removals.
//!
//! Removing a parenthetical can expose a blank or heading-like line, so the
//! rules are reapplied to the trimmed result until it stops changing. That
//! makes [`sanitize`] pure and idempotent.

use once_cell::sync::Lazy;
use regex::Regex;

/// Marker that opens a heading line in plain-text extracts.
pub const HEADING_MARKER: char = '=';

/// Apply all sanitization rules to raw article text.
pub fn sanitize(raw: &str) -> String {
    let mut current = apply_rules(raw);
    loop {
        let next = apply_rules(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn apply_rules(input: &str) -> String {
    let s = remove_blank_lines_and_markup(input);
    let s = remove_parentheticals(&s);
    collapse_spaces(&s).trim().to_string()
}

// ── Rule 1: Remove blank lines and markup lines ──────────────────────────────

fn remove_blank_lines_and_markup(input: &str) -> String {
    input
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with(HEADING_MARKER)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Rule 2: Remove parenthetical spans ───────────────────────────────────────

static RE_PARENTHETICAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((?:\([^()]*\)|[^()])*\)").unwrap());

/// Each pass removes groups nested at most one level deep; deeper groups
/// surface as shallower ones for the next pass.
fn remove_parentheticals(input: &str) -> String {
    let mut current = input.to_string();
    loop {
        let next = RE_PARENTHETICAL.replace_all(&current, "");
        if next.len() == current.len() {
            return current;
        }
        current = next.into_owned();
    }
}

// ── Rule 3: Collapse repeated spaces ─────────────────────────────────────────

static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").unwrap());

fn collapse_spaces(input: &str) -> String {
    RE_SPACES.replace_all(input, " ").into_owned()
}

// ── Tests ────────────────────────────────────────────────────────────────────
