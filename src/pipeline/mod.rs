//! Pipeline stages for search-term-to-script generation.
//!
//! Each submodule implements one transformation of the
//! [`ContentDocument`](crate::document::ContentDocument). Text stages are
//! pure functions; enrichment stages take their collaborator as a trait
//! object and mutate the document in place.
//!
//! ## Data Flow
//!
//! ```text
//! article ──▶ sanitize ──▶ segment ──▶ keywords ──▶ images
//! (raw text)  (flat prose)  (≤ N)      (per sentence) (search, download)
//! ```
//!
//! 1. [`sanitize`]: drop blank/heading lines and parentheticals
//! 2. [`segment`]: split into sentences and apply the cap
//! 3. [`keywords`]: one keyword call per sentence, in order
//! 4. [`images`]: candidate search per sentence, then a deduplicated
//!    download pass guarded by the run's ledger
//!
//! Fetching the article and persisting the document live in
//! [`crate::run`], which sequences these stages.

pub mod images;
pub mod keywords;
pub mod sanitize;
pub mod segment;
