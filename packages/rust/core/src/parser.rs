//! Collector output parser.
//!
//! Two tiers:
//! 1. Strict: the whole text decodes as a JSON array of contact objects.
//! 2. Lenient: the first bracketed substring (`[` up to the first `]` after
//!    it, newlines allowed) decodes as such an array.
//!
//! The lenient tier stops at the first `]`, so an embedded list whose
//! objects themselves contain arrays cannot be recovered.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use gradreach_shared::{ContactRecord, GradReachError, Result};

/// First `[ ... ]` span, lazily closed, across lines.
static BRACKETED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[.*?\]").expect("bracketed list regex"));

/// Which tier produced the records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Strict,
    Lenient,
}

/// Parse raw collector text into contact records.
///
/// On failure the returned [`GradReachError::Parse`] carries `raw` unchanged.
pub fn parse(raw: &str) -> Result<Vec<ContactRecord>> {
    parse_with_mode(raw).map(|(records, _)| records)
}

/// Like [`parse`], also reporting which tier succeeded.
pub fn parse_with_mode(raw: &str) -> Result<(Vec<ContactRecord>, ParseMode)> {
    if raw.trim().is_empty() {
        return Err(GradReachError::parse("collector output is empty", raw));
    }

    let strict_err = match serde_json::from_str::<Vec<ContactRecord>>(raw) {
        Ok(records) => {
            debug!(records = records.len(), "strict parse succeeded");
            return Ok((records, ParseMode::Strict));
        }
        Err(e) => e,
    };

    let Some(span) = BRACKETED_RE.find(raw) else {
        return Err(GradReachError::parse(
            format!("output is not a JSON list ({strict_err}) and contains no bracketed list"),
            raw,
        ));
    };

    match serde_json::from_str::<Vec<ContactRecord>>(span.as_str()) {
        Ok(records) => {
            debug!(
                records = records.len(),
                offset = span.start(),
                "lenient parse recovered embedded list"
            );
            Ok((records, ParseMode::Lenient))
        }
        Err(e) => Err(GradReachError::parse(
            format!("embedded list at byte {} is not a contact list: {e}", span.start()),
            raw,
        )),
    }
}
