//! Contact validation: partitions records and measures the invalid ratio.
//!
//! Deciding what to do about a high ratio is the orchestrator's business.

use std::collections::HashMap;

use tracing::{debug, info, instrument};

use gradreach_shared::{ContactRecord, ValidationVerdict, is_missing};

/// Why a record was excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingName,
    MissingEmail,
    MalformedEmail,
    ForeignDomain,
}

/// Validate `records` against `domain` (e.g. `iastate.edu`).
///
/// Valid records keep their input order; their emails are trimmed.
#[instrument(skip_all, fields(records = records.len(), %domain))]
pub fn validate(records: Vec<ContactRecord>, domain: &str) -> ValidationVerdict {
    let total_count = records.len();
    let suffix = format!("@{}", domain.trim().trim_start_matches('@').to_lowercase());

    let mut valid_records = Vec::with_capacity(total_count);
    for mut record in records {
        match check(&record, &suffix) {
            Ok(email) => {
                record.email = Some(email);
                valid_records.push(record);
            }
            Err(reason) => {
                debug!(name = %record.name, email = ?record.email, ?reason, "rejected contact");
            }
        }
    }

    let verdict = ValidationVerdict {
        invalid_count: total_count - valid_records.len(),
        total_count,
        duplicate_emails: duplicate_emails(&valid_records),
        valid_records,
    };

    info!(
        valid = verdict.valid_records.len(),
        invalid = verdict.invalid_count,
        ratio = verdict.invalid_ratio(),
        duplicates = verdict.duplicate_emails.len(),
        "validation complete"
    );

    verdict
}

/// Apply the per-record rules; on success returns the trimmed email.
pub fn check(record: &ContactRecord, suffix: &str) -> Result<String, Rejection> {
    let name = record.name.trim();
    if name.is_empty() || is_missing(name) {
        return Err(Rejection::MissingName);
    }

    let email = match record.email.as_deref().map(str::trim) {
        Some(e) if !e.is_empty() && !is_missing(e) => e,
        _ => return Err(Rejection::MissingEmail),
    };

    if email.chars().any(char::is_whitespace) {
        return Err(Rejection::MalformedEmail);
    }

    let lowered = email.to_lowercase();
    if !lowered.ends_with(suffix) {
        return Err(Rejection::ForeignDomain);
    }
    if lowered.len() == suffix.len() {
        return Err(Rejection::MalformedEmail);
    }

    Ok(email.to_string())
}

/// Lowercased emails occurring more than once, in first-occurrence order.
fn duplicate_emails(records: &[ContactRecord]) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut order = Vec::new();

    for email in records.iter().filter_map(|r| r.email.as_deref()) {
        let key = email.to_lowercase();
        let count = counts.entry(key.clone()).or_insert(0);
        *count += 1;
        if *count == 2 {
            order.push(key);
        }
    }

    order
}
