//! Outreach file writer.
//!
//! One plain-text file per contact under the output directory:
//!
//! ```text
//! Email: jo@iastate.edu
//! BCC: log@example.org          (only when configured)
//! --------------------------------------------------
//!
//! <message body>
//! ```
//!
//! File names come from [`destination_key`]. Two contacts with the same key
//! overwrite each other (last write wins); the writer reports the collision.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use gradreach_shared::{ContactRecord, GradReachError, Result};

/// Width of the separator line under the headers.
const SEPARATOR_WIDTH: usize = 50;

/// Outcome of writing one contact's file.
#[derive(Debug, Clone, Serialize)]
pub struct WriteResult {
    /// Destination key (file stem).
    pub key: String,
    /// Full path of the written file.
    pub path: PathBuf,
    /// Set when an earlier contact in this run used the same key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collision: Option<WriteCollision>,
}

/// Two contacts mapped to one destination; the later one won.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteCollision {
    pub key: String,
    pub previous_name: String,
    pub previous_email: String,
    pub name: String,
    pub email: String,
}

/// Writes outreach files for one run and tracks the keys it has used.
#[derive(Debug)]
pub struct OutreachWriter {
    output_dir: PathBuf,
    bcc: Option<String>,
    written: HashMap<String, (String, String)>,
}

impl OutreachWriter {
    pub fn new(output_dir: impl Into<PathBuf>, bcc: Option<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            bcc,
            written: HashMap::new(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write `record`'s outreach file.
    ///
    /// The record must have an email and a composed message.
    pub fn write(&mut self, record: &ContactRecord) -> Result<WriteResult> {
        let email = record.email.as_deref().ok_or_else(|| {
            GradReachError::validation(format!("contact '{}' has no email", record.name))
        })?;
        let message = record.outreach_message.as_deref().ok_or_else(|| {
            GradReachError::validation(format!("contact '{}' has no composed message", record.name))
        })?;

        let key = destination_key(&record.name);
        if key.is_empty() {
            return Err(GradReachError::validation(
                "contact name yields an empty file name",
            ));
        }

        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| GradReachError::io(&self.output_dir, e))?;

        let path = self.output_dir.join(format!("{key}.txt"));
        let content = render_file(email, self.bcc.as_deref(), message);
        write_atomic(&path, &content)?;

        let collision = self
            .written
            .insert(key.clone(), (record.name.clone(), email.to_string()))
            .map(|(previous_name, previous_email)| WriteCollision {
                key: key.clone(),
                previous_name,
                previous_email,
                name: record.name.clone(),
                email: email.to_string(),
            });

        if let Some(c) = &collision {
            warn!(
                key = %c.key,
                previous = %c.previous_email,
                current = %c.email,
                "outreach file overwritten by a contact with the same name"
            );
        } else {
            debug!(path = %path.display(), "wrote outreach file");
        }

        Ok(WriteResult {
            key,
            path,
            collision,
        })
    }
}

/// Normalize a name into a file stem: lowercase, whitespace runs and path
/// separators become `_`.
pub fn destination_key(name: &str) -> String {
    name.to_lowercase()
        .replace(['/', '\\'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Full text of one outreach file.
pub fn render_file(email: &str, bcc: Option<&str>, message: &str) -> String {
    let mut out = format!("Email: {email}\n");
    if let Some(bcc) = bcc {
        out.push_str(&format!("BCC: {bcc}\n"));
    }
    out.push_str(&"-".repeat(SEPARATOR_WIDTH));
    out.push_str("\n\n");
    out.push_str(message);
    out
}

/// Write to a temp file beside `path`, then rename over it.
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, content).map_err(|e| GradReachError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| GradReachError::io(path, e))?;
    Ok(())
}
