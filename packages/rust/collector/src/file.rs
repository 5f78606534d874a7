//! Replay collector: returns raw output saved by an earlier run.

use std::path::PathBuf;

use tracing::info;

use gradreach_shared::{GradReachError, Result};

use crate::{CollectRequest, Collector};

/// Collector that reads its raw text from a file on every attempt.
pub struct FileCollector {
    path: PathBuf,
}

impl FileCollector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Collector for FileCollector {
    fn name(&self) -> &str {
        "file"
    }

    async fn collect(&self, request: &CollectRequest) -> Result<String> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| GradReachError::io(&self.path, e))?;

        info!(path = %self.path.display(), bytes = raw.len(), attempt = request.attempt, "replaying saved collector output");
        Ok(raw)
    }
}
