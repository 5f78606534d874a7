//! Collector capability: turns collection instructions into raw contact text.
//!
//! The pipeline never looks at how the text was produced. This crate provides:
//! - [`Collector`]: the capability trait the orchestrator is generic over
//! - [`PageCollector`]: fetches the listing page and scrapes `mailto:` links
//! - [`BridgeCollector`]: delegates to an external extraction agent subprocess
//! - [`FileCollector`]: replays collector output saved to disk
//! - [`instructions`]: natural-language task text sent with each request

mod bridge;
mod file;
pub mod instructions;
mod page;

use std::future::Future;

use gradreach_shared::{
    AppConfig, CollectorMode, GradReachError, PipelineConfig, Result,
};
use serde::Serialize;
use url::Url;

pub use bridge::BridgeCollector;
pub use file::FileCollector;
pub use page::{PageCollector, extract_contacts};

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// One collection attempt, as handed to a [`Collector`].
#[derive(Debug, Clone, Serialize)]
pub struct CollectRequest {
    /// Natural-language task description.
    pub instructions: String,
    /// Page listing the students.
    pub listing_url: Url,
    /// Maximum number of records wanted.
    pub max_count: usize,
    /// 1-based attempt number within the current run.
    pub attempt: u32,
    /// Reviewer note attached when collection is sent back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl CollectRequest {
    /// First-attempt request derived from the pipeline config.
    pub fn initial(config: &PipelineConfig) -> Self {
        Self {
            instructions: instructions::build_instructions(config),
            listing_url: config.listing_url.clone(),
            max_count: config.max_count,
            attempt: 1,
            feedback: None,
        }
    }

    /// Request for the next attempt, carrying the reviewer's feedback.
    pub fn retry(&self, feedback: Option<String>) -> Self {
        Self {
            attempt: self.attempt.saturating_add(1),
            feedback,
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Capability trait
// ---------------------------------------------------------------------------

/// An opaque capability mapping a collection request to raw text.
///
/// Output is nominally a JSON array of `{"name", "email"}` objects but may be
/// wrapped in prose or malformed; interpretation is the parser's job.
pub trait Collector: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &str;

    /// Run one collection attempt.
    fn collect(&self, request: &CollectRequest) -> impl Future<Output = Result<String>> + Send;
}

// ---------------------------------------------------------------------------
// Runtime selection
// ---------------------------------------------------------------------------

/// Settings needed to build whichever collector the config selects.
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub mode: CollectorMode,
    pub bridge_cmd: String,
    pub bridge_script: String,
    pub timeout_secs: u64,
    pub input_file: Option<String>,
}

impl From<&AppConfig> for CollectorSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            mode: config.collector.mode,
            bridge_cmd: config.collector.bridge_cmd.clone(),
            bridge_script: config.collector.bridge_script.clone(),
            timeout_secs: config.collector.timeout_secs,
            input_file: config.collector.input_file.clone(),
        }
    }
}

/// Any of the built-in collectors, chosen at runtime.
pub enum AnyCollector {
    Page(PageCollector),
    Bridge(BridgeCollector),
    File(FileCollector),
}

impl AnyCollector {
    /// Build the collector named by `settings.mode`.
    pub fn from_settings(settings: &CollectorSettings) -> Result<Self> {
        match settings.mode {
            CollectorMode::Page => Ok(Self::Page(PageCollector::new(settings.timeout_secs)?)),
            CollectorMode::Bridge => Ok(Self::Bridge(BridgeCollector::new(
                &settings.bridge_cmd,
                &settings.bridge_script,
                settings.timeout_secs,
            ))),
            CollectorMode::File => {
                let path = settings.input_file.as_deref().ok_or_else(|| {
                    GradReachError::config("file mode needs collector.input_file (or --input)")
                })?;
                Ok(Self::File(FileCollector::new(path)))
            }
        }
    }
}

impl Collector for AnyCollector {
    fn name(&self) -> &str {
        match self {
            Self::Page(c) => c.name(),
            Self::Bridge(c) => c.name(),
            Self::File(c) => c.name(),
        }
    }

    async fn collect(&self, request: &CollectRequest) -> Result<String> {
        match self {
            Self::Page(c) => c.collect(request).await,
            Self::Bridge(c) => c.collect(request).await,
            Self::File(c) => c.collect(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline_config() -> PipelineConfig {
        PipelineConfig::try_from(&AppConfig::default()).unwrap()
    }

    #[test]
    fn initial_request_uses_config() {
        let config = pipeline_config();
        let req = CollectRequest::initial(&config);
        assert_eq!(req.attempt, 1);
        assert_eq!(req.max_count, 150);
        assert!(req.feedback.is_none());
        assert!(req.instructions.contains(config.listing_url.as_str()));
    }

    #[test]
    fn retry_bumps_attempt_and_keeps_count() {
        let req = CollectRequest::initial(&pipeline_config());
        let next = req.retry(Some("too many invalid emails".into()));
        assert_eq!(next.attempt, 2);
        assert_eq!(next.max_count, req.max_count);
        assert_eq!(next.feedback.as_deref(), Some("too many invalid emails"));
    }

    #[test]
    fn retry_attempt_saturates() {
        let mut req = CollectRequest::initial(&pipeline_config());
        req.attempt = u32::MAX;
        assert_eq!(req.retry(None).attempt, u32::MAX);
    }

    #[test]
    fn request_serializes_without_empty_feedback() {
        let req = CollectRequest::initial(&pipeline_config());
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""attempt":1"#));
        assert!(!json.contains("feedback"));
    }

    #[test]
    fn file_mode_requires_input() {
        let settings = CollectorSettings {
            mode: CollectorMode::File,
            bridge_cmd: "python3".into(),
            bridge_script: "agent/collect.py".into(),
            timeout_secs: 10,
            input_file: None,
        };
        let err = AnyCollector::from_settings(&settings).err().expect("error");
        assert!(err.to_string().contains("input_file"));
    }

    #[test]
    fn settings_pick_mode_from_config() {
        let mut config = AppConfig::default();
        config.collector.mode = CollectorMode::Bridge;
        let settings = CollectorSettings::from(&config);
        let collector = AnyCollector::from_settings(&settings).unwrap();
        assert_eq!(collector.name(), "bridge");
    }
}
