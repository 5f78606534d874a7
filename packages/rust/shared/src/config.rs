//! Application configuration for gradreach.
//!
//! User config lives at `~/.gradreach/gradreach.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{GradReachError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "gradreach.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".gradreach";

/// Built-in outreach template. Placeholders are `{field}`; `{{`/`}}` escape braces.
pub const DEFAULT_TEMPLATE: &str = "Subject: Introduction from {company}

Hi {first_name},

I hope you're well! My name is {sender_name}, {sender_title} at {company}. \
I'm reaching out to graduate students in {department} at {university} about \
a paid, part-time research project we are running this term.

Would you be interested in hearing more?

Best,
{sender_name}
";

// ---------------------------------------------------------------------------
// Config structs (matching gradreach.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Which department page to collect from.
    #[serde(default)]
    pub target: TargetConfig,

    /// Who the outreach comes from.
    #[serde(default)]
    pub sender: SenderConfig,

    /// Orchestrator settings.
    #[serde(default)]
    pub pipeline: PipelineSection,

    /// Collector capability settings.
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Outreach message template.
    #[serde(default)]
    pub message: MessageSection,
}

/// `[target]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// University display name.
    #[serde(default = "default_university")]
    pub university: String,

    /// Department display name.
    #[serde(default = "default_department")]
    pub department: String,

    /// Page listing the graduate students.
    #[serde(default = "default_listing_url")]
    pub listing_url: String,

    /// Email domain every valid contact must belong to (e.g. `iastate.edu`).
    #[serde(default = "default_email_domain")]
    pub email_domain: String,

    /// Number of students requested per collection attempt.
    #[serde(default = "default_student_count")]
    pub student_count: usize,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            university: default_university(),
            department: default_department(),
            listing_url: default_listing_url(),
            email_domain: default_email_domain(),
            student_count: default_student_count(),
        }
    }
}

fn default_university() -> String {
    "Iowa State University".into()
}
fn default_department() -> String {
    "Computer Science".into()
}
fn default_listing_url() -> String {
    "https://www.cs.iastate.edu/people/phd-students".into()
}
fn default_email_domain() -> String {
    "iastate.edu".into()
}
fn default_student_count() -> usize {
    150
}

/// `[sender]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Sender's name, used in the message body.
    #[serde(default = "default_sender_name")]
    pub name: String,

    /// Sender's role or title.
    #[serde(default = "default_sender_title")]
    pub title: String,

    /// Organization the sender represents.
    #[serde(default = "default_company")]
    pub company: String,

    /// Address copied on every message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bcc: Option<String>,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            name: default_sender_name(),
            title: default_sender_title(),
            company: default_company(),
            bcc: None,
        }
    }
}

fn default_sender_name() -> String {
    "Your Name".into()
}
fn default_sender_title() -> String {
    "Outreach Coordinator".into()
}
fn default_company() -> String {
    "Our Team".into()
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// How many times the review stage may send collection back.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Directory receiving one outreach file per contact.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_max_retries() -> u32 {
    2
}
fn default_output_dir() -> String {
    "outreach".into()
}

/// Which collector implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectorMode {
    /// Fetch and scrape the listing page directly.
    #[default]
    Page,
    /// Delegate to an external extraction agent subprocess.
    Bridge,
    /// Replay previously saved collector output.
    File,
}

impl CollectorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Bridge => "bridge",
            Self::File => "file",
        }
    }
}

impl std::str::FromStr for CollectorMode {
    type Err = GradReachError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "page" => Ok(Self::Page),
            "bridge" => Ok(Self::Bridge),
            "file" => Ok(Self::File),
            other => Err(GradReachError::config(format!(
                "unknown collector mode '{other}': expected 'page', 'bridge', or 'file'"
            ))),
        }
    }
}

/// `[collector]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Collector implementation.
    #[serde(default)]
    pub mode: CollectorMode,

    /// Bridge command (e.g., "bun", "python3").
    #[serde(default = "default_bridge_cmd")]
    pub bridge_cmd: String,

    /// Script passed to the bridge command.
    #[serde(default = "default_bridge_script")]
    pub bridge_script: String,

    /// Upper bound on one collection attempt, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Saved collector output for `file` mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_file: Option<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            mode: CollectorMode::default(),
            bridge_cmd: default_bridge_cmd(),
            bridge_script: default_bridge_script(),
            timeout_secs: default_timeout_secs(),
            input_file: None,
        }
    }
}

fn default_bridge_cmd() -> String {
    "python3".into()
}
fn default_bridge_script() -> String {
    "agent/collect.py".into()
}
fn default_timeout_secs() -> u64 {
    300
}

/// `[message]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageSection {
    /// Outreach template text.
    #[serde(default = "default_template")]
    pub template: String,

    /// Extra named substitution values.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl Default for MessageSection {
    fn default() -> Self {
        Self {
            template: default_template(),
            fields: BTreeMap::new(),
        }
    }
}

fn default_template() -> String {
    DEFAULT_TEMPLATE.into()
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime orchestrator configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// University display name (used in collection instructions).
    pub university: String,
    /// Department display name.
    pub department: String,
    /// Page listing the students.
    pub listing_url: Url,
    /// Email domain suffix, the sole validity predicate for emails.
    pub email_domain: String,
    /// Records requested per collection attempt.
    pub max_count: usize,
    /// Re-collection attempts allowed after the first.
    pub max_retries: u32,
    /// Outreach output directory.
    pub output_dir: PathBuf,
}

impl TryFrom<&AppConfig> for PipelineConfig {
    type Error = GradReachError;

    fn try_from(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let listing_url = parse_listing_url(&config.target.listing_url)?;
        Ok(Self {
            university: config.target.university.clone(),
            department: config.target.department.clone(),
            listing_url,
            email_domain: normalize_domain(&config.target.email_domain),
            max_count: config.target.student_count,
            max_retries: config.pipeline.max_retries,
            output_dir: PathBuf::from(&config.pipeline.output_dir),
        })
    }
}

/// Runtime message configuration: template plus every named field it may use.
#[derive(Debug, Clone)]
pub struct MessageConfig {
    /// Template text.
    pub template: String,
    /// Substitution values other than the per-contact `name`/`first_name`.
    pub fields: BTreeMap<String, String>,
    /// BCC address written into each outreach file.
    pub bcc: Option<String>,
}

impl From<&AppConfig> for MessageConfig {
    fn from(config: &AppConfig) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("sender_name".to_string(), config.sender.name.clone());
        fields.insert("sender_title".to_string(), config.sender.title.clone());
        fields.insert("company".to_string(), config.sender.company.clone());
        fields.insert("university".to_string(), config.target.university.clone());
        fields.insert("department".to_string(), config.target.department.clone());

        // [message.fields] extend or override the built-ins
        for (key, value) in &config.message.fields {
            fields.insert(key.clone(), value.clone());
        }

        Self {
            template: config.message.template.clone(),
            fields,
            bcc: config
                .sender
                .bcc
                .as_ref()
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty()),
        }
    }
}

impl AppConfig {
    /// Check values that serde defaults cannot guard.
    pub fn validate(&self) -> Result<()> {
        if normalize_domain(&self.target.email_domain).is_empty() {
            return Err(GradReachError::config("target.email_domain must not be empty"));
        }
        if self.target.student_count == 0 {
            return Err(GradReachError::config("target.student_count must be at least 1"));
        }
        parse_listing_url(&self.target.listing_url)?;
        Ok(())
    }
}

/// Strip whitespace and any leading `@` from a configured domain.
fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_start_matches('@').to_ascii_lowercase()
}

fn parse_listing_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| {
        GradReachError::config(format!("target.listing_url '{raw}' is not a valid URL: {e}"))
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(GradReachError::config(format!(
            "target.listing_url must be http(s), got '{scheme}'"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.gradreach/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| GradReachError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.gradreach/gradreach.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| GradReachError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        GradReachError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| GradReachError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| GradReachError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| GradReachError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
