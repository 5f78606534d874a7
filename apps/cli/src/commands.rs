//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use gradreach_collector::{AnyCollector, CollectorSettings, instructions};
use gradreach_core::pipeline::{
    CompletionStatus, OutreachSettings, OutreachSummary, ProgressReporter, RunOutcome, RunReport,
    run_outreach,
};
use gradreach_core::MessageComposer;
use gradreach_shared::{
    AppConfig, CollectorMode, MessageConfig, PipelineConfig, init_config, load_config,
    load_config_from,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// gradreach: reach graduate students with personalized outreach.
#[derive(Parser)]
#[command(
    name = "gradreach",
    version,
    about = "Collect graduate-student contacts from a department listing and write outreach messages.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.gradreach/gradreach.toml.
    #[arg(long, global = true, env = "GRADREACH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Collect contacts, review them, and write outreach files.
    Run(RunArgs),

    /// Render the configured message template for a name.
    Preview {
        /// Full name of the recipient.
        name: String,
    },

    /// Print the collection instructions sent to the collector.
    Instructions,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Flags for `gradreach run`. Each one overrides the config file.
#[derive(clap::Args)]
pub(crate) struct RunArgs {
    /// Collector: page, bridge, or file.
    #[arg(short, long)]
    pub mode: Option<String>,

    /// Saved collector output to replay (implies --mode file).
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Number of students to collect.
    #[arg(short, long)]
    pub count: Option<usize>,

    /// Re-collection attempts allowed after the first.
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Output directory for outreach files.
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Write the last raw collector output to this file.
    #[arg(long)]
    pub save_raw: Option<PathBuf>,

    /// Compose messages and print them without writing files.
    #[arg(long)]
    pub dry_run: bool,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "gradreach=info",
        1 => "gradreach=debug",
        _ => "gradreach=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run(args) => cmd_run(config_path, args).await,
        Command::Preview { name } => cmd_preview(config_path, &name),
        Command::Instructions => cmd_instructions(config_path),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Fold `run` flags into the loaded config.
fn apply_overrides(config: &mut AppConfig, args: &RunArgs) -> Result<()> {
    if let Some(mode) = &args.mode {
        config.collector.mode = mode.parse()?;
    }
    if let Some(input) = &args.input {
        config.collector.input_file = Some(input.to_string_lossy().into_owned());
        if args.mode.is_none() {
            config.collector.mode = CollectorMode::File;
        }
    }
    if let Some(count) = args.count {
        config.target.student_count = count;
    }
    if let Some(max_retries) = args.max_retries {
        config.pipeline.max_retries = max_retries;
    }
    if let Some(out) = &args.out {
        config.pipeline.output_dir = out.to_string_lossy().into_owned();
    }
    config.validate()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(config_path: Option<&Path>, args: RunArgs) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    apply_overrides(&mut config, &args)?;

    let settings = OutreachSettings {
        pipeline: PipelineConfig::try_from(&config)?,
        message: MessageConfig::from(&config),
        dry_run: args.dry_run,
    };
    let collector = AnyCollector::from_settings(&CollectorSettings::from(&config))?;

    info!(
        university = %settings.pipeline.university,
        department = %settings.pipeline.department,
        collector = config.collector.mode.as_str(),
        count = settings.pipeline.max_count,
        max_retries = settings.pipeline.max_retries,
        "starting outreach"
    );

    let reporter = CliProgress::new();
    let summary = run_outreach(&settings, &collector, &reporter).await?;

    if let (Some(path), Some(raw)) = (&args.save_raw, &summary.report.last_raw) {
        std::fs::write(path, raw)
            .map_err(|e| eyre!("failed to save raw output to '{}': {e}", path.display()))?;
        info!(path = %path.display(), "saved raw collector output");
    }

    if let RunOutcome::Failed(failure) = &summary.report.outcome {
        if let Some(raw) = failure.raw_text() {
            eprintln!("--- raw collector output ---");
            eprintln!("{raw}");
            eprintln!("----------------------------");
        }
        return Err(eyre!(
            "run {} failed after {} attempt(s): {failure}",
            summary.report.run_id,
            summary.report.attempts
        ));
    }

    print_summary(&summary, &settings);
    Ok(())
}

fn print_summary(summary: &OutreachSummary, settings: &OutreachSettings) {
    let report = &summary.report;

    if settings.dry_run {
        for contact in &summary.contacts {
            println!("== {} <{}>", contact.name, contact.email.as_deref().unwrap_or(""));
            println!("{}", contact.outreach_message.as_deref().unwrap_or(""));
            println!();
        }
    }

    println!();
    println!("  Outreach run complete!");
    println!("  Run:       {}", report.run_id);
    println!("  Attempts:  {}", report.attempts);
    if let Some(verdict) = &report.verdict {
        println!(
            "  Reviewed:  {} valid / {} collected ({:.0}% invalid)",
            verdict.valid_records.len(),
            verdict.total_count,
            verdict.invalid_ratio() * 100.0
        );
    }
    if let RunOutcome::Completed {
        status: CompletionStatus::RecollectionExhausted,
        ..
    } = report.outcome
    {
        println!("  Status:    retries exhausted; kept the valid contacts from the last batch");
    }
    if settings.dry_run {
        println!("  Files:     none (dry run)");
    } else {
        println!("  Files:     {}", summary.written.len());
        println!("  Path:      {}", settings.pipeline.output_dir.display());
    }
    for collision in summary.collisions() {
        println!(
            "  Overwrote: {}.txt ({} <{}> replaced by {} <{}>)",
            collision.key,
            collision.previous_name,
            collision.previous_email,
            collision.name,
            collision.email
        );
    }
    for (name, error) in &summary.failed {
        println!("  Skipped:   {name} ({error})");
    }
    println!("  Time:      {:.1}s", summary.elapsed.as_secs_f64());
    println!();
}

fn cmd_preview(config_path: Option<&Path>, name: &str) -> Result<()> {
    let config = resolve_config(config_path)?;
    let composer = MessageComposer::from_config(&MessageConfig::from(&config))?;
    println!("{}", composer.compose(name)?);
    Ok(())
}

fn cmd_instructions(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let pipeline = PipelineConfig::try_from(&config)?;
    println!("{}", instructions::build_instructions(&pipeline));
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn attempt(&self, current: u32, max: u32) {
        if current > 1 {
            warn!(attempt = current, max, "re-collecting contacts");
        }
    }

    fn contact_written(&self, path: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Writing [{current}/{total}] {path}"));
    }

    fn done(&self, report: &RunReport) {
        self.spinner.finish_and_clear();
        let duplicates = report
            .verdict
            .as_ref()
            .map_or(0, |v| v.duplicate_emails.len());
        if duplicates > 0 {
            warn!(
                count = duplicates,
                "some emails were collected for more than one student"
            );
        }
    }
}
