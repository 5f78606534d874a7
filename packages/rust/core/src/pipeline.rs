//! Collect → review pipeline and the end-to-end outreach workflow.
//!
//! The orchestrator is a small state machine:
//!
//! ```text
//! Idle → Collecting → Parsing → Validating → Finalizing → Done
//!            ↑            │          │
//!            │            │          └→ Delegating (ratio too high, retries left)
//!            └────────────┴──────────────┘
//! Parsing → Failed      (unparseable output, or zero records)
//! Delegating → Failed   (collector kept failing and the retry budget is spent)
//! ```
//!
//! A collector error counts as recoverable: it goes through `Delegating`
//! like a bad batch does. An unparseable answer is not retried.
//! At most `max_retries + 1` collection attempts happen per run.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use gradreach_collector::{CollectRequest, Collector, instructions};
use gradreach_shared::{
    ContactRecord, GradReachError, MessageConfig, PipelineConfig, Result, RunId,
    ValidationVerdict,
};

use crate::compose::MessageComposer;
use crate::writer::{OutreachWriter, WriteCollision, WriteResult};
use crate::{parser, validator};

// ---------------------------------------------------------------------------
// Run model
// ---------------------------------------------------------------------------

/// Orchestrator states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Idle,
    Collecting,
    Parsing,
    Validating,
    Delegating,
    Finalizing,
    Done,
    Failed,
}

/// How a completed run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompletionStatus {
    /// The last batch was within the invalid-ratio threshold.
    Clean,
    /// Retries ran out while the batch was still above the threshold;
    /// the valid part of the last batch was kept.
    RecollectionExhausted,
}

/// Why a run failed. Nothing is written for a failed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RunFailure {
    /// Collector output could not be parsed, even leniently.
    Parse { message: String, raw: String },
    /// The collector itself failed on the last allowed attempt.
    Collector { message: String },
    /// The collector returned an empty list.
    NoContacts { raw: String },
}

impl RunFailure {
    /// Raw collector text for diagnosis, when there is one.
    pub fn raw_text(&self) -> Option<&str> {
        match self {
            Self::Parse { raw, .. } | Self::NoContacts { raw } => Some(raw),
            Self::Collector { .. } => None,
        }
    }
}

impl std::fmt::Display for RunFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse { message, .. } => write!(f, "collector output could not be parsed: {message}"),
            Self::Collector { message } => write!(f, "collector failed: {message}"),
            Self::NoContacts { .. } => write!(f, "collector returned no contacts"),
        }
    }
}

/// Terminal result of one orchestrated run.
#[derive(Debug, Clone, Serialize)]
pub enum RunOutcome {
    Completed {
        contacts: Vec<ContactRecord>,
        status: CompletionStatus,
    },
    Failed(RunFailure),
}

/// Everything observable about one run. Owned by the caller; nothing is
/// shared between runs.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Collection attempts made (never more than `max_retries + 1`).
    pub attempts: u32,
    /// Every state entered, in order, starting with `Idle`.
    pub states: Vec<PipelineState>,
    /// Verdict on the last validated batch. `None` for a failed run, whose
    /// earlier batches are discarded.
    pub verdict: Option<ValidationVerdict>,
    /// Raw text from the last successful collection attempt.
    #[serde(skip)]
    pub last_raw: Option<String>,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, RunOutcome::Failed(_))
    }

    pub fn final_state(&self) -> PipelineState {
        self.states.last().copied().unwrap_or(PipelineState::Idle)
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before each collection attempt.
    fn attempt(&self, current: u32, max: u32);
    /// Called after each outreach file is written.
    fn contact_written(&self, path: &str, current: usize, total: usize);
    /// Called when the orchestrated run reaches a terminal state.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn attempt(&self, _current: u32, _max: u32) {}
    fn contact_written(&self, _path: &str, _current: usize, _total: usize) {}
    fn done(&self, _report: &RunReport) {}
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Records state transitions for one run.
struct Transitions {
    run_id: RunId,
    states: Vec<PipelineState>,
}

impl Transitions {
    fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            states: vec![PipelineState::Idle],
        }
    }

    fn enter(&mut self, next: PipelineState, attempt: u32) -> PipelineState {
        let from = self.states.last().copied().unwrap_or(PipelineState::Idle);
        info!(run_id = %self.run_id, attempt, ?from, to = ?next, "pipeline transition");
        self.states.push(next);
        next
    }
}

/// What `Delegating` is reacting to.
enum DelegationCause {
    CollectorError(String),
    TooManyInvalid { invalid: usize, total: usize },
}

/// Run collect → parse → validate with bounded re-collection.
///
/// Never returns an error: failures end in [`RunOutcome::Failed`].
#[instrument(skip_all, fields(collector = collector.name(), domain = %config.email_domain, max_retries = config.max_retries))]
pub async fn orchestrate<C: Collector>(
    config: &PipelineConfig,
    collector: &C,
    progress: &dyn ProgressReporter,
) -> RunReport {
    let run_id = RunId::new();
    let started_at = Utc::now();
    let max_attempts = config.max_retries.saturating_add(1);

    let mut transitions = Transitions::new(run_id.clone());
    let mut request = CollectRequest::initial(config);
    let mut retries_left = config.max_retries;
    let mut attempts: u32 = 0;

    let mut collected: Result<String> = Ok(String::new());
    let mut last_raw: Option<String> = None;
    let mut records: Vec<ContactRecord> = Vec::new();
    let mut verdict: Option<ValidationVerdict> = None;
    let mut cause: Option<DelegationCause> = None;

    info!(%run_id, "starting outreach run");

    let mut state = transitions.enter(PipelineState::Collecting, 1);
    let outcome = loop {
        match state {
            PipelineState::Collecting => {
                attempts = attempts.saturating_add(1);
                progress.attempt(attempts, max_attempts);
                progress.phase(&format!("Collecting contacts (attempt {attempts}/{max_attempts})"));

                collected = collector.collect(&request).await;
                state = transitions.enter(PipelineState::Parsing, attempts);
            }

            PipelineState::Parsing => {
                let raw = match std::mem::replace(&mut collected, Ok(String::new())) {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(attempt = attempts, error = %e, "collection attempt failed");
                        cause = Some(DelegationCause::CollectorError(e.to_string()));
                        state = transitions.enter(PipelineState::Delegating, attempts);
                        continue;
                    }
                };

                progress.phase("Parsing collector output");
                let parsed = parser::parse(&raw);
                last_raw = Some(raw);

                match parsed {
                    Ok(list) if list.is_empty() => {
                        warn!(attempt = attempts, "collector returned an empty list");
                        transitions.enter(PipelineState::Failed, attempts);
                        break RunOutcome::Failed(RunFailure::NoContacts {
                            raw: last_raw.clone().unwrap_or_default(),
                        });
                    }
                    Ok(list) => {
                        records = list;
                        state = transitions.enter(PipelineState::Validating, attempts);
                    }
                    Err(e) => {
                        warn!(attempt = attempts, error = %e, "collector output is unparseable");
                        transitions.enter(PipelineState::Failed, attempts);
                        break RunOutcome::Failed(parse_failure(e));
                    }
                }
            }

            PipelineState::Validating => {
                progress.phase("Reviewing contacts");
                let batch = validator::validate(std::mem::take(&mut records), &config.email_domain);

                if !batch.duplicate_emails.is_empty() {
                    warn!(duplicates = ?batch.duplicate_emails, "same email collected for more than one contact");
                }

                let needs_more = batch.requires_recollection();
                if needs_more && retries_left > 0 {
                    cause = Some(DelegationCause::TooManyInvalid {
                        invalid: batch.invalid_count,
                        total: batch.total_count,
                    });
                    state = transitions.enter(PipelineState::Delegating, attempts);
                } else {
                    if needs_more {
                        warn!(
                            ratio = batch.invalid_ratio(),
                            attempts, "retry budget exhausted, keeping valid contacts"
                        );
                    }
                    state = transitions.enter(PipelineState::Finalizing, attempts);
                }
                verdict = Some(batch);
            }

            PipelineState::Delegating => {
                let feedback = match cause.take() {
                    Some(DelegationCause::TooManyInvalid { invalid, total }) => Some(
                        instructions::recollection_feedback(invalid, total, &config.email_domain),
                    ),
                    Some(DelegationCause::CollectorError(message)) if retries_left == 0 => {
                        transitions.enter(PipelineState::Failed, attempts);
                        break RunOutcome::Failed(RunFailure::Collector { message });
                    }
                    Some(DelegationCause::CollectorError(_)) | None => request.feedback.clone(),
                };

                retries_left -= 1;
                info!(retries_left, "sending collection back");
                request = request.retry(feedback);
                state = transitions.enter(PipelineState::Collecting, attempts.saturating_add(1));
            }

            PipelineState::Finalizing => {
                let Some(batch) = verdict.as_ref() else {
                    transitions.enter(PipelineState::Failed, attempts);
                    break RunOutcome::Failed(RunFailure::NoContacts {
                        raw: last_raw.clone().unwrap_or_default(),
                    });
                };
                let status = if batch.requires_recollection() {
                    CompletionStatus::RecollectionExhausted
                } else {
                    CompletionStatus::Clean
                };
                transitions.enter(PipelineState::Done, attempts);
                break RunOutcome::Completed {
                    contacts: batch.valid_records.clone(),
                    status,
                };
            }

            PipelineState::Idle | PipelineState::Done | PipelineState::Failed => {
                unreachable!("terminal and initial states are never looped on")
            }
        }
    };

    if matches!(outcome, RunOutcome::Failed(_)) {
        verdict = None;
    }

    let report = RunReport {
        run_id,
        started_at,
        finished_at: Utc::now(),
        attempts,
        states: transitions.states,
        verdict,
        last_raw,
        outcome,
    };

    match &report.outcome {
        RunOutcome::Completed { contacts, status } => info!(
            run_id = %report.run_id,
            attempts = report.attempts,
            contacts = contacts.len(),
            ?status,
            "run finalized"
        ),
        RunOutcome::Failed(failure) => warn!(
            run_id = %report.run_id,
            attempts = report.attempts,
            %failure,
            "run failed"
        ),
    }

    progress.done(&report);
    report
}

fn parse_failure(err: GradReachError) -> RunFailure {
    match err {
        GradReachError::Parse { message, raw } => RunFailure::Parse { message, raw },
        other => RunFailure::Parse {
            message: other.to_string(),
            raw: String::new(),
        },
    }
}

// ---------------------------------------------------------------------------
// End-to-end workflow
// ---------------------------------------------------------------------------

/// Settings for [`run_outreach`].
#[derive(Debug, Clone)]
pub struct OutreachSettings {
    pub pipeline: PipelineConfig,
    pub message: MessageConfig,
    /// Compose but do not write files.
    pub dry_run: bool,
}

/// Result of [`run_outreach`].
#[derive(Debug)]
pub struct OutreachSummary {
    pub report: RunReport,
    /// Finalized contacts with their composed messages (empty on failure).
    pub contacts: Vec<ContactRecord>,
    /// One entry per file written (empty on failure or dry run).
    pub written: Vec<WriteResult>,
    /// Contacts whose file could not be written, with the reason.
    pub failed: Vec<(String, GradReachError)>,
    pub elapsed: std::time::Duration,
}

impl OutreachSummary {
    pub fn collisions(&self) -> impl Iterator<Item = &WriteCollision> {
        self.written.iter().filter_map(|w| w.collision.as_ref())
    }
}

/// Orchestrate a run, then compose and write a message per valid contact.
///
/// The template is checked before any collection happens. A failed run
/// returns `Ok` with no contacts and no files; inspect `report.outcome`.
/// A contact whose file cannot be written is skipped and listed in
/// `failed`; the rest are still written.
#[instrument(skip_all, fields(output_dir = %settings.pipeline.output_dir.display(), dry_run = settings.dry_run))]
pub async fn run_outreach<C: Collector>(
    settings: &OutreachSettings,
    collector: &C,
    progress: &dyn ProgressReporter,
) -> Result<OutreachSummary> {
    let start = Instant::now();
    let composer = MessageComposer::from_config(&settings.message)?;

    let report = orchestrate(&settings.pipeline, collector, progress).await;

    let RunOutcome::Completed { contacts, .. } = &report.outcome else {
        return Ok(OutreachSummary {
            report,
            contacts: Vec::new(),
            written: Vec::new(),
            failed: Vec::new(),
            elapsed: start.elapsed(),
        });
    };

    progress.phase("Composing messages");
    let mut contacts = contacts.clone();
    for contact in &mut contacts {
        contact.outreach_message = Some(composer.compose(&contact.name)?);
    }

    let mut written = Vec::new();
    let mut failed = Vec::new();
    if !settings.dry_run {
        progress.phase("Writing outreach files");
        let mut writer =
            OutreachWriter::new(&settings.pipeline.output_dir, settings.message.bcc.clone());
        let total = contacts.len();
        for (i, contact) in contacts.iter().enumerate() {
            match writer.write(contact) {
                Ok(result) => {
                    progress.contact_written(&result.path.to_string_lossy(), i + 1, total);
                    written.push(result);
                }
                Err(e) => {
                    warn!(name = %contact.name, error = %e, "skipping contact, outreach file not written");
                    failed.push((contact.name.clone(), e));
                }
            }
        }
    }

    let summary = OutreachSummary {
        report,
        contacts,
        written,
        failed,
        elapsed: start.elapsed(),
    };

    info!(
        run_id = %summary.report.run_id,
        contacts = summary.contacts.len(),
        files = summary.written.len(),
        failed = summary.failed.len(),
        collisions = summary.collisions().count(),
        elapsed_ms = summary.elapsed.as_millis(),
        "outreach run complete"
    );

    Ok(summary)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use gradreach_shared::AppConfig;

    use super::*;

    /// Collector that replays queued answers and records the requests it saw.
    struct ScriptedCollector {
        answers: Mutex<VecDeque<Result<String>>>,
        seen: Mutex<Vec<CollectRequest>>,
    }

    impl ScriptedCollector {
        fn new(answers: Vec<Result<String>>) -> Self {
            Self {
                answers: Mutex::new(answers.into()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<CollectRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl Collector for ScriptedCollector {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn collect(&self, request: &CollectRequest) -> Result<String> {
            self.seen.lock().unwrap().push(request.clone());
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GradReachError::Collector("script exhausted".into())))
        }
    }

    fn config(max_retries: u32) -> PipelineConfig {
        let mut config = PipelineConfig::try_from(&AppConfig::default()).unwrap();
        config.max_retries = max_retries;
        config.max_count = 10;
        config
    }

    const MIXED: &str = r#"[{"name":"Jo Lee","email":"jo@iastate.edu"},{"name":"X","email":"None"}]"#;
    const CLEAN: &str = r#"[{"name":"Jo Lee","email":"jo@iastate.edu"},{"name":"Amy Wu","email":"amy@iastate.edu"}]"#;

    use PipelineState::*;

    #[tokio::test]
    async fn clean_batch_finishes_in_one_attempt() {
        let collector = ScriptedCollector::new(vec![Ok(CLEAN.into())]);
        let report = orchestrate(&config(2), &collector, &SilentProgress).await;

        assert_eq!(report.attempts, 1);
        assert_eq!(report.states, vec![Idle, Collecting, Parsing, Validating, Finalizing, Done]);
        match &report.outcome {
            RunOutcome::Completed { contacts, status } => {
                assert_eq!(contacts.len(), 2);
                assert_eq!(*status, CompletionStatus::Clean);
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bad_batch_is_sent_back_with_feedback() {
        let collector = ScriptedCollector::new(vec![Ok(MIXED.into()), Ok(CLEAN.into())]);
        let report = orchestrate(&config(2), &collector, &SilentProgress).await;

        assert_eq!(report.attempts, 2);
        assert_eq!(
            report.states,
            vec![
                Idle, Collecting, Parsing, Validating, Delegating, Collecting, Parsing,
                Validating, Finalizing, Done
            ]
        );

        let requests = collector.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].feedback.is_none());
        assert_eq!(requests[1].attempt, 2);
        assert!(requests[1].feedback.as_deref().unwrap().contains("1 of 2"));
        assert_eq!(requests[1].max_count, requests[0].max_count);
    }

    #[tokio::test]
    async fn exhausted_retries_still_finalize() {
        let collector = ScriptedCollector::new(vec![
            Ok(MIXED.into()),
            Ok(MIXED.into()),
            Ok(MIXED.into()),
            Ok(CLEAN.into()),
        ]);
        let report = orchestrate(&config(2), &collector, &SilentProgress).await;

        assert_eq!(report.attempts, 3);
        assert_eq!(collector.requests().len(), 3);
        assert_eq!(report.final_state(), Done);
        match &report.outcome {
            RunOutcome::Completed { contacts, status } => {
                assert_eq!(contacts.len(), 1);
                assert_eq!(contacts[0].name, "Jo Lee");
                assert_eq!(*status, CompletionStatus::RecollectionExhausted);
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_retries_means_single_attempt() {
        let collector = ScriptedCollector::new(vec![Ok(MIXED.into()), Ok(CLEAN.into())]);
        let report = orchestrate(&config(0), &collector, &SilentProgress).await;
        assert_eq!(report.attempts, 1);
        assert!(!report.states.contains(&Delegating));
    }

    #[tokio::test]
    async fn attempts_never_exceed_budget() {
        for max_retries in 0..4 {
            let answers = (0..10).map(|_| Ok(MIXED.to_string())).collect();
            let collector = ScriptedCollector::new(answers);
            let report = orchestrate(&config(max_retries), &collector, &SilentProgress).await;
            assert_eq!(report.attempts, max_retries + 1);
            assert_eq!(collector.requests().len() as u32, max_retries + 1);
        }
    }

    #[tokio::test]
    async fn unparseable_output_fails_without_retry() {
        let raw = "I could not open the page, sorry.";
        let collector = ScriptedCollector::new(vec![Ok(raw.into()), Ok(CLEAN.into())]);
        let report = orchestrate(&config(2), &collector, &SilentProgress).await;

        assert_eq!(report.attempts, 1);
        assert_eq!(report.states, vec![Idle, Collecting, Parsing, Failed]);
        match &report.outcome {
            RunOutcome::Failed(failure) => {
                assert!(matches!(failure, RunFailure::Parse { .. }));
                assert_eq!(failure.raw_text(), Some(raw));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn prose_wrapped_list_is_recovered() {
        let raw = "Sure! Here you go:\n[{\"name\":\"A\",\"email\":\"a@iastate.edu\"}]\nThanks.";
        let collector = ScriptedCollector::new(vec![Ok(raw.into())]);
        let report = orchestrate(&config(1), &collector, &SilentProgress).await;
        assert!(matches!(
            report.outcome,
            RunOutcome::Completed { status: CompletionStatus::Clean, .. }
        ));
        assert_eq!(report.last_raw.as_deref(), Some(raw));
    }

    #[tokio::test]
    async fn empty_list_is_its_own_failure() {
        let collector = ScriptedCollector::new(vec![Ok("[]".into())]);
        let report = orchestrate(&config(2), &collector, &SilentProgress).await;

        assert_eq!(report.attempts, 1);
        assert_eq!(report.final_state(), Failed);
        assert!(matches!(
            report.outcome,
            RunOutcome::Failed(RunFailure::NoContacts { .. })
        ));
    }

    #[tokio::test]
    async fn collector_error_is_retried_then_recovers() {
        let collector = ScriptedCollector::new(vec![
            Err(GradReachError::Network("timeout".into())),
            Ok(CLEAN.into()),
        ]);
        let report = orchestrate(&config(1), &collector, &SilentProgress).await;

        assert_eq!(report.attempts, 2);
        assert_eq!(
            report.states,
            vec![Idle, Collecting, Parsing, Delegating, Collecting, Parsing, Validating, Finalizing, Done]
        );
        assert!(collector.requests()[1].feedback.is_none());
    }

    #[tokio::test]
    async fn collector_error_without_budget_fails() {
        let collector = ScriptedCollector::new(vec![
            Err(GradReachError::Network("timeout".into())),
            Err(GradReachError::Network("timeout again".into())),
        ]);
        let report = orchestrate(&config(1), &collector, &SilentProgress).await;

        assert_eq!(report.attempts, 2);
        assert_eq!(report.final_state(), Failed);
        assert_eq!(report.states[report.states.len() - 2], Delegating);
        match &report.outcome {
            RunOutcome::Failed(RunFailure::Collector { message }) => {
                assert!(message.contains("timeout again"));
            }
            other => panic!("expected collector failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_run_drops_earlier_verdict() {
        let collector = ScriptedCollector::new(vec![
            Ok(MIXED.into()),
            Err(GradReachError::Network("timeout".into())),
        ]);
        let report = orchestrate(&config(1), &collector, &SilentProgress).await;

        assert!(matches!(
            report.outcome,
            RunOutcome::Failed(RunFailure::Collector { .. })
        ));
        assert!(report.verdict.is_none());
        assert_eq!(report.last_raw.as_deref(), Some(MIXED));
    }

    #[tokio::test]
    async fn huge_retry_budget_does_not_overflow() {
        let collector = ScriptedCollector::new(vec![Ok(CLEAN.into())]);
        let report = orchestrate(&config(u32::MAX), &collector, &SilentProgress).await;

        assert_eq!(report.attempts, 1);
        assert_eq!(report.final_state(), Done);
    }

    #[tokio::test]
    async fn runs_do_not_share_contacts() {
        let first = ScriptedCollector::new(vec![Ok(CLEAN.into())]);
        let second = ScriptedCollector::new(vec![Ok(
            r#"[{"name":"Le Chen","email":"lechen@iastate.edu"}]"#.into(),
        )]);

        let a = orchestrate(&config(0), &first, &SilentProgress).await;
        let b = orchestrate(&config(0), &second, &SilentProgress).await;

        assert_ne!(a.run_id, b.run_id);
        let RunOutcome::Completed { contacts, .. } = &b.outcome else {
            panic!("expected Completed");
        };
        assert_eq!(contacts.len(), 1);
    }

    // -----------------------------------------------------------------------
    // run_outreach
    // -----------------------------------------------------------------------

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("gr-pipeline-test-{}", uuid::Uuid::now_v7()))
    }

    fn settings(output_dir: PathBuf, dry_run: bool) -> OutreachSettings {
        let app = AppConfig::default();
        let mut pipeline = config(1);
        pipeline.output_dir = output_dir;
        OutreachSettings {
            pipeline,
            message: MessageConfig::from(&app),
            dry_run,
        }
    }

    #[tokio::test]
    async fn writes_one_file_per_valid_contact() {
        let dir = temp_dir();
        let collector = ScriptedCollector::new(vec![Ok(CLEAN.into())]);
        let summary = run_outreach(&settings(dir.clone(), false), &collector, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(summary.written.len(), 2);
        assert!(summary.contacts.iter().all(|c| c.outreach_message.is_some()));

        let jo = std::fs::read_to_string(dir.join("jo_lee.txt")).unwrap();
        assert!(jo.starts_with("Email: jo@iastate.edu\n"));
        assert!(jo.contains("Hi Jo,"));
        assert!(dir.join("amy_wu.txt").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn same_name_contacts_collide() {
        let dir = temp_dir();
        let raw = r#"[{"name":"J Smith","email":"js1@iastate.edu"},{"name":"J Smith","email":"js2@iastate.edu"}]"#;
        let collector = ScriptedCollector::new(vec![Ok(raw.into())]);
        let summary = run_outreach(&settings(dir.clone(), false), &collector, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(summary.written.len(), 2);
        let collisions: Vec<_> = summary.collisions().collect();
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].key, "j_smith");

        let entries = std::fs::read_dir(&dir).unwrap().count();
        assert_eq!(entries, 1);
        let content = std::fs::read_to_string(dir.join("j_smith.txt")).unwrap();
        assert!(content.contains("js2@iastate.edu"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn failed_run_writes_nothing() {
        let dir = temp_dir();
        let collector = ScriptedCollector::new(vec![Ok("no data here".into())]);
        let summary = run_outreach(&settings(dir.clone(), false), &collector, &SilentProgress)
            .await
            .unwrap();

        assert!(summary.report.is_failed());
        assert!(summary.contacts.is_empty());
        assert!(summary.written.is_empty());
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn dry_run_composes_without_writing() {
        let dir = temp_dir();
        let collector = ScriptedCollector::new(vec![Ok(CLEAN.into())]);
        let summary = run_outreach(&settings(dir.clone(), true), &collector, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(summary.contacts.len(), 2);
        assert!(summary.contacts[0].outreach_message.as_deref().unwrap().contains("Hi Jo,"));
        assert!(summary.written.is_empty());
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn unwritable_contact_does_not_stop_the_rest() {
        let dir = temp_dir();
        let raw = r#"[{"name":"Jo Lee","email":"jo@iastate.edu"},{"name":"/","email":"slash@iastate.edu"},{"name":"Amy Wu","email":"amy@iastate.edu"}]"#;
        let collector = ScriptedCollector::new(vec![Ok(raw.into())]);
        let summary = run_outreach(&settings(dir.clone(), false), &collector, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(summary.written.len(), 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "/");
        assert!(matches!(summary.failed[0].1, GradReachError::Validation { .. }));
        assert!(dir.join("jo_lee.txt").exists());
        assert!(dir.join("amy_wu.txt").exists());
        assert!(!summary.report.is_failed());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn bad_template_fails_before_collecting() {
        let mut s = settings(temp_dir(), true);
        s.message.template = "Hello {unknown_field}".into();
        let collector = ScriptedCollector::new(vec![Ok(CLEAN.into())]);

        let err = run_outreach(&s, &collector, &SilentProgress).await.unwrap_err();
        assert!(matches!(err, GradReachError::Template { .. }));
        assert!(collector.requests().is_empty());
    }
}
