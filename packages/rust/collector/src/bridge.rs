//! Extraction-agent bridge.
//!
//! Spawns an external agent (typically a script driving an LLM with web
//! tools) and exchanges JSON-lines messages over stdin/stdout:
//!
//! ```text
//! agent  -> {"type":"ready"}
//! us     -> {"type":"collect","id":"collect-1","request":{...}}
//! agent  -> {"type":"result","id":"collect-1","text":"[...]"}
//!        |  {"type":"error","id":"collect-1","error":"..."}
//! us     -> {"type":"shutdown"}
//! ```

use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, instrument, warn};

use gradreach_shared::{GradReachError, Result};

use crate::{CollectRequest, Collector};

// ---------------------------------------------------------------------------
// Protocol types
// ---------------------------------------------------------------------------

/// Request message sent to the agent.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum RequestMessage<'a> {
    #[serde(rename = "collect")]
    Collect {
        id: String,
        request: &'a CollectRequest,
    },
    #[serde(rename = "shutdown")]
    Shutdown,
}

/// Response message received from the agent.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseMessage {
    #[serde(rename = "ready")]
    Ready,
    #[serde(rename = "result")]
    Result { id: String, text: String },
    #[serde(rename = "error")]
    Error {
        #[allow(dead_code)]
        id: String,
        error: String,
    },
}

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

/// Collector backed by an external extraction agent subprocess.
///
/// A fresh agent process is started for every attempt, so no agent state
/// leaks between attempts or runs.
pub struct BridgeCollector {
    cmd: String,
    script: String,
    timeout: Duration,
}

impl BridgeCollector {
    pub fn new(cmd: &str, script: &str, timeout_secs: u64) -> Self {
        Self {
            cmd: cmd.to_string(),
            script: script.to_string(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    async fn run_session(&self, request: &CollectRequest) -> Result<String> {
        let mut session = BridgeSession::spawn(&self.cmd, &self.script)?;
        session.wait_for_ready().await?;

        let outcome = session.send_collect(request).await;
        session.shutdown().await;
        outcome
    }
}

impl Collector for BridgeCollector {
    fn name(&self) -> &str {
        "bridge"
    }

    #[instrument(skip_all, fields(cmd = %self.cmd, script = %self.script, attempt = request.attempt))]
    async fn collect(&self, request: &CollectRequest) -> Result<String> {
        match tokio::time::timeout(self.timeout, self.run_session(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(GradReachError::Collector(format!(
                "extraction agent did not answer within {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Session handle
// ---------------------------------------------------------------------------

/// Handle to one spawned agent process.
struct BridgeSession {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    request_counter: u64,
}

impl BridgeSession {
    fn spawn(cmd: &str, script: &str) -> Result<Self> {
        info!(%cmd, %script, "spawning extraction agent");

        let mut child = Command::new(cmd)
            .arg(script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // agent logs go to parent stderr
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                GradReachError::Collector(format!(
                    "failed to spawn extraction agent: {e}. Is `{cmd}` installed?"
                ))
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            GradReachError::Collector("failed to capture agent stdin".into())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            GradReachError::Collector("failed to capture agent stdout".into())
        })?;

        Ok(Self {
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
            request_counter: 0,
        })
    }

    async fn wait_for_ready(&mut self) -> Result<()> {
        match self.read_message().await? {
            ResponseMessage::Ready => {
                debug!("extraction agent is ready");
                Ok(())
            }
            other => Err(GradReachError::Collector(format!(
                "expected ready message, got: {other:?}"
            ))),
        }
    }

    async fn send_collect(&mut self, request: &CollectRequest) -> Result<String> {
        self.request_counter += 1;
        let id = format!("collect-{}", self.request_counter);

        self.write_message(&RequestMessage::Collect {
            id: id.clone(),
            request,
        })
        .await?;

        match self.read_message().await? {
            ResponseMessage::Result { id: resp_id, text } => {
                if resp_id != id {
                    warn!(expected = %id, got = %resp_id, "agent answered with a different id");
                }
                Ok(text)
            }
            ResponseMessage::Error { error, .. } => Err(GradReachError::Collector(error)),
            ResponseMessage::Ready => Err(GradReachError::Collector(
                "unexpected ready message during collection".into(),
            )),
        }
    }

    async fn shutdown(mut self) {
        if let Err(e) = self.write_message(&RequestMessage::Shutdown).await {
            debug!(error = %e, "agent stdin already closed");
        }

        match self.child.wait().await {
            Ok(status) => debug!(?status, "extraction agent exited"),
            Err(e) => warn!("extraction agent wait error: {e}"),
        }
    }

    async fn write_message(&mut self, msg: &RequestMessage<'_>) -> Result<()> {
        let json = serde_json::to_string(msg).map_err(|e| {
            GradReachError::Collector(format!("failed to serialize request: {e}"))
        })?;

        self.stdin
            .write_all(format!("{json}\n").as_bytes())
            .await
            .map_err(|e| GradReachError::Collector(format!("failed to write to agent: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| GradReachError::Collector(format!("failed to flush agent stdin: {e}")))
    }

    /// Next non-blank line, decoded as a protocol message.
    async fn read_message(&mut self) -> Result<ResponseMessage> {
        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| GradReachError::Collector(format!("agent read error: {e}")))?
                .ok_or_else(|| {
                    GradReachError::Collector("extraction agent closed stdout unexpectedly".into())
                })?;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            return serde_json::from_str(trimmed).map_err(|e| {
                GradReachError::Collector(format!(
                    "invalid agent message: {e} (got: {})",
                    truncate(trimmed, 200)
                ))
            });
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
