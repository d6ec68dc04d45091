//! Code Runner - the execution boundary
//!
//! **Responsibility:**
//! Execute source code for one language against one stdin and hand back raw
//! stdout, or a failure describing why no usable output exists.
//!
//! **Boundary:**
//! - Runners know HOW code is executed (nowhere, or by an external executor)
//! - Runners do NOT compare outputs or decide pass/fail
//! - Runners do NOT touch persistence
//!
//! Sandboxed execution itself happens outside this workspace; `QueueRunner`
//! only forwards work to whatever executor consumes the Redis runner queue.

use async_trait::async_trait;
use odyssey_common::redis as keys;
use odyssey_common::types::RunRequest;
use tracing::{debug, warn};
use uuid::Uuid;

/// Safety limits applied before anything leaves the process
pub const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024; // 1MB
pub const MAX_TEST_INPUT_BYTES: usize = 10 * 1024 * 1024; // 10MB

/// Output used by `PlaceholderRunner` when none is configured
pub const PLACEHOLDER_OUTPUT: &str = "Placeholder output";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunnerError {
    #[error("Execution timed out after {0}ms")]
    Timeout(u64),
    #[error("Process exited with code {exit_code}: {stderr}")]
    Runtime { exit_code: i64, stderr: String },
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("Input rejected: {0}")]
    Rejected(String),
    #[error("Runner unavailable: {0}")]
    Unavailable(String),
}

impl RunnerError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RunnerError::Timeout(_))
    }
}

#[async_trait]
pub trait CodeRunner: Send + Sync {
    /// Run `code` once with `input` on stdin and return its stdout
    async fn run(&self, code: &str, language: &str, input: &str) -> Result<String, RunnerError>;
}

/// Runner that never executes anything and answers with a fixed output
#[derive(Debug, Clone)]
pub struct PlaceholderRunner {
    output: String,
}

impl PlaceholderRunner {
    pub fn new() -> Self {
        Self::with_output(PLACEHOLDER_OUTPUT)
    }

    pub fn with_output(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
        }
    }
}

impl Default for PlaceholderRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CodeRunner for PlaceholderRunner {
    async fn run(&self, _code: &str, _language: &str, _input: &str) -> Result<String, RunnerError> {
        Ok(self.output.clone())
    }
}

/// Longest head start the evaluator's timeout gets over the reply wait
const MAX_REPLY_MARGIN_MS: u64 = 500;

/// Pass-through to an external executor over Redis
///
/// Pushes a `RunRequest` onto the language queue over the shared connection
/// and waits for the per-job reply on a connection of its own, so one
/// pending reply never holds up another run.
#[derive(Clone)]
pub struct QueueRunner {
    client: redis::Client,
    conn: redis::aio::ConnectionManager,
    timeout_ms: u64,
}

impl QueueRunner {
    pub async fn connect(redis_url: &str, timeout_ms: u64) -> odyssey_common::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = redis::aio::ConnectionManager::new(client.clone()).await?;
        Ok(Self {
            client,
            conn,
            timeout_ms: timeout_ms.max(1),
        })
    }
}

/// BLPOP wait for an executor reply: positive, and short of `timeout_ms`
/// by a tenth of it (at most `MAX_REPLY_MARGIN_MS`)
pub fn reply_wait_seconds(timeout_ms: u64) -> f64 {
    let margin = (timeout_ms / 10).min(MAX_REPLY_MARGIN_MS);
    timeout_ms.saturating_sub(margin).max(1) as f64 / 1000.0
}

/// Reject inputs an executor must never see
pub fn check_limits(code: &str, input: &str) -> Result<(), RunnerError> {
    if code.len() > MAX_SOURCE_CODE_BYTES {
        return Err(RunnerError::Rejected(format!(
            "source code exceeds maximum size of {} bytes",
            MAX_SOURCE_CODE_BYTES
        )));
    }
    if input.len() > MAX_TEST_INPUT_BYTES {
        return Err(RunnerError::Rejected(format!(
            "test input exceeds maximum size of {} bytes",
            MAX_TEST_INPUT_BYTES
        )));
    }
    Ok(())
}

#[async_trait]
impl CodeRunner for QueueRunner {
    async fn run(&self, code: &str, language: &str, input: &str) -> Result<String, RunnerError> {
        check_limits(code, input)?;
        if language.trim().is_empty() {
            return Err(RunnerError::UnsupportedLanguage(language.to_string()));
        }

        let request = RunRequest {
            id: Uuid::new_v4(),
            language: language.to_lowercase(),
            source_code: code.to_string(),
            input: input.to_string(),
            timeout_ms: self.timeout_ms,
        };

        let mut reply_conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| RunnerError::Unavailable(e.to_string()))?;

        let mut conn = self.conn.clone();
        keys::push_run_request(&mut conn, &request)
            .await
            .map_err(|e| RunnerError::Unavailable(e.to_string()))?;
        debug!(job_id = %request.id, language = %request.language, "Run request queued");

        let wait_seconds = reply_wait_seconds(self.timeout_ms);
        let outcome = keys::wait_run_outcome(&mut reply_conn, &request.id, wait_seconds)
            .await
            .map_err(|e| RunnerError::Unavailable(e.to_string()))?;

        match outcome {
            None => {
                warn!(job_id = %request.id, timeout_ms = self.timeout_ms, "No reply from executor");
                Err(RunnerError::Timeout(self.timeout_ms))
            }
            Some(outcome) if outcome.timed_out => Err(RunnerError::Timeout(self.timeout_ms)),
            Some(outcome) => match outcome.exit_code {
                Some(code) if code != 0 => Err(RunnerError::Runtime {
                    exit_code: code,
                    stderr: outcome.stderr,
                }),
                _ => Ok(outcome.stdout),
            },
        }
    }
}
