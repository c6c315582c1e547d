//! Build command execution.
//!
//! Commands run inside a stage's working directory with captured output.
//! There are no retries: a non-zero exit is terminal for the pipeline and
//! is surfaced verbatim to the invoker. The execution policy makes the
//! timeout decision explicit instead of inheriting silence as a default.

use crate::errors::BuildError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Default cap on captured bytes per stream.
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 256 * 1024;

/// Execution policy for build commands.
///
/// The default carries no timeout, matching recipes that specify none;
/// callers that want a bound must opt in explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPolicy {
    /// Maximum wall-clock time for a single command, if any.
    pub step_timeout: Option<Duration>,
    /// Cap on captured bytes per output stream.
    pub output_limit_bytes: usize,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            step_timeout: None,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
        }
    }
}

impl ExecutionPolicy {
    /// Sets the per-command timeout.
    #[must_use]
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    /// Sets the captured-output cap.
    #[must_use]
    pub fn with_output_limit(mut self, bytes: usize) -> Self {
        self.output_limit_bytes = bytes;
        self
    }
}

/// One captured output stream.
///
/// UTF-8 output is carried verbatim in `text`. Non-UTF-8 bytes are
/// carried lossily in `text` and losslessly in `base64`, so nothing the
/// build printed is unrecoverable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamCapture {
    /// The captured text (lossy if the stream was not UTF-8).
    pub text: String,
    /// Base64 of the raw bytes, present only when they were not UTF-8.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
    /// Whether the stream was cut at the output limit.
    pub truncated: bool,
}

impl StreamCapture {
    /// Captures raw bytes under a byte limit.
    #[must_use]
    pub fn from_bytes(bytes: &[u8], limit: usize) -> Self {
        let truncated = bytes.len() > limit;
        let bytes = &bytes[..bytes.len().min(limit)];

        match std::str::from_utf8(bytes) {
            Ok(text) => Self {
                text: text.to_string(),
                base64: None,
                truncated,
            },
            Err(_) => Self {
                text: String::from_utf8_lossy(bytes).into_owned(),
                base64: Some(STANDARD.encode(bytes)),
                truncated,
            },
        }
    }
}

/// Captured stdout/stderr of one build command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapturedOutput {
    /// Captured standard output.
    pub stdout: StreamCapture,
    /// Captured standard error.
    pub stderr: StreamCapture,
}

impl CapturedOutput {
    /// Returns the tail of stderr for compact diagnostics.
    #[must_use]
    pub fn stderr_tail(&self, max_chars: usize) -> &str {
        let text = &self.stderr.text;
        let start = text
            .char_indices()
            .rev()
            .nth(max_chars.saturating_sub(1))
            .map_or(0, |(i, _)| i);
        &text[start..]
    }
}

/// Runs build commands inside stage working directories.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    policy: ExecutionPolicy,
}

impl CommandRunner {
    /// Creates a runner with the given policy.
    #[must_use]
    pub fn new(policy: ExecutionPolicy) -> Self {
        Self { policy }
    }

    /// Returns the runner's policy.
    #[must_use]
    pub fn policy(&self) -> &ExecutionPolicy {
        &self.policy
    }

    /// Executes `argv` with `cwd` as the working directory.
    ///
    /// # Errors
    ///
    /// - `BuildFailed` on non-zero exit or spawn failure, with captured
    ///   output attached.
    /// - `ExecutionTimeout` when the policy's timeout elapses.
    pub async fn run(
        &self,
        stage: &str,
        argv: &[String],
        cwd: &Path,
    ) -> Result<CapturedOutput, BuildError> {
        let Some((program, args)) = argv.split_first() else {
            return Err(BuildError::Internal(format!(
                "empty command in stage '{stage}'"
            )));
        };

        debug!(stage = %stage, command = %argv.join(" "), "Executing build command");

        let mut command = Command::new(program);
        command.args(args).current_dir(cwd).kill_on_drop(true);

        let output = match self.policy.step_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, command.output()).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(BuildError::ExecutionTimeout {
                        stage: stage.to_string(),
                        argv: argv.to_vec(),
                        timeout_ms: timeout.as_millis() as u64,
                    })
                }
            },
            None => command.output().await,
        };

        let output = match output {
            Ok(output) => output,
            Err(err) => {
                // Spawn failure: the environment lacks the command. Same
                // terminal contract as a failing build.
                let captured = CapturedOutput {
                    stdout: StreamCapture::default(),
                    stderr: StreamCapture::from_bytes(
                        err.to_string().as_bytes(),
                        self.policy.output_limit_bytes,
                    ),
                };
                return Err(BuildError::BuildFailed {
                    stage: stage.to_string(),
                    argv: argv.to_vec(),
                    exit_code: None,
                    output: Box::new(captured),
                });
            }
        };

        let captured = CapturedOutput {
            stdout: StreamCapture::from_bytes(&output.stdout, self.policy.output_limit_bytes),
            stderr: StreamCapture::from_bytes(&output.stderr, self.policy.output_limit_bytes),
        };

        if output.status.success() {
            Ok(captured)
        } else {
            Err(BuildError::BuildFailed {
                stage: stage.to_string(),
                argv: argv.to_vec(),
                exit_code: output.status.code(),
                output: Box::new(captured),
            })
        }
    }
}
