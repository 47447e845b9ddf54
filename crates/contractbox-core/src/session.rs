//! Execution session: one captured run of user source text.
//!
//! A run is atomic from the caller's point of view: the configuration text is
//! written to the runtime's virtual filesystem, the output channels are
//! redirected to in-memory buffers, the source text is executed, the buffers
//! are read back, and the channels are restored — unconditionally, on every
//! exit path. No output is visible until the run concludes.
//!
//! A failure raised by the source text is a normal outcome, folded into the
//! result. Only failures in the surrounding orchestration (handle gone, step
//! watchdog tripped, cancel flag set) surface as the run's entire output.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PlaygroundError, Result};
use crate::runtime::InterpreterRuntime;

/// Fixed virtual-filesystem location the guard library reads the
/// configuration from.
pub const CONTRACT_FILE: &str = "contracts.yaml";

/// Substituted when a run produces no output at all.
pub const NO_OUTPUT_PLACEHOLDER: &str = "(no output)";

/// Redirects the runtime's output channels into fresh in-memory buffers.
pub const REDIRECT_PRELUDE: &str = "\
import sys, io
_cbx_stdout = io.StringIO()
_cbx_stderr = io.StringIO()
sys.stdout = _cbx_stdout
sys.stderr = _cbx_stderr
";

/// Reads the captured standard-output buffer.
pub const READ_STDOUT_EXPR: &str = "_cbx_stdout.getvalue()";

/// Reads the captured standard-error buffer.
pub const READ_STDERR_EXPR: &str = "_cbx_stderr.getvalue()";

/// Restores the original output channels.
pub const RESTORE_EPILOGUE: &str = "\
import sys
sys.stdout = sys.__stdout__
sys.stderr = sys.__stderr__
";

/// Configuration for a session's watchdog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Maximum wall-clock time for a single execution step (milliseconds).
    /// The watchdog discards a stuck step; it cannot interrupt the
    /// cooperative runtime mid-computation.
    pub step_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            step_timeout_ms: 30_000,
        }
    }
}

/// Cooperative cancellation flag, honored at step boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The in-flight step is not interrupted; the
    /// session stops before starting the next one.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// The result of one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunOutcome {
    /// Concatenated stdout, stderr, and raised-error text, or the
    /// orchestration failure message, or the no-output placeholder.
    pub output: String,
    /// Message of an error raised by the source text, when one was.
    pub runtime_error: Option<String>,
}

impl RunOutcome {
    fn orchestration(err: &PlaygroundError) -> Self {
        Self {
            output: err.to_string(),
            runtime_error: None,
        }
    }
}

/// One captured execution of source text against a configuration text.
///
/// Borrows the runtime handle per run; never retains it past the run.
pub struct ExecutionSession {
    runtime: Arc<dyn InterpreterRuntime>,
    config: SessionConfig,
}

impl ExecutionSession {
    pub fn new(runtime: Arc<dyn InterpreterRuntime>) -> Self {
        Self {
            runtime,
            config: SessionConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Run one step under the cancel flag and the watchdog timeout.
    async fn step<T, F>(&self, cancel: &CancelFlag, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if cancel.is_cancelled() {
            return Err(PlaygroundError::Cancelled);
        }
        let limit = Duration::from_millis(self.config.step_timeout_ms);
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_elapsed) => Err(PlaygroundError::StepTimeout {
                elapsed_ms: self.config.step_timeout_ms,
                limit_ms: self.config.step_timeout_ms,
            }),
        }
    }

    /// Execute `source_text` against `config_text` and capture everything the
    /// runtime wrote to its output channels.
    ///
    /// Never returns an error: user-code failures are folded into the
    /// outcome, orchestration failures become the outcome's entire output.
    pub async fn run(
        &self,
        config_text: &str,
        source_text: &str,
        cancel: &CancelFlag,
    ) -> RunOutcome {
        // Step 1: hand the configuration to the guard library.
        if let Err(err) = self
            .step(cancel, self.runtime.write_file(CONTRACT_FILE, config_text))
            .await
        {
            return RunOutcome::orchestration(&err);
        }

        // Step 2: scoped redirection of the output channels.
        if let Err(err) = self.step(cancel, self.runtime.run_async(REDIRECT_PRELUDE)).await {
            return RunOutcome::orchestration(&err);
        }

        // Step 3: the user's source text. A raise is an expected outcome.
        let runtime_error = match self.step(cancel, self.runtime.run_async(source_text)).await {
            Ok(_) => None,
            Err(PlaygroundError::Raised(message)) => Some(message),
            Err(err) => {
                // Orchestration failure mid-run; channels must still come back.
                let _ = self.runtime.run_async(RESTORE_EPILOGUE).await;
                return RunOutcome::orchestration(&err);
            }
        };

        // Step 4: read both buffers. Restoration happens regardless.
        let stdout = self.step(cancel, self.runtime.run_async(READ_STDOUT_EXPR)).await;
        let stderr = self.step(cancel, self.runtime.run_async(READ_STDERR_EXPR)).await;

        // Step 5: unconditional restoration, outside cancel/watchdog gating.
        let restored = self.runtime.run_async(RESTORE_EPILOGUE).await;

        let (stdout, stderr) = match (stdout, stderr) {
            (Ok(out), Ok(err)) => (out.unwrap_or_default(), err.unwrap_or_default()),
            (Err(err), _) | (_, Err(err)) => return RunOutcome::orchestration(&err),
        };
        if let Err(err) = restored {
            return RunOutcome::orchestration(&err);
        }

        let mut parts: Vec<&str> = Vec::new();
        if !stdout.is_empty() {
            parts.push(&stdout);
        }
        if !stderr.is_empty() {
            parts.push(&stderr);
        }
        if let Some(message) = runtime_error.as_deref() {
            if !message.is_empty() {
                parts.push(message);
            }
        }

        let output = if parts.is_empty() {
            NO_OUTPUT_PLACEHOLDER.to_string()
        } else {
            parts.join("\n")
        };

        RunOutcome {
            output,
            runtime_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fakes::{RunScript, ScriptedRuntime};

    #[tokio::test]
    async fn test_successful_run_concatenates_streams() {
        let runtime = Arc::new(ScriptedRuntime::new());
        runtime.push_run(RunScript {
            stdout: "OK: done\n".to_string(),
            stderr: "warning: slow\n".to_string(),
            raise: None,
        });

        let session = ExecutionSession::new(runtime.clone());
        let outcome = session.run("contracts: []", "print('x')", &CancelFlag::new()).await;

        assert!(outcome.runtime_error.is_none());
        assert_eq!(outcome.output, "OK: done\n\nwarning: slow\n");
        assert_eq!(
            runtime.written_files(),
            vec![(CONTRACT_FILE.to_string(), "contracts: []".to_string())]
        );
        assert!(runtime.channels_restored());
    }

    #[tokio::test]
    async fn test_raise_is_folded_and_channels_restored() {
        let runtime = Arc::new(ScriptedRuntime::new());
        runtime.push_run(RunScript {
            stdout: "before the raise\n".to_string(),
            stderr: String::new(),
            raise: Some("NameError: name 'x' is not defined".to_string()),
        });

        let session = ExecutionSession::new(runtime.clone());
        let outcome = session.run("c", "x", &CancelFlag::new()).await;

        assert_eq!(
            outcome.runtime_error.as_deref(),
            Some("NameError: name 'x' is not defined")
        );
        assert_eq!(
            outcome.output,
            "before the raise\n\nNameError: name 'x' is not defined"
        );
        assert!(runtime.channels_restored());
    }

    #[tokio::test]
    async fn test_empty_run_yields_placeholder() {
        let runtime = Arc::new(ScriptedRuntime::new());
        runtime.push_run(RunScript::default());

        let session = ExecutionSession::new(runtime.clone());
        let outcome = session.run("c", "pass", &CancelFlag::new()).await;

        assert_eq!(outcome.output, NO_OUTPUT_PLACEHOLDER);
        assert!(outcome.runtime_error.is_none());
    }

    #[tokio::test]
    async fn test_orchestration_failure_becomes_output() {
        let runtime = Arc::new(ScriptedRuntime::new());
        runtime.fail_next_write_file("virtual filesystem detached");

        let session = ExecutionSession::new(runtime.clone());
        let outcome = session.run("c", "pass", &CancelFlag::new()).await;

        assert!(outcome.output.contains("virtual filesystem detached"));
        assert!(outcome.runtime_error.is_none());
    }

    #[tokio::test]
    async fn test_cancel_before_run_is_orchestration_outcome() {
        let runtime = Arc::new(ScriptedRuntime::new());
        runtime.push_run(RunScript::default());

        let cancel = CancelFlag::new();
        cancel.cancel();

        let session = ExecutionSession::new(runtime.clone());
        let outcome = session.run("c", "pass", &cancel).await;
        assert_eq!(outcome.output, PlaygroundError::Cancelled.to_string());
    }

    #[tokio::test]
    async fn test_back_to_back_runs_do_not_leak_capture() {
        let runtime = Arc::new(ScriptedRuntime::new());
        runtime.push_run(RunScript {
            stdout: "first run output\n".to_string(),
            stderr: String::new(),
            raise: Some("boom".to_string()),
        });
        runtime.push_run(RunScript {
            stdout: "second run output\n".to_string(),
            stderr: String::new(),
            raise: None,
        });

        let session = ExecutionSession::new(runtime.clone());
        let cancel = CancelFlag::new();
        let first = session.run("c", "a", &cancel).await;
        let second = session.run("c", "b", &cancel).await;

        assert!(first.output.contains("first run output"));
        assert!(!second.output.contains("first run output"));
        assert_eq!(second.output, "second run output\n");
        assert!(runtime.channels_restored());
    }
}
