//! In-memory fakes for the runtime traits (testing only)
//!
//! Provides `ScriptedRuntime` and `FakeLoader` that satisfy the trait
//! contracts without spawning an interpreter process. The scripted runtime
//! understands the session's fixed redirect/read/restore snippets and plays
//! back queued [`RunScript`]s for everything else.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{PlaygroundError, Result};
use crate::runtime::{InterpreterRuntime, LoaderOptions, RuntimeLoader};
use crate::session::{
    READ_STDERR_EXPR, READ_STDOUT_EXPR, REDIRECT_PRELUDE, RESTORE_EPILOGUE,
};

/// What one executed source block writes to the captured channels, and
/// whether it raises.
#[derive(Debug, Clone, Default)]
pub struct RunScript {
    pub stdout: String,
    pub stderr: String,
    pub raise: Option<String>,
}

#[derive(Debug, Default)]
struct ScriptedState {
    written_files: Vec<(String, String)>,
    loaded_packages: Vec<String>,
    installed: Vec<String>,
    executed_sources: Vec<String>,
    run_queue: VecDeque<RunScript>,
    redirected: bool,
    prelude_count: u32,
    stdout_buf: String,
    stderr_buf: String,
    fail_next_write: Option<String>,
    fail_install: Option<String>,
}

/// Scripted in-memory interpreter runtime.
#[derive(Debug, Default)]
pub struct ScriptedRuntime {
    state: Mutex<ScriptedState>,
    run_delay: Mutex<Duration>,
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the behavior of the next executed source block.
    pub fn push_run(&self, script: RunScript) {
        self.state.lock().unwrap().run_queue.push_back(script);
    }

    /// Make the next `write_file` fail with the given reason.
    pub fn fail_next_write_file(&self, reason: &str) {
        self.state.lock().unwrap().fail_next_write = Some(reason.to_string());
    }

    /// Make every `install` fail with the given reason.
    pub fn fail_install(&self, reason: &str) {
        self.state.lock().unwrap().fail_install = Some(reason.to_string());
    }

    /// Delay each executed source block, for exercising concurrent edits
    /// while a run is in flight. Control snippets stay instant.
    pub fn set_run_delay(&self, delay: Duration) {
        *self.run_delay.lock().unwrap() = delay;
    }

    pub fn written_files(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().written_files.clone()
    }

    pub fn loaded_packages(&self) -> Vec<String> {
        self.state.lock().unwrap().loaded_packages.clone()
    }

    pub fn installed(&self) -> Vec<String> {
        self.state.lock().unwrap().installed.clone()
    }

    /// Source blocks executed, control snippets excluded.
    pub fn executed_sources(&self) -> Vec<String> {
        self.state.lock().unwrap().executed_sources.clone()
    }

    /// True when at least one redirection happened and the channels are back
    /// to their original identity.
    pub fn channels_restored(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.prelude_count > 0 && !state.redirected
    }
}

#[async_trait]
impl InterpreterRuntime for ScriptedRuntime {
    async fn load_package(&self, name: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .loaded_packages
            .push(name.to_string());
        Ok(())
    }

    async fn install(&self, requirement: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(reason) = state.fail_install.clone() {
            return Err(PlaygroundError::PackageInstall {
                package: requirement.to_string(),
                reason,
            });
        }
        state.installed.push(requirement.to_string());
        Ok(())
    }

    async fn run_async(&self, code: &str) -> Result<Option<String>> {
        let is_control = matches!(
            code,
            REDIRECT_PRELUDE | READ_STDOUT_EXPR | READ_STDERR_EXPR | RESTORE_EPILOGUE
        );
        if !is_control {
            let delay = *self.run_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        let mut state = self.state.lock().unwrap();
        match code {
            REDIRECT_PRELUDE => {
                state.redirected = true;
                state.prelude_count += 1;
                state.stdout_buf.clear();
                state.stderr_buf.clear();
                Ok(None)
            }
            READ_STDOUT_EXPR => Ok(Some(state.stdout_buf.clone())),
            READ_STDERR_EXPR => Ok(Some(state.stderr_buf.clone())),
            RESTORE_EPILOGUE => {
                state.redirected = false;
                Ok(None)
            }
            source => {
                state.executed_sources.push(source.to_string());
                let script = state.run_queue.pop_front().unwrap_or_default();
                if state.redirected {
                    state.stdout_buf.push_str(&script.stdout);
                    state.stderr_buf.push_str(&script.stderr);
                }
                match script.raise {
                    Some(message) => Err(PlaygroundError::Raised(message)),
                    None => Ok(None),
                }
            }
        }
    }

    async fn write_file(&self, path: &str, data: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(reason) = state.fail_next_write.take() {
            return Err(PlaygroundError::RuntimeUnavailable(reason));
        }
        state.written_files.push((path.to_string(), data.to_string()));
        Ok(())
    }
}

/// Counting loader handing out a shared [`ScriptedRuntime`].
pub struct FakeLoader {
    runtime: Arc<ScriptedRuntime>,
    acquires: AtomicU32,
    loads: AtomicU32,
    fail_load: AtomicBool,
    load_delay: Mutex<Duration>,
}

impl FakeLoader {
    pub fn new(runtime: Arc<ScriptedRuntime>) -> Self {
        Self {
            runtime,
            acquires: AtomicU32::new(0),
            loads: AtomicU32::new(0),
            fail_load: AtomicBool::new(false),
            load_delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn acquire_count(&self) -> u32 {
        self.acquires.load(Ordering::Relaxed)
    }

    pub fn load_count(&self) -> u32 {
        self.loads.load(Ordering::Relaxed)
    }

    pub fn set_fail_load(&self, fail: bool) {
        self.fail_load.store(fail, Ordering::Relaxed);
    }

    /// Delay inside `load`, for exercising concurrent bootstrap callers.
    pub fn set_load_delay(&self, delay: Duration) {
        *self.load_delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl RuntimeLoader for FakeLoader {
    async fn acquire(&self) -> Result<()> {
        self.acquires.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn load(&self, _options: &LoaderOptions) -> Result<Arc<dyn InterpreterRuntime>> {
        let delay = *self.load_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.loads.fetch_add(1, Ordering::Relaxed);
        if self.fail_load.load(Ordering::Relaxed) {
            return Err(PlaygroundError::InterpreterLoad(
                "scripted loader failure".to_string(),
            ));
        }
        Ok(self.runtime.clone())
    }
}
