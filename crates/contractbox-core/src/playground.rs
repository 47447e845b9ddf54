//! Top-level playground controller.
//!
//! Owns the bootstrapper, the example catalog, the two editable session
//! buffers, and the output string. All stage transitions flow through the
//! bootstrapper's stage cell and the run guard; the editing actions
//! (`select_example`, `reset`, buffer edits) never touch the stage.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

use crate::bootstrap::{BootstrapConfig, RuntimeBootstrapper};
use crate::catalog::Catalog;
use crate::error::{PlaygroundError, Result};
use crate::obs;
use crate::runtime::RuntimeLoader;
use crate::session::{CancelFlag, ExecutionSession, RunOutcome, SessionConfig};
use crate::stage::{RuntimeStage, StageSnapshot};

/// The two editable texts driving one execution.
///
/// Owned by the editing surface; the execution session reads a snapshot and
/// never mutates them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionBuffers {
    pub contract_yaml: String,
    pub source_code: String,
}

/// Metadata and outcome of one concluded run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub run_id: Uuid,
    pub example: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: RunOutcome,
}

/// Result of asking the playground to run.
///
/// A request while the stage is not `ready` is dropped, not queued.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RunRequest {
    Completed(RunReport),
    Skipped { stage: RuntimeStage },
}

#[derive(Debug)]
struct EditorState {
    selected: String,
    buffers: SessionBuffers,
    output: String,
}

/// The playground: one runtime, one pair of buffers, one output panel.
pub struct Playground {
    bootstrapper: RuntimeBootstrapper,
    catalog: Catalog,
    session_config: SessionConfig,
    state: Mutex<EditorState>,
}

impl Playground {
    pub fn new(loader: Arc<dyn RuntimeLoader>, config: BootstrapConfig) -> Self {
        Self::with_catalog(loader, config, Catalog::builtin())
    }

    pub fn with_catalog(
        loader: Arc<dyn RuntimeLoader>,
        config: BootstrapConfig,
        catalog: Catalog,
    ) -> Self {
        let first = catalog.first();
        let state = EditorState {
            selected: first.key.clone(),
            buffers: SessionBuffers {
                contract_yaml: first.contract_yaml.clone(),
                source_code: first.source_code.clone(),
            },
            output: String::new(),
        };
        Self {
            bootstrapper: RuntimeBootstrapper::new(loader, config),
            catalog,
            session_config: SessionConfig::default(),
            state: Mutex::new(state),
        }
    }

    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Boot the runtime (startup effect). Failures land in the stage; the
    /// error is also returned for callers that want to retry.
    pub async fn start(&self) -> Result<()> {
        self.bootstrapper.ensure_ready().await.map(|_| ())
    }

    pub fn stage(&self) -> StageSnapshot {
        self.bootstrapper.stage().snapshot()
    }

    pub fn subscribe_stage(&self) -> tokio::sync::watch::Receiver<StageSnapshot> {
        self.bootstrapper.stage().subscribe()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub async fn selected_example(&self) -> String {
        self.state.lock().await.selected.clone()
    }

    pub async fn buffers(&self) -> SessionBuffers {
        self.state.lock().await.buffers.clone()
    }

    pub async fn output(&self) -> String {
        self.state.lock().await.output.clone()
    }

    /// Edit the configuration text.
    pub async fn set_contract_yaml(&self, text: impl Into<String>) {
        self.state.lock().await.buffers.contract_yaml = text.into();
    }

    /// Edit the source text.
    pub async fn set_source_code(&self, text: impl Into<String>) {
        self.state.lock().await.buffers.source_code = text.into();
    }

    /// Atomically replace both buffers from the named example and clear the
    /// output. Never a partial update, never a stage change.
    pub async fn select_example(&self, key: &str) -> Result<()> {
        let example = self
            .catalog
            .get(key)
            .ok_or_else(|| PlaygroundError::UnknownExample(key.to_string()))?;
        let mut state = self.state.lock().await;
        state.selected = example.key.clone();
        state.buffers = SessionBuffers {
            contract_yaml: example.contract_yaml.clone(),
            source_code: example.source_code.clone(),
        };
        state.output.clear();
        obs::emit_example_selected(key);
        Ok(())
    }

    /// Re-apply the selected example's texts and clear the output.
    pub async fn reset(&self) {
        let key = self.state.lock().await.selected.clone();
        // The selected key always names a catalog entry.
        let _ = self.select_example(&key).await;
    }

    /// Run the current buffers. Dropped (not queued) unless stage is `ready`.
    pub async fn run(&self) -> RunRequest {
        self.run_with_cancel(&CancelFlag::new()).await
    }

    /// Run with an external cancellation flag, honored at step boundaries.
    pub async fn run_with_cancel(&self, cancel: &CancelFlag) -> RunRequest {
        let Some(_guard) = self.bootstrapper.stage().begin_run() else {
            let stage = self.bootstrapper.stage().current();
            obs::emit_run_skipped(stage.name());
            return RunRequest::Skipped { stage };
        };

        // Snapshot the buffers before the first await: a mid-run example
        // switch must not leak into this run.
        let (example, buffers) = {
            let mut state = self.state.lock().await;
            state.output.clear();
            (state.selected.clone(), state.buffers.clone())
        };

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let started = std::time::Instant::now();
        obs::emit_run_started(&run_id.to_string(), &example);

        let outcome = match self.bootstrapper.handle() {
            Some(runtime) => {
                let session =
                    ExecutionSession::new(runtime).with_config(self.session_config.clone());
                session
                    .run(&buffers.contract_yaml, &buffers.source_code, cancel)
                    .instrument(obs::run_span(&run_id.to_string()))
                    .await
            }
            // Ready stage without a handle means the runtime disappeared
            // mid-lifecycle; recorded as the run's entire output.
            None => RunOutcome {
                output: PlaygroundError::RuntimeUnavailable(
                    "runtime handle missing".to_string(),
                )
                .to_string(),
                runtime_error: None,
            },
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        obs::emit_run_finished(
            &run_id.to_string(),
            duration_ms,
            outcome.output.len(),
            outcome.runtime_error.is_some(),
        );

        // Atomic replacement: output is never appended to.
        self.state.lock().await.output = outcome.output.clone();

        RunRequest::Completed(RunReport {
            run_id,
            example,
            started_at,
            duration_ms,
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fakes::{FakeLoader, RunScript, ScriptedRuntime};

    fn playground(runtime: Arc<ScriptedRuntime>) -> Playground {
        let loader = Arc::new(FakeLoader::new(runtime));
        Playground::new(loader, BootstrapConfig::default())
    }

    #[tokio::test]
    async fn test_run_before_ready_is_skipped() {
        let runtime = Arc::new(ScriptedRuntime::new());
        let pg = playground(runtime);

        match pg.run().await {
            RunRequest::Skipped { stage } => assert_eq!(stage, RuntimeStage::Idle),
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_replaces_output() {
        let runtime = Arc::new(ScriptedRuntime::new());
        runtime.push_run(RunScript {
            stdout: "OK: Contents of README.md\n".to_string(),
            stderr: String::new(),
            raise: None,
        });
        let pg = playground(runtime.clone());
        pg.start().await.unwrap();

        let report = match pg.run().await {
            RunRequest::Completed(report) => report,
            other => panic!("expected completion, got {other:?}"),
        };
        assert_eq!(report.example, "file-agent");
        assert!(report.outcome.runtime_error.is_none());
        assert_eq!(pg.output().await, "OK: Contents of README.md\n");
        assert_eq!(pg.stage().stage, RuntimeStage::Ready);

        // The configuration text reached the fixed virtual file.
        let files = runtime.written_files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0, crate::session::CONTRACT_FILE);
        assert!(files[0].1.contains("block-sensitive-reads"));
    }

    #[tokio::test]
    async fn test_select_example_is_atomic_and_clears_output() {
        let runtime = Arc::new(ScriptedRuntime::new());
        runtime.push_run(RunScript {
            stdout: "stale\n".to_string(),
            stderr: String::new(),
            raise: None,
        });
        let pg = playground(runtime);
        pg.start().await.unwrap();
        pg.run().await;
        assert!(!pg.output().await.is_empty());

        pg.select_example("devops-agent").await.unwrap();
        assert_eq!(pg.output().await, "");
        let buffers = pg.buffers().await;
        assert!(buffers.contract_yaml.contains("prod-deploy-requires-senior"));
        assert!(buffers.source_code.contains("deploy_service"));
        // Selecting never touches the stage.
        assert_eq!(pg.stage().stage, RuntimeStage::Ready);
    }

    #[tokio::test]
    async fn test_select_unknown_example_fails_without_partial_update() {
        let runtime = Arc::new(ScriptedRuntime::new());
        let pg = playground(runtime);
        let before = pg.buffers().await;

        assert!(matches!(
            pg.select_example("missing").await,
            Err(PlaygroundError::UnknownExample(_))
        ));
        assert_eq!(pg.buffers().await, before);
    }

    #[tokio::test]
    async fn test_reset_restores_selected_example_texts() {
        let runtime = Arc::new(ScriptedRuntime::new());
        let pg = playground(runtime);

        pg.set_source_code("print('edited away')").await;
        pg.reset().await;
        let buffers = pg.buffers().await;
        assert!(buffers.source_code.contains("read_file"));
    }

    #[tokio::test]
    async fn test_next_run_uses_newly_selected_texts() {
        let runtime = Arc::new(ScriptedRuntime::new());
        runtime.push_run(RunScript::default());
        runtime.push_run(RunScript::default());
        let pg = playground(runtime.clone());
        pg.start().await.unwrap();

        pg.run().await;
        pg.select_example("research-agent").await.unwrap();
        pg.run().await;

        let sources = runtime.executed_sources();
        assert_eq!(sources.len(), 2);
        assert!(sources[0].contains("/app/.env"));
        assert!(sources[1].contains("python async patterns"));
    }
}
