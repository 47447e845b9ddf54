//! Runtime stage machine for the playground lifecycle.
//!
//! There is exactly one stage per playground, and [`StageCell`] is the only
//! mutation path. Observers subscribe through a `tokio::sync::watch` channel;
//! the presentation layer never writes the stage directly.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Lifecycle stage of the embedded interpreter runtime.
///
/// `Idle` is initial. `Ready` and `Error` are stable until the bootstrapper
/// is (re-)invoked; `Running` always returns to `Ready` when a run concludes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeStage {
    Idle,
    LoadingInterpreter,
    InstallingPackage,
    Ready,
    Running,
    Error,
}

impl RuntimeStage {
    /// Stable string name, matching the serde form.
    pub fn name(&self) -> &'static str {
        match self {
            RuntimeStage::Idle => "idle",
            RuntimeStage::LoadingInterpreter => "loading-interpreter",
            RuntimeStage::InstallingPackage => "installing-package",
            RuntimeStage::Ready => "ready",
            RuntimeStage::Running => "running",
            RuntimeStage::Error => "error",
        }
    }

    /// Human-readable status label for display surfaces.
    pub fn label(&self) -> &'static str {
        match self {
            RuntimeStage::Idle => "Not loaded",
            RuntimeStage::LoadingInterpreter => "Loading interpreter runtime...",
            RuntimeStage::InstallingPackage => "Installing guard package...",
            RuntimeStage::Ready => "Ready",
            RuntimeStage::Running => "Running...",
            RuntimeStage::Error => "Error",
        }
    }
}

/// One observable point-in-time view of the stage machine.
///
/// `error` is populated exactly when `stage` is [`RuntimeStage::Error`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageSnapshot {
    pub stage: RuntimeStage,
    pub error: Option<String>,
}

impl StageSnapshot {
    fn at(stage: RuntimeStage) -> Self {
        Self { stage, error: None }
    }
}

impl Default for StageSnapshot {
    fn default() -> Self {
        Self::at(RuntimeStage::Idle)
    }
}

/// The single mutation path for the playground stage.
///
/// Cloneable; all clones share one underlying watch channel.
#[derive(Debug, Clone)]
pub struct StageCell {
    tx: watch::Sender<StageSnapshot>,
}

impl StageCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(StageSnapshot::default());
        Self { tx }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> StageSnapshot {
        self.tx.borrow().clone()
    }

    /// Current stage.
    pub fn current(&self) -> RuntimeStage {
        self.tx.borrow().stage
    }

    /// Subscribe to stage changes.
    pub fn subscribe(&self) -> watch::Receiver<StageSnapshot> {
        self.tx.subscribe()
    }

    fn set(&self, snapshot: StageSnapshot) {
        tracing::debug!(event = "stage.changed", stage = snapshot.stage.name());
        // send_replace never fails even with zero receivers.
        self.tx.send_replace(snapshot);
    }

    /// Enter `loading-interpreter`. Clears any prior error, which is how an
    /// explicit bootstrapper re-invocation leaves the `Error` stage.
    pub fn begin_loading(&self) {
        self.set(StageSnapshot::at(RuntimeStage::LoadingInterpreter));
    }

    /// Enter `installing-package`.
    pub fn begin_installing(&self) {
        self.set(StageSnapshot::at(RuntimeStage::InstallingPackage));
    }

    /// Enter `ready`.
    pub fn mark_ready(&self) {
        self.set(StageSnapshot::at(RuntimeStage::Ready));
    }

    /// Enter `error` with a human-readable message.
    pub fn fail(&self, message: impl Into<String>) {
        self.set(StageSnapshot {
            stage: RuntimeStage::Error,
            error: Some(message.into()),
        });
    }

    /// Try to enter `running`. Returns `None` unless the stage is `Ready`,
    /// which is what structurally prevents overlapping runs.
    ///
    /// The returned [`RunGuard`] restores `Ready` when dropped, so the stage
    /// can never stay stuck in `Running` regardless of which exit path the
    /// run took.
    pub fn begin_run(&self) -> Option<RunGuard> {
        let mut started = false;
        self.tx.send_if_modified(|snapshot| {
            if snapshot.stage == RuntimeStage::Ready {
                *snapshot = StageSnapshot::at(RuntimeStage::Running);
                started = true;
                true
            } else {
                false
            }
        });
        if started {
            tracing::debug!(event = "stage.changed", stage = "running");
            Some(RunGuard {
                tx: self.tx.clone(),
            })
        } else {
            None
        }
    }
}

impl Default for StageCell {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for the `running` stage.
///
/// Dropping the guard transitions `running -> ready` unconditionally. Holding
/// it is the only way to be in `Running`.
#[derive(Debug)]
pub struct RunGuard {
    tx: watch::Sender<StageSnapshot>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.tx.send_replace(StageSnapshot {
            stage: RuntimeStage::Ready,
            error: None,
        });
        tracing::debug!(event = "stage.changed", stage = "ready");
    }
}
