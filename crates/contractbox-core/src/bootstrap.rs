//! Interpreter bootstrapper and package installer.
//!
//! [`RuntimeBootstrapper::ensure_ready`] is idempotent and memoized: the
//! first caller drives acquisition, load, and provisioning; concurrent and
//! later callers await the same in-flight or already-resolved handle. A
//! failed boot leaves the memo cell empty, so an explicit re-invocation
//! retries from the top (and clears the `error` stage).
//!
//! The bootstrapper exclusively owns the runtime handle for the process
//! lifetime. It is never explicitly torn down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::error::{PlaygroundError, Result};
use crate::obs;
use crate::runtime::{InterpreterRuntime, LoaderOptions, PackageSpec, RuntimeLoader};
use crate::stage::StageCell;

/// Startup configuration: where the runtime comes from and what gets
/// provisioned into it before any user code runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BootstrapConfig {
    pub loader_options: LoaderOptions,
    /// Package-manager module loaded into the runtime (`pip` for the process
    /// runtime, `micropip` for a web-embedded one).
    pub package_manager: String,
    /// The single guard-library dependency installed before first use.
    pub package: PackageSpec,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            loader_options: LoaderOptions::default(),
            package_manager: "pip".to_string(),
            package: PackageSpec::default(),
        }
    }
}

/// Lazily-initialized owner of the interpreter runtime handle.
pub struct RuntimeBootstrapper {
    loader: Arc<dyn RuntimeLoader>,
    config: BootstrapConfig,
    stage: StageCell,
    cell: OnceCell<Arc<dyn InterpreterRuntime>>,
    // Latched on successful acquisition only; a failed fetch may be retried.
    script_acquired: AtomicBool,
}

impl RuntimeBootstrapper {
    pub fn new(loader: Arc<dyn RuntimeLoader>, config: BootstrapConfig) -> Self {
        Self {
            loader,
            config,
            stage: StageCell::new(),
            cell: OnceCell::new(),
            script_acquired: AtomicBool::new(false),
        }
    }

    /// The stage cell this bootstrapper (and its sessions) transition.
    pub fn stage(&self) -> &StageCell {
        &self.stage
    }

    /// The cached handle, when boot has completed.
    pub fn handle(&self) -> Option<Arc<dyn InterpreterRuntime>> {
        self.cell.get().cloned()
    }

    /// Boot the runtime, or return the cached/in-flight handle.
    ///
    /// Failures transition the stage to `error` with the underlying message
    /// and are also returned, so mount-time retry logic can observe them.
    pub async fn ensure_ready(&self) -> Result<Arc<dyn InterpreterRuntime>> {
        self.cell
            .get_or_try_init(|| self.boot())
            .await
            .cloned()
    }

    async fn boot(&self) -> Result<Arc<dyn InterpreterRuntime>> {
        obs::emit_bootstrap_started(&self.config.package.requirement());
        self.stage.begin_loading();

        if !self.script_acquired.load(Ordering::Acquire) {
            if let Err(err) = self.loader.acquire().await {
                return Err(self.fail(err));
            }
            self.script_acquired.store(true, Ordering::Release);
        }

        let runtime = match self.loader.load(&self.config.loader_options).await {
            Ok(runtime) => runtime,
            Err(err) => return Err(self.fail(err)),
        };

        self.stage.begin_installing();
        if let Err(err) = runtime.load_package(&self.config.package_manager).await {
            return Err(self.fail(err));
        }
        let requirement = self.config.package.requirement();
        if let Err(err) = runtime.install(&requirement).await {
            return Err(self.fail(err));
        }

        self.stage.mark_ready();
        obs::emit_bootstrap_ready(&requirement);
        Ok(runtime)
    }

    fn fail(&self, err: PlaygroundError) -> PlaygroundError {
        obs::emit_bootstrap_failed(&err);
        self.stage.fail(err.to_string());
        err
    }
}
