//! Interpreter runtime seam.
//!
//! The playground never talks to a concrete interpreter directly; it consumes
//! the narrow [`InterpreterRuntime`] surface through a shared handle obtained
//! from a [`RuntimeLoader`]. The process-backed implementation lives in
//! [`process`]; in-memory fakes for tests live in [`fakes`].

pub mod fakes;
pub mod process;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Where the loader finds the interpreter distribution.
///
/// For the process-backed runtime this is the interpreter executable; a
/// web-embedded runtime would carry its distribution URL here instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoaderOptions {
    pub index_url: String,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            index_url: "python3".to_string(),
        }
    }
}

/// The single dependency provisioned into the runtime before any user code
/// runs. `extras` is the optional feature qualifier (`name[extras]`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackageSpec {
    pub name: String,
    pub extras: Option<String>,
}

impl PackageSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extras: None,
        }
    }

    pub fn with_extras(mut self, extras: impl Into<String>) -> Self {
        self.extras = Some(extras.into());
        self
    }

    /// Requirement string handed to the runtime's package manager.
    pub fn requirement(&self) -> String {
        match &self.extras {
            Some(extras) => format!("{}[{}]", self.name, extras),
            None => self.name.clone(),
        }
    }
}

impl Default for PackageSpec {
    fn default() -> Self {
        Self::new("covenant").with_extras("yaml")
    }
}

/// Handle to a booted interpreter runtime.
///
/// The bootstrapper owns the handle for the process lifetime; the execution
/// session borrows it per run and never retains it past the run.
#[async_trait]
pub trait InterpreterRuntime: Send + Sync {
    /// Load a runtime-bundled package (the package-manager module itself).
    async fn load_package(&self, name: &str) -> Result<()>;

    /// Install a dependency through the runtime's package manager.
    async fn install(&self, requirement: &str) -> Result<()>;

    /// Execute a code block in the runtime's shared namespace.
    ///
    /// Returns the textual value of the block when it is a single
    /// expression, `None` otherwise. A raised error surfaces as `Err`.
    async fn run_async(&self, code: &str) -> Result<Option<String>>;

    /// Write a file into the runtime's virtual filesystem.
    async fn write_file(&self, path: &str, data: &str) -> Result<()>;
}

/// Factory for interpreter runtimes.
#[async_trait]
pub trait RuntimeLoader: Send + Sync {
    /// One-time acquisition of the interpreter distribution (script fetch,
    /// binary probe). The bootstrapper guarantees at most one call per
    /// process lifetime.
    async fn acquire(&self) -> Result<()>;

    /// Boot a runtime and hand back its shared handle.
    async fn load(&self, options: &LoaderOptions) -> Result<Arc<dyn InterpreterRuntime>>;
}
