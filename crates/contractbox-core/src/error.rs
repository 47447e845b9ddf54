//! Error taxonomy for the playground core.
//!
//! Only bootstrap and installation failures may leave the stage machine in a
//! persistent `error` state. User-code failures, parser failures, and
//! orchestration failures are absorbed and rendered as data.

/// Errors produced by the playground core.
#[derive(Debug, thiserror::Error)]
pub enum PlaygroundError {
    #[error("script acquisition failed: {0}")]
    ScriptAcquisition(String),

    #[error("interpreter load failed: {0}")]
    InterpreterLoad(String),

    #[error("package install failed for {package}: {reason}")]
    PackageInstall { package: String, reason: String },

    #[error("runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    #[error("runtime step timed out after {elapsed_ms}ms (limit {limit_ms}ms)")]
    StepTimeout { elapsed_ms: u64, limit_ms: u64 },

    #[error("run cancelled")]
    Cancelled,

    /// An error raised by user source text inside the runtime. Expected and
    /// recoverable; the session folds it into the run output verbatim.
    #[error("{0}")]
    Raised(String),

    #[error("unknown example: {0}")]
    UnknownExample(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for playground operations.
pub type Result<T> = std::result::Result<T, PlaygroundError>;
