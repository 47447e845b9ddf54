//! ContractBox Core Library
//!
//! Orchestrates an embedded script interpreter: boots it once per process,
//! provisions the guard-library package, executes user source text against a
//! contract bundle, captures the output streams, and parses the raw text
//! into a typed, renderable audit-event stream.

pub mod audit;
pub mod bootstrap;
pub mod catalog;
pub mod error;
pub mod obs;
pub mod playground;
pub mod render;
pub mod runtime;
pub mod session;
pub mod stage;
pub mod telemetry;

pub use audit::{parse_lines, AuditEvent, ContractCheck, OutputLine};
pub use bootstrap::{BootstrapConfig, RuntimeBootstrapper};
pub use catalog::{Catalog, Example};
pub use error::{PlaygroundError, Result};
pub use playground::{Playground, RunReport, RunRequest, SessionBuffers};
pub use render::{
    action_label, colorize, grouped_view, raw_view, strip_spans, AuditCard, OutputBlock, RawLine,
    Severity, Span, TokenKind,
};
pub use runtime::process::{PyProcessLoader, PyProcessRuntime};
pub use runtime::{InterpreterRuntime, LoaderOptions, PackageSpec, RuntimeLoader};
pub use session::{
    CancelFlag, ExecutionSession, RunOutcome, SessionConfig, CONTRACT_FILE, NO_OUTPUT_PLACEHOLDER,
};
pub use stage::{RuntimeStage, StageCell, StageSnapshot};
pub use telemetry::init_tracing;

/// ContractBox version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
