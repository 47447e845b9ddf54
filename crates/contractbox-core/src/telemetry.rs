//! Tracing initialisation for ContractBox binaries.
//!
//! Call [`init_tracing`] once at program start to configure the global
//! subscriber. Filter directives are taken from `CONTRACTBOX_LOG` first,
//! then `RUST_LOG`, then the given default level.
//!
//! Safe to call more than once — subsequent calls are silently ignored
//! (the global subscriber can only be set once per process).

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Dedicated filter variable, consulted before `RUST_LOG`.
pub const LOG_ENV_VAR: &str = "CONTRACTBOX_LOG";

fn build_filter(level: Level) -> EnvFilter {
    std::env::var(LOG_ENV_VAR)
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level.as_str()))
}

/// Initialise the global tracing subscriber.
///
/// * `json` — when `true`, emit newline-delimited JSON log lines.
/// * `level` — default verbosity when neither filter variable is set.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = build_filter(level);

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}
