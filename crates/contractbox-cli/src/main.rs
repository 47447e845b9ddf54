//! ContractBox - contract playground from a terminal
//!
//! The `contractbox` command boots an embedded Python runtime, provisions
//! the covenant guard library into it, and runs the builtin examples (or
//! your own contract bundle and code) against it.
//!
//! ## Commands
//!
//! - `list`: Show the builtin example catalog
//! - `show`: Print an example's contract bundle and source code
//! - `run`: Execute code against a contract bundle and render the audit stream

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing::Level;

use contractbox_core::{
    grouped_view, init_tracing, parse_lines, raw_view, AuditCard, BootstrapConfig, LoaderOptions,
    OutputBlock, PackageSpec, Playground, PyProcessLoader, RawLine, RunRequest, SessionConfig,
    Severity, Span, TokenKind,
};

#[derive(Parser)]
#[command(name = "contractbox")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run Python agents against contract guard bundles", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the builtin examples
    List,

    /// Print an example's texts
    Show {
        /// Example key (see `contractbox list`)
        key: String,

        /// Which text to print
        #[arg(long, value_enum, default_value_t = ShowPart::Both)]
        part: ShowPart,
    },

    /// Boot the runtime and execute one run
    Run {
        /// Builtin example to run
        #[arg(short, long, default_value = "file-agent")]
        example: String,

        /// Override the contract bundle from a file
        #[arg(long)]
        contract: Option<PathBuf>,

        /// Override the source code from a file
        #[arg(long)]
        code: Option<PathBuf>,

        /// Interpreter executable to boot
        #[arg(long, default_value = "python3", env = "CONTRACTBOX_PYTHON")]
        interpreter: String,

        /// Guard-library package name to provision
        #[arg(long, default_value = "covenant")]
        package: String,

        /// Optional extras qualifier for the package (name[extras])
        #[arg(long, default_value = "yaml")]
        extras: String,

        /// Per-step watchdog in milliseconds
        #[arg(long, default_value = "30000")]
        timeout_ms: u64,

        /// Render the raw line stream instead of grouped cards
        #[arg(long)]
        raw: bool,

        /// Emit the full run report as JSON instead of rendered output
        #[arg(long)]
        report: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ShowPart {
    Contract,
    Code,
    Both,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match cli.command {
        Commands::List => cmd_list(),
        Commands::Show { key, part } => cmd_show(&key, part),
        Commands::Run {
            example,
            contract,
            code,
            interpreter,
            package,
            extras,
            timeout_ms,
            raw,
            report,
        } => {
            cmd_run(RunArgs {
                example,
                contract,
                code,
                interpreter,
                package,
                extras,
                timeout_ms,
                raw,
                report,
                verbose: cli.verbose,
            })
            .await
        }
    }
}

/// List the builtin examples
fn cmd_list() -> Result<()> {
    let catalog = contractbox_core::Catalog::builtin();
    for example in catalog.iter() {
        println!(
            "{:<16} {}",
            example.key.bold(),
            example.label
        );
        println!("{:<16} {}", "", example.description.dimmed());
    }
    Ok(())
}

/// Print an example's contract bundle and/or source code
fn cmd_show(key: &str, part: ShowPart) -> Result<()> {
    let catalog = contractbox_core::Catalog::builtin();
    let example = catalog
        .get(key)
        .with_context(|| format!("Unknown example: {}", key))?;

    println!("{} - {}", example.label.bold(), example.description);

    if matches!(part, ShowPart::Contract | ShowPart::Both) {
        println!();
        println!("{}", "# contracts.yaml".dimmed());
        println!("{}", example.contract_yaml);
    }
    if matches!(part, ShowPart::Code | ShowPart::Both) {
        println!();
        println!("{}", "# agent.py".dimmed());
        println!("{}", example.source_code);
    }
    Ok(())
}

struct RunArgs {
    example: String,
    contract: Option<PathBuf>,
    code: Option<PathBuf>,
    interpreter: String,
    package: String,
    extras: String,
    timeout_ms: u64,
    raw: bool,
    report: bool,
    verbose: bool,
}

/// Boot the runtime, run once, render the captured stream
async fn cmd_run(args: RunArgs) -> Result<()> {
    let mut package = PackageSpec::new(args.package);
    if !args.extras.is_empty() {
        package = package.with_extras(args.extras);
    }
    let config = BootstrapConfig {
        loader_options: LoaderOptions {
            index_url: args.interpreter,
        },
        package_manager: "pip".to_string(),
        package,
    };

    let playground = Playground::new(Arc::new(PyProcessLoader::new()), config)
        .with_session_config(SessionConfig {
            step_timeout_ms: args.timeout_ms,
        });

    // Mirror stage transitions to stderr while booting.
    if args.verbose {
        let mut rx = playground.subscribe_stage();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow().clone();
                eprintln!("{}", snapshot.stage.label().dimmed());
            }
        });
    }

    playground
        .start()
        .await
        .context("Failed to boot the interpreter runtime")?;

    playground.select_example(&args.example).await?;
    if let Some(path) = &args.contract {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read contract file: {:?}", path))?;
        playground.set_contract_yaml(text).await;
    }
    if let Some(path) = &args.code {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read code file: {:?}", path))?;
        playground.set_source_code(text).await;
    }

    let report = match playground.run().await {
        RunRequest::Completed(report) => report,
        RunRequest::Skipped { stage } => {
            anyhow::bail!("Run skipped: runtime stage is '{}'", stage.name())
        }
    };

    if args.report {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let rendered = if args.raw {
        render_raw_text(&report.outcome.output)
    } else {
        render_grouped_text(&report.outcome.output)
    };
    println!("{}", rendered);

    if let Some(error) = &report.outcome.runtime_error {
        println!();
        println!("{} {}", "Error:".red().bold(), error);
    }

    tracing::debug!(
        run_id = %report.run_id,
        duration_ms = report.duration_ms,
        "run complete"
    );
    Ok(())
}

fn severity_paint(severity: Severity, text: &str) -> String {
    match severity {
        Severity::Deny => text.red().bold().to_string(),
        Severity::Warn => text.yellow().bold().to_string(),
        Severity::Ok => text.green().bold().to_string(),
    }
}

fn card_text(card: &AuditCard) -> String {
    let mut out = format!(
        "{} {}",
        severity_paint(card.severity, &format!("[{}]", card.label)),
        card.tool_name.bold()
    );
    if let Some(decision) = &card.decision_name {
        out.push_str(&format!("  {}", decision.dimmed()));
    }
    if let Some(reason) = &card.reason {
        out.push_str(&format!("\n    {}", reason));
    }
    out
}

/// Grouped view: labeled cards interleaved with plain text, input order.
fn render_grouped_text(output: &str) -> String {
    let blocks = grouped_view(&parse_lines(output));
    let mut lines = Vec::new();
    for block in &blocks {
        match block {
            OutputBlock::Card(card) => lines.push(card_text(card)),
            OutputBlock::Text(text) => lines.push(text.clone()),
        }
    }
    lines.join("\n")
}

fn span_paint(span: &Span) -> String {
    match span.kind {
        TokenKind::Key => span.text.cyan().to_string(),
        TokenKind::Str => span.text.green().to_string(),
        TokenKind::Number => span.text.magenta().to_string(),
        TokenKind::Bool => span.text.yellow().to_string(),
        TokenKind::Null => span.text.bright_black().to_string(),
        TokenKind::Punct | TokenKind::Plain => span.text.clone(),
    }
}

/// Raw view: structured records pretty-printed and token-colorized,
/// everything else verbatim.
fn render_raw_text(output: &str) -> String {
    let mut lines = Vec::new();
    for line in raw_view(output) {
        match line {
            RawLine::Json { spans } => {
                lines.push(spans.iter().map(|s| span_paint(s)).collect::<String>())
            }
            RawLine::Text { text } => lines.push(text),
        }
    }
    lines.join("\n")
}
