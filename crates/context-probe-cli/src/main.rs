// crates/context-probe-cli/src/main.rs
// ============================================================================
// Module: Context Probe CLI Entry Point
// Description: Command-line entry for a single context isolation probe run.
// Purpose: Parse the run selection, validate configuration, run, and report.
// Dependencies: clap, context-probe-cli, context-probe-config, serde_json,
//               tokio, tracing-subscriber
// ============================================================================

//! ## Overview
//! `context-probe <VARIANT>` starts the probe server on loopback, fires two
//! concurrent requests at the variant's fault routes, waits for them to
//! settle, and reports whether the captured error events kept their request
//! context to themselves. All user-facing strings go through the
//! [`t!`](context_probe_cli::t) catalog; the runtime trace goes to stderr via
//! `tracing` and is filtered by `RUST_LOG`.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::ArgAction;
use clap::Parser;
use clap::ValueEnum;
use context_probe_cli::DriverError;
use context_probe_cli::RunDriver;
use context_probe_cli::RunSummary;
use context_probe_cli::driver::EXPECTED_EVENTS;
use context_probe_cli::t;
use context_probe_config::HarnessConfig;
use context_probe_config::HarnessOptions;
use context_probe_core::IsolationMode;
use context_probe_core::IsolationReport;
use context_probe_core::LeakSource;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(
    name = "context-probe",
    version,
    about = "Checks whether captured error context leaks between concurrent requests."
)]
struct Cli {
    /// Test run to execute.
    #[arg(value_enum, value_name = "VARIANT")]
    variant: VariantArg,
    /// Loopback address to listen on.
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,
    /// Directory for the `debug.<variant>.json` event log.
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,
    /// Time to wait for both requests, measured from when they are sent.
    #[arg(long, value_name = "MS")]
    settle_ms: Option<u64>,
    /// Progress lines each handler writes before failing.
    #[arg(long, value_name = "N")]
    log_count: Option<u32>,
    /// Suspension after each progress line in async variants.
    #[arg(long, value_name = "MS")]
    step_delay_ms: Option<u64>,
    /// Report format.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    format: ReportFormat,
    /// Also post captured events to the `SENTRY_DSN` store endpoint.
    #[arg(long, action = ArgAction::SetTrue)]
    forward: bool,
    /// Exit non-zero when the outcome contradicts the variant's expectation.
    #[arg(long, action = ArgAction::SetTrue)]
    check: bool,
}

/// Test run names accepted on the command line.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum VariantArg {
    /// Synchronous handlers, shared context.
    #[value(name = "sync", alias = "none")]
    Sync,
    /// Suspending handlers, shared context.
    #[value(name = "async", alias = "async-implicit")]
    Async,
    /// Suspending handlers, per-request context.
    #[value(name = "async-context", alias = "async-explicit")]
    AsyncContext,
}

impl From<VariantArg> for IsolationMode {
    fn from(value: VariantArg) -> Self {
        match value {
            VariantArg::Sync => Self::Sync,
            VariantArg::Async => Self::AsyncImplicit,
            VariantArg::AsyncContext => Self::AsyncExplicit,
        }
    }
}

/// Report output formats.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ReportFormat {
    /// Human-readable lines.
    Text,
    /// One pretty-printed JSON document on stdout.
    Json,
}

/// CLI error wrapper for user-facing failures.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`] from a catalog message.
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// Result alias for CLI operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes one probe run.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    init_tracing()?;

    let mode = IsolationMode::from(cli.variant);
    let options = HarnessOptions {
        bind: cli.bind,
        output_dir: cli.output_dir,
        settle_ms: cli.settle_ms,
        log_count: cli.log_count,
        step_delay_ms: cli.step_delay_ms,
        forward: cli.forward,
        ..HarnessOptions::new(mode)
    };
    let config = HarnessConfig::from_process_env(options)
        .map_err(|err| CliError::new(t!("config.invalid", error = err)))?;
    let log_name = mode.log_file_name();
    let dsn = config.dsn.to_string();

    let notice = |message: String| -> CliResult<()> {
        match cli.format {
            ReportFormat::Text => {
                write_stdout_line(&message).map_err(|err| output_error("stdout", &err))
            }
            ReportFormat::Json => {
                write_stderr_line(&message).map_err(|err| output_error("stderr", &err))
            }
        }
    };
    notice(t!("run.header", label = mode.label()))?;

    let started = RunDriver::new(config).start().await.map_err(|err| driver_failure(&err))?;
    notice(t!("run.server_uri", uri = started.uri()))?;
    if cli.forward {
        notice(t!("run.dsn_forwarding", dsn = dsn))?;
    } else {
        notice(t!("run.dsn", dsn = dsn))?;
    }

    let summary = started.finish().await.map_err(|err| driver_failure(&err))?;

    match cli.format {
        ReportFormat::Text => {
            for line in render_report(&summary.report) {
                write_stdout_line(&line).map_err(|err| output_error("stdout", &err))?;
            }
        }
        ReportFormat::Json => {
            let json = serde_json::to_string_pretty(&summary)
                .map_err(|err| CliError::new(t!("output.json_failed", error = err)))?;
            write_stdout_line(&json).map_err(|err| output_error("stdout", &err))?;
        }
    }
    if let Some(stats) = summary.forwarded {
        notice(t!("run.forwarded", sent = stats.sent, failed = stats.failed))?;
    }
    notice(t!("run.complete", label = mode.label(), log = log_name))?;
    if !mode.expects_isolation() {
        notice(t!("run.leak_note"))?;
    }

    Ok(check_outcome(cli.check, &summary))
}

/// Traces a fatal driver failure and wraps it for the user.
fn driver_failure(err: &DriverError) -> CliError {
    tracing::error!(error = %err, "probe run aborted");
    CliError::new(t!("driver.failed", error = err))
}

/// Installs the stderr trace subscriber, filtered by `RUST_LOG`.
fn init_tracing() -> CliResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| CliError::new(t!("tracing.init_failed", error = err)))
}

// ============================================================================
// SECTION: Reporting
// ============================================================================

/// Renders the text form of an isolation report.
fn render_report(report: &IsolationReport) -> Vec<String> {
    let mut lines = vec![
        t!("report.header", label = report.mode.label(), strategy = report.mode.strategy_name()),
        t!("report.events", total = report.total_events),
        t!("report.leaked", leaked = report.leaked_events),
        t!("report.verdict", verdict = report.verdict.as_str()),
    ];
    for leak in &report.leaks {
        let source = match &leak.source {
            LeakSource::Tag {
                name,
            } => t!("report.source.tag", name = name),
            LeakSource::Breadcrumb {
                index,
            } => t!("report.source.breadcrumb", index = index),
        };
        lines.push(t!(
            "report.leak",
            path = leak.event_path,
            source = source,
            detail = leak.detail
        ));
    }
    lines.push(t!("report.expected", expectation = expectation_label(report.mode)));
    lines
}

/// Returns the catalog label for what `mode` is expected to produce.
fn expectation_label(mode: IsolationMode) -> String {
    if mode.expects_isolation() {
        t!("report.expectation.isolated")
    } else {
        t!("report.expectation.leaked")
    }
}

/// Maps the run outcome to an exit code, reporting `--check` results.
fn check_outcome(check: bool, summary: &RunSummary) -> ExitCode {
    if !check {
        return ExitCode::SUCCESS;
    }
    if summary.matches_expectation() {
        let _ = write_stderr_line(&t!("check.passed"));
        return ExitCode::SUCCESS;
    }
    emit_error(&t!(
        "check.failed",
        label = summary.mode.label(),
        expected = EXPECTED_EVENTS,
        expectation = expectation_label(summary.mode),
        total = summary.report.total_events,
        verdict = summary.report.verdict.as_str()
    ))
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output failure as a CLI error.
fn output_error(stream: &str, error: &std::io::Error) -> CliError {
    CliError::new(t!("output.write_failed", stream = stream, error = error))
}

/// Emits an error message and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
