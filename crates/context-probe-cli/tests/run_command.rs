// crates/context-probe-cli/tests/run_command.rs
// ============================================================================
// Module: CLI Run Command Tests
// Description: Integration tests for the context-probe binary.
// Purpose: Ensure bad input fails before startup and a full run reports.
// Dependencies: context-probe-cli binary, tempfile
// ============================================================================
//! ## Overview
//! Spawns the built binary with controlled arguments and environment. Usage
//! and configuration errors must exit non-zero before any socket is opened;
//! a complete run must write its event log and pass `--check`.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::process::Command;
use std::process::Output;

use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const VALID_DSN: &str = "https://publickey@errors.example.io/7";

fn run_cli(dir: &Path, args: &[&str], dsn: Option<&str>) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_context-probe"));
    command.current_dir(dir).args(args).env_remove("SENTRY_DSN").env("RUST_LOG", "warn");
    if let Some(dsn) = dsn {
        command.env("SENTRY_DSN", dsn);
    }
    command.output().expect("run context-probe")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

// ============================================================================
// SECTION: Startup Failures
// ============================================================================

#[test]
fn unknown_variant_fails_before_startup() {
    let dir = TempDir::new().unwrap();
    let output = run_cli(dir.path(), &["threads"], Some(VALID_DSN));
    assert!(!output.status.success());
    assert!(stderr(&output).contains("threads"), "stderr: {}", stderr(&output));
    assert!(!stdout(&output).contains("Server running"));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn missing_variant_fails() {
    let dir = TempDir::new().unwrap();
    let output = run_cli(dir.path(), &[], Some(VALID_DSN));
    assert!(!output.status.success());
}

#[test]
fn missing_dsn_fails_before_startup() {
    let dir = TempDir::new().unwrap();
    let output = run_cli(dir.path(), &["sync", "--bind", "127.0.0.1:0"], None);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("SENTRY_DSN"), "stderr: {}", stderr(&output));
    assert!(!dir.path().join("debug.sync.json").exists());
}

#[test]
fn invalid_dsn_fails_before_startup() {
    let dir = TempDir::new().unwrap();
    let output = run_cli(dir.path(), &["sync", "--bind", "127.0.0.1:0"], Some("not-a-dsn"));
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Invalid configuration"), "stderr: {}", stderr(&output));
}

#[test]
fn non_loopback_bind_is_refused() {
    let dir = TempDir::new().unwrap();
    let output = run_cli(dir.path(), &["sync", "--bind", "0.0.0.0:0"], Some(VALID_DSN));
    assert!(!output.status.success());
    assert!(stderr(&output).contains("non-loopback"), "stderr: {}", stderr(&output));
}

// ============================================================================
// SECTION: Full Runs
// ============================================================================

#[test]
fn async_context_run_passes_check_and_writes_log() {
    let dir = TempDir::new().unwrap();
    let output = run_cli(
        dir.path(),
        &[
            "async-explicit",
            "--bind",
            "127.0.0.1:0",
            "--settle-ms",
            "800",
            "--step-delay-ms",
            "50",
            "--check",
        ],
        Some(VALID_DSN),
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let out = stdout(&output);
    assert!(out.contains("Running Test: async-context"));
    assert!(out.contains("Server running on http://127.0.0.1:"));
    assert!(out.contains("https://***@errors.example.io/7"));
    assert!(!out.contains("publickey"));
    assert!(out.contains("verdict: isolated"));
    assert!(out.contains("Check debug.async-context.json"));
    assert!(!out.contains("Note that state of tags"));
    assert!(out.contains("(events stay local)"));

    let log = fs::read_to_string(dir.path().join("debug.async-context.json")).unwrap();
    assert_eq!(log.lines().count(), 2);
}

#[test]
fn async_run_passes_check_by_leaking() {
    let dir = TempDir::new().unwrap();
    let output = run_cli(
        dir.path(),
        &["async", "--bind", "127.0.0.1:0", "--settle-ms", "800", "--step-delay-ms", "50", "--check"],
        Some(VALID_DSN),
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("verdict: leaked"));
    assert!(out.contains("Note that state of tags and breadcrumbs contains data from other requests."));
}

#[test]
fn json_format_prints_summary_document() {
    let dir = TempDir::new().unwrap();
    let output = run_cli(
        dir.path(),
        &["sync", "--bind", "127.0.0.1:0", "--settle-ms", "500", "--format", "json"],
        Some(VALID_DSN),
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let summary: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(summary["mode"], "sync");
    assert_eq!(summary["report"]["total_events"], 2);
    assert_eq!(summary["report"]["verdict"], "isolated");
    assert!(stderr(&output).contains("Running Test: sync"));
}
