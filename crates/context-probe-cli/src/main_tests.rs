// crates/context-probe-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Helpers Tests
// Description: Unit tests for argument parsing and report rendering.
// Purpose: Ensure variant names, aliases, and report lines stay stable.
// Dependencies: context-probe-cli main helpers
// ============================================================================

//! ## Overview
//! Parses argument vectors without running anything and renders reports
//! built by hand.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use clap::Parser;
use context_probe_core::ContextLeak;
use context_probe_core::IsolationMode;
use context_probe_core::IsolationReport;
use context_probe_core::IsolationVerdict;
use context_probe_core::LeakSource;

use super::Cli;
use super::ReportFormat;
use super::VariantArg;
use super::render_report;

// ============================================================================
// SECTION: Parsing
// ============================================================================

#[test]
fn variant_names_and_aliases_map_to_modes() {
    let cases = [
        ("sync", IsolationMode::Sync),
        ("none", IsolationMode::Sync),
        ("async", IsolationMode::AsyncImplicit),
        ("async-implicit", IsolationMode::AsyncImplicit),
        ("async-context", IsolationMode::AsyncExplicit),
        ("async-explicit", IsolationMode::AsyncExplicit),
    ];
    for (arg, mode) in cases {
        let cli = Cli::try_parse_from(["context-probe", arg]).unwrap();
        assert_eq!(IsolationMode::from(cli.variant), mode, "variant {arg}");
    }
}

#[test]
fn unknown_or_missing_variant_is_a_usage_error() {
    assert!(Cli::try_parse_from(["context-probe", "threads"]).is_err());
    assert!(Cli::try_parse_from(["context-probe"]).is_err());
}

#[test]
fn forwarding_is_off_by_default() {
    let cli = Cli::try_parse_from(["context-probe", "sync"]).unwrap();
    assert!(!cli.forward);
}

#[test]
fn optional_flags_parse() {
    let cli = Cli::try_parse_from([
        "context-probe",
        "async-context",
        "--bind",
        "127.0.0.1:0",
        "--settle-ms",
        "1200",
        "--log-count",
        "2",
        "--step-delay-ms",
        "25",
        "--format",
        "json",
        "--forward",
        "--check",
    ])
    .unwrap();
    assert_eq!(cli.variant, VariantArg::AsyncContext);
    assert_eq!(cli.bind.as_deref(), Some("127.0.0.1:0"));
    assert_eq!(cli.settle_ms, Some(1200));
    assert_eq!(cli.log_count, Some(2));
    assert_eq!(cli.step_delay_ms, Some(25));
    assert_eq!(cli.format, ReportFormat::Json);
    assert!(cli.forward);
    assert!(cli.check);
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

#[test]
fn report_lists_each_leak_and_expectation() {
    let report = IsolationReport {
        mode: IsolationMode::AsyncImplicit,
        total_events: 2,
        leaked_events: 1,
        leaks: vec![ContextLeak {
            event_id: "evt-1".to_string(),
            event_path: "/async/boom/foo".to_string(),
            source: LeakSource::Breadcrumb {
                index: 2,
            },
            detail: "/async/boom/bar - 0".to_string(),
        }],
        verdict: IsolationVerdict::Leaked,
    };
    let lines = render_report(&report);
    assert_eq!(lines[0], "Isolation report for async (async-implicit):");
    assert!(lines.contains(&"  verdict: leaked".to_string()));
    assert!(lines.contains(&"  - /async/boom/foo breadcrumb #2: /async/boom/bar - 0".to_string()));
    assert_eq!(lines.last().unwrap(), "  expected: leaked (intentionally unsafe mode)");
}
