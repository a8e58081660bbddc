// crates/context-probe-cli/src/driver/tests.rs
// ============================================================================
// Module: Run Driver Tests
// Description: End-to-end runs over an ephemeral loopback port.
// Purpose: Validate per-mode outcomes, log replacement, and bind failures.
// Dependencies: axum, context-probe-cli, tempfile, tokio
// ============================================================================

//! ## Overview
//! Each test runs the full driver against a scratch output directory with a
//! short fault plan and settle window.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::use_debug,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::net::TcpListener;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;

use context_probe_config::HarnessConfig;
use context_probe_config::HarnessOptions;
use context_probe_core::IsolationMode;
use context_probe_core::IsolationVerdict;
use context_probe_core::read_event_log;
use tempfile::TempDir;

use super::DriverError;
use super::EXPECTED_EVENTS;
use super::RunDriver;
use crate::forward::ForwardStats;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn config(mode: IsolationMode, output_dir: &Path, bind: &str) -> HarnessConfig {
    config_with_dsn(mode, output_dir, bind, "https://key@errors.example.io/1", false)
}

fn config_with_dsn(
    mode: IsolationMode,
    output_dir: &Path,
    bind: &str,
    dsn: &str,
    forward: bool,
) -> HarnessConfig {
    let options = HarnessOptions {
        bind: Some(bind.to_string()),
        output_dir: Some(output_dir.to_path_buf()),
        settle_ms: Some(600),
        log_count: Some(3),
        step_delay_ms: Some(40),
        forward,
        ..HarnessOptions::new(mode)
    };
    HarnessConfig::load(options, |name| (name == "SENTRY_DSN").then(|| dsn.to_string()))
        .expect("valid config")
}

async fn counting_store() -> (String, Arc<AtomicUsize>) {
    let posts = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route(
            "/api/1/store/",
            post(|State(posts): State<Arc<AtomicUsize>>| async move {
                posts.fetch_add(1, Ordering::SeqCst);
                StatusCode::OK
            }),
        )
        .with_state(Arc::clone(&posts));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://key@{addr}/1"), posts)
}

// ============================================================================
// SECTION: Mode Outcomes
// ============================================================================

#[tokio::test]
async fn sync_run_records_two_isolated_events() {
    let dir = TempDir::new().unwrap();
    let summary = RunDriver::new(config(IsolationMode::Sync, dir.path(), "127.0.0.1:0"))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.log_path, dir.path().join("debug.sync.json"));
    assert_eq!(summary.requests.len(), EXPECTED_EVENTS);
    assert!(summary.requests.iter().all(|outcome| outcome.status == 500));
    assert!(summary.requests.iter().all(|outcome| outcome.server_correlation_id.is_some()));
    assert_eq!(summary.report.total_events, 2);
    assert_eq!(summary.report.verdict, IsolationVerdict::Isolated, "{:?}", summary.report.leaks);
    assert!(summary.matches_expectation());
}

#[tokio::test]
async fn async_run_reports_leaked_context() {
    let dir = TempDir::new().unwrap();
    let summary = RunDriver::new(config(IsolationMode::AsyncImplicit, dir.path(), "127.0.0.1:0"))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.report.total_events, 2);
    assert_eq!(summary.report.verdict, IsolationVerdict::Leaked);
    assert!(summary.matches_expectation());
}

#[tokio::test]
async fn async_context_run_keeps_each_event_to_its_own_request() {
    let dir = TempDir::new().unwrap();
    let summary = RunDriver::new(config(IsolationMode::AsyncExplicit, dir.path(), "127.0.0.1:0"))
        .run()
        .await
        .unwrap();
    assert_eq!(summary.report.verdict, IsolationVerdict::Isolated, "{:?}", summary.report.leaks);

    let events = read_event_log(&summary.log_path).unwrap();
    assert_eq!(events.len(), 2);
    for event in &events {
        let expected_client = format!(
            "async-context-{}",
            event.path.rsplit('/').next().unwrap()
        );
        assert_eq!(
            event.tags.get("client_correlation_id").map(String::as_str),
            Some(expected_client.as_str())
        );
        let outcome = summary.requests.iter().find(|outcome| outcome.path == event.path).unwrap();
        assert_eq!(outcome.server_correlation_id.as_ref(), Some(&event.request_id));
    }

    let foo = events.iter().find(|event| event.path == "/async-context/boom/foo").unwrap();
    let bar = events.iter().find(|event| event.path == "/async-context/boom/bar").unwrap();
    assert!(foo.breadcrumbs.iter().all(|crumb| !crumb.message.contains("bar")));
    assert!(bar.breadcrumbs.iter().all(|crumb| !crumb.message.contains("foo")));
}

#[tokio::test]
async fn forwarding_posts_every_captured_event() {
    let dir = TempDir::new().unwrap();
    let (dsn, posts) = counting_store().await;
    let config = config_with_dsn(IsolationMode::AsyncImplicit, dir.path(), "127.0.0.1:0", &dsn, true);
    let summary = RunDriver::new(config).run().await.unwrap();

    assert_eq!(
        summary.forwarded,
        Some(ForwardStats {
            sent: 2,
            failed: 0
        })
    );
    assert_eq!(posts.load(Ordering::SeqCst), 2);
    assert_eq!(read_event_log(&summary.log_path).unwrap().len(), 2);
}

#[tokio::test]
async fn runs_stay_local_without_forwarding() {
    let dir = TempDir::new().unwrap();
    let summary = RunDriver::new(config(IsolationMode::Sync, dir.path(), "127.0.0.1:0"))
        .run()
        .await
        .unwrap();
    assert_eq!(summary.forwarded, None);
}

// ============================================================================
// SECTION: Log Lifecycle
// ============================================================================

#[tokio::test]
async fn rerun_replaces_previous_log() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("debug.sync.json"), "leftover\n").unwrap();
    for _ in 0 .. 2 {
        let summary = RunDriver::new(config(IsolationMode::Sync, dir.path(), "127.0.0.1:0"))
            .run()
            .await
            .unwrap();
        assert_eq!(read_event_log(&summary.log_path).unwrap().len(), 2);
    }
}

#[tokio::test]
async fn occupied_port_fails_before_any_request() {
    let dir = TempDir::new().unwrap();
    let occupied = TcpListener::bind("127.0.0.1:0").unwrap();
    let bind = occupied.local_addr().unwrap().to_string();

    let err = RunDriver::new(config(IsolationMode::Sync, dir.path(), &bind))
        .start()
        .await
        .expect_err("port already bound");
    assert!(matches!(err, DriverError::Server(_)), "unexpected error {err}");
    assert!(read_event_log(&dir.path().join("debug.sync.json")).unwrap().is_empty());
}
