// crates/context-probe-core/src/isolation/tests.rs
// ============================================================================
// Module: Isolation Strategy Tests
// Description: Interleaving tests for shared and scoped context strategies.
// Purpose: Show that scoped handles survive suspension and shared ones leak.
// Dependencies: context-probe-core, tokio
// ============================================================================

//! ## Overview
//! Drives two units of work that suspend between writes on a single-threaded
//! runtime, so their steps interleave, and inspects what each unit's context
//! looks like when it finishes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use super::IsolationStrategy;
use super::RequestEntry;
use super::ScopedContextStrategy;
use super::SharedContextStrategy;
use super::TAG_CLIENT_CORRELATION_ID;
use super::TAG_ENVIRONMENT;
use super::TAG_PATH;
use super::TAG_REQUEST_ID;
use super::within;
use crate::context::BreadcrumbCategory;
use crate::context::RequestContext;
use crate::mode::IsolationMode;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn entry(mode: IsolationMode, route: &str, request_id: &str) -> RequestEntry {
    RequestEntry {
        mode,
        path: format!("/{}/boom/{route}", mode.label()),
        request_id: request_id.to_string(),
        client_id: None,
    }
}

/// Writes three lines, suspending after each, and returns the final context.
async fn interleaved_unit<S: IsolationStrategy + ?Sized>(
    strategy: &S,
    entry: RequestEntry,
) -> RequestContext {
    let path = entry.path.clone();
    within(strategy, &entry, |handle| async move {
        for step in 0 .. 3 {
            handle.log(format!("{path} - {step}"));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.snapshot()
    })
    .await
}

fn mentions(context: &RequestContext, needle: &str) -> bool {
    context.tags.values().any(|value| value.contains(needle))
        || context.breadcrumbs.iter().any(|crumb| crumb.message.contains(needle))
}

// ============================================================================
// SECTION: Entry Tests
// ============================================================================

#[test]
fn entry_applies_request_start_mutations() {
    let strategy = ScopedContextStrategy::new("local");
    let mut request = entry(IsolationMode::AsyncExplicit, "foo", "req-1");
    request.client_id = Some("async-context-foo".to_string());
    let context = strategy.enter(&request).snapshot();

    assert_eq!(context.tags.get(TAG_ENVIRONMENT).map(String::as_str), Some("local"));
    assert_eq!(context.tags.get(TAG_PATH).map(String::as_str), Some("/async-context/boom/foo"));
    assert_eq!(context.tags.get(TAG_REQUEST_ID).map(String::as_str), Some("req-1"));
    assert_eq!(
        context.tags.get(TAG_CLIENT_CORRELATION_ID).map(String::as_str),
        Some("async-context-foo")
    );
    assert_eq!(context.breadcrumbs.len(), 1);
    assert_eq!(context.breadcrumbs[0].category, BreadcrumbCategory::Http);
    assert_eq!(context.breadcrumbs[0].message, "GET /async-context/boom/foo");
}

#[test]
fn shared_strategy_resets_the_single_instance() {
    let strategy = SharedContextStrategy::new("local");
    let first = strategy.enter(&entry(IsolationMode::Sync, "foo", "req-1"));
    first.log("/sync/boom/foo - 0");
    let second = strategy.enter(&entry(IsolationMode::Sync, "bar", "req-2"));

    assert!(first.ptr_eq(&second));
    assert!(first.ptr_eq(&strategy.handle()));
    let context = first.snapshot();
    assert!(!mentions(&context, "/sync/boom/foo"));
    assert_eq!(context.tags.get(TAG_REQUEST_ID).map(String::as_str), Some("req-2"));
}

#[test]
fn scoped_strategy_issues_distinct_instances() {
    let strategy = ScopedContextStrategy::new("local");
    let first = strategy.enter(&entry(IsolationMode::AsyncExplicit, "foo", "req-1"));
    let second = strategy.enter(&entry(IsolationMode::AsyncExplicit, "bar", "req-2"));
    assert!(!first.ptr_eq(&second));
}

// ============================================================================
// SECTION: Interleaving Tests
// ============================================================================

#[tokio::test]
async fn scoped_units_stay_isolated_across_suspension() {
    let strategy = ScopedContextStrategy::new("local");
    let (foo, bar) = tokio::join!(
        interleaved_unit(&strategy, entry(IsolationMode::AsyncExplicit, "foo", "req-foo")),
        interleaved_unit(&strategy, entry(IsolationMode::AsyncExplicit, "bar", "req-bar")),
    );

    assert!(!mentions(&foo, "/boom/bar"));
    assert!(!mentions(&bar, "/boom/foo"));
    assert_eq!(foo.breadcrumbs.len(), 4);
    assert_eq!(bar.breadcrumbs.len(), 4);
    assert_eq!(foo.tags.get(TAG_REQUEST_ID).map(String::as_str), Some("req-foo"));
    assert_eq!(bar.tags.get(TAG_REQUEST_ID).map(String::as_str), Some("req-bar"));
}

#[tokio::test]
async fn shared_units_leak_across_suspension() {
    let strategy = SharedContextStrategy::new("local");
    let (foo, bar) = tokio::join!(
        interleaved_unit(&strategy, entry(IsolationMode::AsyncImplicit, "foo", "req-foo")),
        interleaved_unit(&strategy, entry(IsolationMode::AsyncImplicit, "bar", "req-bar")),
    );

    assert!(mentions(&foo, "/boom/bar") || mentions(&bar, "/boom/foo"));
    assert_eq!(foo.tags.get(TAG_REQUEST_ID).map(String::as_str), Some("req-bar"));
}
