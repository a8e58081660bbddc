// crates/context-probe-cli/src/i18n.rs
// ============================================================================
// Module: CLI Message Catalog
// Description: Message catalog and placeholder substitution for CLI output.
// Purpose: Keep every user-facing string of the probe CLI in one table.
// Dependencies: Standard library collections.
// ============================================================================

//! ## Overview
//! User-facing strings live in a static catalog keyed by dotted names. All
//! runtime output is produced through the [`t!`](crate::t) macro, which looks
//! up a template and substitutes `{placeholder}` arguments.
//!
//! ## Invariants
//! - The catalog is built once and read-only thereafter.
//! - Missing keys render as the key itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::OnceLock;

// ============================================================================
// SECTION: Types
// ============================================================================

/// A formatted message argument captured by the [`macro@crate::t`] macro.
#[derive(Clone)]
pub struct MessageArg {
    /// Placeholder name without braces.
    pub key: &'static str,
    /// Preformatted substitution value.
    pub value: String,
}

impl MessageArg {
    /// Constructs a new [`MessageArg`].
    pub fn new(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Static catalog entries.
const CATALOG: &[(&str, &str)] = &[
    ("run.header", "\n\nRunning Test: {label}"),
    ("run.server_uri", "Server running on {uri}"),
    ("run.dsn", "Error tracking endpoint: {dsn} (events stay local)"),
    ("run.dsn_forwarding", "Error tracking endpoint: {dsn} (forwarding captured events)"),
    (
        "run.complete",
        "\nTest run for {label} complete! Check {log} to see the captured error events.",
    ),
    ("run.leak_note", "Note that state of tags and breadcrumbs contains data from other requests."),
    ("run.forwarded", "Forwarded events: {sent} sent, {failed} failed"),
    ("report.header", "Isolation report for {label} ({strategy}):"),
    ("report.events", "  events captured: {total}"),
    ("report.leaked", "  events with foreign context: {leaked}"),
    ("report.verdict", "  verdict: {verdict}"),
    ("report.leak", "  - {path} {source}: {detail}"),
    ("report.source.tag", "tag {name}"),
    ("report.source.breadcrumb", "breadcrumb #{index}"),
    ("report.expected", "  expected: {expectation}"),
    ("report.expectation.isolated", "isolated"),
    ("report.expectation.leaked", "leaked (intentionally unsafe mode)"),
    (
        "check.failed",
        "Check failed: {label} expected {expected} events {expectation}, got {total} events \
         {verdict}.",
    ),
    ("check.passed", "Check passed."),
    ("config.invalid", "Invalid configuration: {error}"),
    ("driver.failed", "Run failed: {error}"),
    ("output.write_failed", "Failed to write to {stream}: {error}"),
    ("output.json_failed", "Failed to render report as JSON: {error}"),
    ("tracing.init_failed", "Failed to initialize tracing: {error}"),
];

/// Returns the message catalog.
pub(crate) fn catalog() -> &'static HashMap<&'static str, &'static str> {
    static CATALOG_MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    CATALOG_MAP.get_or_init(|| CATALOG.iter().copied().collect())
}

/// Returns every catalog entry in declaration order.
#[must_use]
pub fn catalog_entries() -> &'static [(&'static str, &'static str)] {
    CATALOG
}

// ============================================================================
// SECTION: Translation
// ============================================================================

/// Renders `key` while substituting `args`.
#[must_use]
pub fn translate(key: &str, args: Vec<MessageArg>) -> String {
    let template = catalog().get(key).copied().unwrap_or(key);
    let mut result = template.to_string();
    for arg in args {
        let placeholder = format!("{{{}}}", arg.key);
        result = result.replace(&placeholder, &arg.value);
    }
    result
}

// ============================================================================
// SECTION: Macro
// ============================================================================

/// Formats a catalog message from a key and named arguments.
///
/// - `$key` must match a catalog entry.
/// - Named arguments are substituted into `{placeholder}` positions.
#[macro_export]
macro_rules! t {
    ($key:literal $(, $name:ident = $value:expr )* $(,)?) => {{
        let args = ::std::vec![
            $(
                $crate::i18n::MessageArg::new(stringify!($name), $value.to_string()),
            )*
        ];
        $crate::i18n::translate($key, args)
    }};
}
