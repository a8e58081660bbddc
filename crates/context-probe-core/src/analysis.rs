// crates/context-probe-core/src/analysis.rs
// ============================================================================
// Module: Leak Analysis
// Description: Detection of foreign request context inside captured events.
// Purpose: Turn a recorded run into an isolation verdict.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! An event leaks when its context carries data written by a different
//! request. Two signals are checked:
//! - the `request_id` tag differs from the event's own `request_id`;
//! - the `client_correlation_id` tag names a route other than the event's
//!   own (driver labels end with `-<route>`);
//! - a tag value or breadcrumb message mentions a known route path other
//!   than the event's own path.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;

use crate::event::CapturedEvent;
use crate::isolation::TAG_CLIENT_CORRELATION_ID;
use crate::isolation::TAG_REQUEST_ID;
use crate::mode::IsolationMode;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Where foreign data was found inside an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LeakSource {
    /// A tag.
    Tag {
        /// Tag name.
        name: String,
    },
    /// A breadcrumb.
    Breadcrumb {
        /// Zero-based breadcrumb position.
        index: usize,
    },
}

/// One piece of foreign context found in an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextLeak {
    /// Event containing the foreign data.
    pub event_id: String,
    /// Path of the event's own request.
    pub event_path: String,
    /// Location of the foreign data.
    pub source: LeakSource,
    /// Offending tag value or breadcrumb message.
    pub detail: String,
}

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationVerdict {
    /// No event carried foreign context.
    Isolated,
    /// At least one event carried foreign context.
    Leaked,
}

impl IsolationVerdict {
    /// Returns a stable label for the verdict.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Isolated => "isolated",
            Self::Leaked => "leaked",
        }
    }
}

/// Leak analysis of one run's events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IsolationReport {
    /// Mode the run exercised.
    pub mode: IsolationMode,
    /// Number of events analyzed.
    pub total_events: usize,
    /// Number of events with at least one leak.
    pub leaked_events: usize,
    /// Every leak found, in event order.
    pub leaks: Vec<ContextLeak>,
    /// Overall outcome.
    pub verdict: IsolationVerdict,
}

impl IsolationReport {
    /// Returns true when the run behaved as its mode predicts.
    ///
    /// Isolating modes must produce `expected_events` isolated events. The
    /// `async` mode must produce `expected_events` events with a leak.
    #[must_use]
    pub fn matches_expectation(&self, expected_events: usize) -> bool {
        let expected_verdict = if self.mode.expects_isolation() {
            IsolationVerdict::Isolated
        } else {
            IsolationVerdict::Leaked
        };
        self.total_events == expected_events && self.verdict == expected_verdict
    }
}

// ============================================================================
// SECTION: Analysis
// ============================================================================

/// Analyzes a run's events against the set of known route paths.
#[must_use]
pub fn analyze_events(
    mode: IsolationMode,
    events: &[CapturedEvent],
    known_paths: &[String],
) -> IsolationReport {
    let mut leaks = Vec::new();
    let mut leaked_events = 0;
    for event in events {
        let found = find_leaks(event, known_paths);
        if !found.is_empty() {
            leaked_events += 1;
        }
        leaks.extend(found);
    }
    let verdict =
        if leaks.is_empty() { IsolationVerdict::Isolated } else { IsolationVerdict::Leaked };
    IsolationReport {
        mode,
        total_events: events.len(),
        leaked_events,
        leaks,
        verdict,
    }
}

/// Returns every foreign tag and breadcrumb in a single event.
#[must_use]
pub fn find_leaks(event: &CapturedEvent, known_paths: &[String]) -> Vec<ContextLeak> {
    let foreign: Vec<&str> = known_paths
        .iter()
        .map(String::as_str)
        .filter(|path| *path != event.path)
        .collect();
    let mentions_foreign = |text: &str| foreign.iter().any(|path| text.contains(path));
    let own_label_suffix =
        event.path.rsplit('/').next().map(|route| format!("-{route}")).unwrap_or_default();
    let leak = |source: LeakSource, detail: &str| ContextLeak {
        event_id: event.event_id.clone(),
        event_path: event.path.clone(),
        source,
        detail: detail.to_string(),
    };

    let mut leaks = Vec::new();
    for (name, value) in &event.tags {
        let foreign_request = name == TAG_REQUEST_ID && *value != event.request_id;
        let foreign_label =
            name == TAG_CLIENT_CORRELATION_ID && !value.ends_with(&own_label_suffix);
        if foreign_request || foreign_label || mentions_foreign(value) {
            leaks.push(leak(
                LeakSource::Tag {
                    name: name.clone(),
                },
                value,
            ));
        }
    }
    for (index, crumb) in event.breadcrumbs.iter().enumerate() {
        if mentions_foreign(&crumb.message) {
            leaks.push(leak(
                LeakSource::Breadcrumb {
                    index,
                },
                &crumb.message,
            ));
        }
    }
    leaks
}

// ============================================================================
// SECTION: Tests
// ============================================================================
