// crates/context-probe-core/src/correlation.rs
// ============================================================================
// Module: Request Correlation
// Description: Client route labels and run-scoped request/event ids.
// Purpose: Make every captured event attributable to the request it belongs to.
// Dependencies: rand
// ============================================================================

//! ## Overview
//! The run driver labels each request with `x-correlation-id: <mode>-<route>`
//! ([`route_label`]). The server reads the header as a [`ClientLabel`]: a
//! printable label is kept and tagged on the request's context, anything else
//! is dropped with a warning and the request proceeds unlabeled. A label
//! never decides whether a fault route runs.
//!
//! Each request and each captured event also gets a server id from an
//! [`IdSequence`]. The event's own `request_id` comes from the failing
//! request, while the `request_id` tag comes from whatever context instance
//! the handler was writing to; a mismatch is a leak.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use rand::RngCore;
use rand::rngs::OsRng;

use crate::mode::IsolationMode;
use crate::mode::RouteName;

/// Header carrying the client's route label.
pub const CLIENT_CORRELATION_HEADER: &str = "x-correlation-id";
/// Header carrying the server-issued request id.
pub const SERVER_CORRELATION_HEADER: &str = "x-server-correlation-id";
/// Longest client label kept on a context.
pub const MAX_CLIENT_LABEL_LENGTH: usize = 128;

/// Returns the label the driver sends for `route` in `mode`.
#[must_use]
pub fn route_label(mode: IsolationMode, route: RouteName) -> String {
    format!("{}-{}", mode.label(), route.as_str())
}

/// Client label header as read by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientLabel {
    /// No header was sent.
    Missing,
    /// Trimmed printable label.
    Accepted(String),
    /// Header present but blank, oversized, or not printable ASCII.
    Discarded,
}

impl ClientLabel {
    /// Reads raw header bytes.
    #[must_use]
    pub fn from_header(raw: Option<&[u8]>) -> Self {
        let Some(raw) = raw else {
            return Self::Missing;
        };
        let trimmed = raw.trim_ascii();
        let printable = trimmed.iter().all(u8::is_ascii_graphic);
        if trimmed.is_empty() || trimmed.len() > MAX_CLIENT_LABEL_LENGTH || !printable {
            return Self::Discarded;
        }
        String::from_utf8(trimmed.to_vec()).map_or(Self::Discarded, Self::Accepted)
    }

    /// Returns the label to tag, if any.
    #[must_use]
    pub fn into_label(self) -> Option<String> {
        match self {
            Self::Accepted(label) => Some(label),
            Self::Missing | Self::Discarded => None,
        }
    }
}

/// Run-scoped id source: `<prefix>-<run tag>-<sequence>`.
///
/// The run tag is random per sequence so ids from separate runs never match.
#[derive(Debug)]
pub struct IdSequence {
    /// Leading label of every id.
    prefix: &'static str,
    /// Random tag fixed at construction.
    run_tag: u32,
    /// Next sequence number.
    next: AtomicU64,
}

impl IdSequence {
    /// Creates a sequence starting at 1.
    #[must_use]
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            run_tag: OsRng.next_u32(),
            next: AtomicU64::new(1),
        }
    }

    /// Issues the next id.
    #[must_use]
    pub fn issue(&self) -> String {
        let seq = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{:08x}-{seq}", self.prefix, self.run_tag)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
