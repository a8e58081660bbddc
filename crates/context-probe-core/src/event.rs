// crates/context-probe-core/src/event.rs
// ============================================================================
// Module: Captured Events
// Description: Event snapshots taken on handler failure and the sinks that
//              persist them.
// Purpose: Record every captured failure as one JSON line per event.
// Dependencies: serde, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! A [`CapturedEvent`] pairs a handler failure with the context snapshot the
//! failing request saw at capture time. Events are handed to an [`EventSink`]
//! injected into the instrumentation boundary.
//!
//! [`FileEventSink`] appends compact JSON lines to the run's log file. Writes
//! are serialized through a mutex, so lines are never interleaved and appear
//! in the order `record` was called. Sinks never return errors: a failed write
//! is reported on the runtime trace and the event is dropped.
//! [`FanoutEventSink`] combines the file sink with any other observer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::context::Breadcrumb;
use crate::context::RequestContext;
use crate::context::now_ms;
use crate::mode::IsolationMode;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Immutable record of a captured handler failure.
///
/// # Invariants
/// - `request_id` and `path` describe the failing request itself.
/// - `tags` and `breadcrumbs` are whatever the request's context instance held
///   at capture time; under correct isolation they only reflect that request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedEvent {
    /// Event identifier.
    pub event_id: String,
    /// Server-issued id of the failing request.
    pub request_id: String,
    /// Capture timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Mode of the handler group that failed.
    pub mode: IsolationMode,
    /// Deployment environment label.
    pub environment: String,
    /// Severity label.
    pub level: String,
    /// HTTP method of the failing request.
    pub method: String,
    /// Path of the failing request.
    pub path: String,
    /// Error message raised by the handler.
    pub message: String,
    /// Tags from the context snapshot.
    pub tags: BTreeMap<String, String>,
    /// Breadcrumbs from the context snapshot.
    pub breadcrumbs: Vec<Breadcrumb>,
}

/// Inputs required to construct a captured event.
pub struct CapturedEventParams {
    /// Event identifier.
    pub event_id: String,
    /// Server-issued id of the failing request.
    pub request_id: String,
    /// Mode of the handler group that failed.
    pub mode: IsolationMode,
    /// Deployment environment label.
    pub environment: String,
    /// Path of the failing request.
    pub path: String,
    /// Error message raised by the handler.
    pub message: String,
    /// Context snapshot taken at capture time.
    pub context: RequestContext,
}

impl CapturedEvent {
    /// Creates an error-level event for a GET request, stamped now.
    #[must_use]
    pub fn new(params: CapturedEventParams) -> Self {
        Self {
            event_id: params.event_id,
            request_id: params.request_id,
            timestamp_ms: now_ms(),
            mode: params.mode,
            environment: params.environment,
            level: "error".to_string(),
            method: "GET".to_string(),
            path: params.path,
            message: params.message,
            tags: params.context.tags,
            breadcrumbs: params.context.breadcrumbs,
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Observer receiving every captured event.
pub trait EventSink: Send + Sync {
    /// Records an event. Must not fail.
    fn record(&self, event: &CapturedEvent);
}

// ============================================================================
// SECTION: File Sink
// ============================================================================

/// Sink appending one JSON line per event to a log file.
#[derive(Debug)]
pub struct FileEventSink {
    /// Log file location.
    path: PathBuf,
    /// Append-mode handle.
    file: Mutex<File>,
}

impl FileEventSink {
    /// Deletes any previous log at `path` and opens a new, empty one.
    ///
    /// # Errors
    ///
    /// Returns an error if the old file cannot be removed or the new file
    /// cannot be created.
    pub fn create_fresh(path: &Path) -> io::Result<Self> {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// Serializes and appends one event.
    fn append(&self, event: &CapturedEvent) -> io::Result<()> {
        let payload = serde_json::to_string(event).map_err(io::Error::other)?;
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(file, "{payload}")?;
        file.flush()
    }
}

impl EventSink for FileEventSink {
    fn record(&self, event: &CapturedEvent) {
        if let Err(err) = self.append(event) {
            tracing::error!(
                path = %self.path.display(),
                event_id = %event.event_id,
                error = %err,
                "failed to append captured event"
            );
        }
    }
}

// ============================================================================
// SECTION: Memory Sink
// ============================================================================

/// Sink keeping events in memory, in record order.
#[derive(Debug, Default)]
pub struct InMemoryEventSink {
    /// Recorded events.
    events: Mutex<Vec<CapturedEvent>>,
}

impl InMemoryEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl EventSink for InMemoryEventSink {
    fn record(&self, event: &CapturedEvent) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event.clone());
    }
}

// ============================================================================
// SECTION: Fan-Out Sink
// ============================================================================

/// Sink handing every event to each inner sink, in order.
pub struct FanoutEventSink {
    /// Inner sinks.
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    /// Creates a sink over `sinks`.
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self {
            sinks,
        }
    }
}

impl EventSink for FanoutEventSink {
    fn record(&self, event: &CapturedEvent) {
        for sink in &self.sinks {
            sink.record(event);
        }
    }
}

// ============================================================================
// SECTION: Log Reading
// ============================================================================

/// Errors raised while reading an event log back.
#[derive(Debug, Error)]
pub enum EventLogError {
    /// The log could not be read.
    #[error("failed to read event log {path}: {source}")]
    Read {
        /// Log location.
        path: String,
        /// Underlying error.
        source: io::Error,
    },
    /// A line was not a valid captured event.
    #[error("invalid event on line {line} of {path}: {source}")]
    Parse {
        /// Log location.
        path: String,
        /// One-based line number.
        line: usize,
        /// Underlying error.
        source: serde_json::Error,
    },
}

/// Reads every event from a JSON-lines log, skipping blank lines.
///
/// # Errors
///
/// Returns [`EventLogError`] when the file cannot be read or a line fails to
/// parse.
pub fn read_event_log(path: &Path) -> Result<Vec<CapturedEvent>, EventLogError> {
    let contents = fs::read_to_string(path).map_err(|source| EventLogError::Read {
        path: path.display().to_string(),
        source,
    })?;
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|source| EventLogError::Parse {
                path: path.display().to_string(),
                line: index + 1,
                source,
            })
        })
        .collect()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
