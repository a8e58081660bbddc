// crates/context-probe-core/src/context.rs
// ============================================================================
// Module: Request Context Store
// Description: Tags and breadcrumbs attached to the request being handled.
// Purpose: Hold the mutable "current request" metadata captured on failure.
// Dependencies: serde, tracing
// ============================================================================

//! ## Overview
//! [`RequestContext`] is the metadata an error-capture layer attaches to an
//! event: a tag map and a chronological breadcrumb trail. Handlers never own
//! the context directly; they hold a [`ContextHandle`] obtained from an
//! [`crate::IsolationStrategy`]. Whether two requests observe the same
//! instance depends entirely on which strategy issued their handles.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Source classification for a breadcrumb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreadcrumbCategory {
    /// Request entry observed by the instrumentation boundary.
    Http,
    /// Progress line written by a handler.
    Console,
}

/// Single breadcrumb entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadcrumb {
    /// Record timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Breadcrumb source.
    pub category: BreadcrumbCategory,
    /// Breadcrumb text.
    pub message: String,
}

impl Breadcrumb {
    /// Creates a breadcrumb stamped with the current time.
    #[must_use]
    pub fn now(category: BreadcrumbCategory, message: impl Into<String>) -> Self {
        Self {
            timestamp_ms: now_ms(),
            category,
            message: message.into(),
        }
    }
}

/// Tags and breadcrumbs describing the request being handled.
///
/// # Invariants
/// - Breadcrumbs are kept in insertion order.
/// - Tag keys are unique; later writes replace earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Tag map.
    pub tags: BTreeMap<String, String>,
    /// Chronological breadcrumb trail.
    pub breadcrumbs: Vec<Breadcrumb>,
}

impl RequestContext {
    /// Creates a context pre-populated with the given tags.
    #[must_use]
    pub fn with_tags(tags: BTreeMap<String, String>) -> Self {
        Self {
            tags,
            breadcrumbs: Vec::new(),
        }
    }
}

/// Lifecycle phase of a single request through a fault handler.
///
/// `Entered -> Logging(0..N) -> Failed -> Captured`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    /// Context established by the isolation strategy.
    Entered,
    /// Writing progress line `step`.
    Logging {
        /// Zero-based progress step.
        step: u32,
    },
    /// Handler raised its fault.
    Failed,
    /// Fault converted into a recorded event.
    Captured,
}

impl RequestPhase {
    /// Returns a stable label for trace output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Entered => "entered",
            Self::Logging {
                ..
            } => "logging",
            Self::Failed => "failed",
            Self::Captured => "captured",
        }
    }

    /// Returns true when `next` is a legal successor of this phase.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        match (self, next) {
            (
                Self::Entered,
                Self::Logging {
                    step: 0,
                },
            )
            | (Self::Entered | Self::Logging { .. }, Self::Failed)
            | (Self::Failed, Self::Captured) => true,
            (
                Self::Logging {
                    step,
                },
                Self::Logging {
                    step: next_step,
                },
            ) => matches!(step.checked_add(1), Some(expected) if expected == next_step),
            _ => false,
        }
    }
}

// ============================================================================
// SECTION: Handle
// ============================================================================

/// Capability for reading and mutating one context instance.
///
/// Cloning a handle shares the underlying instance.
#[derive(Debug, Clone, Default)]
pub struct ContextHandle {
    /// Shared context instance.
    inner: Arc<Mutex<RequestContext>>,
}

impl ContextHandle {
    /// Creates a handle to a fresh instance seeded with `context`.
    #[must_use]
    pub fn new(context: RequestContext) -> Self {
        Self {
            inner: Arc::new(Mutex::new(context)),
        }
    }

    /// Sets or replaces a tag.
    pub fn set_tag(&self, key: impl Into<String>, value: impl Into<String>) {
        self.lock().tags.insert(key.into(), value.into());
    }

    /// Appends a breadcrumb.
    pub fn add_breadcrumb(&self, breadcrumb: Breadcrumb) {
        self.lock().breadcrumbs.push(breadcrumb);
    }

    /// Writes a progress line to the runtime trace and records it as a breadcrumb.
    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(target: "context_probe::handler", "{message}");
        self.add_breadcrumb(Breadcrumb::now(BreadcrumbCategory::Console, message));
    }

    /// Replaces the instance contents with `context`.
    pub fn reset(&self, context: RequestContext) {
        *self.lock() = context;
    }

    /// Returns a copy of the current contents.
    #[must_use]
    pub fn snapshot(&self) -> RequestContext {
        self.lock().clone()
    }

    /// Returns true when both handles refer to the same instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Locks the instance, recovering the data from a poisoned lock.
    fn lock(&self) -> MutexGuard<'_, RequestContext> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the current time in milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
