// crates/context-probe-core/src/isolation.rs
// ============================================================================
// Module: Isolation Strategies
// Description: Policies deciding which context instance a request writes to.
// Purpose: Contrast a shared process-wide context with per-request scopes.
// Dependencies: context-probe-core
// ============================================================================

//! ## Overview
//! An [`IsolationStrategy`] is consulted once, when a request enters a fault
//! route. It returns the [`ContextHandle`] the request will write to for the
//! rest of its life, after applying the automatic request-start mutations
//! (base tags, `path`, `request_id`, and an `http` breadcrumb).
//!
//! - [`SharedContextStrategy`] resets and returns one process-wide instance.
//!   It only keeps requests apart when handlers never suspend between entry
//!   and capture. Under suspending handlers it leaks; that is the behavior the
//!   `async` run exists to show, and it is kept as is.
//! - [`ScopedContextStrategy`] returns a fresh instance per request. The
//!   handle is moved into the request's future by [`within`], so every
//!   continuation observes the same instance regardless of where the runtime
//!   resumes it, and no other request can reach it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::future::Future;

use crate::context::Breadcrumb;
use crate::context::BreadcrumbCategory;
use crate::context::ContextHandle;
use crate::context::RequestContext;
use crate::mode::IsolationMode;

// ============================================================================
// SECTION: Tag Names
// ============================================================================

/// Tag holding the deployment environment.
pub const TAG_ENVIRONMENT: &str = "environment";
/// Tag holding the isolation mode label of the handler group.
pub const TAG_MODE: &str = "mode";
/// Tag holding the request path.
pub const TAG_PATH: &str = "path";
/// Tag holding the server-issued request id.
pub const TAG_REQUEST_ID: &str = "request_id";
/// Tag holding the client route label.
pub const TAG_CLIENT_CORRELATION_ID: &str = "client_correlation_id";

// ============================================================================
// SECTION: Request Entry
// ============================================================================

/// Facts known about a request at the moment it enters a fault route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEntry {
    /// Mode of the handler group serving the request.
    pub mode: IsolationMode,
    /// Request path.
    pub path: String,
    /// Server-issued request id.
    pub request_id: String,
    /// Client route label, when a usable one was sent.
    pub client_id: Option<String>,
}

impl RequestEntry {
    /// Applies the request-start mutations to `handle`.
    fn apply(&self, handle: &ContextHandle) {
        handle.set_tag(TAG_MODE, self.mode.label());
        handle.set_tag(TAG_PATH, self.path.clone());
        handle.set_tag(TAG_REQUEST_ID, self.request_id.clone());
        if let Some(client_id) = &self.client_id {
            handle.set_tag(TAG_CLIENT_CORRELATION_ID, client_id.clone());
        }
        handle.add_breadcrumb(Breadcrumb::now(
            BreadcrumbCategory::Http,
            format!("GET {}", self.path),
        ));
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Policy selecting the context instance for an entering request.
pub trait IsolationStrategy: Send + Sync {
    /// Returns a stable label for trace output.
    fn name(&self) -> &'static str;

    /// Establishes context for a request and returns its handle.
    fn enter(&self, entry: &RequestEntry) -> ContextHandle;
}

/// Runs `unit` with the handle `strategy` issues for `entry`.
///
/// The handle is passed by value into the unit of work; nothing is stored in
/// ambient state.
pub async fn within<S, F, Fut>(strategy: &S, entry: &RequestEntry, unit: F) -> Fut::Output
where
    S: IsolationStrategy + ?Sized,
    F: FnOnce(ContextHandle) -> Fut,
    Fut: Future,
{
    let handle = strategy.enter(entry);
    tracing::debug!(
        strategy = strategy.name(),
        path = %entry.path,
        request_id = %entry.request_id,
        "request context entered"
    );
    unit(handle).await
}

/// Builds the base tag set shared by every context instance.
fn base_context(environment: &str) -> RequestContext {
    let mut tags = BTreeMap::new();
    tags.insert(TAG_ENVIRONMENT.to_string(), environment.to_string());
    RequestContext::with_tags(tags)
}

// ============================================================================
// SECTION: Shared Strategy
// ============================================================================

/// One context instance for every request in the process.
#[derive(Debug)]
pub struct SharedContextStrategy {
    /// Process-wide instance.
    handle: ContextHandle,
    /// Contents restored on every request entry.
    base: RequestContext,
}

impl SharedContextStrategy {
    /// Creates the shared instance for the given environment.
    #[must_use]
    pub fn new(environment: &str) -> Self {
        let base = base_context(environment);
        Self {
            handle: ContextHandle::new(base.clone()),
            base,
        }
    }

    /// Returns a handle to the shared instance.
    #[must_use]
    pub fn handle(&self) -> ContextHandle {
        self.handle.clone()
    }
}

impl IsolationStrategy for SharedContextStrategy {
    fn name(&self) -> &'static str {
        "shared"
    }

    fn enter(&self, entry: &RequestEntry) -> ContextHandle {
        self.handle.reset(self.base.clone());
        entry.apply(&self.handle);
        self.handle.clone()
    }
}

// ============================================================================
// SECTION: Scoped Strategy
// ============================================================================

/// A fresh context instance for every request.
#[derive(Debug)]
pub struct ScopedContextStrategy {
    /// Contents every new instance starts from.
    base: RequestContext,
}

impl ScopedContextStrategy {
    /// Creates the strategy for the given environment.
    #[must_use]
    pub fn new(environment: &str) -> Self {
        Self {
            base: base_context(environment),
        }
    }
}

impl IsolationStrategy for ScopedContextStrategy {
    fn name(&self) -> &'static str {
        "scoped"
    }

    fn enter(&self, entry: &RequestEntry) -> ContextHandle {
        let handle = ContextHandle::new(self.base.clone());
        entry.apply(&handle);
        handle
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
