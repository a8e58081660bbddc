// crates/context-probe-core/src/lib.rs
// ============================================================================
// Module: Context Probe Core
// Description: Request context, isolation strategies, and captured events.
// Purpose: Provide the data model shared by the probe server and run driver.
// Dependencies: rand, serde, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! Context Probe Core models how an error-capture layer attaches request
//! metadata (tags and breadcrumbs) to the errors raised by HTTP handlers, and
//! how that metadata is confined (or not) to the request that produced it.
//!
//! The crate exposes:
//! - [`IsolationMode`] and [`FaultPlan`] describing a test run.
//! - [`ContextHandle`] and [`RequestContext`], the context store.
//! - [`IsolationStrategy`] with shared and scoped implementations.
//! - [`CapturedEvent`] and [`EventSink`], the event recorder.
//! - [`analysis`] for detecting context leakage in a recorded run.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod analysis;
pub mod context;
pub mod correlation;
pub mod event;
pub mod isolation;
pub mod mode;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use analysis::ContextLeak;
pub use analysis::IsolationReport;
pub use analysis::IsolationVerdict;
pub use analysis::LeakSource;
pub use analysis::analyze_events;
pub use context::Breadcrumb;
pub use context::BreadcrumbCategory;
pub use context::ContextHandle;
pub use context::RequestContext;
pub use context::RequestPhase;
pub use correlation::ClientLabel;
pub use correlation::IdSequence;
pub use event::CapturedEvent;
pub use event::EventLogError;
pub use event::EventSink;
pub use event::FanoutEventSink;
pub use event::FileEventSink;
pub use event::InMemoryEventSink;
pub use event::read_event_log;
pub use isolation::IsolationStrategy;
pub use isolation::RequestEntry;
pub use isolation::ScopedContextStrategy;
pub use isolation::SharedContextStrategy;
pub use mode::FaultPlan;
pub use mode::IsolationMode;
pub use mode::RouteName;
pub use mode::UnknownModeError;
