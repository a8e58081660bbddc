// crates/context-probe-server/src/routes.rs
// ============================================================================
// Module: Fault Routes
// Description: Handler bodies that log progress and then fail.
// Purpose: Produce the faults whose captured context is under test.
// Dependencies: context-probe-core, thiserror, tokio, tracing
// ============================================================================

//! ## Overview
//! Every fault route writes `log_count` lines `"<path> - <i>"` through its
//! [`ContextHandle`] and then raises a [`HandlerFault`]. There is no success
//! path. The non-suspending body has no await point at all; the suspending
//! body sleeps `step_delay` after each line so concurrent requests
//! interleave.

// ============================================================================
// SECTION: Imports
// ============================================================================

use context_probe_core::ContextHandle;
use context_probe_core::FaultPlan;
use context_probe_core::IsolationMode;
use context_probe_core::RequestContext;
use context_probe_core::RequestPhase;
use thiserror::Error;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Fault raised by every fault route.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerFault {
    /// Path of the failing route.
    pub path: String,
    /// Fault message, `"BOOM <path>"`.
    pub message: String,
}

impl HandlerFault {
    /// Builds the fault for `path`.
    #[must_use]
    pub fn boom(path: &str) -> Self {
        Self {
            path: path.to_string(),
            message: format!("BOOM {path}"),
        }
    }
}

/// Fault plus the context observed at the moment it was raised.
#[derive(Debug)]
pub struct FaultOutcome {
    /// Raised fault.
    pub fault: HandlerFault,
    /// Context snapshot taken when the fault was raised.
    pub context: RequestContext,
    /// Phase trace of the request.
    pub(crate) trace: PhaseTrace,
}

impl FaultOutcome {
    /// Raises the fault for `trace`'s path and snapshots `handle`.
    fn raise(handle: &ContextHandle, mut trace: PhaseTrace) -> Self {
        trace.advance(RequestPhase::Failed);
        Self {
            fault: HandlerFault::boom(&trace.path),
            context: handle.snapshot(),
            trace,
        }
    }
}

/// Phase transitions of one request, mirrored to the runtime trace.
#[derive(Debug)]
pub(crate) struct PhaseTrace {
    /// Request path.
    path: String,
    /// Current phase.
    phase: RequestPhase,
}

impl PhaseTrace {
    /// Starts a trace in the `Entered` phase.
    fn entered(path: &str) -> Self {
        Self {
            path: path.to_string(),
            phase: RequestPhase::Entered,
        }
    }

    /// Moves to `next`, reporting out-of-order transitions.
    pub(crate) fn advance(&mut self, next: RequestPhase) {
        if !self.phase.can_advance_to(next) {
            tracing::warn!(
                path = %self.path,
                from = self.phase.as_str(),
                to = next.as_str(),
                "unexpected request phase transition"
            );
        }
        tracing::debug!(path = %self.path, phase = next.as_str(), "request phase");
        self.phase = next;
    }
}

// ============================================================================
// SECTION: Handler Bodies
// ============================================================================

/// Runs the fault body appropriate for `mode`.
pub async fn run_fault_route(
    mode: IsolationMode,
    handle: ContextHandle,
    path: String,
    plan: FaultPlan,
) -> FaultOutcome {
    if mode.suspends() {
        fail_after_suspending(handle, path, plan).await
    } else {
        fail_without_suspending(&handle, &path, plan)
    }
}

/// Logs every progress line and fails without yielding.
#[must_use]
pub fn fail_without_suspending(handle: &ContextHandle, path: &str, plan: FaultPlan) -> FaultOutcome {
    let mut trace = PhaseTrace::entered(path);
    for step in 0 .. plan.log_count {
        trace.advance(RequestPhase::Logging {
            step,
        });
        handle.log(format!("{path} - {step}"));
    }
    FaultOutcome::raise(handle, trace)
}

/// Logs every progress line, sleeping `step_delay` after each, then fails.
pub async fn fail_after_suspending(
    handle: ContextHandle,
    path: String,
    plan: FaultPlan,
) -> FaultOutcome {
    let mut trace = PhaseTrace::entered(&path);
    for step in 0 .. plan.log_count {
        trace.advance(RequestPhase::Logging {
            step,
        });
        handle.log(format!("{path} - {step}"));
        tokio::time::sleep(plan.step_delay).await;
    }
    FaultOutcome::raise(&handle, trace)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
