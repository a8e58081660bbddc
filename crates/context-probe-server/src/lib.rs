// crates/context-probe-server/src/lib.rs
// ============================================================================
// Module: Context Probe Server
// Description: HTTP server exposing the fault-injection routes.
// Purpose: Serve every mode's handler group and capture their faults.
// Dependencies: axum, context-probe-core, tokio, tracing
// ============================================================================

//! ## Overview
//! The probe server registers two fault routes for each isolation mode.
//! Every route writes progress lines through its request context and then
//! fails. The failure is captured into a [`context_probe_core::CapturedEvent`]
//! built from that context and handed to an injected
//! [`context_probe_core::EventSink`]; the client receives a generic 500.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod routes;
pub mod server;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use routes::FaultOutcome;
pub use routes::HandlerFault;
pub use server::ProbeServer;
pub use server::ProbeServerError;
pub use server::ProbeSettings;
