// crates/context-probe-cli/src/lib.rs
// ============================================================================
// Module: Context Probe CLI Library
// Description: Run driver and message catalog behind the `context-probe` binary.
// Purpose: Keep the orchestration testable outside the binary entry point.
// Dependencies: context-probe-config, context-probe-core, context-probe-server,
//               reqwest
// ============================================================================

//! ## Overview
//! [`driver`] runs one probe end to end; [`forward`] optionally posts the
//! captured events to the error-tracking endpoint; [`i18n`] holds every
//! user-facing string printed by the binary.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod driver;
pub mod forward;
pub mod i18n;


// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use driver::DriverError;
pub use driver::RunDriver;
pub use driver::RunSummary;
pub use forward::ForwardStats;
