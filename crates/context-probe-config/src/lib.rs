// crates/context-probe-config/src/lib.rs
// ============================================================================
// Module: Context Probe Config
// Description: Run configuration for the context probe harness.
// Purpose: Assemble and validate the settings of a single probe run.
// Dependencies: context-probe-core, thiserror, url
// ============================================================================

//! ## Overview
//! A probe run is configured from the selected test run, a handful of
//! optional command-line overrides, and the environment. The only required
//! environment input is the error-tracking DSN; everything else has a
//! default. Validation is fail-closed: any problem is reported before a
//! socket is opened or the event log is touched.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod dsn;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::ConfigError;
pub use config::HarnessConfig;
pub use config::HarnessOptions;
pub use dsn::Dsn;
pub use dsn::DsnError;
