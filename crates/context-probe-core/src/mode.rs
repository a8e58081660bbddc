// crates/context-probe-core/src/mode.rs
// ============================================================================
// Module: Test Run Identity
// Description: Isolation modes, fault routes, and the per-handler fault plan.
// Purpose: Fix the naming and timing of a single probe run.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! A probe run exercises exactly one [`IsolationMode`]. The mode determines
//! the route prefix hit by the driver, the name of the event log, whether
//! handlers suspend between log lines, and whether the run is expected to keep
//! request context isolated.
//!
//! The `async` mode is intentionally unsafe: it shares one context instance
//! across suspending handlers and is expected to leak.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default number of progress lines each handler writes before failing.
pub const DEFAULT_LOG_COUNT: u32 = 4;
/// Default suspension between progress lines for suspending handlers.
pub const DEFAULT_STEP_DELAY: Duration = Duration::from_millis(100);

// ============================================================================
// SECTION: Isolation Mode
// ============================================================================

/// Concurrency model under test.
///
/// # Invariants
/// - Labels are stable; they name routes and log files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationMode {
    /// Synchronous handlers sharing one context instance.
    #[serde(alias = "none")]
    Sync,
    /// Suspending handlers sharing one context instance.
    #[serde(rename = "async", alias = "async-implicit")]
    AsyncImplicit,
    /// Suspending handlers, each inside its own context scope.
    #[serde(rename = "async-context", alias = "async-explicit")]
    AsyncExplicit,
}

impl IsolationMode {
    /// All modes in route registration order.
    pub const ALL: [Self; 3] = [Self::Sync, Self::AsyncImplicit, Self::AsyncExplicit];

    /// Returns the run label used on the command line, in routes, and in log names.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::AsyncImplicit => "async",
            Self::AsyncExplicit => "async-context",
        }
    }

    /// Returns the descriptive name of the isolation strategy.
    #[must_use]
    pub const fn strategy_name(self) -> &'static str {
        match self {
            Self::Sync => "none",
            Self::AsyncImplicit => "async-implicit",
            Self::AsyncExplicit => "async-explicit",
        }
    }

    /// Returns the full request path for a fault route in this mode.
    #[must_use]
    pub fn route_path(self, route: RouteName) -> String {
        format!("/{}/boom/{}", self.label(), route.as_str())
    }

    /// Returns both fault route paths for this mode.
    #[must_use]
    pub fn route_paths(self) -> [String; 2] {
        RouteName::ALL.map(|route| self.route_path(route))
    }

    /// Returns the event log file name for this mode.
    #[must_use]
    pub fn log_file_name(self) -> String {
        format!("debug.{}.json", self.label())
    }

    /// Returns true when handlers suspend between progress lines.
    #[must_use]
    pub const fn suspends(self) -> bool {
        !matches!(self, Self::Sync)
    }

    /// Returns true when each request gets its own context instance.
    #[must_use]
    pub const fn scoped(self) -> bool {
        matches!(self, Self::AsyncExplicit)
    }

    /// Returns true when captured events are expected to stay isolated.
    #[must_use]
    pub const fn expects_isolation(self) -> bool {
        !matches!(self, Self::AsyncImplicit)
    }
}

impl fmt::Display for IsolationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned when a run label does not name a known mode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown test run '{label}'; expected one of: sync, async, async-context")]
pub struct UnknownModeError {
    /// Label as provided.
    pub label: String,
}

impl FromStr for IsolationMode {
    type Err = UnknownModeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "sync" | "none" => Ok(Self::Sync),
            "async" | "async-implicit" => Ok(Self::AsyncImplicit),
            "async-context" | "async-explicit" => Ok(Self::AsyncExplicit),
            other => Err(UnknownModeError {
                label: other.to_string(),
            }),
        }
    }
}

// ============================================================================
// SECTION: Route Names
// ============================================================================

/// Fault-injection route within a mode's handler group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteName {
    /// The `foo` route.
    Foo,
    /// The `bar` route.
    Bar,
}

impl RouteName {
    /// Both routes in registration order.
    pub const ALL: [Self; 2] = [Self::Foo, Self::Bar];

    /// Returns the path segment for this route.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Foo => "foo",
            Self::Bar => "bar",
        }
    }
}

// ============================================================================
// SECTION: Fault Plan
// ============================================================================

/// Timing of a fault handler: how many lines to log and how long to suspend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultPlan {
    /// Progress lines written before the handler fails.
    pub log_count: u32,
    /// Suspension after each progress line (suspending modes only).
    pub step_delay: Duration,
}

impl FaultPlan {
    /// Returns the total time a suspending handler spends asleep.
    #[must_use]
    pub fn suspended_time(&self) -> Duration {
        self.step_delay.saturating_mul(self.log_count)
    }
}

impl Default for FaultPlan {
    fn default() -> Self {
        Self {
            log_count: DEFAULT_LOG_COUNT,
            step_delay: DEFAULT_STEP_DELAY,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
