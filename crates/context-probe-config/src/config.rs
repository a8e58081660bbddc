// crates/context-probe-config/src/config.rs
// ============================================================================
// Module: Harness Configuration
// Description: Run settings assembled from overrides and the environment.
// Purpose: Validate a probe run before any socket or file is opened.
// Dependencies: context-probe-core, thiserror
// ============================================================================

//! ## Overview
//! [`HarnessConfig::load`] merges [`HarnessOptions`] (command-line overrides)
//! with an injected environment lookup, applies defaults, and validates the
//! result. Validation rules:
//! - `SENTRY_DSN` is required and must parse as a DSN.
//! - The bind address must be loopback; the probe never listens publicly.
//! - `log_count` and `step_delay` must stay within fixed bounds.
//! - The settle window must outlast the handlers' suspended time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use context_probe_core::FaultPlan;
use context_probe_core::IsolationMode;
use thiserror::Error;

use crate::dsn::Dsn;
use crate::dsn::DsnError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable holding the error-tracking DSN.
pub const DSN_ENV: &str = "SENTRY_DSN";
/// Environment variable overriding the environment tag.
pub const ENVIRONMENT_ENV: &str = "SENTRY_ENVIRONMENT";
/// Environment tag used when none is configured.
pub const DEFAULT_ENVIRONMENT: &str = "local";
/// Default listen address.
pub const DEFAULT_BIND: &str = "127.0.0.1:3000";
/// Default settle window.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(3000);
/// Slack required between the handlers' suspended time and the settle window.
pub const SETTLE_MARGIN: Duration = Duration::from_millis(250);
/// Upper bound on progress lines per handler.
pub const MAX_LOG_COUNT: u32 = 64;
/// Upper bound on the per-step suspension.
pub const MAX_STEP_DELAY: Duration = Duration::from_secs(5);
/// Upper bound on the environment tag length.
pub const MAX_ENVIRONMENT_LENGTH: usize = 64;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration failures. All are fatal before the server starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Required DSN variable is unset or blank.
    #[error("{env} must be set to the error-tracking dsn")]
    MissingDsn {
        /// Variable name.
        env: &'static str,
    },
    /// DSN did not parse.
    #[error("invalid {env}: {source}")]
    InvalidDsn {
        /// Variable name.
        env: &'static str,
        /// Parse failure.
        source: DsnError,
    },
    /// Bind address did not parse.
    #[error("invalid bind address '{value}'")]
    InvalidBind {
        /// Address as provided.
        value: String,
    },
    /// Bind address is not loopback.
    #[error("non-loopback bind {addr} disallowed; the probe only listens on loopback")]
    NonLoopbackBind {
        /// Rejected address.
        addr: SocketAddr,
    },
    /// Environment tag is empty, too long, or not a plain token.
    #[error("invalid environment tag '{value}'")]
    InvalidEnvironment {
        /// Tag as provided.
        value: String,
    },
    /// Progress line count outside `1..=MAX_LOG_COUNT`.
    #[error("log count must be between 1 and {max}, got {value}")]
    InvalidLogCount {
        /// Count as provided.
        value: u32,
        /// Upper bound.
        max: u32,
    },
    /// Step delay above `MAX_STEP_DELAY`.
    #[error("step delay must be at most {max_ms} ms, got {value_ms} ms")]
    InvalidStepDelay {
        /// Delay as provided.
        value_ms: u128,
        /// Upper bound.
        max_ms: u128,
    },
    /// Settle window too short for the handlers to finish.
    #[error("settle window of {settle_ms} ms is too short; at least {required_ms} ms required")]
    SettleTooShort {
        /// Configured window.
        settle_ms: u128,
        /// Minimum window.
        required_ms: u128,
    },
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// Optional overrides for a probe run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessOptions {
    /// Selected test run.
    pub mode: IsolationMode,
    /// Listen address override.
    pub bind: Option<String>,
    /// Directory for the event log.
    pub output_dir: Option<PathBuf>,
    /// Settle window override in milliseconds.
    pub settle_ms: Option<u64>,
    /// Progress line count override.
    pub log_count: Option<u32>,
    /// Step delay override in milliseconds.
    pub step_delay_ms: Option<u64>,
    /// Post captured events to the DSN's store endpoint.
    pub forward: bool,
}

impl HarnessOptions {
    /// Returns options with every override unset.
    #[must_use]
    pub const fn new(mode: IsolationMode) -> Self {
        Self {
            mode,
            bind: None,
            output_dir: None,
            settle_ms: None,
            log_count: None,
            step_delay_ms: None,
            forward: false,
        }
    }
}

/// Validated settings of one probe run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Selected test run.
    pub mode: IsolationMode,
    /// Error-tracking endpoint.
    pub dsn: Dsn,
    /// Whether captured events are also posted to `dsn`.
    pub forward: bool,
    /// Value of the `environment` tag.
    pub environment: String,
    /// Listen address.
    pub bind: SocketAddr,
    /// Directory holding the event log.
    pub output_dir: PathBuf,
    /// Time allowed for the two requests to complete.
    pub settle: Duration,
    /// Handler timing.
    pub plan: FaultPlan,
}

impl HarnessConfig {
    /// Builds and validates a configuration.
    ///
    /// `env` resolves environment variables by name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required value is missing or any
    /// setting is invalid.
    pub fn load<F>(options: HarnessOptions, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_dsn = env(DSN_ENV).filter(|value| !value.trim().is_empty()).ok_or(
            ConfigError::MissingDsn {
                env: DSN_ENV,
            },
        )?;
        let dsn = Dsn::parse(&raw_dsn).map_err(|source| ConfigError::InvalidDsn {
            env: DSN_ENV,
            source,
        })?;
        let environment =
            env(ENVIRONMENT_ENV).unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());
        let bind_text = options.bind.unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_text.trim().parse::<SocketAddr>().map_err(|_| ConfigError::InvalidBind {
            value: bind_text.clone(),
        })?;
        let defaults = FaultPlan::default();
        let plan = FaultPlan {
            log_count: options.log_count.unwrap_or(defaults.log_count),
            step_delay: options
                .step_delay_ms
                .map_or(defaults.step_delay, Duration::from_millis),
        };
        let config = Self {
            mode: options.mode,
            dsn,
            forward: options.forward,
            environment,
            bind,
            output_dir: options.output_dir.unwrap_or_else(|| PathBuf::from(".")),
            settle: options.settle_ms.map_or(DEFAULT_SETTLE, Duration::from_millis),
            plan,
        };
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration from the process environment.
    ///
    /// # Errors
    ///
    /// See [`HarnessConfig::load`].
    pub fn from_process_env(options: HarnessOptions) -> Result<Self, ConfigError> {
        Self::load(options, |name| std::env::var(name).ok())
    }

    /// Checks every invariant of the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.bind.ip().is_loopback() {
            return Err(ConfigError::NonLoopbackBind {
                addr: self.bind,
            });
        }
        validate_environment(&self.environment)?;
        if self.plan.log_count == 0 || self.plan.log_count > MAX_LOG_COUNT {
            return Err(ConfigError::InvalidLogCount {
                value: self.plan.log_count,
                max: MAX_LOG_COUNT,
            });
        }
        if self.plan.step_delay > MAX_STEP_DELAY {
            return Err(ConfigError::InvalidStepDelay {
                value_ms: self.plan.step_delay.as_millis(),
                max_ms: MAX_STEP_DELAY.as_millis(),
            });
        }
        let required = self.required_settle();
        if self.settle < required {
            return Err(ConfigError::SettleTooShort {
                settle_ms: self.settle.as_millis(),
                required_ms: required.as_millis(),
            });
        }
        Ok(())
    }

    /// Returns the shortest settle window the handlers need.
    #[must_use]
    pub fn required_settle(&self) -> Duration {
        let suspended =
            if self.mode.suspends() { self.plan.suspended_time() } else { Duration::ZERO };
        suspended.saturating_add(SETTLE_MARGIN)
    }

    /// Returns the event log location for this run.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.output_dir.join(self.mode.log_file_name())
    }
}

/// Accepts short tags made of ASCII alphanumerics, `-`, `_`, and `.`.
fn validate_environment(value: &str) -> Result<(), ConfigError> {
    let valid = !value.is_empty()
        && value.len() <= MAX_ENVIRONMENT_LENGTH
        && value.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidEnvironment {
            value: value.to_string(),
        })
    }
}
