// crates/context-probe-cli/src/driver.rs
// ============================================================================
// Module: Run Driver
// Description: Orchestrates one probe run from log reset to leak report.
// Purpose: Start the server, fire the concurrent pair, settle, and analyze.
// Dependencies: context-probe-config, context-probe-core, context-probe-server,
//               reqwest, serde, thiserror, tokio, tracing
// ============================================================================

//! ## Overview
//! A run has two halves so callers can report the bound address in between:
//! - [`RunDriver::start`] replaces the event log, starts event forwarding
//!   when enabled, binds the server, and spawns it with a graceful-shutdown
//!   signal.
//! - [`StartedRun::finish`] fires one request at each of the mode's two
//!   fault routes concurrently, waits the settle window measured from the
//!   moment they were fired, stops the server, drains forwarding, and
//!   analyzes the log.
//!
//! Any transport failure or task failure aborts the run. Faults inside the
//! handlers are the expected outcome and arrive as 500 responses.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use context_probe_config::HarnessConfig;
use context_probe_core::EventLogError;
use context_probe_core::EventSink;
use context_probe_core::FanoutEventSink;
use context_probe_core::FileEventSink;
use context_probe_core::IsolationMode;
use context_probe_core::IsolationReport;
use context_probe_core::RouteName;
use context_probe_core::analyze_events;
use context_probe_core::correlation::CLIENT_CORRELATION_HEADER;
use context_probe_core::correlation::SERVER_CORRELATION_HEADER;
use context_probe_core::correlation::route_label;
use context_probe_core::read_event_log;
use context_probe_server::ProbeServer;
use context_probe_server::ProbeServerError;
use context_probe_server::ProbeSettings;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::forward::EventForwarder;
use crate::forward::FORWARD_DRAIN_LIMIT;
use crate::forward::ForwardError;
use crate::forward::ForwardStats;
use crate::forward::ForwardTask;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Number of requests fired per run, one per fault route.
pub const EXPECTED_EVENTS: usize = RouteName::ALL.len();

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Driver-level failures. All are fatal for the run.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The event log could not be replaced.
    #[error("failed to reset event log {path}: {source}")]
    LogReset {
        /// Log location.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The server failed to bind or serve.
    #[error(transparent)]
    Server(#[from] ProbeServerError),
    /// Event forwarding could not be set up.
    #[error(transparent)]
    Forward(#[from] ForwardError),
    /// A probe request got no HTTP response.
    #[error("request to {path} failed: {reason}")]
    Request {
        /// Requested path.
        path: String,
        /// Transport failure.
        reason: String,
    },
    /// A spawned task panicked or was cancelled.
    #[error("{task} task failed: {reason}")]
    Join {
        /// Task label.
        task: &'static str,
        /// Join failure.
        reason: String,
    },
    /// The event log could not be read back.
    #[error(transparent)]
    Analysis(#[from] EventLogError),
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// HTTP outcome of one probe request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestOutcome {
    /// Requested path.
    pub path: String,
    /// Response status code.
    pub status: u16,
    /// Server request id from the response header.
    pub server_correlation_id: Option<String>,
}

/// Result of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Mode exercised.
    pub mode: IsolationMode,
    /// Address the server listened on.
    pub server_addr: SocketAddr,
    /// Event log written by the run.
    pub log_path: PathBuf,
    /// Request outcomes in route order.
    pub requests: Vec<RequestOutcome>,
    /// Leak analysis of the captured events.
    pub report: IsolationReport,
    /// Forwarding counts, when forwarding was enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forwarded: Option<ForwardStats>,
}

impl RunSummary {
    /// Returns true when the run behaved as its mode predicts.
    #[must_use]
    pub fn matches_expectation(&self) -> bool {
        self.report.matches_expectation(EXPECTED_EVENTS)
    }
}

// ============================================================================
// SECTION: Driver
// ============================================================================

/// Entry point of a probe run.
#[derive(Debug)]
pub struct RunDriver {
    /// Validated run settings.
    config: HarnessConfig,
}

impl RunDriver {
    /// Creates a driver for `config`.
    #[must_use]
    pub const fn new(config: HarnessConfig) -> Self {
        Self {
            config,
        }
    }

    /// Runs start to finish.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when any step fails.
    pub async fn run(self) -> Result<RunSummary, DriverError> {
        self.start().await?.finish().await
    }

    /// Replaces the event log, binds the server, and starts serving.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::LogReset`], [`DriverError::Forward`], or
    /// [`DriverError::Server`]; no request has been sent in any case.
    pub async fn start(self) -> Result<StartedRun, DriverError> {
        let log_path = self.config.log_path();
        let file_sink = FileEventSink::create_fresh(&log_path).map_err(|source| {
            DriverError::LogReset {
                path: log_path.display().to_string(),
                source,
            }
        })?;
        tracing::info!(path = %log_path.display(), "event log reset");

        let file_sink: Arc<dyn EventSink> = Arc::new(file_sink);
        let (sink, forwarder) = if self.config.forward {
            let (forwarding, task) = EventForwarder::new(&self.config.dsn)?.spawn();
            let forwarding: Arc<dyn EventSink> = Arc::new(forwarding);
            tracing::info!(dsn = %self.config.dsn, "forwarding captured events");
            let sink: Arc<dyn EventSink> =
                Arc::new(FanoutEventSink::new(vec![file_sink, forwarding]));
            (sink, Some(task))
        } else {
            (file_sink, None)
        };

        let settings = ProbeSettings {
            environment: self.config.environment.clone(),
            plan: self.config.plan,
        };
        let server = ProbeServer::bind(self.config.bind, settings, sink).await?;
        let local_addr = server.local_addr();
        let (shutdown, signal) = oneshot::channel();
        let server_task = tokio::spawn(server.serve_with_shutdown(async move {
            let _ = signal.await;
        }));
        Ok(StartedRun {
            config: self.config,
            local_addr,
            log_path,
            shutdown,
            server_task,
            forwarder,
        })
    }
}

/// A run whose server is listening.
#[derive(Debug)]
pub struct StartedRun {
    /// Validated run settings.
    config: HarnessConfig,
    /// Address actually bound.
    local_addr: SocketAddr,
    /// Event log location.
    log_path: PathBuf,
    /// Graceful shutdown trigger.
    shutdown: oneshot::Sender<()>,
    /// Serving task.
    server_task: JoinHandle<Result<(), ProbeServerError>>,
    /// Forwarding task, when enabled.
    forwarder: Option<ForwardTask>,
}

impl StartedRun {
    /// Returns the bound address.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the base URI of the running server.
    #[must_use]
    pub fn uri(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    /// Fires the request pair, settles, stops the server, and analyzes.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] on transport, task, server, or log failures.
    pub async fn finish(self) -> Result<RunSummary, DriverError> {
        let mode = self.config.mode;
        let client = reqwest::Client::new();
        let fired_at = Instant::now();
        let requests: Vec<JoinHandle<Result<RequestOutcome, DriverError>>> = RouteName::ALL
            .into_iter()
            .map(|route| {
                let path = mode.route_path(route);
                let url = format!("{}{path}", self.uri());
                let label = route_label(mode, route);
                tokio::spawn(fire_request(client.clone(), url, path, label))
            })
            .collect();
        drop(client);
        tracing::info!(mode = %mode, count = EXPECTED_EVENTS, "requests fired");

        tokio::time::sleep_until(fired_at + self.config.settle).await;
        tracing::info!(settle_ms = self.config.settle.as_millis(), "settle window elapsed");

        let _ = self.shutdown.send(());
        self.server_task.await.map_err(|err| DriverError::Join {
            task: "server",
            reason: err.to_string(),
        })??;

        let mut outcomes = Vec::with_capacity(requests.len());
        for request in requests {
            let outcome = request.await.map_err(|err| DriverError::Join {
                task: "request",
                reason: err.to_string(),
            })??;
            outcomes.push(outcome);
        }

        let forwarded = match self.forwarder {
            Some(task) => Some(task.finish(FORWARD_DRAIN_LIMIT).await),
            None => None,
        };

        let events = read_event_log(&self.log_path)?;
        let report = analyze_events(mode, &events, &mode.route_paths());
        tracing::info!(
            total = report.total_events,
            leaked = report.leaked_events,
            verdict = report.verdict.as_str(),
            "run analyzed"
        );
        Ok(RunSummary {
            mode,
            server_addr: self.local_addr,
            log_path: self.log_path,
            requests: outcomes,
            report,
            forwarded,
        })
    }
}

/// Sends one probe request and records its outcome.
async fn fire_request(
    client: reqwest::Client,
    url: String,
    path: String,
    label: String,
) -> Result<RequestOutcome, DriverError> {
    let response = client
        .get(&url)
        .header(CLIENT_CORRELATION_HEADER, label)
        .send()
        .await
        .map_err(|err| DriverError::Request {
            path: path.clone(),
            reason: err.to_string(),
        })?;
    let server_correlation_id = response
        .headers()
        .get(SERVER_CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);
    let status = response.status().as_u16();
    tracing::info!(path = %path, status, "request completed");
    Ok(RequestOutcome {
        path,
        status,
        server_correlation_id,
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
