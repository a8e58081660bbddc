// crates/context-probe-cli/src/forward.rs
// ============================================================================
// Module: Event Forwarding
// Description: Opt-in delivery of captured events to the DSN store endpoint.
// Purpose: Send every captured event to the error-tracking service as well as
//          the local log.
// Dependencies: context-probe-config, context-probe-core, rand, reqwest,
//               serde, thiserror, tokio, tracing
// ============================================================================

//! ## Overview
//! [`EventSink::record`] is synchronous and must not fail, so forwarding is
//! split in two:
//! - [`ForwardingEventSink`] clones each event onto an unbounded queue.
//! - [`ForwardTask`] owns a background task that posts queued events one at a
//!   time to `<dsn>/api/<project>/store/` with an `X-Sentry-Auth` header.
//!
//! Delivery failures are traced and counted, never raised. [`ForwardTask::finish`]
//! closes the queue, lets the task post what is already queued, and returns
//! the counts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use context_probe_config::Dsn;
use context_probe_core::BreadcrumbCategory;
use context_probe_core::CapturedEvent;
use context_probe_core::EventSink;
use context_probe_core::IsolationMode;
use rand::RngCore;
use rand::rngs::OsRng;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use reqwest::redirect::Policy;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Client identifier sent in the auth header.
pub const FORWARD_CLIENT: &str = concat!("context-probe/", env!("CARGO_PKG_VERSION"));
/// Per-request timeout for store posts.
pub const FORWARD_TIMEOUT: Duration = Duration::from_secs(5);
/// Longest wait for queued events once the run is over.
pub const FORWARD_DRAIN_LIMIT: Duration = Duration::from_secs(5);
/// Header carrying the DSN public key.
const AUTH_HEADER: &str = "x-sentry-auth";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Forwarding failures.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// The HTTP client or its headers could not be built.
    #[error("forwarding client setup failed: {0}")]
    Setup(String),
    /// The event could not be serialized.
    #[error("event serialization failed: {0}")]
    Serialize(String),
    /// The store endpoint could not be reached.
    #[error("store request failed: {0}")]
    Transport(String),
    /// The store endpoint answered with a non-success status.
    #[error("store endpoint returned http {0}")]
    Status(u16),
}

// ============================================================================
// SECTION: Stats
// ============================================================================

/// Delivery counts of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ForwardStats {
    /// Events accepted by the store endpoint.
    pub sent: usize,
    /// Events that could not be delivered.
    pub failed: usize,
}

/// Counters shared between the task and its owner.
#[derive(Debug, Default)]
struct ForwardCounters {
    /// Delivered events.
    sent: AtomicUsize,
    /// Undelivered events.
    failed: AtomicUsize,
}

impl ForwardCounters {
    /// Reads both counters.
    fn snapshot(&self) -> ForwardStats {
        ForwardStats {
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// SECTION: Sink
// ============================================================================

/// Sink queuing events for the forwarding task.
#[derive(Debug)]
pub struct ForwardingEventSink {
    /// Queue drained by the forwarding task.
    queue: mpsc::UnboundedSender<CapturedEvent>,
}

impl EventSink for ForwardingEventSink {
    fn record(&self, event: &CapturedEvent) {
        if self.queue.send(event.clone()).is_err() {
            tracing::warn!(event_id = %event.event_id, "forwarding queue closed; event not sent");
        }
    }
}

// ============================================================================
// SECTION: Forwarder
// ============================================================================

/// HTTP client bound to one DSN store endpoint.
#[derive(Debug)]
pub struct EventForwarder {
    /// Store client.
    client: Client,
    /// Store endpoint URL.
    endpoint: String,
    /// Headers sent with every post.
    headers: HeaderMap,
}

impl EventForwarder {
    /// Creates a forwarder for `dsn`.
    ///
    /// # Errors
    ///
    /// Returns [`ForwardError::Setup`] when the client cannot be built.
    pub fn new(dsn: &Dsn) -> Result<Self, ForwardError> {
        let client = Client::builder()
            .timeout(FORWARD_TIMEOUT)
            .redirect(Policy::none())
            .build()
            .map_err(|err| ForwardError::Setup(err.to_string()))?;
        let auth = HeaderValue::from_str(&dsn.auth_header(FORWARD_CLIENT))
            .map_err(|err| ForwardError::Setup(err.to_string()))?;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(AUTH_HEADER, auth);
        Ok(Self {
            client,
            endpoint: dsn.store_endpoint(),
            headers,
        })
    }

    /// Starts the forwarding task and returns the sink feeding it.
    #[must_use]
    pub fn spawn(self) -> (ForwardingEventSink, ForwardTask) {
        let (queue, events) = mpsc::unbounded_channel();
        let (close, closed) = oneshot::channel();
        let counters = Arc::new(ForwardCounters::default());
        let handle = tokio::spawn(self.run(events, closed, Arc::clone(&counters)));
        (
            ForwardingEventSink {
                queue,
            },
            ForwardTask {
                close,
                handle,
                counters,
            },
        )
    }

    /// Posts queued events until the queue is closed and empty.
    async fn run(
        self,
        mut events: mpsc::UnboundedReceiver<CapturedEvent>,
        mut closed: oneshot::Receiver<()>,
        counters: Arc<ForwardCounters>,
    ) {
        let mut closing = false;
        loop {
            let next = if closing {
                events.recv().await
            } else {
                tokio::select! {
                    next = events.recv() => next,
                    _ = &mut closed => {
                        events.close();
                        closing = true;
                        continue;
                    }
                }
            };
            let Some(event) = next else {
                break;
            };
            match self.post(&event).await {
                Ok(()) => {
                    counters.sent.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(event_id = %event.event_id, "event forwarded");
                }
                Err(err) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(event_id = %event.event_id, error = %err, "event not forwarded");
                }
            }
        }
    }

    /// Posts one event.
    async fn post(&self, event: &CapturedEvent) -> Result<(), ForwardError> {
        let payload = serde_json::to_vec(&StorePayload::from_event(event))
            .map_err(|err| ForwardError::Serialize(err.to_string()))?;
        let response = self
            .client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .body(payload)
            .send()
            .await
            .map_err(|err| ForwardError::Transport(err.to_string()))?;
        let status = response.status();
        if status.is_success() { Ok(()) } else { Err(ForwardError::Status(status.as_u16())) }
    }
}

/// Running forwarding task.
#[derive(Debug)]
pub struct ForwardTask {
    /// Close signal.
    close: oneshot::Sender<()>,
    /// Task handle.
    handle: JoinHandle<()>,
    /// Delivery counts.
    counters: Arc<ForwardCounters>,
}

impl ForwardTask {
    /// Closes the queue and waits up to `limit` for queued events to be posted.
    ///
    /// Events still queued after `limit` are abandoned and not counted.
    pub async fn finish(self, limit: Duration) -> ForwardStats {
        let Self {
            close,
            mut handle,
            counters,
        } = self;
        let _ = close.send(());
        match tokio::time::timeout(limit, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(error = %err, "forwarding task failed"),
            Err(_) => {
                handle.abort();
                tracing::warn!(limit_ms = limit.as_millis(), "forwarding abandoned queued events");
            }
        }
        let stats = counters.snapshot();
        tracing::info!(sent = stats.sent, failed = stats.failed, "event forwarding finished");
        stats
    }
}

// ============================================================================
// SECTION: Store Payload
// ============================================================================

/// Event body in the store endpoint's format.
#[derive(Debug, Serialize)]
struct StorePayload<'a> {
    /// 32 hex digit event id.
    event_id: String,
    /// Capture time in seconds since epoch.
    timestamp: f64,
    /// Platform label.
    platform: &'static str,
    /// Logger label.
    logger: &'static str,
    /// Severity.
    level: &'a str,
    /// Environment tag.
    environment: &'a str,
    /// Fault message.
    message: &'a str,
    /// Context tags.
    tags: &'a BTreeMap<String, String>,
    /// Context breadcrumbs.
    breadcrumbs: StoreBreadcrumbs<'a>,
    /// Failing request.
    request: StoreRequest<'a>,
    /// Local identifiers.
    extra: StoreExtra<'a>,
}

/// Breadcrumb list wrapper.
#[derive(Debug, Serialize)]
struct StoreBreadcrumbs<'a> {
    /// Breadcrumbs in order.
    values: Vec<StoreBreadcrumb<'a>>,
}

/// One breadcrumb.
#[derive(Debug, Serialize)]
struct StoreBreadcrumb<'a> {
    /// Record time in seconds since epoch.
    timestamp: f64,
    /// Source.
    category: BreadcrumbCategory,
    /// Text.
    message: &'a str,
}

/// Request section.
#[derive(Debug, Serialize)]
struct StoreRequest<'a> {
    /// HTTP method.
    method: &'a str,
    /// Request path.
    url: &'a str,
}

/// Identifiers of the local log entry.
#[derive(Debug, Serialize)]
struct StoreExtra<'a> {
    /// Local event id.
    local_event_id: &'a str,
    /// Server request id.
    request_id: &'a str,
    /// Run mode.
    mode: IsolationMode,
}

impl<'a> StorePayload<'a> {
    /// Maps a captured event onto the store format.
    fn from_event(event: &'a CapturedEvent) -> Self {
        Self {
            event_id: random_event_id(),
            timestamp: seconds(event.timestamp_ms),
            platform: "other",
            logger: "context-probe",
            level: &event.level,
            environment: &event.environment,
            message: &event.message,
            tags: &event.tags,
            breadcrumbs: StoreBreadcrumbs {
                values: event
                    .breadcrumbs
                    .iter()
                    .map(|crumb| StoreBreadcrumb {
                        timestamp: seconds(crumb.timestamp_ms),
                        category: crumb.category,
                        message: &crumb.message,
                    })
                    .collect(),
            },
            request: StoreRequest {
                method: &event.method,
                url: &event.path,
            },
            extra: StoreExtra {
                local_event_id: &event.event_id,
                request_id: &event.request_id,
                mode: event.mode,
            },
        }
    }
}

/// Returns a random 32 hex digit id.
fn random_event_id() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    format!("{:032x}", u128::from_be_bytes(bytes))
}

/// Converts epoch milliseconds to fractional seconds.
fn seconds(timestamp_ms: u128) -> f64 {
    Duration::from_millis(u64::try_from(timestamp_ms).unwrap_or(u64::MAX)).as_secs_f64()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
