// crates/context-probe-server/src/server.rs
// ============================================================================
// Module: Probe Server
// Description: axum router, request instrumentation, and fault capture.
// Purpose: Serve the fault routes and record one event per failed request.
// Dependencies: axum, context-probe-core, serde, tokio, tracing
// ============================================================================

//! ## Overview
//! Each fault route is wrapped by the same instrumentation:
//! 1. read the optional `x-correlation-id` label (an unusable label is
//!    dropped with a warning; the route still runs);
//! 2. issue a server request id;
//! 3. enter the mode's isolation strategy and run the route body with the
//!    issued handle;
//! 4. build a [`CapturedEvent`] from the context snapshot taken at fault
//!    time and hand it to the [`EventSink`];
//! 5. reply with a generic 500 carrying `x-server-correlation-id`.
//!
//! The `sync` and `async` groups share a single context instance. The
//! `async-context` group gets a fresh instance per request.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use context_probe_core::CapturedEvent;
use context_probe_core::ClientLabel;
use context_probe_core::EventSink;
use context_probe_core::FaultPlan;
use context_probe_core::IdSequence;
use context_probe_core::IsolationMode;
use context_probe_core::IsolationStrategy;
use context_probe_core::RequestEntry;
use context_probe_core::RequestPhase;
use context_probe_core::RouteName;
use context_probe_core::ScopedContextStrategy;
use context_probe_core::SharedContextStrategy;
use context_probe_core::correlation::CLIENT_CORRELATION_HEADER;
use context_probe_core::correlation::SERVER_CORRELATION_HEADER;
use context_probe_core::event::CapturedEventParams;
use context_probe_core::isolation::within;
use serde::Serialize;
use tokio::net::TcpListener;

use crate::routes::run_fault_route;

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Values every handler group needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSettings {
    /// Value of the `environment` tag.
    pub environment: String,
    /// Handler timing.
    pub plan: FaultPlan,
}

// ============================================================================
// SECTION: Probe Server
// ============================================================================

/// Probe server bound to a listening socket.
pub struct ProbeServer {
    /// Bound listener.
    listener: TcpListener,
    /// Address actually bound.
    local_addr: SocketAddr,
    /// Route table with state attached.
    router: Router,
}

impl ProbeServer {
    /// Binds `addr` and prepares the route table.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeServerError::Bind`] when the socket cannot be bound.
    pub async fn bind(
        addr: SocketAddr,
        settings: ProbeSettings,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, ProbeServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|err| ProbeServerError::Bind(format!("{addr}: {err}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|err| ProbeServerError::Bind(format!("{addr}: {err}")))?;
        let state = Arc::new(ServerState::new(settings, sink));
        Ok(Self {
            listener,
            local_addr,
            router: build_router(state),
        })
    }

    /// Returns the bound address.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves until `shutdown` completes, then drains open connections.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeServerError::Transport`] when the server fails.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<(), ProbeServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!(addr = %self.local_addr, "probe server listening");
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|err| ProbeServerError::Transport(err.to_string()))?;
        tracing::info!(addr = %self.local_addr, "probe server stopped");
        Ok(())
    }
}

/// Builds the route table: two fault routes per mode plus a 404 fallback.
fn build_router(state: Arc<ServerState>) -> Router {
    let mut router = Router::new();
    for mode in IsolationMode::ALL {
        for route in RouteName::ALL {
            router = router.route(
                &mode.route_path(route),
                get(move |State(state): State<Arc<ServerState>>, headers: HeaderMap| async move {
                    handle_fault(state, mode, route, &headers).await
                }),
            );
        }
    }
    router.fallback(not_found).with_state(state)
}

// ============================================================================
// SECTION: Server State
// ============================================================================

/// State shared by every handler.
struct ServerState {
    /// Single instance used by the `sync` and `async` groups.
    shared: SharedContextStrategy,
    /// Per-request instances for the `async-context` group.
    scoped: ScopedContextStrategy,
    /// Event recorder.
    sink: Arc<dyn EventSink>,
    /// Request id source.
    request_ids: IdSequence,
    /// Event id source.
    event_ids: IdSequence,
    /// Value of the `environment` tag.
    environment: String,
    /// Handler timing.
    plan: FaultPlan,
}

impl ServerState {
    /// Creates state with fresh strategies and id generators.
    fn new(settings: ProbeSettings, sink: Arc<dyn EventSink>) -> Self {
        Self {
            shared: SharedContextStrategy::new(&settings.environment),
            scoped: ScopedContextStrategy::new(&settings.environment),
            sink,
            request_ids: IdSequence::new("req"),
            event_ids: IdSequence::new("evt"),
            environment: settings.environment,
            plan: settings.plan,
        }
    }

    /// Returns the strategy serving `mode`'s handler group.
    fn strategy(&self, mode: IsolationMode) -> &dyn IsolationStrategy {
        if mode.scoped() { &self.scoped } else { &self.shared }
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Instruments one fault route invocation.
async fn handle_fault(
    state: Arc<ServerState>,
    mode: IsolationMode,
    route: RouteName,
    headers: &HeaderMap,
) -> Response {
    let path = mode.route_path(route);
    let request_id = state.request_ids.issue();
    let label = ClientLabel::from_header(
        headers.get(CLIENT_CORRELATION_HEADER).map(|value| value.as_bytes()),
    );
    if label == ClientLabel::Discarded {
        tracing::warn!(
            path = %path,
            request_id = %request_id,
            "ignoring unusable {CLIENT_CORRELATION_HEADER} header"
        );
    }
    let entry = RequestEntry {
        mode,
        path: path.clone(),
        request_id: request_id.clone(),
        client_id: label.into_label(),
    };
    let plan = state.plan;
    let mut outcome = within(state.strategy(mode), &entry, |handle| {
        run_fault_route(mode, handle, path.clone(), plan)
    })
    .await;

    let event = CapturedEvent::new(CapturedEventParams {
        event_id: state.event_ids.issue(),
        request_id: request_id.clone(),
        mode,
        environment: state.environment.clone(),
        path,
        message: outcome.fault.message.clone(),
        context: outcome.context,
    });
    state.sink.record(&event);
    outcome.trace.advance(RequestPhase::Captured);
    tracing::info!(
        event_id = %event.event_id,
        request_id = %event.request_id,
        path = %event.path,
        "captured handler fault"
    );
    internal_error(&request_id)
}

/// Responds to paths outside the route table.
async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(ErrorBody::new(StatusCode::NOT_FOUND, "Not Found".to_string())))
        .into_response()
}

// ============================================================================
// SECTION: Error Bodies
// ============================================================================

/// Error payload in the `{statusCode, error, message}` shape.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    /// Numeric status.
    status_code: u16,
    /// Status reason phrase.
    error: &'static str,
    /// Client-facing message.
    message: String,
}

impl ErrorBody {
    /// Builds a body for `status`.
    fn new(status: StatusCode, message: String) -> Self {
        Self {
            status_code: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Unknown"),
            message,
        }
    }
}

/// Generic 500 carrying the server request id.
fn internal_error(request_id: &str) -> Response {
    let status = StatusCode::INTERNAL_SERVER_ERROR;
    (
        status,
        [(SERVER_CORRELATION_HEADER, request_id.to_string())],
        Json(ErrorBody::new(status, "An internal server error occurred".to_string())),
    )
        .into_response()
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Probe server errors.
#[derive(Debug, thiserror::Error)]
pub enum ProbeServerError {
    /// The listen socket could not be bound.
    #[error("bind error: {0}")]
    Bind(String),
    /// The server failed while running.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================
