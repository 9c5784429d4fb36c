//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the gate handlers
//! - Wire up middleware (tracing, body limit, request ID)
//! - Assemble the action registry (upstreams + built-ins)
//! - Serve until shutdown

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::gate::{register_builtin_actions, ActionRegistry, Gate};
use crate::http::handlers;
use crate::http::upstream::register_upstream_actions;
use crate::lifecycle::Shutdown;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<Gate>,
    pub actions: Arc<ActionRegistry>,
}

impl AppState {
    /// Upstream actions for every configured `upstream`, plus the audit query.
    pub fn new(gate: Arc<Gate>, client: &reqwest::Client) -> Self {
        let mut actions = ActionRegistry::new();
        register_upstream_actions(gate.registry(), &mut actions, client);
        register_builtin_actions(&mut actions, gate.audit().clone());

        for name in gate.registry().names() {
            if !actions.contains(name) {
                tracing::warn!(operation = name, "Operation has no action; allowed requests will fail");
            }
        }

        Self {
            gate,
            actions: Arc::new(actions),
        }
    }

    pub fn with_actions(gate: Arc<Gate>, actions: ActionRegistry) -> Self {
        Self {
            gate,
            actions: Arc::new(actions),
        }
    }
}

/// HTTP server for the gate.
pub struct GateServer {
    router: Router,
}

impl GateServer {
    pub fn new(state: AppState, max_body_bytes: usize) -> Self {
        Self {
            router: build_router(state, max_body_bytes),
        }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown.wait())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/ops/{operation}", post(handlers::invoke))
        .route("/audit", get(handlers::audit))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}
