// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! tgate: distributed terminal gateway.
//!
//! Bridges browser/dashboard viewers to terminal sessions that may be local
//! to this process, reachable over SSH or Docker exec, or hosted by a
//! reverse-tunnel agent that dialed in from elsewhere. See [`router`] for
//! the coordinator that ties the location registry (C1), agent registry
//! (C2), connection manager (C3), and the two WebSocket transports (C4, C5)
//! together.

pub mod agent;
pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod location;
pub mod metadata;
pub mod protocol;
pub mod router;
pub mod transport;
pub mod viewer;
pub mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::agent::AgentRegistry;
use crate::config::GatewayConfig;
use crate::location::LocationRegistry;
use crate::router::GatewayState;

/// Build the axum `Router` with every gateway route mounted.
pub fn build_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/healthz", get(http::health))
        .route("/api/v1/stats", get(http::stats))
        .route("/api/v1/agents", get(http::list_agents))
        .route("/ws/agent", get(ws::agent_ws::agent_ws_handler))
        .route("/ws/viewer", get(ws::viewer_ws::viewer_ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => tracing::warn!(err = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received");
    shutdown.cancel();
}

/// Run the gateway until shutdown (Ctrl-C or SIGTERM).
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let metadata = metadata::build(config.metadata_base_url.clone());
    let state = Arc::new(GatewayState::new(
        LocationRegistry::new(),
        AgentRegistry::new(),
        metadata,
        config.clone(),
    ));

    tokio::spawn(router::run_janitor(Arc::clone(&state), shutdown.clone()));
    tokio::spawn(router::run_event_loop(Arc::clone(&state), shutdown.clone()));
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr, "tgate listening");
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
