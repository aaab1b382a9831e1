// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ambient HTTP surface: liveness and a stats snapshot. Everything else is
//! WebSocket (see [`crate::ws`]).

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::router::GatewayState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_agents: usize,
    pub active_sessions: usize,
}

/// `GET /healthz`
pub async fn health(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let agents = state.agents.list().await;
    let stats = state.stats().await;
    Json(HealthResponse {
        status: "ok",
        active_agents: agents.len(),
        active_sessions: stats.total_active_sessions,
    })
}

/// `GET /api/v1/stats`
pub async fn stats(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(state.stats().await)
}

/// `GET /api/v1/agents`
pub async fn list_agents(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(state.agents.list().await)
}
