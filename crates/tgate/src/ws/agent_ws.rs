// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent WebSocket handler (C4).
//!
//! An agent's very first frame must be `agent:register`; anything else, or
//! silence for [`HANDSHAKE_TIMEOUT`], closes the socket with code 1008
//! (policy violation). Once registered, the socket is a plain duplex: reads
//! dispatch into [`crate::agent::AgentRegistry`] and [`crate::router`],
//! writes are whatever the registry queues via the agent's
//! [`crate::agent::registry::AgentHandle`] — including a forced close when a
//! same-id reconnection displaces this socket.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::agent::registry::AgentHandle;
use crate::auth::validate_agent_secret;
use crate::location::{ConnectionType, CreateParams, LocationPatch, LocationStatus};
use crate::protocol::agent_msg::{tmux_target, AgentMessage, GatewayMessage};
use crate::router::{self, GatewayState};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

fn epoch_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// `GET /ws/agent` — WebSocket upgrade for a reverse-tunnel agent.
pub async fn agent_ws_handler(
    State(state): State<Arc<GatewayState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn policy_violation(reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code: close_code::POLICY,
        reason: reason.to_owned().into(),
    }))
}

/// Send `gateway:error{error}` followed by a 1008 close, per spec §4.4's
/// registration-failure contract. Best-effort: a send failure here just
/// means the peer is already gone.
async fn reject_registration(socket: &mut WebSocket, error: &str) {
    let frame = GatewayMessage::Error { error: error.to_owned() };
    if let Ok(text) = serde_json::to_string(&frame) {
        let _ = socket.send(Message::Text(text.into())).await;
    }
    let _ = socket.send(policy_violation(error)).await;
}

async fn handle_socket(mut socket: WebSocket, state: Arc<GatewayState>) {
    let register = match tokio::time::timeout(HANDSHAKE_TIMEOUT, socket.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => serde_json::from_str::<AgentMessage>(&text),
        Ok(Some(Ok(Message::Close(_)))) | Ok(None) => return,
        Ok(Some(Ok(_))) => {
            let _ = socket.send(policy_violation("first frame must be agent:register")).await;
            return;
        }
        Ok(Some(Err(e))) => {
            debug!(err = %e, "agent socket error awaiting registration");
            return;
        }
        Err(_) => {
            let _ = socket.send(policy_violation("registration timed out")).await;
            return;
        }
    };

    let (agent_id, hostname) = match register {
        Ok(AgentMessage::Register { agent_id, agent_secret, hostname, .. }) => {
            if !validate_agent_secret(&agent_id, &agent_secret) {
                reject_registration(&mut socket, "Invalid agent credentials").await;
                return;
            }
            (agent_id, hostname)
        }
        Ok(_) => {
            let _ = socket.send(policy_violation("first frame must be agent:register")).await;
            return;
        }
        Err(e) => {
            let _ = socket.send(policy_violation("malformed agent:register frame")).await;
            debug!(err = %e, "failed to parse agent:register");
            return;
        }
    };

    let (handle, mut gateway_rx, cancel) = AgentHandle::new();
    state.agents.register_agent(&agent_id, handle).await;
    info!(agent_id, hostname = hostname.as_deref().unwrap_or("unknown"), "agent registered");

    let welcome = GatewayMessage::Registered {
        agent_id: agent_id.clone(),
        message: "registered".to_owned(),
    };
    if let Ok(text) = serde_json::to_string(&welcome) {
        if socket.send(Message::Text(text.into())).await.is_err() {
            state.agents.unregister_agent(&agent_id, false).await;
            return;
        }
    }

    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut displaced = false;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                displaced = true;
                break;
            }

            outbound = gateway_rx.recv() => {
                match outbound {
                    Some(text) => {
                        if ws_tx.send(Message::Text(text.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_message(&state, &agent_id, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(agent_id, err = %e, "agent socket read error");
                        break;
                    }
                }
            }
        }
    }

    if displaced {
        let _ = ws_tx.send(policy_violation("superseded by a new connection with the same agent id")).await;
    } else {
        state.agents.unregister_agent(&agent_id, false).await;
        info!(agent_id, "agent disconnected");
    }
}

async fn handle_message(state: &Arc<GatewayState>, agent_id: &str, text: &str) {
    let message = match serde_json::from_str::<AgentMessage>(text) {
        Ok(m) => m,
        Err(e) => {
            warn!(agent_id, err = %e, "failed to parse inbound agent frame");
            return;
        }
    };

    match message {
        AgentMessage::Register { .. } => {
            debug!(agent_id, "ignoring duplicate agent:register on an already-registered socket");
        }
        AgentMessage::Heartbeat { agent_id: sender, active_sessions, .. } => {
            state.agents.update_heartbeat(&sender).await;
            state.location.touch_heartbeat(&sender).await;
            debug!(agent_id = %sender, sessions = active_sessions.len(), "heartbeat");
            if let Some(handle) = state.agents.handle_for(&sender).await {
                if let Ok(text) = serde_json::to_string(&GatewayMessage::Pong {}) {
                    handle.send(Arc::from(text.as_str()));
                }
            }
        }
        AgentMessage::SessionStart { session_id, project_id, tmux_session_name, tmux_window_name } => {
            let target = tmux_target(&session_id, tmux_session_name.as_deref(), tmux_window_name.as_deref());
            if let Err(e) = state
                .agents
                .register_session(agent_id, &session_id, target.clone(), Some(project_id.clone()))
                .await
            {
                warn!(agent_id, session_id, err = %e, "failed to register session on agent");
                return;
            }

            match state.location.get(&session_id).await {
                Some(_) => {
                    state
                        .location
                        .update(
                            &session_id,
                            LocationPatch {
                                status: Some(LocationStatus::Active),
                                reverse_agent_id: Some(agent_id.to_owned()),
                                tmux_session_name,
                                tmux_window_name,
                                last_heartbeat_at: Some(epoch_ms()),
                                ..Default::default()
                            },
                        )
                        .await;
                }
                None => {
                    // Previously-unknown session: lazily register it with
                    // the out-of-scope metadata service before upserting
                    // our own location row.
                    state.metadata.ensure_project(&project_id).await;
                    state.metadata.ensure_session(&project_id, &session_id).await;
                    state
                        .location
                        .create(CreateParams {
                            session_id: session_id.clone(),
                            project_id,
                            connection_type: ConnectionType::Reverse,
                            tmux_session_name,
                            tmux_window_name,
                            reverse_agent_id: Some(agent_id.to_owned()),
                            status: Some(LocationStatus::Active),
                            ..Default::default()
                        })
                        .await;
                }
            }
            info!(agent_id, session_id, target, "agent session started");
        }
        AgentMessage::SessionEnd { session_id, reason } => {
            let viewers = state.agents.viewer_handles_for(&session_id).await;
            for viewer in &viewers {
                router::cleanup_session(state, &session_id, viewer.id).await;
            }
            state.agents.unregister_session(agent_id, &session_id).await;
            state
                .location
                .update(&session_id, LocationPatch { status: Some(LocationStatus::Inactive), ..Default::default() })
                .await;
            info!(agent_id, session_id, reason = reason.as_deref().unwrap_or("none"), "agent session ended");
        }
        AgentMessage::SessionOutput { session_id, data } => {
            router::fan_out_output(state, &session_id, &data).await;
        }
        AgentMessage::SessionError { session_id, error, details } => match session_id {
            Some(session_id) => router::fan_out_error(state, &session_id, &error, details).await,
            None => warn!(agent_id, error, "agent-level error with no session_id"),
        },
        AgentMessage::Ack { command_type, session_id, success, message } => {
            debug!(
                agent_id,
                command_type,
                session_id = session_id.as_deref().unwrap_or(""),
                success,
                message = message.as_deref().unwrap_or(""),
                "agent ack"
            );
        }
    }
}
