// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Viewer WebSocket handler (C5).
//!
//! No handshake gate: a viewer socket is useful the instant it is open,
//! since every `terminal:connect` carries its own `session_id`/`project_id`
//! and is resolved independently by [`crate::router`]. Connect requests are
//! dispatched onto their own task so a slow transport dial never blocks this
//! socket's read loop from servicing other sessions the same viewer holds.
//! A per-connection `known_sessions` set enforces that `terminal:input`/
//! `terminal:resize`/`terminal:disconnect` only ever reference a session_id
//! this socket itself established via `terminal:connect`.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, warn};

use crate::protocol::viewer_msg::{ServerMessage, ViewerMessage};
use crate::router::{self, GatewayState};
use crate::viewer::ViewerHandle;

/// `GET /ws/viewer` — WebSocket upgrade for a dashboard/browser viewer.
pub async fn viewer_ws_handler(
    State(state): State<Arc<GatewayState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<GatewayState>) {
    let (viewer, mut write_rx) = ViewerHandle::new(state.config.viewer_write_hwm_bytes);
    let viewer_id = viewer.id;
    let cancel = viewer.cancellation();
    let mut known_sessions: HashSet<String> = HashSet::new();
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                warn!(viewer_id, "dropping viewer: write backlog exceeded high-water mark");
                break;
            }

            frame = write_rx.recv() => {
                match frame {
                    Some(frame) => {
                        let len = frame.text.len();
                        let sent = ws_tx.send(Message::Text(frame.text.to_string().into())).await.is_ok();
                        viewer.release(len);
                        if !sent {
                            break;
                        }
                    }
                    None => break,
                }
            }

            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_message(&state, &viewer, &mut known_sessions, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(viewer_id, err = %e, "viewer socket read error");
                        break;
                    }
                }
            }
        }
    }

    router::disconnect_viewer(&state, viewer_id).await;
}

async fn handle_message(
    state: &Arc<GatewayState>,
    viewer: &ViewerHandle,
    known_sessions: &mut HashSet<String>,
    text: &str,
) {
    let message = match serde_json::from_str::<ViewerMessage>(text) {
        Ok(m) => m,
        Err(e) => {
            warn!(viewer_id = viewer.id, err = %e, "failed to parse inbound viewer frame");
            return;
        }
    };

    match message {
        ViewerMessage::TerminalConnect { session_id, project_id, cols, rows } => {
            known_sessions.insert(session_id.clone());
            let state = Arc::clone(state);
            let viewer = viewer.clone();
            tokio::spawn(async move {
                router::connect_viewer(&state, viewer, &session_id, &project_id, cols, rows).await;
            });
        }
        ViewerMessage::TerminalInput { session_id, data } => {
            if !known_sessions.contains(&session_id) {
                reject_unknown_session(viewer, &session_id);
                return;
            }
            router::viewer_input(state, &session_id, viewer.id, &data).await;
        }
        ViewerMessage::TerminalResize { session_id, cols, rows } => {
            if !known_sessions.contains(&session_id) {
                reject_unknown_session(viewer, &session_id);
                return;
            }
            router::viewer_resize(state, &session_id, viewer.id, cols, rows).await;
        }
        ViewerMessage::TerminalDisconnect { session_id } => {
            if !known_sessions.remove(&session_id) {
                reject_unknown_session(viewer, &session_id);
                return;
            }
            router::cleanup_session(state, &session_id, viewer.id).await;
        }
    }
}

fn reject_unknown_session(viewer: &ViewerHandle, session_id: &str) {
    let frame = ServerMessage::error(session_id, "Unknown session for this connection");
    if let Ok(text) = serde_json::to_string(&frame) {
        let _ = viewer.try_send(Arc::from(text.as_str()));
    }
}
