// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway router (C6): the top-level coordinator.
//!
//! Owns the active-session table, couples a viewer to either a direct
//! transport (via [`crate::transport::ConnectionManager`]) or a reverse
//! tunnel (via [`crate::agent::AgentRegistry`] + the agent protocol
//! handler), pumps bytes and events between them, and runs the janitor that
//! reaps stale agents. A background task subscribed to agent registry
//! events is the only place that turns an agent disconnect into viewer-
//! facing cleanup — this is what lets C2 stay ignorant of sockets.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::agent::registry::AgentEvent;
use crate::agent::AgentRegistry;
use crate::config::GatewayConfig;
use crate::location::{ConnectionType, LocationPatch, LocationRegistry, LocationStatus};
use crate::metadata::MetadataRegistry;
use crate::protocol::agent_msg::GatewayMessage;
use crate::protocol::viewer_msg::ServerMessage;
use crate::transport::{ConnectionManager, TerminalHandle, TransportEvent};
use crate::viewer::{ViewerHandle, ViewerId};

fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// `data` is forwarded byte-for-byte; a transport that emits non-UTF-8 bytes
/// gets a lossy conversion rather than a hard failure, since the wire
/// protocol's `data` field is a JSON string.
fn bytes_to_data(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn send_frame(viewer: &ViewerHandle, msg: &ServerMessage) {
    match serde_json::to_string(msg) {
        Ok(text) => {
            if !viewer.try_send(Arc::from(text.as_str())) {
                warn!(viewer_id = viewer.id, "frame dropped: viewer write backlog exceeded high-water mark, disconnecting");
            }
        }
        Err(e) => warn!(err = %e, "failed to serialize outbound viewer frame"),
    }
}

enum ActiveKind {
    Direct(TerminalHandle),
    Reverse { agent_id: String },
}

/// Viewer-lifetime record of one connected terminal session.
pub struct ActiveSession {
    pub session_id: String,
    pub project_id: String,
    pub viewer: ViewerHandle,
    pub connection_type: ConnectionType,
    pub created_at: u64,
    pub last_activity: AtomicU64,
    kind: ActiveKind,
}

impl ActiveSession {
    fn touch(&self) {
        self.last_activity.store(epoch_ms(), Ordering::Relaxed);
    }
}

/// Snapshot of one active session, for the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveSessionInfo {
    pub session_id: String,
    pub project_id: String,
    pub connection_type: ConnectionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub created_at: u64,
    pub last_activity: u64,
}

/// Stats snapshot exposed over `/api/v1/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub total_active_sessions: usize,
    pub by_connection_type: HashMap<String, usize>,
    pub sessions: Vec<ActiveSessionInfo>,
}

/// Shared gateway state: the three registries plus the viewer-lifetime
/// active-session table this module owns.
pub struct GatewayState {
    pub location: LocationRegistry,
    pub agents: AgentRegistry,
    pub connections: ConnectionManager,
    pub metadata: Box<dyn MetadataRegistry>,
    pub config: GatewayConfig,
    /// session_id -> viewer_id -> entry. A reverse session may carry many
    /// viewers; a direct session holds exactly one transport per viewer.
    active: RwLock<HashMap<String, HashMap<ViewerId, Arc<ActiveSession>>>>,
    /// viewer_id -> set of session_ids, for O(1) cleanup when a viewer
    /// socket closes.
    viewer_index: RwLock<HashMap<ViewerId, std::collections::HashSet<String>>>,
}

impl GatewayState {
    pub fn new(
        location: LocationRegistry,
        agents: AgentRegistry,
        metadata: Box<dyn MetadataRegistry>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            location,
            agents,
            connections: ConnectionManager::new(),
            metadata,
            config,
            active: RwLock::new(HashMap::new()),
            viewer_index: RwLock::new(HashMap::new()),
        }
    }

    async fn insert_active(&self, entry: Arc<ActiveSession>) {
        let viewer_id = entry.viewer.id;
        let session_id = entry.session_id.clone();
        self.active
            .write()
            .await
            .entry(session_id.clone())
            .or_default()
            .insert(viewer_id, entry);
        self.viewer_index.write().await.entry(viewer_id).or_default().insert(session_id);
    }

    async fn take_active(&self, session_id: &str, viewer_id: ViewerId) -> Option<Arc<ActiveSession>> {
        let mut active = self.active.write().await;
        let entry = active.get_mut(session_id).and_then(|m| m.remove(&viewer_id));
        if active.get(session_id).is_some_and(|m| m.is_empty()) {
            active.remove(session_id);
        }
        drop(active);
        if let Some(sessions) = self.viewer_index.write().await.get_mut(&viewer_id) {
            sessions.remove(session_id);
        }
        entry
    }

    async fn sessions_for_viewer(&self, viewer_id: ViewerId) -> Vec<String> {
        self.viewer_index.write().await.remove(&viewer_id).map(|s| s.into_iter().collect()).unwrap_or_default()
    }

    async fn sessions_owned_by_agent(&self, agent_id: &str) -> Vec<(String, ViewerId)> {
        let active = self.active.read().await;
        active
            .iter()
            .flat_map(|(session_id, viewers)| {
                viewers.iter().filter_map(move |(viewer_id, entry)| match &entry.kind {
                    ActiveKind::Reverse { agent_id: owner } if owner == agent_id => {
                        Some((session_id.clone(), *viewer_id))
                    }
                    _ => None,
                })
            })
            .collect()
    }

    /// Stats snapshot: total active sessions, counts by connection type,
    /// and a flat per-session listing.
    pub async fn stats(&self) -> StatsSnapshot {
        let active = self.active.read().await;
        let mut by_connection_type = HashMap::new();
        let mut sessions = Vec::new();
        for viewers in active.values() {
            for entry in viewers.values() {
                let key = match entry.connection_type {
                    ConnectionType::Local => "local",
                    ConnectionType::Ssh => "ssh",
                    ConnectionType::Docker => "docker",
                    ConnectionType::Reverse => "reverse",
                };
                *by_connection_type.entry(key.to_owned()).or_insert(0usize) += 1;
                let agent_id = match &entry.kind {
                    ActiveKind::Reverse { agent_id } => Some(agent_id.clone()),
                    ActiveKind::Direct(_) => None,
                };
                sessions.push(ActiveSessionInfo {
                    session_id: entry.session_id.clone(),
                    project_id: entry.project_id.clone(),
                    connection_type: entry.connection_type,
                    agent_id,
                    created_at: entry.created_at,
                    last_activity: entry.last_activity.load(Ordering::Relaxed),
                });
            }
        }
        StatsSnapshot { total_active_sessions: sessions.len(), by_connection_type, sessions }
    }
}

/// Handle a viewer's `terminal:connect`. Sends `terminal:connected`/
/// `terminal:error` frames to `viewer` directly; does not return a value
/// since the viewer socket is the only observer of the outcome.
pub async fn connect_viewer(
    state: &Arc<GatewayState>,
    viewer: ViewerHandle,
    session_id: &str,
    project_id: &str,
    cols: u16,
    rows: u16,
) {
    let Some(location) = state.location.get(session_id).await else {
        send_frame(&viewer, &ServerMessage::error(session_id, "Session location not found"));
        return;
    };

    match location.connection_type {
        ConnectionType::Reverse => {
            connect_reverse(state, viewer, &location, project_id, cols, rows).await;
        }
        ConnectionType::Local | ConnectionType::Ssh | ConnectionType::Docker => {
            connect_direct(state, viewer, &location, project_id, cols, rows).await;
        }
    }
}

async fn connect_reverse(
    state: &Arc<GatewayState>,
    viewer: ViewerHandle,
    location: &crate::location::SessionLocation,
    project_id: &str,
    cols: u16,
    rows: u16,
) {
    let session_id = location.session_id.clone();
    let Some(agent_id) = location.reverse_agent_id.clone() else {
        send_frame(&viewer, &ServerMessage::error(&session_id, "Session has no owning agent"));
        return;
    };

    if !state.agents.is_online(&agent_id).await {
        send_frame(&viewer, &ServerMessage::error(&session_id, "Agent is not currently online"));
        return;
    }

    if !state.agents.attach_viewer(&session_id, viewer.clone()).await {
        send_frame(&viewer, &ServerMessage::error(&session_id, "Session is no longer hosted"));
        return;
    }

    let Some(handle) = state.agents.handle_for(&agent_id).await else {
        state.agents.detach_viewer(&session_id, viewer.id).await;
        send_frame(&viewer, &ServerMessage::error(&session_id, "Agent is not currently online"));
        return;
    };

    let entry = Arc::new(ActiveSession {
        session_id: session_id.clone(),
        project_id: project_id.to_owned(),
        viewer: viewer.clone(),
        connection_type: ConnectionType::Reverse,
        created_at: epoch_ms(),
        last_activity: AtomicU64::new(epoch_ms()),
        kind: ActiveKind::Reverse { agent_id: agent_id.clone() },
    });
    state.insert_active(entry).await;

    let command = GatewayMessage::CommandConnect {
        session_id: session_id.clone(),
        cols: Some(cols),
        rows: Some(rows),
    };
    if let Ok(text) = serde_json::to_string(&command) {
        handle.send(Arc::from(text.as_str()));
    }

    state
        .location
        .update(
            &session_id,
            LocationPatch { status: Some(LocationStatus::Active), last_verified_at: Some(epoch_ms()), ..Default::default() },
        )
        .await;

    send_frame(&viewer, &ServerMessage::connected(&session_id, "reverse", Some(agent_id)));
}

async fn connect_direct(
    state: &Arc<GatewayState>,
    viewer: ViewerHandle,
    location: &crate::location::SessionLocation,
    project_id: &str,
    cols: u16,
    rows: u16,
) {
    let session_id = location.session_id.clone();
    let connection_type = location.connection_type;

    let (handle, mut events) = match state.connections.connect(location, cols, rows).await {
        Ok(pair) => pair,
        Err(e) => {
            send_frame(&viewer, &ServerMessage::error(&session_id, e.message));
            return;
        }
    };

    let entry = Arc::new(ActiveSession {
        session_id: session_id.clone(),
        project_id: project_id.to_owned(),
        viewer: viewer.clone(),
        connection_type,
        created_at: epoch_ms(),
        last_activity: AtomicU64::new(epoch_ms()),
        kind: ActiveKind::Direct(handle),
    });
    state.insert_active(entry).await;

    let connection_type_str = match connection_type {
        ConnectionType::Local => "local",
        ConnectionType::Ssh => "ssh",
        ConnectionType::Docker => "docker",
        ConnectionType::Reverse => "reverse",
    };

    state
        .location
        .update(
            &session_id,
            LocationPatch { status: Some(LocationStatus::Active), last_verified_at: Some(epoch_ms()), ..Default::default() },
        )
        .await;

    send_frame(&viewer, &ServerMessage::connected(&session_id, connection_type_str, None));

    let pump_state = Arc::clone(state);
    let pump_session_id = session_id.clone();
    let pump_viewer = viewer.clone();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Data(bytes) => {
                    send_frame(
                        &pump_viewer,
                        &ServerMessage::output(&pump_session_id, bytes_to_data(&bytes)),
                    );
                    if let Some(entry) = active_entry(&pump_state, &pump_session_id, pump_viewer.id).await {
                        entry.touch();
                    }
                }
                TransportEvent::Error(message) => {
                    send_frame(&pump_viewer, &ServerMessage::error(&pump_session_id, message));
                }
                TransportEvent::Closed => {
                    send_frame(&pump_viewer, &ServerMessage::disconnected(&pump_session_id));
                    cleanup_session(&pump_state, &pump_session_id, pump_viewer.id).await;
                    break;
                }
            }
        }
    });
}

async fn active_entry(
    state: &Arc<GatewayState>,
    session_id: &str,
    viewer_id: ViewerId,
) -> Option<Arc<ActiveSession>> {
    state.active.read().await.get(session_id).and_then(|m| m.get(&viewer_id)).cloned()
}

/// Refresh an ActiveSession's `last_activity` and forward `data` into its
/// transport (direct) or out to the owning agent as `agent:command:input`
/// (reverse).
pub async fn viewer_input(state: &Arc<GatewayState>, session_id: &str, viewer_id: ViewerId, data: &str) {
    let Some(entry) = active_entry(state, session_id, viewer_id).await else {
        debug!(session_id, "input for unknown ActiveSession, dropping");
        return;
    };
    entry.touch();
    match &entry.kind {
        ActiveKind::Direct(handle) => handle.write(data.as_bytes().to_vec()),
        ActiveKind::Reverse { agent_id } => {
            if let Some(agent_handle) = state.agents.handle_for(agent_id).await {
                let command =
                    GatewayMessage::CommandInput { session_id: session_id.to_owned(), data: data.to_owned() };
                if let Ok(text) = serde_json::to_string(&command) {
                    agent_handle.send(Arc::from(text.as_str()));
                }
            }
        }
    }
}

/// Forward a viewer's `terminal:resize`.
pub async fn viewer_resize(state: &Arc<GatewayState>, session_id: &str, viewer_id: ViewerId, cols: u16, rows: u16) {
    let Some(entry) = active_entry(state, session_id, viewer_id).await else { return };
    entry.touch();
    match &entry.kind {
        ActiveKind::Direct(handle) => handle.resize(cols, rows),
        ActiveKind::Reverse { agent_id } => {
            if let Some(agent_handle) = state.agents.handle_for(agent_id).await {
                let command = GatewayMessage::CommandResize { session_id: session_id.to_owned(), cols, rows };
                if let Ok(text) = serde_json::to_string(&command) {
                    agent_handle.send(Arc::from(text.as_str()));
                }
            }
        }
    }
}

/// Idempotent teardown of one ActiveSession: detaches from the owning
/// agent or closes the direct transport, removes the entry, and patches
/// the location row to `inactive`. Storage failures are logged but never
/// block the in-memory teardown from completing.
pub async fn cleanup_session(state: &Arc<GatewayState>, session_id: &str, viewer_id: ViewerId) {
    let Some(entry) = state.take_active(session_id, viewer_id).await else { return };

    match &entry.kind {
        ActiveKind::Reverse { agent_id } => {
            state.agents.detach_viewer(session_id, viewer_id).await;
            if let Some(handle) = state.agents.handle_for(agent_id).await {
                let command = GatewayMessage::CommandDisconnect { session_id: session_id.to_owned() };
                if let Ok(text) = serde_json::to_string(&command) {
                    handle.send(Arc::from(text.as_str()));
                }
            }
        }
        ActiveKind::Direct(handle) => handle.close(),
    }

    state
        .location
        .update(session_id, LocationPatch { status: Some(LocationStatus::Inactive), ..Default::default() })
        .await;
}

/// Explicit `terminal:disconnect` from a viewer, or the viewer socket
/// closing: tear down every session that viewer held.
pub async fn disconnect_viewer(state: &Arc<GatewayState>, viewer_id: ViewerId) {
    for session_id in state.sessions_for_viewer(viewer_id).await {
        cleanup_session(state, &session_id, viewer_id).await;
    }
}

/// Send `agent:session:output` fan-out to every viewer attached to
/// `session_id`. Unknown sessions are dropped with a warning; per-viewer
/// backpressure drops are handled inside `send_frame`.
pub async fn fan_out_output(state: &Arc<GatewayState>, session_id: &str, data: &str) {
    let viewers = state.agents.viewer_handles_for(session_id).await;
    if viewers.is_empty() {
        warn!(session_id, "agent:session:output for session with no attached viewers");
        return;
    }
    let frame = ServerMessage::output(session_id, data);
    for viewer in viewers {
        send_frame(&viewer, &frame);
        if let Some(entry) = active_entry(state, session_id, viewer.id).await {
            entry.touch();
        }
    }
}

/// Forward `agent:session:error` to every viewer attached to `session_id`,
/// if any.
pub async fn fan_out_error(state: &Arc<GatewayState>, session_id: &str, error: &str, details: Option<String>) {
    let viewers = state.agents.viewer_handles_for(session_id).await;
    let frame = ServerMessage::error_with_details(session_id, error, details);
    for viewer in viewers {
        send_frame(&viewer, &frame);
    }
}

/// Background task: reacts to [`AgentEvent`]s without the registry ever
/// calling into this module directly.
pub async fn run_event_loop(state: Arc<GatewayState>, shutdown: CancellationToken) {
    let mut events = state.agents.subscribe();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            event = events.recv() => {
                match event {
                    Ok(AgentEvent::Disconnected { agent_id, timed_out }) => {
                        let message = if timed_out { "Agent timed out" } else { "Agent disconnected" };
                        for (session_id, viewer_id) in state.sessions_owned_by_agent(&agent_id).await {
                            if let Some(entry) = active_entry(&state, &session_id, viewer_id).await {
                                send_frame(&entry.viewer, &ServerMessage::error(&session_id, message));
                            }
                            cleanup_session(&state, &session_id, viewer_id).await;
                        }
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "router event loop lagged behind agent registry events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                }
            }
        }
    }
}

/// Periodic task: reaps agents that stopped heartbeating and patches
/// orphaned reverse locations to `inactive`.
pub async fn run_janitor(state: Arc<GatewayState>, shutdown: CancellationToken) {
    let interval = state.config.janitor_interval();
    let timeout_ms = state.config.heartbeat_timeout_ms;
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }

        // Nudge every connected agent with a liveness ping each sweep, ahead
        // of the heartbeat-timeout reap below; a healthy agent's own
        // heartbeat is still what keeps it alive, this is just an extra
        // liveness signal exercising the same command channel.
        if let Ok(text) = serde_json::to_string(&GatewayMessage::CommandPing {}) {
            let frame: Arc<str> = Arc::from(text.as_str());
            for handle in state.agents.all_handles().await {
                handle.send(Arc::clone(&frame));
            }
        }

        // Agent reaping triggers AgentEvent::Disconnected{timed_out:true},
        // which run_event_loop turns into viewer-facing cleanup.
        let reaped = state.agents.cleanup(timeout_ms).await;
        if !reaped.is_empty() {
            debug!(count = reaped.len(), "janitor reaped timed-out agents");
        }

        let cutoff = epoch_ms().saturating_sub(timeout_ms);
        let stale = state.location.list_stale_reverse_active(cutoff).await;
        for row in stale {
            let _ = state
                .location
                .update(&row.session_id, LocationPatch { status: Some(LocationStatus::Inactive), ..Default::default() })
                .await;
        }
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
