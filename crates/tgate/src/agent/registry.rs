// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent registry.
//!
//! In-memory directory of connected reverse-tunnel agents, the sessions
//! each one hosts, and the viewers currently attached to each session. This
//! is the hottest shared state in the gateway: every reverse byte and every
//! viewer attach/detach touches it, so mutations here never perform I/O and
//! never hold their lock across an `.await` on anything but the lock itself.
//!
//! The registry only ever stores socket *handles*, never a reference back
//! to the router's `ActiveSession` table. State changes are broadcast as
//! [`AgentEvent`]s; the router subscribes and reacts (closing viewers,
//! patching the location store) without the registry ever calling into it
//! directly. This keeps C2 and C6 from holding pointers into each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::error::{ErrorKind, GatewayError};
use crate::viewer::{ViewerHandle, ViewerId};

fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// Send handle to an agent's duplex socket, plus a token the registry can
/// cancel to force the socket's read/write loop to close — used when a
/// reconnecting agent_id displaces an already-registered one.
#[derive(Clone)]
pub struct AgentHandle {
    tx: mpsc::UnboundedSender<Arc<str>>,
    cancel: CancellationToken,
}

impl AgentHandle {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Arc<str>>, CancellationToken) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        (Self { tx, cancel: cancel.clone() }, rx, cancel)
    }

    /// Queue a frame for delivery to the agent. Silently dropped if the
    /// agent's write task has already gone away.
    pub fn send(&self, text: Arc<str>) {
        let _ = self.tx.send(text);
    }

    /// Force this agent's socket loop to terminate.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

/// Per-session bookkeeping an agent reports via `agent:session:start`.
#[derive(Clone)]
pub struct SessionInfo {
    pub tmux_target: String,
    pub project_id: Option<String>,
    pub attached_viewers: HashMap<ViewerId, ViewerHandle>,
}

/// A connected reverse-tunnel agent.
struct ConnectedAgent {
    handle: AgentHandle,
    connected_at: u64,
    last_heartbeat: u64,
    sessions: HashMap<String, SessionInfo>,
}

/// A point-in-time snapshot of a connected agent, for stats/debugging.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectedAgentInfo {
    pub agent_id: String,
    pub connected_at: u64,
    pub last_heartbeat: u64,
    pub session_ids: Vec<String>,
}

/// Emitted on every registry state transition so the router can react
/// without the registry calling back into it.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    Registered { agent_id: String },
    /// `timed_out` distinguishes a janitor reap (viewer message: "Agent
    /// timed out") from an ordinary socket close or reconnect displacement
    /// (viewer message: plain disconnected status).
    Disconnected { agent_id: String, timed_out: bool },
    SessionStarted { agent_id: String, session_id: String },
    SessionEnded { agent_id: String, session_id: String },
}

struct Inner {
    agents: HashMap<String, ConnectedAgent>,
    /// session_id -> agent_id, kept consistent with every agent's `sessions`
    /// map under the same lock acquisition.
    session_index: HashMap<String, String>,
}

/// Directory of connected agents, their hosted sessions, and each session's
/// attached viewers.
pub struct AgentRegistry {
    inner: RwLock<Inner>,
    events: broadcast::Sender<AgentEvent>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        let (events, _rx) = broadcast::channel(1024);
        Self {
            inner: RwLock::new(Inner { agents: HashMap::new(), session_index: HashMap::new() }),
            events,
        }
    }

    /// Subscribe to registry events. Each subscriber gets its own queue;
    /// the router keeps exactly one long-lived subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.subscribe()
    }

    /// Register a new agent connection. If `agent_id` is already
    /// registered, the prior registration is torn down first: its socket is
    /// closed and its sessions are unregistered, exactly as if
    /// `unregister_agent` had been called, before the new handle is
    /// installed.
    pub async fn register_agent(&self, agent_id: &str, handle: AgentHandle) {
        let mut inner = self.inner.write().await;
        if let Some(prior) = inner.agents.remove(agent_id) {
            prior.handle.close();
            for session_id in prior.sessions.keys() {
                inner.session_index.remove(session_id);
            }
            let _ = self.events.send(AgentEvent::Disconnected {
                agent_id: agent_id.to_owned(),
                timed_out: false,
            });
        }

        inner.agents.insert(
            agent_id.to_owned(),
            ConnectedAgent {
                handle,
                connected_at: epoch_ms(),
                last_heartbeat: epoch_ms(),
                sessions: HashMap::new(),
            },
        );
        let _ = self.events.send(AgentEvent::Registered { agent_id: agent_id.to_owned() });
    }

    /// Drop an agent and unregister every session it hosted.
    ///
    /// Idempotent: unregistering an agent that is not present is a no-op.
    pub async fn unregister_agent(&self, agent_id: &str, timed_out: bool) {
        let mut inner = self.inner.write().await;
        let Some(agent) = inner.agents.remove(agent_id) else { return };
        for session_id in agent.sessions.keys() {
            inner.session_index.remove(session_id);
        }
        let _ = self
            .events
            .send(AgentEvent::Disconnected { agent_id: agent_id.to_owned(), timed_out });
    }

    /// Record that an agent now hosts `session_id`, targeting `tmux_target`.
    ///
    /// Fails with [`ErrorKind::NotFound`] if the agent is not currently
    /// registered.
    pub async fn register_session(
        &self,
        agent_id: &str,
        session_id: &str,
        tmux_target: String,
        project_id: Option<String>,
    ) -> Result<(), GatewayError> {
        let mut inner = self.inner.write().await;
        let agent = inner
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| GatewayError::new(ErrorKind::NotFound, "unknown agent"))?;
        agent.sessions.insert(
            session_id.to_owned(),
            SessionInfo { tmux_target, project_id, attached_viewers: HashMap::new() },
        );
        inner.session_index.insert(session_id.to_owned(), agent_id.to_owned());
        drop(inner);
        let _ = self.events.send(AgentEvent::SessionStarted {
            agent_id: agent_id.to_owned(),
            session_id: session_id.to_owned(),
        });
        Ok(())
    }

    /// Remove a session from its owning agent and empty its viewer set.
    ///
    /// Idempotent: unregistering an unknown or already-removed session is a
    /// no-op.
    pub async fn unregister_session(&self, agent_id: &str, session_id: &str) {
        let mut inner = self.inner.write().await;
        let removed = inner
            .agents
            .get_mut(agent_id)
            .and_then(|agent| agent.sessions.remove(session_id))
            .is_some();
        inner.session_index.remove(session_id);
        drop(inner);
        if removed {
            let _ = self.events.send(AgentEvent::SessionEnded {
                agent_id: agent_id.to_owned(),
                session_id: session_id.to_owned(),
            });
        }
    }

    /// Add a viewer to a session's `attached_viewers` set. Returns `false`
    /// if the session is not currently hosted by any agent.
    pub async fn attach_viewer(&self, session_id: &str, viewer: ViewerHandle) -> bool {
        let mut inner = self.inner.write().await;
        let Some(agent_id) = inner.session_index.get(session_id).cloned() else { return false };
        let Some(agent) = inner.agents.get_mut(&agent_id) else { return false };
        let Some(info) = agent.sessions.get_mut(session_id) else { return false };
        info.attached_viewers.insert(viewer.id, viewer);
        true
    }

    /// Remove a viewer from a session's `attached_viewers` set.
    ///
    /// Idempotent.
    pub async fn detach_viewer(&self, session_id: &str, viewer_id: ViewerId) {
        let mut inner = self.inner.write().await;
        if let Some(agent_id) = inner.session_index.get(session_id).cloned() {
            if let Some(agent) = inner.agents.get_mut(&agent_id) {
                if let Some(info) = agent.sessions.get_mut(session_id) {
                    info.attached_viewers.remove(&viewer_id);
                }
            }
        }
    }

    /// Fan out an `agent:session:output` payload to every attached viewer
    /// of `session_id`, via the caller-supplied frame builder. Sessions not
    /// currently known are silently dropped (a warning is the caller's
    /// responsibility since this module has no viewer-facing wire format).
    pub async fn viewer_handles_for(&self, session_id: &str) -> Vec<ViewerHandle> {
        let inner = self.inner.read().await;
        inner
            .session_index
            .get(session_id)
            .and_then(|agent_id| inner.agents.get(agent_id))
            .and_then(|agent| agent.sessions.get(session_id))
            .map(|info| info.attached_viewers.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Refresh an agent's liveness timestamp.
    pub async fn update_heartbeat(&self, agent_id: &str) {
        let mut inner = self.inner.write().await;
        if let Some(agent) = inner.agents.get_mut(agent_id) {
            agent.last_heartbeat = epoch_ms();
        }
    }

    /// Look up the outbound handle for a connected agent.
    pub async fn handle_for(&self, agent_id: &str) -> Option<AgentHandle> {
        self.inner.read().await.agents.get(agent_id).map(|a| a.handle.clone())
    }

    /// Outbound handles for every currently connected agent, for the
    /// janitor's liveness ping sweep.
    pub async fn all_handles(&self) -> Vec<AgentHandle> {
        self.inner.read().await.agents.values().map(|a| a.handle.clone()).collect()
    }

    /// Whether `agent_id` is currently connected.
    pub async fn is_online(&self, agent_id: &str) -> bool {
        self.inner.read().await.agents.contains_key(agent_id)
    }

    /// Which agent (if any) currently hosts `session_id`.
    pub async fn agent_for_session(&self, session_id: &str) -> Option<String> {
        self.inner.read().await.session_index.get(session_id).cloned()
    }

    /// Remove every agent whose last heartbeat is older than
    /// `now - timeout`. Returns the reaped agent ids so the caller (the
    /// router's janitor) can notify their viewers.
    pub async fn cleanup(&self, timeout_ms: u64) -> Vec<String> {
        let now = epoch_ms();
        let cutoff = now.saturating_sub(timeout_ms);

        let expired: Vec<String> = {
            let inner = self.inner.read().await;
            inner
                .agents
                .iter()
                .filter(|(_, a)| a.last_heartbeat < cutoff)
                .map(|(id, _)| id.clone())
                .collect()
        };

        for agent_id in &expired {
            self.unregister_agent(agent_id, true).await;
        }
        expired
    }

    /// Snapshot of every connected agent, for the stats endpoint.
    pub async fn list(&self) -> Vec<ConnectedAgentInfo> {
        let inner = self.inner.read().await;
        inner
            .agents
            .iter()
            .map(|(id, a)| ConnectedAgentInfo {
                agent_id: id.clone(),
                connected_at: a.connected_at,
                last_heartbeat: a.last_heartbeat,
                session_ids: a.sessions.keys().cloned().collect(),
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
