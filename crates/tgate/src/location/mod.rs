// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Location registry.
//!
//! Persists the *where* of each terminal session: which transport kind it
//! uses and the parameters that transport needs. One row per `session_id`.
//! The registry never dials a transport and never knows about live sockets —
//! it is the single source of truth the router consults before doing either.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Which kind of transport owns a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    Local,
    Ssh,
    Docker,
    Reverse,
}

/// Lifecycle status of a `SessionLocation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationStatus {
    Connecting,
    Active,
    Inactive,
    Error,
}

/// A persisted record of where a session lives and how to reach it.
///
/// `connection_type` determines which parameter subset is meaningful:
/// `ssh_host`/`ssh_port`/`ssh_username` for `Ssh`, `docker_container_id` for
/// `Docker`, `tmux_session_name`/`tmux_window_name` for `Local` (and
/// optionally `Reverse`, describing the agent's own tmux target), and
/// `reverse_agent_id`/`reverse_agent_secret` for `Reverse`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionLocation {
    pub session_id: String,
    pub project_id: String,
    pub connection_type: ConnectionType,

    pub ssh_host: Option<String>,
    pub ssh_port: Option<u16>,
    pub ssh_username: Option<String>,

    pub docker_container_id: Option<String>,

    pub tmux_session_name: Option<String>,
    pub tmux_window_name: Option<String>,

    pub reverse_agent_id: Option<String>,
    pub reverse_agent_secret: Option<String>,

    pub status: LocationStatus,

    pub last_heartbeat_at: Option<u64>,
    pub last_verified_at: Option<u64>,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Parameters accepted by [`LocationRegistry::create`].
#[derive(Debug, Clone, Default)]
pub struct CreateParams {
    pub session_id: String,
    pub project_id: String,
    pub connection_type: ConnectionType,
    pub ssh_host: Option<String>,
    pub ssh_port: Option<u16>,
    pub ssh_username: Option<String>,
    pub docker_container_id: Option<String>,
    pub tmux_session_name: Option<String>,
    pub tmux_window_name: Option<String>,
    pub reverse_agent_id: Option<String>,
    pub reverse_agent_secret: Option<String>,
    pub status: Option<LocationStatus>,
}

impl Default for ConnectionType {
    fn default() -> Self {
        ConnectionType::Local
    }
}

/// A partial update applied to an existing row. `None` fields are left
/// untouched; only the fields actually present are meant to be mutated, so
/// every field here is itself an `Option<Option<T>>`-free "set if Some"
/// convention except `status`, which is the common case and kept bare.
#[derive(Debug, Clone, Default)]
pub struct LocationPatch {
    pub status: Option<LocationStatus>,
    pub last_heartbeat_at: Option<u64>,
    pub last_verified_at: Option<u64>,
    pub ssh_host: Option<String>,
    pub ssh_port: Option<u16>,
    pub ssh_username: Option<String>,
    pub docker_container_id: Option<String>,
    pub tmux_session_name: Option<String>,
    pub tmux_window_name: Option<String>,
    pub reverse_agent_id: Option<String>,
    pub reverse_agent_secret: Option<String>,
}

/// Filter accepted by [`LocationRegistry::list`].
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub connection_type: Option<ConnectionType>,
    pub status: Option<LocationStatus>,
}

/// Single table mapping `session_id` to its `SessionLocation`.
pub struct LocationRegistry {
    rows: RwLock<HashMap<String, SessionLocation>>,
}

impl Default for LocationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationRegistry {
    pub fn new() -> Self {
        Self { rows: RwLock::new(HashMap::new()) }
    }

    /// Insert a new row, or overwrite an existing one with the same id.
    pub async fn create(&self, params: CreateParams) -> SessionLocation {
        let now = epoch_ms();
        let row = SessionLocation {
            session_id: params.session_id.clone(),
            project_id: params.project_id,
            connection_type: params.connection_type,
            ssh_host: params.ssh_host,
            ssh_port: params.ssh_port,
            ssh_username: params.ssh_username,
            docker_container_id: params.docker_container_id,
            tmux_session_name: params.tmux_session_name,
            tmux_window_name: params.tmux_window_name,
            reverse_agent_id: params.reverse_agent_id,
            reverse_agent_secret: params.reverse_agent_secret,
            status: params.status.unwrap_or(LocationStatus::Connecting),
            last_heartbeat_at: None,
            last_verified_at: None,
            created_at: now,
            updated_at: now,
        };
        self.rows.write().await.insert(params.session_id, row.clone());
        row
    }

    /// Look up a row by id. Returns `None` on unknown id; never errors for a
    /// missing row.
    pub async fn get(&self, session_id: &str) -> Option<SessionLocation> {
        self.rows.read().await.get(session_id).cloned()
    }

    /// Apply a partial update. Returns the updated row, or `None` if the id
    /// is unknown. `updated_at` is refreshed on every mutation.
    pub async fn update(&self, session_id: &str, patch: LocationPatch) -> Option<SessionLocation> {
        let mut rows = self.rows.write().await;
        let row = rows.get_mut(session_id)?;

        if let Some(status) = patch.status {
            row.status = status;
        }
        if patch.last_heartbeat_at.is_some() {
            row.last_heartbeat_at = patch.last_heartbeat_at;
        }
        if patch.last_verified_at.is_some() {
            row.last_verified_at = patch.last_verified_at;
        }
        if patch.ssh_host.is_some() {
            row.ssh_host = patch.ssh_host;
        }
        if patch.ssh_port.is_some() {
            row.ssh_port = patch.ssh_port;
        }
        if patch.ssh_username.is_some() {
            row.ssh_username = patch.ssh_username;
        }
        if patch.docker_container_id.is_some() {
            row.docker_container_id = patch.docker_container_id;
        }
        if patch.tmux_session_name.is_some() {
            row.tmux_session_name = patch.tmux_session_name;
        }
        if patch.tmux_window_name.is_some() {
            row.tmux_window_name = patch.tmux_window_name;
        }
        if patch.reverse_agent_id.is_some() {
            row.reverse_agent_id = patch.reverse_agent_id;
        }
        if patch.reverse_agent_secret.is_some() {
            row.reverse_agent_secret = patch.reverse_agent_secret;
        }
        row.updated_at = epoch_ms();
        Some(row.clone())
    }

    /// Remove a row. Returns whether a row was actually present.
    pub async fn delete(&self, session_id: &str) -> bool {
        self.rows.write().await.remove(session_id).is_some()
    }

    /// Snapshot rows matching the given filter.
    pub async fn list(&self, filter: ListFilter) -> Vec<SessionLocation> {
        let rows = self.rows.read().await;
        rows.values()
            .filter(|r| filter.connection_type.is_none_or(|t| r.connection_type == t))
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .cloned()
            .collect()
    }

    /// Bulk-update `last_heartbeat_at` for every row whose `reverse_agent_id`
    /// matches `agent_id`.
    pub async fn touch_heartbeat(&self, agent_id: &str) {
        let now = epoch_ms();
        let mut rows = self.rows.write().await;
        for row in rows.values_mut() {
            if row.reverse_agent_id.as_deref() == Some(agent_id) {
                row.last_heartbeat_at = Some(now);
                row.updated_at = now;
            }
        }
    }

    /// Reverse-tunnel rows currently `active` whose last heartbeat is older
    /// than `cutoff_ms` (epoch millis), or that have never heartbeated.
    pub async fn list_stale_reverse_active(&self, cutoff_ms: u64) -> Vec<SessionLocation> {
        let rows = self.rows.read().await;
        rows.values()
            .filter(|r| r.connection_type == ConnectionType::Reverse)
            .filter(|r| r.status == LocationStatus::Active)
            .filter(|r| r.last_heartbeat_at.is_none_or(|t| t < cutoff_ms))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
#[path = "location_tests.rs"]
mod tests;
