// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire types for the agent duplex channel.

use serde::{Deserialize, Serialize};

/// Frames an agent may send.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    #[serde(rename = "agent:register")]
    Register {
        agent_id: String,
        agent_secret: String,
        #[serde(default)]
        hostname: Option<String>,
        #[serde(default)]
        platform: Option<String>,
        #[serde(default)]
        version: Option<String>,
    },
    #[serde(rename = "agent:heartbeat")]
    Heartbeat {
        agent_id: String,
        #[serde(default)]
        active_sessions: Vec<String>,
        #[serde(default)]
        system_info: Option<serde_json::Value>,
    },
    #[serde(rename = "agent:session:start")]
    SessionStart {
        session_id: String,
        project_id: String,
        #[serde(default)]
        tmux_session_name: Option<String>,
        #[serde(default)]
        tmux_window_name: Option<String>,
    },
    #[serde(rename = "agent:session:end")]
    SessionEnd {
        session_id: String,
        #[serde(default)]
        reason: Option<String>,
    },
    #[serde(rename = "agent:session:output")]
    SessionOutput { session_id: String, data: String },
    #[serde(rename = "agent:session:error")]
    SessionError {
        #[serde(default)]
        session_id: Option<String>,
        error: String,
        #[serde(default)]
        details: Option<String>,
    },
    #[serde(rename = "agent:ack")]
    Ack {
        command_type: String,
        #[serde(default)]
        session_id: Option<String>,
        success: bool,
        #[serde(default)]
        message: Option<String>,
    },
}

/// Frames sent to an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayMessage {
    #[serde(rename = "agent:registered")]
    Registered { agent_id: String, message: String },
    #[serde(rename = "agent:pong")]
    Pong {},
    #[serde(rename = "agent:command:connect")]
    CommandConnect {
        session_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cols: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        rows: Option<u16>,
    },
    #[serde(rename = "agent:command:input")]
    CommandInput { session_id: String, data: String },
    #[serde(rename = "agent:command:resize")]
    CommandResize { session_id: String, cols: u16, rows: u16 },
    #[serde(rename = "agent:command:disconnect")]
    CommandDisconnect { session_id: String },
    #[serde(rename = "agent:command:ping")]
    CommandPing {},
    #[serde(rename = "gateway:error")]
    Error { error: String },
}

/// Computed tmux target for an `agent:session:start` event: `sess:win` if
/// both a session and window name are given, otherwise whichever of the two
/// is present, otherwise the session id itself.
pub fn tmux_target(
    session_id: &str,
    tmux_session_name: Option<&str>,
    tmux_window_name: Option<&str>,
) -> String {
    match (tmux_session_name, tmux_window_name) {
        (Some(sess), Some(win)) => format!("{sess}:{win}"),
        (Some(sess), None) => sess.to_owned(),
        (None, Some(win)) => win.to_owned(),
        (None, None) => session_id.to_owned(),
    }
}

#[cfg(test)]
#[path = "agent_msg_tests.rs"]
mod tests;
