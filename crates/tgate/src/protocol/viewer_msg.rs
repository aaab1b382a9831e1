// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire types for the viewer duplex channel.

use serde::{Deserialize, Serialize};

use super::epoch_ms;

/// Frames a viewer may send.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerMessage {
    #[serde(rename = "terminal:connect")]
    TerminalConnect {
        session_id: String,
        project_id: String,
        #[serde(default = "default_cols")]
        cols: u16,
        #[serde(default = "default_rows")]
        rows: u16,
    },
    #[serde(rename = "terminal:input")]
    TerminalInput { session_id: String, data: String },
    #[serde(rename = "terminal:resize")]
    TerminalResize { session_id: String, cols: u16, rows: u16 },
    #[serde(rename = "terminal:disconnect")]
    TerminalDisconnect { session_id: String },
}

fn default_cols() -> u16 {
    80
}

fn default_rows() -> u16 {
    24
}

/// Status values reported in `terminal:status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

/// Frames sent to a viewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(rename = "terminal:output")]
    TerminalOutput { session_id: String, data: String, timestamp: u64 },
    #[serde(rename = "terminal:status")]
    TerminalStatus {
        session_id: String,
        status: TerminalStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        connection_type: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
        timestamp: u64,
    },
    #[serde(rename = "terminal:error")]
    TerminalError {
        session_id: String,
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
        timestamp: u64,
    },
}

impl ServerMessage {
    pub fn output(session_id: impl Into<String>, data: impl Into<String>) -> Self {
        ServerMessage::TerminalOutput {
            session_id: session_id.into(),
            data: data.into(),
            timestamp: epoch_ms(),
        }
    }

    pub fn connected(
        session_id: impl Into<String>,
        connection_type: impl Into<String>,
        agent_id: Option<String>,
    ) -> Self {
        ServerMessage::TerminalStatus {
            session_id: session_id.into(),
            status: TerminalStatus::Connected,
            message: None,
            connection_type: Some(connection_type.into()),
            agent_id,
            timestamp: epoch_ms(),
        }
    }

    pub fn disconnected(session_id: impl Into<String>) -> Self {
        ServerMessage::TerminalStatus {
            session_id: session_id.into(),
            status: TerminalStatus::Disconnected,
            message: None,
            connection_type: None,
            agent_id: None,
            timestamp: epoch_ms(),
        }
    }

    pub fn error(session_id: impl Into<String>, error: impl Into<String>) -> Self {
        ServerMessage::TerminalError {
            session_id: session_id.into(),
            error: error.into(),
            details: None,
            timestamp: epoch_ms(),
        }
    }

    pub fn error_with_details(
        session_id: impl Into<String>,
        error: impl Into<String>,
        details: Option<String>,
    ) -> Self {
        ServerMessage::TerminalError {
            session_id: session_id.into(),
            error: error.into(),
            details,
            timestamp: epoch_ms(),
        }
    }
}

#[cfg(test)]
#[path = "viewer_msg_tests.rs"]
mod tests;
