// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection manager (C3): dispatches a [`crate::location::SessionLocation`]
//! to the transport that owns its bytes.
//!
//! `reverse` locations are explicitly out of scope here — the router
//! handles those directly through the agent registry and protocol handler,
//! since a reverse tunnel is not a transport this process spawns.

pub mod docker;
pub mod local;
pub mod ssh;

use tokio::sync::mpsc;

use crate::error::GatewayError;
use crate::location::{ConnectionType, SessionLocation};

/// Something a live transport reports back to whoever is driving it.
#[derive(Debug)]
pub enum TransportEvent {
    /// Bytes read from the remote terminal.
    Data(Vec<u8>),
    /// The transport ended cleanly.
    Closed,
    /// The transport ended abnormally; carries a human-readable cause.
    Error(String),
}

/// A send handle to a directly-spawned terminal's driving task.
///
/// `write`/`resize`/`close` enqueue onto that task; the matching
/// `mpsc::Receiver<TransportEvent>` returned alongside this handle stands
/// in for the subscribe-style `onData`/`onClose`/`onError` triad — a single
/// ordered channel the caller drains is the idiomatic async-Rust shape for
/// the same contract.
#[derive(Clone)]
pub struct TerminalHandle {
    input_tx: mpsc::UnboundedSender<Vec<u8>>,
    resize_tx: mpsc::UnboundedSender<(u16, u16)>,
    close_tx: mpsc::UnboundedSender<()>,
}

impl TerminalHandle {
    pub(crate) fn new(
        input_tx: mpsc::UnboundedSender<Vec<u8>>,
        resize_tx: mpsc::UnboundedSender<(u16, u16)>,
        close_tx: mpsc::UnboundedSender<()>,
    ) -> Self {
        Self { input_tx, resize_tx, close_tx }
    }

    /// Write bytes to the transport's stdin. Silently dropped if the
    /// transport has already closed.
    pub fn write(&self, data: Vec<u8>) {
        let _ = self.input_tx.send(data);
    }

    /// Best-effort resize notification.
    pub fn resize(&self, cols: u16, rows: u16) {
        let _ = self.resize_tx.send((cols, rows));
    }

    /// Idempotent: ends stdin and kills the underlying process.
    pub fn close(&self) {
        let _ = self.close_tx.send(());
    }
}

/// Dispatches to the transport implied by `location.connection_type`.
pub struct ConnectionManager;

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self
    }

    /// Spawn or attach a transport for `location`, sized `cols` x `rows`.
    ///
    /// Returns [`crate::error::ErrorKind::Unsupported`] for `ssh`/`docker`
    /// and [`crate::error::ErrorKind::BadRequest`] for `reverse`, which is
    /// never a C3 concern.
    pub async fn connect(
        &self,
        location: &SessionLocation,
        cols: u16,
        rows: u16,
    ) -> Result<(TerminalHandle, mpsc::Receiver<TransportEvent>), GatewayError> {
        match location.connection_type {
            ConnectionType::Local => local::spawn(location, cols, rows).await,
            ConnectionType::Ssh => ssh::connect(location, cols, rows).await,
            ConnectionType::Docker => docker::connect(location, cols, rows).await,
            ConnectionType::Reverse => Err(GatewayError::bad_request(
                "reverse sessions are not handled by the connection manager",
            )),
        }
    }
}
