// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SSH transport.
//!
//! Out of scope for the first cut. When implemented this must open an SSH
//! channel to `ssh_host:ssh_port` as `ssh_username`, request a PTY sized
//! `cols x rows`, exec `tmux attach-session -d -t <target>`, and map channel
//! data/close/error onto [`super::TransportEvent`] the same way
//! [`super::local`] does for the subprocess case.

use tokio::sync::mpsc;

use crate::error::GatewayError;
use crate::location::SessionLocation;

use super::{TerminalHandle, TransportEvent};

pub async fn connect(
    _location: &SessionLocation,
    _cols: u16,
    _rows: u16,
) -> Result<(TerminalHandle, mpsc::Receiver<TransportEvent>), GatewayError> {
    Err(GatewayError::unsupported("ssh transport is not implemented"))
}
