// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Docker exec transport.
//!
//! Symmetric to [`super::ssh`]: out of scope for the first cut. When
//! implemented this attaches to `docker_container_id` via a container-exec
//! mechanism and maps its data/close/error onto [`super::TransportEvent`].

use tokio::sync::mpsc;

use crate::error::GatewayError;
use crate::location::SessionLocation;

use super::{TerminalHandle, TransportEvent};

pub async fn connect(
    _location: &SessionLocation,
    _cols: u16,
    _rows: u16,
) -> Result<(TerminalHandle, mpsc::Receiver<TransportEvent>), GatewayError> {
    Err(GatewayError::unsupported("docker transport is not implemented"))
}
