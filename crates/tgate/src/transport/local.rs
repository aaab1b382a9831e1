// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local transport: attaches to a tmux session on the gateway's own host via
//! a plain subprocess. No PTY allocation — the workspace denies `unsafe`,
//! and `tmux attach-session` happily drives a pipe for non-interactive
//! consumers, so the dedicated master/slave pty pair an interactive
//! terminal would need is not required here.

use std::process::Stdio;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::error::GatewayError;
use crate::location::SessionLocation;

use super::{TerminalHandle, TransportEvent};

const READ_CHUNK: usize = 8192;

fn target_for(location: &SessionLocation) -> Result<String, GatewayError> {
    let session = location
        .tmux_session_name
        .as_deref()
        .ok_or_else(|| GatewayError::bad_request("local session missing tmux_session_name"))?;
    Ok(match &location.tmux_window_name {
        Some(window) => format!("{session}:{window}"),
        None => session.to_owned(),
    })
}

pub async fn spawn(
    location: &SessionLocation,
    cols: u16,
    rows: u16,
) -> Result<(TerminalHandle, mpsc::Receiver<TransportEvent>), GatewayError> {
    let target = target_for(location)?;

    let mut child = Command::new("tmux")
        .args(["attach-session", "-d", "-t", &target])
        .env("TERM", "xterm-256color")
        .env("COLUMNS", cols.to_string())
        .env("LINES", rows.to_string())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| GatewayError::transport(format!("failed to spawn tmux: {e}")))?;

    let mut stdin = child.stdin.take().ok_or_else(|| {
        GatewayError::transport("tmux child process did not expose a stdin pipe")
    })?;
    let mut stdout = child.stdout.take().ok_or_else(|| {
        GatewayError::transport("tmux child process did not expose a stdout pipe")
    })?;
    let mut stderr = child.stderr.take().ok_or_else(|| {
        GatewayError::transport("tmux child process did not expose a stderr pipe")
    })?;

    let (events_tx, events_rx) = mpsc::channel(256);
    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let (resize_tx, mut resize_rx) = mpsc::unbounded_channel::<(u16, u16)>();
    let (close_tx, mut close_rx) = mpsc::unbounded_channel::<()>();

    let stdout_events = events_tx.clone();
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            match stdout.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if stdout_events.send(TransportEvent::Data(buf[..n].to_vec())).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let stderr_events = events_tx.clone();
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            match stderr.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                    if stderr_events.send(TransportEvent::Error(text)).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                _ = close_rx.recv() => {
                    let _ = stdin.shutdown().await;
                    let _ = child.kill().await;
                    break;
                }
                status = child.wait() => {
                    match status {
                        Ok(status) if !status.success() => {
                            let _ = events_tx
                                .send(TransportEvent::Error(format!(
                                    "tmux exited with status {status}"
                                )))
                                .await;
                        }
                        Err(e) => {
                            let _ = events_tx
                                .send(TransportEvent::Error(format!("waiting on tmux failed: {e}")))
                                .await;
                        }
                        _ => {}
                    }
                    let _ = events_tx.send(TransportEvent::Closed).await;
                    break;
                }
                data = input_rx.recv() => {
                    match data {
                        Some(bytes) => {
                            if stdin.write_all(&bytes).await.is_err() {
                                let _ = events_tx.send(TransportEvent::Closed).await;
                                break;
                            }
                        }
                        None => {
                            let _ = stdin.shutdown().await;
                            let _ = child.kill().await;
                            break;
                        }
                    }
                }
                resize = resize_rx.recv() => {
                    if let Some((cols, rows)) = resize {
                        let cmd = format!("stty cols {cols} rows {rows}\n");
                        let _ = stdin.write_all(cmd.as_bytes()).await;
                    }
                }
            }
        }
    });

    Ok((TerminalHandle::new(input_tx, resize_tx, close_tx), events_rx))
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
