// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end WebSocket integration tests: real TCP connections against an
//! in-process gateway, driving both the agent and viewer sockets the way a
//! real reverse-tunnel agent and a real browser would.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use tgate::agent::AgentRegistry;
use tgate::config::GatewayConfig;
use tgate::location::LocationRegistry;
use tgate::metadata::NoopMetadataRegistry;
use tgate::router::{run_event_loop, run_janitor, GatewayState};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
type WsTx = futures_util::stream::SplitSink<WsStream, WsMessage>;
type WsRx = futures_util::stream::SplitStream<WsStream>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

fn test_config() -> GatewayConfig {
    GatewayConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
        metadata_base_url: None,
        heartbeat_timeout_ms: 30_000,
        janitor_interval_ms: 30_000,
        viewer_write_hwm_bytes: 1_048_576,
    }
}

/// Spawn a gateway with the janitor and agent-event loop running, bound to
/// an ephemeral TCP port. Returns the listen address; the caller owns the
/// cancellation token and should drop it to stop the background tasks.
async fn spawn_gateway(config: GatewayConfig) -> (std::net::SocketAddr, CancellationToken) {
    let state = Arc::new(GatewayState::new(
        LocationRegistry::new(),
        AgentRegistry::new(),
        Box::new(NoopMetadataRegistry),
        config,
    ));
    let shutdown = CancellationToken::new();
    tokio::spawn(run_janitor(Arc::clone(&state), shutdown.clone()));
    tokio::spawn(run_event_loop(Arc::clone(&state), shutdown.clone()));

    let router = tgate::build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    (addr, shutdown)
}

async fn ws_connect(addr: &std::net::SocketAddr, path: &str) -> anyhow::Result<(WsTx, WsRx)> {
    let url = format!("ws://{addr}{path}");
    let (stream, _) = tokio_tungstenite::connect_async(&url).await?;
    Ok(stream.split())
}

async fn ws_send(tx: &mut WsTx, value: &serde_json::Value) -> anyhow::Result<()> {
    let text = serde_json::to_string(value)?;
    tx.send(WsMessage::Text(text.into())).await?;
    Ok(())
}

async fn ws_recv(rx: &mut WsRx) -> anyhow::Result<serde_json::Value> {
    loop {
        let msg = tokio::time::timeout(RECV_TIMEOUT, rx.next())
            .await
            .map_err(|_| anyhow::anyhow!("ws recv timeout"))?
            .ok_or_else(|| anyhow::anyhow!("ws stream closed"))?
            .map_err(|e| anyhow::anyhow!("ws recv: {e}"))?;
        match msg {
            WsMessage::Text(text) => return Ok(serde_json::from_str(&text)?),
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            other => anyhow::bail!("expected Text message, got {other:?}"),
        }
    }
}

async fn register_agent(tx: &mut WsTx, rx: &mut WsRx, agent_id: &str) -> anyhow::Result<()> {
    ws_send(
        tx,
        &serde_json::json!({
            "type": "agent:register",
            "agent_id": agent_id,
            "agent_secret": "good",
        }),
    )
    .await?;
    let reply = ws_recv(rx).await?;
    anyhow::ensure!(reply["type"] == "agent:registered", "unexpected reply: {reply}");
    Ok(())
}

// -- Scenario 2: reverse tunnel happy path -----------------------------------

#[tokio::test]
async fn reverse_tunnel_happy_path() -> anyhow::Result<()> {
    std::env::set_var("AGENT_SECRETS", "good");
    let (addr, _shutdown) = spawn_gateway(test_config()).await;

    let (mut agent_tx, mut agent_rx) = ws_connect(&addr, "/ws/agent").await?;
    register_agent(&mut agent_tx, &mut agent_rx, "A1").await?;

    ws_send(
        &mut agent_tx,
        &serde_json::json!({
            "type": "agent:session:start",
            "session_id": "S2",
            "project_id": "P2",
            "tmux_session_name": "ccc-A",
            "tmux_window_name": "w0",
        }),
    )
    .await?;

    let (mut viewer_tx, mut viewer_rx) = ws_connect(&addr, "/ws/viewer").await?;
    ws_send(
        &mut viewer_tx,
        &serde_json::json!({"type": "terminal:connect", "session_id": "S2", "project_id": "P2"}),
    )
    .await?;

    // Agent receives agent:command:connect for S2.
    let command = ws_recv(&mut agent_rx).await?;
    assert_eq!(command["type"], "agent:command:connect");
    assert_eq!(command["session_id"], "S2");
    assert_eq!(command["cols"], 80);
    assert_eq!(command["rows"], 24);

    // Viewer gets status:connected, connection_type:reverse, agent_id:A1.
    let status = ws_recv(&mut viewer_rx).await?;
    assert_eq!(status["type"], "terminal:status");
    assert_eq!(status["status"], "connected");
    assert_eq!(status["connection_type"], "reverse");
    assert_eq!(status["agent_id"], "A1");

    // Agent reports output; viewer receives it.
    ws_send(
        &mut agent_tx,
        &serde_json::json!({"type": "agent:session:output", "session_id": "S2", "data": "xyz"}),
    )
    .await?;
    let output = ws_recv(&mut viewer_rx).await?;
    assert_eq!(output["type"], "terminal:output");
    assert_eq!(output["session_id"], "S2");
    assert_eq!(output["data"], "xyz");

    Ok(())
}

// -- Scenario 4: authentication failure --------------------------------------

#[tokio::test]
async fn agent_registration_bad_secret_closes_with_policy_violation() -> anyhow::Result<()> {
    std::env::set_var("AGENT_SECRETS", "good");
    let (addr, _shutdown) = spawn_gateway(test_config()).await;

    let (mut agent_tx, mut agent_rx) = ws_connect(&addr, "/ws/agent").await?;
    ws_send(
        &mut agent_tx,
        &serde_json::json!({"type": "agent:register", "agent_id": "A2", "agent_secret": "bad"}),
    )
    .await?;

    let error_msg = tokio::time::timeout(RECV_TIMEOUT, agent_rx.next())
        .await?
        .expect("socket should send a gateway:error frame, not hang up silently");
    match error_msg {
        Ok(WsMessage::Text(text)) => {
            let reply: serde_json::Value = serde_json::from_str(&text)?;
            assert_eq!(reply["type"], "gateway:error");
            assert_eq!(reply["error"], "Invalid agent credentials");
        }
        other => panic!("expected a gateway:error text frame, got {other:?}"),
    }

    let close_msg = tokio::time::timeout(RECV_TIMEOUT, agent_rx.next())
        .await?
        .expect("socket should send a close frame after gateway:error");
    match close_msg {
        Ok(WsMessage::Close(Some(frame))) => {
            assert_eq!(frame.code, tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode::Policy);
        }
        other => panic!("expected a policy-violation close frame, got {other:?}"),
    }

    Ok(())
}

// -- Scenario 5: duplicate agent id ------------------------------------------

#[tokio::test]
async fn duplicate_agent_registration_displaces_prior_socket() -> anyhow::Result<()> {
    std::env::set_var("AGENT_SECRETS", "good");
    let (addr, _shutdown) = spawn_gateway(test_config()).await;

    let (mut agent1_tx, mut agent1_rx) = ws_connect(&addr, "/ws/agent").await?;
    register_agent(&mut agent1_tx, &mut agent1_rx, "A1").await?;
    ws_send(
        &mut agent1_tx,
        &serde_json::json!({
            "type": "agent:session:start",
            "session_id": "S1",
            "project_id": "P1",
            "tmux_session_name": "ccc",
        }),
    )
    .await?;

    let (mut viewer_tx, mut viewer_rx) = ws_connect(&addr, "/ws/viewer").await?;
    ws_send(
        &mut viewer_tx,
        &serde_json::json!({"type": "terminal:connect", "session_id": "S1", "project_id": "P1"}),
    )
    .await?;
    let _command = ws_recv(&mut agent1_rx).await?;
    let status = ws_recv(&mut viewer_rx).await?;
    assert_eq!(status["status"], "connected");

    // A second socket registers with the same agent_id.
    let (mut agent2_tx, mut agent2_rx) = ws_connect(&addr, "/ws/agent").await?;
    register_agent(&mut agent2_tx, &mut agent2_rx, "A1").await?;

    // Old socket is closed with a policy-violation frame.
    let old_msg = tokio::time::timeout(RECV_TIMEOUT, agent1_rx.next()).await?;
    match old_msg {
        Some(Ok(WsMessage::Close(_))) => {}
        other => panic!("expected the displaced socket to be closed, got {other:?}"),
    }

    // The viewer that was attached to the old registration sees an error.
    let viewer_error = ws_recv(&mut viewer_rx).await?;
    assert_eq!(viewer_error["type"], "terminal:error");

    Ok(())
}

// -- Scenario 6: unknown session on connect ----------------------------------

#[tokio::test]
async fn connect_to_unknown_session_yields_single_error_frame() -> anyhow::Result<()> {
    let (addr, _shutdown) = spawn_gateway(test_config()).await;

    let (mut viewer_tx, mut viewer_rx) = ws_connect(&addr, "/ws/viewer").await?;
    ws_send(
        &mut viewer_tx,
        &serde_json::json!({"type": "terminal:connect", "session_id": "S-missing", "project_id": "P1"}),
    )
    .await?;

    let reply = ws_recv(&mut viewer_rx).await?;
    assert_eq!(reply["type"], "terminal:error");
    assert!(reply["error"].as_str().unwrap_or_default().contains("not found"));

    Ok(())
}

// -- Scenario 3: agent times out ---------------------------------------------

#[tokio::test]
async fn agent_timeout_reaps_agent_and_notifies_viewers() -> anyhow::Result<()> {
    std::env::set_var("AGENT_SECRETS", "good");
    let mut config = test_config();
    config.heartbeat_timeout_ms = 200;
    config.janitor_interval_ms = 50;
    let (addr, _shutdown) = spawn_gateway(config).await;

    let (mut agent_tx, mut agent_rx) = ws_connect(&addr, "/ws/agent").await?;
    register_agent(&mut agent_tx, &mut agent_rx, "A1").await?;
    ws_send(
        &mut agent_tx,
        &serde_json::json!({
            "type": "agent:session:start",
            "session_id": "S3",
            "project_id": "P3",
            "tmux_session_name": "ccc",
        }),
    )
    .await?;

    let (mut viewer_tx, mut viewer_rx) = ws_connect(&addr, "/ws/viewer").await?;
    ws_send(
        &mut viewer_tx,
        &serde_json::json!({"type": "terminal:connect", "session_id": "S3", "project_id": "P3"}),
    )
    .await?;
    let _command = ws_recv(&mut agent_rx).await?;
    let status = ws_recv(&mut viewer_rx).await?;
    assert_eq!(status["status"], "connected");

    // Stop heartbeating; the janitor should reap A1 well within a second.
    let error = tokio::time::timeout(Duration::from_secs(3), ws_recv(&mut viewer_rx))
        .await
        .map_err(|_| anyhow::anyhow!("viewer never got the agent-timeout error"))??;
    assert_eq!(error["type"], "terminal:error");
    assert_eq!(error["error"], "Agent timed out");

    Ok(())
}
