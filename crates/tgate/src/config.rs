// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the terminal gateway daemon.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "tgated", version, about = "Distributed terminal gateway")]
pub struct GatewayConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "GATEWAY_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8088, env = "GATEWAY_PORT")]
    pub port: u16,

    /// Base URL of the metadata service consulted when a `/connect` request
    /// carries a `project_id` but no resolved `SessionLocation`.
    #[arg(long, env = "METADATA_BASE_URL")]
    pub metadata_base_url: Option<String>,

    /// Milliseconds of silence on an agent socket before the janitor
    /// considers it dead.
    #[arg(long, default_value_t = 30_000, env = "HEARTBEAT_TIMEOUT_MS")]
    pub heartbeat_timeout_ms: u64,

    /// How often the janitor sweeps for expired agents and stale sessions.
    #[arg(long, default_value_t = 30_000, env = "JANITOR_INTERVAL_MS")]
    pub janitor_interval_ms: u64,

    /// Backpressure high-water mark, in bytes of unflushed output, before a
    /// viewer socket is dropped.
    #[arg(long, default_value_t = 1_048_576, env = "VIEWER_WRITE_HWM_BYTES")]
    pub viewer_write_hwm_bytes: usize,
}

impl GatewayConfig {
    pub fn heartbeat_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn janitor_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.janitor_interval_ms)
    }
}
