// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent authentication: validates the shared secret presented in
//! `agent:register` against configuration.
//!
//! A per-agent secret, `AGENT_SECRET_<NORMALIZED_AGENT_ID>`, takes
//! precedence over the comma-separated `AGENT_SECRETS` allow-list. If
//! neither is configured the agent is admitted with a warning — useful for
//! local development, dangerous anywhere else.

use tracing::warn;

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Normalize an `agent_id` into the form used by its per-agent secret env
/// var: uppercase, with `-` and `.` replaced by `_`.
pub fn normalize_agent_id(agent_id: &str) -> String {
    agent_id.to_uppercase().replace(['-', '.'], "_")
}

/// Validate `agent_secret` for `agent_id` against environment-sourced
/// configuration. Returns `true` if the agent should be admitted.
pub fn validate_agent_secret(agent_id: &str, agent_secret: &str) -> bool {
    let per_agent_var = format!("AGENT_SECRET_{}", normalize_agent_id(agent_id));
    if let Ok(expected) = std::env::var(&per_agent_var) {
        return constant_time_eq(agent_secret, &expected);
    }

    if let Ok(list) = std::env::var("AGENT_SECRETS") {
        return list.split(',').map(str::trim).any(|candidate| {
            !candidate.is_empty() && constant_time_eq(agent_secret, candidate)
        });
    }

    warn!(agent_id, "no agent secret configured; admitting agent without authentication");
    true
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
