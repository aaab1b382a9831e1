// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Narrow collaborator interface to the out-of-scope project/session
//! metadata service (§6 "Collaborator contracts consumed"). The gateway
//! calls `ensure_project`/`ensure_session` lazily, the first time an agent
//! announces a `session_id` this process has never seen a location row for;
//! it never reads the metadata service's own state back.

use std::time::Duration;

use async_trait::async_trait;

/// Collaborator contract for registering projects/sessions with the
/// out-of-scope metadata service. Both calls are fire-and-forget from the
/// gateway's perspective: failures are logged, never surfaced to the agent
/// or the viewer, and never block the `SessionLocation` upsert that
/// triggered them.
#[async_trait]
pub trait MetadataRegistry: Send + Sync {
    async fn ensure_project(&self, project_id: &str);
    async fn ensure_session(&self, project_id: &str, session_id: &str);
}

/// Used when no metadata base URL is configured. Every call is a no-op.
pub struct NoopMetadataRegistry;

#[async_trait]
impl MetadataRegistry for NoopMetadataRegistry {
    async fn ensure_project(&self, _project_id: &str) {}
    async fn ensure_session(&self, _project_id: &str, _session_id: &str) {}
}

/// HTTP-backed implementation, calling `POST {base_url}/projects/{id}/ensure`
/// and `POST {base_url}/projects/{project_id}/sessions/{session_id}/ensure`.
pub struct HttpMetadataRegistry {
    base_url: String,
    client: reqwest::Client,
}

impl HttpMetadataRegistry {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

#[async_trait]
impl MetadataRegistry for HttpMetadataRegistry {
    async fn ensure_project(&self, project_id: &str) {
        let url = format!("{}/projects/{project_id}/ensure", self.base());
        if let Err(e) = self.client.post(&url).send().await {
            tracing::debug!(err = %e, project_id, "ensure_project request failed");
        }
    }

    async fn ensure_session(&self, project_id: &str, session_id: &str) {
        let url = format!("{}/projects/{project_id}/sessions/{session_id}/ensure", self.base());
        if let Err(e) = self.client.post(&url).send().await {
            tracing::debug!(err = %e, project_id, session_id, "ensure_session request failed");
        }
    }
}

/// Build the configured registry: HTTP-backed if a base URL is set,
/// no-op otherwise.
pub fn build(base_url: Option<String>) -> Box<dyn MetadataRegistry> {
    match base_url {
        Some(url) => Box::new(HttpMetadataRegistry::new(url)),
        None => Box::new(NoopMetadataRegistry),
    }
}

#[cfg(test)]
#[path = "metadata_tests.rs"]
mod tests;
