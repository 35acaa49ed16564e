//! Fire-and-forget side effects.
//!
//! Reactions, notifications, and other nice-to-have calls must never abort
//! the pipeline: `best_effort` captures and logs their failures, and the
//! `Notifier` posts completion/error events to an optional webhook.

use reqwest::Client;
use serde_json::json;
use std::future::Future;
use tracing::warn;

use magpie_core::RepoRef;

/// Await a non-critical call, logging any failure and swallowing it.
pub async fn best_effort<T>(what: &str, fut: impl Future<Output = anyhow::Result<T>>) {
    if let Err(e) = fut.await {
        warn!("Best-effort call '{}' failed: {:#}", what, e);
    }
}

/// Notification collaborator. Unconfigured instances silently drop every
/// notification.
#[derive(Clone)]
pub struct Notifier {
    client: Client,
    url: Option<String>,
}

impl Notifier {
    pub fn new(url: Option<String>) -> Self {
        let client = Client::builder()
            .user_agent("magpie/0.1.0")
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");
        Self { client, url }
    }

    pub async fn notify_review_complete(
        &self,
        repo: &RepoRef,
        pr_number: u64,
        workflow_id: &str,
        health_score: u8,
    ) {
        self.post(json!({
            "event": "review_complete",
            "repository": repo.full_name(),
            "pull_request": pr_number,
            "workflow_id": workflow_id,
            "health_score": health_score,
        }))
        .await;
    }

    pub async fn notify_error(
        &self,
        repo: &RepoRef,
        pr_number: u64,
        workflow_id: &str,
        message: &str,
    ) {
        self.post(json!({
            "event": "review_error",
            "repository": repo.full_name(),
            "pull_request": pr_number,
            "workflow_id": workflow_id,
            "message": message,
        }))
        .await;
    }

    async fn post(&self, payload: serde_json::Value) {
        let Some(url) = &self.url else {
            return;
        };
        let result = self.client.post(url).json(&payload).send().await;
        match result {
            Ok(response) if !response.status().is_success() => {
                warn!("Notification endpoint returned {}", response.status());
            }
            Err(e) => warn!("Failed to send notification: {:#}", e),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[tokio::test]
    async fn test_best_effort_swallows_errors() {
        // Must not panic or propagate
        best_effort("failing call", async { Err::<(), _>(anyhow!("boom")) }).await;
        best_effort("succeeding call", async { Ok::<_, anyhow::Error>(42) }).await;
    }

    #[tokio::test]
    async fn test_unconfigured_notifier_is_inert() {
        let notifier = Notifier::new(None);
        // No URL means no network call; completes immediately.
        notifier
            .notify_review_complete(&RepoRef::new("acme", "widgets"), 1, "wf", 90)
            .await;
        notifier
            .notify_error(&RepoRef::new("acme", "widgets"), 1, "wf", "boom")
            .await;
    }
}
