//! Issue-tracker client.
//!
//! Optional collaborator: when no base URL is configured the client is not
//! constructed and the tracker sink is inert. Only two operations are
//! consumed: fetching a ticket summary during context collection and adding
//! a comment during publishing.

use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

#[derive(Clone)]
pub struct TrackerClient {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct IssueResponse {
    fields: IssueFields,
}

#[derive(Debug, Deserialize)]
struct IssueFields {
    summary: Option<String>,
}

impl TrackerClient {
    /// Build a client when both settings are present; `None` otherwise.
    pub fn from_config(base_url: Option<String>, token: Option<String>) -> Option<Self> {
        let base_url = base_url?;
        let token = token?;
        let client = Client::builder()
            .user_agent("magpie/0.1.0")
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .expect("Failed to create HTTP client");
        Some(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub async fn get_summary(&self, ticket_key: &str) -> Result<Option<String>> {
        let url = format!(
            "{}/rest/api/2/issue/{}?fields=summary",
            self.base_url, ticket_key
        );

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .send()
            .await
            .context("Failed to send ticket fetch")?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(anyhow!("Tracker API error fetching {}: {}", ticket_key, status));
        }

        let issue: IssueResponse = response
            .json()
            .await
            .context("Failed to parse ticket response")?;
        Ok(issue.fields.summary)
    }

    pub async fn add_comment(&self, ticket_key: &str, body: &str) -> Result<()> {
        let url = format!("{}/rest/api/2/issue/{}/comment", self.base_url, ticket_key);

        info!("Posting tracker comment to {}", ticket_key);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .json(&json!({ "body": body }))
            .send()
            .await
            .context("Failed to send tracker comment")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Tracker API error commenting on {}: {} - {}",
                ticket_key,
                status,
                error_text
            ));
        }

        Ok(())
    }
}
