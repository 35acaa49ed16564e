use anyhow::{Context, Result, anyhow};
use base64::{Engine as _, engine::general_purpose};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{info, warn};

use magpie_core::RepoRef;

const API_BASE: &str = "https://api.github.com";
const ACCEPT_JSON: &str = "application/vnd.github.v3+json";

/// GitHub App client. Authenticates with an RS256 JWT exchanged for
/// per-installation tokens, cached with an expiry buffer.
#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    app_id: u64,
    private_key: String,
    token_cache: Arc<RwLock<HashMap<u64, (String, SystemTime)>>>,
}

#[derive(Debug, Serialize)]
struct GitHubAppClaims {
    iss: u64,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct InstallationTokenResponse {
    token: String,
    expires_at: String,
}

#[derive(Debug, Deserialize)]
pub struct PullRequestResponse {
    pub number: u64,
    pub title: Option<String>,
    pub body: Option<String>,
    #[serde(default)]
    pub draft: bool,
    pub mergeable: Option<bool>,
    pub head: GitRefResponse,
    pub base: GitRefResponse,
}

#[derive(Debug, Deserialize)]
pub struct GitRefResponse {
    pub sha: String,
    #[serde(rename = "ref")]
    pub ref_name: String,
}

#[derive(Debug, Deserialize)]
pub struct PullRequestFile {
    pub filename: String,
    pub status: String,
    pub additions: u32,
    pub deletions: u32,
    pub patch: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Comment {
    pub id: u64,
}

#[derive(Debug, Serialize)]
struct CreateCommentRequest {
    body: String,
}

/// One inline comment in a batched review submission.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewComment {
    pub path: String,
    pub line: u64,
    pub side: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
struct CreateReviewRequest {
    body: String,
    event: String,
    comments: Vec<ReviewComment>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewResponse {
    pub id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStatusState {
    Pending,
    Success,
    Failure,
    Error,
}

impl CommitStatusState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitStatusState::Pending => "pending",
            CommitStatusState::Success => "success",
            CommitStatusState::Failure => "failure",
            CommitStatusState::Error => "error",
        }
    }
}

impl fmt::Display for CommitStatusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug)]
pub struct CommitStatusRequest<'a> {
    pub installation_id: u64,
    pub repo: &'a RepoRef,
    pub sha: &'a str,
    pub state: CommitStatusState,
    pub target_url: Option<&'a str>,
    pub description: Option<&'a str>,
    pub context: &'a str,
}

#[derive(Debug, Serialize)]
struct CommitStatusBody<'a> {
    state: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    context: &'a str,
}

/// Reactions the bot posts for acknowledgment and completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Eyes,
    Rocket,
    Confused,
}

impl Reaction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reaction::Eyes => "eyes",
            Reaction::Rocket => "rocket",
            Reaction::Confused => "confused",
        }
    }
}

#[derive(Debug, Serialize)]
struct ReactionRequest {
    content: String,
}

#[derive(Debug, Serialize)]
struct AddLabelsRequest<'a> {
    labels: &'a [String],
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: String,
}

#[derive(Debug, Deserialize)]
struct FileContentsResponse {
    content: String,
}

impl GitHubClient {
    pub fn new(app_id: u64, private_key: String) -> Self {
        let client = Client::builder()
            .user_agent("magpie/0.1.0")
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            app_id,
            private_key,
            token_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn generate_jwt(&self) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("Failed to get current time")?
            .as_secs();

        let claims = GitHubAppClaims {
            iss: self.app_id,
            iat: now - 60,  // Issued 60 seconds ago to account for clock skew
            exp: now + 600, // Expires in 10 minutes
        };

        let header = Header::new(Algorithm::RS256);
        let encoding_key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .context("Failed to parse private key")?;

        encode(&header, &claims, &encoding_key).context("Failed to encode JWT")
    }

    async fn get_installation_token(&self, installation_id: u64) -> Result<String> {
        // Reuse the cached token while it has more than 5 minutes left
        {
            let cache = self.token_cache.read().await;
            if let Some((token, expires_at)) = cache.get(&installation_id) {
                if expires_at
                    .duration_since(SystemTime::now())
                    .unwrap_or_default()
                    .as_secs()
                    > 300
                {
                    return Ok(token.clone());
                }
            }
        }

        let jwt = self.generate_jwt()?;
        let url = format!(
            "{}/app/installations/{}/access_tokens",
            API_BASE, installation_id
        );

        info!("Requesting new installation access token");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", jwt))
            .header("Accept", ACCEPT_JSON)
            .send()
            .await
            .context("Failed to send installation token request")?;

        let response = ensure_success(response, "installation token request").await?;

        let token_response: InstallationTokenResponse = response
            .json()
            .await
            .context("Failed to parse installation token response")?;

        let expires_at = chrono::DateTime::parse_from_rfc3339(&token_response.expires_at)
            .context("Failed to parse token expiration")?
            .with_timezone(&Utc);
        let expires_at_system =
            UNIX_EPOCH + std::time::Duration::from_secs(expires_at.timestamp() as u64);

        {
            let mut cache = self.token_cache.write().await;
            cache.insert(
                installation_id,
                (token_response.token.clone(), expires_at_system),
            );
        }

        info!("Successfully obtained installation access token");
        Ok(token_response.token)
    }

    async fn authed(
        &self,
        method: reqwest::Method,
        installation_id: u64,
        url: &str,
    ) -> Result<reqwest::RequestBuilder> {
        let token = self.get_installation_token(installation_id).await?;
        Ok(self
            .client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", ACCEPT_JSON))
    }

    pub async fn get_pull_request(
        &self,
        installation_id: u64,
        repo: &RepoRef,
        pr_number: u64,
    ) -> Result<PullRequestResponse> {
        let url = format!(
            "{}/repos/{}/{}/pulls/{}",
            API_BASE, repo.owner, repo.name, pr_number
        );

        info!("Fetching PR #{} in {}", pr_number, repo);

        let response = self
            .authed(reqwest::Method::GET, installation_id, &url)
            .await?
            .send()
            .await
            .context("Failed to send pull request fetch")?;

        let response = ensure_success(response, "pull request fetch").await?;
        response
            .json()
            .await
            .context("Failed to parse pull request response")
    }

    /// List the files of a pull request, following pagination.
    pub async fn list_pull_request_files(
        &self,
        installation_id: u64,
        repo: &RepoRef,
        pr_number: u64,
    ) -> Result<Vec<PullRequestFile>> {
        let mut all_files = Vec::new();
        let mut page = 1;
        let per_page = 100;

        info!("Fetching changed files for PR #{} in {}", pr_number, repo);

        loop {
            let url = format!(
                "{}/repos/{}/{}/pulls/{}/files?page={}&per_page={}",
                API_BASE, repo.owner, repo.name, pr_number, page, per_page
            );

            let response = self
                .authed(reqwest::Method::GET, installation_id, &url)
                .await?
                .send()
                .await
                .context("Failed to send PR files request")?;

            let response = ensure_success(response, "PR files request").await?;
            let files: Vec<PullRequestFile> = response
                .json()
                .await
                .context("Failed to parse PR files response")?;

            let fetched = files.len();
            all_files.extend(files);

            if fetched < per_page {
                break;
            }
            page += 1;
        }

        info!("Found {} changed files", all_files.len());
        Ok(all_files)
    }

    pub async fn create_issue_comment(
        &self,
        installation_id: u64,
        repo: &RepoRef,
        issue_number: u64,
        body: &str,
    ) -> Result<Comment> {
        let url = format!(
            "{}/repos/{}/{}/issues/{}/comments",
            API_BASE, repo.owner, repo.name, issue_number
        );

        info!("Posting comment to #{} in {}", issue_number, repo);

        let response = self
            .authed(reqwest::Method::POST, installation_id, &url)
            .await?
            .json(&CreateCommentRequest {
                body: body.to_string(),
            })
            .send()
            .await
            .context("Failed to send comment request")?;

        let response = ensure_success(response, "comment request").await?;
        let comment: Comment = response
            .json()
            .await
            .context("Failed to parse comment response")?;
        info!("Successfully posted comment with ID: {}", comment.id);
        Ok(comment)
    }

    /// Submit one batched review carrying all inline comments, so the PR
    /// receives a single notification instead of one per comment.
    pub async fn create_review(
        &self,
        installation_id: u64,
        repo: &RepoRef,
        pr_number: u64,
        body: &str,
        comments: Vec<ReviewComment>,
    ) -> Result<ReviewResponse> {
        let url = format!(
            "{}/repos/{}/{}/pulls/{}/reviews",
            API_BASE, repo.owner, repo.name, pr_number
        );

        info!(
            "Submitting review with {} inline comments to PR #{} in {}",
            comments.len(),
            pr_number,
            repo
        );

        let response = self
            .authed(reqwest::Method::POST, installation_id, &url)
            .await?
            .json(&CreateReviewRequest {
                body: body.to_string(),
                event: "COMMENT".to_string(),
                comments,
            })
            .send()
            .await
            .context("Failed to send review request")?;

        let response = ensure_success(response, "review request").await?;
        response
            .json()
            .await
            .context("Failed to parse review response")
    }

    pub async fn post_commit_status(&self, request: &CommitStatusRequest<'_>) -> Result<()> {
        let url = format!(
            "{}/repos/{}/{}/statuses/{}",
            API_BASE, request.repo.owner, request.repo.name, request.sha
        );

        info!(
            "Posting {} commit status for {} in {}",
            request.state, request.sha, request.repo
        );

        let response = self
            .authed(reqwest::Method::POST, request.installation_id, &url)
            .await?
            .json(&CommitStatusBody {
                state: request.state.as_str(),
                target_url: request.target_url,
                description: request.description,
                context: request.context,
            })
            .send()
            .await
            .context("Failed to send commit status request")?;

        ensure_success(response, "commit status request").await?;
        Ok(())
    }

    pub async fn add_labels(
        &self,
        installation_id: u64,
        repo: &RepoRef,
        issue_number: u64,
        labels: &[String],
    ) -> Result<()> {
        if labels.is_empty() {
            return Ok(());
        }

        let url = format!(
            "{}/repos/{}/{}/issues/{}/labels",
            API_BASE, repo.owner, repo.name, issue_number
        );

        info!("Adding labels {:?} to #{} in {}", labels, issue_number, repo);

        let response = self
            .authed(reqwest::Method::POST, installation_id, &url)
            .await?
            .json(&AddLabelsRequest { labels })
            .send()
            .await
            .context("Failed to send add labels request")?;

        ensure_success(response, "add labels request").await?;
        Ok(())
    }

    pub async fn create_issue_reaction(
        &self,
        installation_id: u64,
        repo: &RepoRef,
        issue_number: u64,
        reaction: Reaction,
    ) -> Result<()> {
        let url = format!(
            "{}/repos/{}/{}/issues/{}/reactions",
            API_BASE, repo.owner, repo.name, issue_number
        );
        self.post_reaction(installation_id, &url, reaction).await
    }

    pub async fn create_comment_reaction(
        &self,
        installation_id: u64,
        repo: &RepoRef,
        comment_id: u64,
        reaction: Reaction,
    ) -> Result<()> {
        let url = format!(
            "{}/repos/{}/{}/issues/comments/{}/reactions",
            API_BASE, repo.owner, repo.name, comment_id
        );
        self.post_reaction(installation_id, &url, reaction).await
    }

    async fn post_reaction(
        &self,
        installation_id: u64,
        url: &str,
        reaction: Reaction,
    ) -> Result<()> {
        let response = self
            .authed(reqwest::Method::POST, installation_id, url)
            .await?
            .json(&ReactionRequest {
                content: reaction.as_str().to_string(),
            })
            .send()
            .await
            .context("Failed to send reaction request")?;

        ensure_success(response, "reaction request").await?;
        Ok(())
    }

    /// Fetch the repository tree at a commit. The recursive listing may be
    /// truncated by the host for very large repositories; the truncated
    /// prefix is still useful for knowledge gathering.
    pub async fn get_repository_tree(
        &self,
        installation_id: u64,
        repo: &RepoRef,
        sha: &str,
    ) -> Result<Vec<TreeEntry>> {
        let url = format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            API_BASE, repo.owner, repo.name, sha
        );

        info!("Fetching repository tree for {} at {}", repo, sha);

        let response = self
            .authed(reqwest::Method::GET, installation_id, &url)
            .await?
            .send()
            .await
            .context("Failed to send tree request")?;

        let response = ensure_success(response, "tree request").await?;
        let tree: TreeResponse = response
            .json()
            .await
            .context("Failed to parse tree response")?;

        if tree.truncated {
            warn!("Repository tree for {} was truncated by the host", repo);
        }

        Ok(tree
            .tree
            .into_iter()
            .filter(|entry| entry.entry_type == "blob")
            .collect())
    }

    pub async fn get_file_contents(
        &self,
        installation_id: u64,
        repo: &RepoRef,
        file_path: &str,
        sha: &str,
    ) -> Result<String> {
        let url = format!(
            "{}/repos/{}/{}/contents/{}?ref={}",
            API_BASE, repo.owner, repo.name, file_path, sha
        );

        let response = self
            .authed(reqwest::Method::GET, installation_id, &url)
            .await?
            .send()
            .await
            .context("Failed to send file contents request")?;

        let response = ensure_success(response, "file contents request").await?;
        let file_response: FileContentsResponse = response
            .json()
            .await
            .context("Failed to parse file contents response")?;

        let decoded = general_purpose::STANDARD
            .decode(file_response.content.replace('\n', ""))
            .context("Failed to decode base64 file content")?;
        String::from_utf8(decoded).context("File content is not valid UTF-8")
    }
}

async fn ensure_success(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let error_text = response.text().await.unwrap_or_default();
    Err(anyhow!(
        "GitHub API error on {}: {} - {}",
        what,
        status,
        error_text
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_status_state_strings() {
        assert_eq!(CommitStatusState::Pending.as_str(), "pending");
        assert_eq!(CommitStatusState::Success.as_str(), "success");
        assert_eq!(CommitStatusState::Failure.as_str(), "failure");
        assert_eq!(CommitStatusState::Error.as_str(), "error");
    }

    #[test]
    fn test_reaction_strings() {
        assert_eq!(Reaction::Eyes.as_str(), "eyes");
        assert_eq!(Reaction::Rocket.as_str(), "rocket");
        assert_eq!(Reaction::Confused.as_str(), "confused");
    }

    #[test]
    fn test_commit_status_body_omits_missing_fields() {
        let body = CommitStatusBody {
            state: "pending",
            target_url: None,
            description: None,
            context: "magpie/review",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("target_url").is_none());
        assert!(json.get("description").is_none());
        assert_eq!(json["state"], "pending");
    }
}
