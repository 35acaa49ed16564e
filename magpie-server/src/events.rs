//! Typed webhook events.
//!
//! Raw payloads are duck-typed JSON; they are deserialized here and
//! immediately classified into one `WebhookEvent` variant. Nothing past the
//! router boundary ever sees raw payload JSON.

use magpie_core::{EventKind, RepoRef};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RawWebhookPayload {
    pub action: Option<String>,
    pub pull_request: Option<RawPullRequest>,
    pub issue: Option<RawIssue>,
    pub comment: Option<RawComment>,
    pub review: Option<RawReview>,
    pub repository: Option<RawRepository>,
    pub sender: Option<RawUser>,
    pub installation: Option<RawInstallation>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RawPullRequest {
    pub number: u64,
    #[serde(default)]
    pub draft: bool,
    pub title: Option<String>,
    pub body: Option<String>,
    pub head: RawGitRef,
    pub base: RawGitRef,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RawGitRef {
    pub sha: String,
    #[serde(rename = "ref")]
    pub ref_name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RawIssue {
    pub number: u64,
    /// Present (as an object with diff/patch URLs) only when the issue is a
    /// pull request. The contents are irrelevant; presence is the signal.
    pub pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RawComment {
    pub id: u64,
    pub body: String,
    pub user: RawUser,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RawReview {
    pub id: u64,
    pub body: Option<String>,
    pub user: RawUser,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RawRepository {
    pub name: String,
    pub full_name: String,
    pub owner: RawUser,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RawUser {
    pub id: u64,
    pub login: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RawInstallation {
    pub id: u64,
    pub account: Option<RawUser>,
}

/// Pull-request lifecycle actions this bot reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrAction {
    Opened,
    Synchronize,
    Reopened,
    ReadyForReview,
}

impl PrAction {
    pub fn from_action(action: &str) -> Option<Self> {
        match action {
            "opened" => Some(PrAction::Opened),
            "synchronize" => Some(PrAction::Synchronize),
            "reopened" => Some(PrAction::Reopened),
            "ready_for_review" => Some(PrAction::ReadyForReview),
            _ => None,
        }
    }

    pub fn event_kind(&self) -> EventKind {
        match self {
            PrAction::Opened => EventKind::PullRequestOpened,
            PrAction::Synchronize => EventKind::PullRequestSynchronize,
            PrAction::Reopened => EventKind::PullRequestReopened,
            PrAction::ReadyForReview => EventKind::PullRequestReadyForReview,
        }
    }
}

/// Pull-request fields the gate and pipeline need before the collector runs.
#[derive(Debug, Clone)]
pub struct PullRequestDetails {
    pub number: u64,
    pub draft: bool,
    pub title: String,
    pub head_sha: String,
    pub base_sha: String,
    pub branch: String,
}

/// A classified webhook event. Everything downstream of the webhook handler
/// works in terms of these variants.
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    PullRequest {
        action: PrAction,
        repo: RepoRef,
        installation_id: u64,
        sender: String,
        pr: PullRequestDetails,
    },
    Comment {
        repo: RepoRef,
        installation_id: u64,
        sender: String,
        issue_number: u64,
        comment_id: u64,
        body: String,
        on_pull_request: bool,
    },
    Review {
        repo: RepoRef,
        installation_id: u64,
        sender: String,
        pr_number: u64,
        body: Option<String>,
    },
    Installation {
        action: String,
        account: Option<String>,
    },
}

fn repo_ref(repository: &RawRepository) -> RepoRef {
    RepoRef::new(repository.owner.login.clone(), repository.name.clone())
}

/// Classify a raw payload by its event name (the `X-GitHub-Event` header).
/// Returns `None` for event/action combinations the bot does not consume.
pub fn classify_event(event_name: &str, payload: &RawWebhookPayload) -> Option<WebhookEvent> {
    match event_name {
        "pull_request" => {
            let action = PrAction::from_action(payload.action.as_deref()?)?;
            let pr = payload.pull_request.as_ref()?;
            let repository = payload.repository.as_ref()?;
            let installation = payload.installation.as_ref()?;
            Some(WebhookEvent::PullRequest {
                action,
                repo: repo_ref(repository),
                installation_id: installation.id,
                sender: payload
                    .sender
                    .as_ref()
                    .map(|s| s.login.clone())
                    .unwrap_or_default(),
                pr: PullRequestDetails {
                    number: pr.number,
                    draft: pr.draft,
                    title: pr.title.clone().unwrap_or_default(),
                    head_sha: pr.head.sha.clone(),
                    base_sha: pr.base.sha.clone(),
                    branch: pr.head.ref_name.clone(),
                },
            })
        }
        "issue_comment" => {
            if payload.action.as_deref() != Some("created") {
                return None;
            }
            let issue = payload.issue.as_ref()?;
            let comment = payload.comment.as_ref()?;
            let repository = payload.repository.as_ref()?;
            let installation = payload.installation.as_ref()?;
            Some(WebhookEvent::Comment {
                repo: repo_ref(repository),
                installation_id: installation.id,
                sender: comment.user.login.clone(),
                issue_number: issue.number,
                comment_id: comment.id,
                body: comment.body.clone(),
                on_pull_request: issue.pull_request.is_some(),
            })
        }
        "pull_request_review" => {
            if payload.action.as_deref() != Some("submitted") {
                return None;
            }
            let review = payload.review.as_ref()?;
            let pr = payload.pull_request.as_ref()?;
            let repository = payload.repository.as_ref()?;
            let installation = payload.installation.as_ref()?;
            Some(WebhookEvent::Review {
                repo: repo_ref(repository),
                installation_id: installation.id,
                sender: review.user.login.clone(),
                pr_number: pr.number,
                body: review.body.clone(),
            })
        }
        "installation" => {
            if payload.action.as_deref() != Some("created") {
                return None;
            }
            Some(WebhookEvent::Installation {
                action: "created".to_string(),
                account: payload
                    .installation
                    .as_ref()
                    .and_then(|i| i.account.as_ref())
                    .map(|a| a.login.clone()),
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> RawWebhookPayload {
        serde_json::from_value(value).unwrap()
    }

    fn base_pr_payload(action: &str, draft: bool) -> serde_json::Value {
        json!({
            "action": action,
            "pull_request": {
                "number": 12,
                "draft": draft,
                "title": "Add parser",
                "body": "Implements PROJ-9",
                "head": { "sha": "abc", "ref": "feature/parser" },
                "base": { "sha": "def", "ref": "main" }
            },
            "repository": {
                "name": "widgets",
                "full_name": "acme/widgets",
                "owner": { "id": 1, "login": "acme" }
            },
            "sender": { "id": 2, "login": "dev" },
            "installation": { "id": 77 }
        })
    }

    #[test]
    fn test_classify_pull_request_opened() {
        let event = classify_event("pull_request", &payload(base_pr_payload("opened", false)));
        match event {
            Some(WebhookEvent::PullRequest {
                action,
                repo,
                installation_id,
                pr,
                ..
            }) => {
                assert_eq!(action, PrAction::Opened);
                assert_eq!(repo.full_name(), "acme/widgets");
                assert_eq!(installation_id, 77);
                assert_eq!(pr.number, 12);
                assert_eq!(pr.branch, "feature/parser");
                assert!(!pr.draft);
            }
            other => panic!("expected PullRequest event, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_ignores_unconsumed_pr_actions() {
        assert!(classify_event("pull_request", &payload(base_pr_payload("closed", false))).is_none());
        assert!(classify_event("pull_request", &payload(base_pr_payload("labeled", false))).is_none());
    }

    #[test]
    fn test_classify_comment_on_pull_request() {
        let raw = payload(json!({
            "action": "created",
            "issue": { "number": 5, "pull_request": { "url": "..." } },
            "comment": { "id": 900, "body": "/ai-review", "user": { "id": 3, "login": "dev" } },
            "repository": {
                "name": "widgets",
                "full_name": "acme/widgets",
                "owner": { "id": 1, "login": "acme" }
            },
            "sender": { "id": 3, "login": "dev" },
            "installation": { "id": 77 }
        }));
        match classify_event("issue_comment", &raw) {
            Some(WebhookEvent::Comment {
                issue_number,
                comment_id,
                body,
                on_pull_request,
                ..
            }) => {
                assert_eq!(issue_number, 5);
                assert_eq!(comment_id, 900);
                assert_eq!(body, "/ai-review");
                assert!(on_pull_request);
            }
            other => panic!("expected Comment event, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_comment_on_plain_issue() {
        let raw = payload(json!({
            "action": "created",
            "issue": { "number": 5 },
            "comment": { "id": 900, "body": "/ai-review", "user": { "id": 3, "login": "dev" } },
            "repository": {
                "name": "widgets",
                "full_name": "acme/widgets",
                "owner": { "id": 1, "login": "acme" }
            },
            "installation": { "id": 77 }
        }));
        match classify_event("issue_comment", &raw) {
            Some(WebhookEvent::Comment { on_pull_request, .. }) => assert!(!on_pull_request),
            other => panic!("expected Comment event, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_edited_comment_is_ignored() {
        let raw = payload(json!({
            "action": "edited",
            "issue": { "number": 5, "pull_request": {} },
            "comment": { "id": 900, "body": "/ai-review", "user": { "id": 3, "login": "dev" } },
            "repository": {
                "name": "widgets",
                "full_name": "acme/widgets",
                "owner": { "id": 1, "login": "acme" }
            },
            "installation": { "id": 77 }
        }));
        assert!(classify_event("issue_comment", &raw).is_none());
    }

    #[test]
    fn test_classify_review_submitted() {
        let raw = payload(json!({
            "action": "submitted",
            "review": { "id": 31, "body": "/review security", "user": { "id": 3, "login": "dev" } },
            "pull_request": {
                "number": 12,
                "title": "Add parser",
                "head": { "sha": "abc", "ref": "feature/parser" },
                "base": { "sha": "def", "ref": "main" }
            },
            "repository": {
                "name": "widgets",
                "full_name": "acme/widgets",
                "owner": { "id": 1, "login": "acme" }
            },
            "installation": { "id": 77 }
        }));
        match classify_event("pull_request_review", &raw) {
            Some(WebhookEvent::Review { pr_number, body, .. }) => {
                assert_eq!(pr_number, 12);
                assert_eq!(body.as_deref(), Some("/review security"));
            }
            other => panic!("expected Review event, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_installation_created() {
        let raw = payload(json!({
            "action": "created",
            "installation": { "id": 77, "account": { "id": 1, "login": "acme" } }
        }));
        match classify_event("installation", &raw) {
            Some(WebhookEvent::Installation { account, .. }) => {
                assert_eq!(account.as_deref(), Some("acme"));
            }
            other => panic!("expected Installation event, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_unknown_event_name() {
        let raw = payload(json!({ "action": "created" }));
        assert!(classify_event("workflow_run", &raw).is_none());
    }
}
