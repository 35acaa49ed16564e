//! Event routing.
//!
//! The gate is a pure function over the typed event, so every skip rule is
//! unit-testable without collaborators. Everything effectful - reactions,
//! the pipeline run, publishing, the failure boundary - lives in
//! `handle_event` and below. Any error raised by context collection or the
//! pipeline is converted here into an error comment, a confused reaction,
//! and a notification; nothing propagates past this module.

use std::sync::Arc;
use tracing::{error, info};

use magpie_core::{EventKind, RepoRef};

use crate::AppState;
use crate::collector::ContextCollector;
use crate::command::{self, SlashCommand};
use crate::events::{PrAction, WebhookEvent};
use crate::github::{CommitStatusRequest, CommitStatusState, Reaction};
use crate::knowledge::TreeKnowledgeProvider;
use crate::notify::best_effort;
use crate::pipeline::{AnalysisPipeline, conflict_check};
use crate::publisher::{
    COMMIT_STATUS_CONTEXT, PublishSettings, PublishTarget, ResultPublisher, ack_reaction,
    failure_reaction, render_error_comment, success_reaction,
};
use crate::registry::{WorkflowKey, WorkflowOutcome};

/// What a gated event asks the router to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Review { focus: Option<String> },
    SuggestImprovements,
    ResolveConflicts { force: bool },
    Status,
    Help,
    UnknownCommand { attempted: String },
}

/// Gate decision. `Skip` carries the reason for the log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    Proceed(Trigger),
    Skip(&'static str),
}

fn trigger_for_command(body: &str) -> Trigger {
    match SlashCommand::classify(&command::parse(body)) {
        SlashCommand::Review { focus } => Trigger::Review { focus },
        SlashCommand::SuggestImprovements => Trigger::SuggestImprovements,
        SlashCommand::ResolveConflicts { force } => Trigger::ResolveConflicts { force },
        SlashCommand::Status => Trigger::Status,
        SlashCommand::Help => Trigger::Help,
        SlashCommand::Unknown { attempted } => Trigger::UnknownCommand { attempted },
    }
}

/// Evaluate the gating rules for an event. Pure: performs no collaborator
/// calls, so a skipped event provably causes none.
pub fn evaluate(event: &WebhookEvent) -> Gate {
    match event {
        WebhookEvent::PullRequest { action, pr, .. } => {
            if pr.draft && *action != PrAction::ReadyForReview {
                return Gate::Skip("draft pull request");
            }
            Gate::Proceed(Trigger::Review { focus: None })
        }
        WebhookEvent::Comment {
            on_pull_request,
            body,
            ..
        } => {
            if !on_pull_request {
                return Gate::Skip("comment is not on a pull request");
            }
            if !command::is_command(body) {
                return Gate::Skip("comment is not a command");
            }
            Gate::Proceed(trigger_for_command(body))
        }
        WebhookEvent::Review { body, .. } => {
            let Some(body) = body else {
                return Gate::Skip("review has no body");
            };
            if !command::is_command(body) {
                return Gate::Skip("review body is not a command");
            }
            Gate::Proceed(trigger_for_command(body))
        }
        WebhookEvent::Installation { .. } => Gate::Skip("installation event acknowledged"),
    }
}

/// The triggering object, reduced to what the effect handlers need.
#[derive(Debug, Clone)]
struct EventRef {
    installation_id: u64,
    repo: RepoRef,
    pr_number: u64,
    /// Reaction target when the trigger was a comment.
    comment_id: Option<u64>,
    sender: Option<String>,
    event_kind: EventKind,
}

impl EventRef {
    fn from_event(event: &WebhookEvent) -> Option<Self> {
        match event {
            WebhookEvent::PullRequest {
                action,
                repo,
                installation_id,
                sender,
                pr,
            } => Some(Self {
                installation_id: *installation_id,
                repo: repo.clone(),
                pr_number: pr.number,
                comment_id: None,
                sender: Some(sender.clone()),
                event_kind: action.event_kind(),
            }),
            WebhookEvent::Comment {
                repo,
                installation_id,
                sender,
                issue_number,
                comment_id,
                ..
            } => Some(Self {
                installation_id: *installation_id,
                repo: repo.clone(),
                pr_number: *issue_number,
                comment_id: Some(*comment_id),
                sender: Some(sender.clone()),
                event_kind: EventKind::IssueComment,
            }),
            WebhookEvent::Review {
                repo,
                installation_id,
                sender,
                pr_number,
                ..
            } => Some(Self {
                installation_id: *installation_id,
                repo: repo.clone(),
                pr_number: *pr_number,
                comment_id: None,
                sender: Some(sender.clone()),
                event_kind: EventKind::ReviewComment,
            }),
            WebhookEvent::Installation { .. } => None,
        }
    }

    fn workflow_key(&self) -> WorkflowKey {
        WorkflowKey::new(self.repo.full_name(), self.pr_number)
    }
}

/// Entry point for one classified webhook event. Never returns an error:
/// the router is the failure boundary for the whole pipeline per event.
pub async fn handle_event(state: Arc<AppState>, event: WebhookEvent) {
    if let WebhookEvent::Installation { account, .. } = &event {
        info!(
            "Installation created for {}",
            account.as_deref().unwrap_or("unknown account")
        );
        return;
    }

    let trigger = match evaluate(&event) {
        Gate::Skip(reason) => {
            info!("Skipping event: {}", reason);
            return;
        }
        Gate::Proceed(trigger) => trigger,
    };

    let Some(event_ref) = EventRef::from_event(&event) else {
        return;
    };

    info!(
        "Handling {} for PR #{} in {} ({:?})",
        event_ref.event_kind, event_ref.pr_number, event_ref.repo, trigger
    );

    match trigger {
        Trigger::UnknownCommand { attempted } => {
            let body = format!(
                "Unknown command `{}`. Try `/ai-help` for the list of supported commands.",
                attempted
            );
            post_comment(&state, &event_ref, &body).await;
            react(&state, &event_ref, failure_reaction()).await;
        }
        Trigger::Help => {
            react(&state, &event_ref, ack_reaction()).await;
            post_comment(&state, &event_ref, &command::help_text()).await;
            react(&state, &event_ref, success_reaction()).await;
        }
        Trigger::Status => {
            react(&state, &event_ref, ack_reaction()).await;
            let body = render_status(&state, &event_ref).await;
            post_comment(&state, &event_ref, &body).await;
            react(&state, &event_ref, success_reaction()).await;
        }
        Trigger::ResolveConflicts { force } => {
            react(&state, &event_ref, ack_reaction()).await;
            resolve_conflicts(&state, &event_ref, force).await;
        }
        Trigger::Review { focus } => {
            react(&state, &event_ref, ack_reaction()).await;
            run_review(&state, &event_ref, focus).await;
        }
        Trigger::SuggestImprovements => {
            react(&state, &event_ref, ack_reaction()).await;
            run_review(&state, &event_ref, Some("improvements".to_string())).await;
        }
    }
}

async fn run_review(state: &Arc<AppState>, event_ref: &EventRef, focus: Option<String>) {
    let key = event_ref.workflow_key();
    let Some(record) = state
        .workflows
        .begin(key, &event_ref.event_kind.to_string())
        .await
    else {
        // Concurrent-run policy: reject, the user can re-trigger afterwards
        info!(
            "A review is already running for PR #{} in {}; event rejected",
            event_ref.pr_number, event_ref.repo
        );
        return;
    };
    let workflow_id = record.id.to_string();

    let collector = ContextCollector {
        github: state.github_client.as_ref(),
        tracker: state.tracker.as_deref(),
    };
    let context = match collector
        .gather(
            event_ref.installation_id,
            &event_ref.repo,
            event_ref.pr_number,
            event_ref.event_kind,
            event_ref.sender.clone(),
        )
        .await
    {
        Ok(context) => context,
        Err(e) => {
            fail_workflow(state, event_ref, record.id, &workflow_id, None, e).await;
            return;
        }
    };

    post_status(
        state,
        event_ref,
        &context.head_sha,
        CommitStatusState::Pending,
        "Review in progress",
    )
    .await;

    let provider =
        TreeKnowledgeProvider::new(state.github_client.clone(), event_ref.installation_id);
    let pipeline = AnalysisPipeline {
        knowledge_provider: &provider,
        completion: state.completion.as_ref(),
        weights: state.config.health_weights,
        llm_timeout: std::time::Duration::from_secs(state.config.llm_timeout_secs),
    };

    match pipeline.run(&workflow_id, &context, focus.as_deref()).await {
        Ok(result) => {
            let publisher = ResultPublisher {
                github: state.github_client.as_ref(),
                tracker: state.tracker.as_deref(),
                settings: publish_settings(state),
            };
            let target = PublishTarget {
                installation_id: event_ref.installation_id,
                repo: event_ref.repo.clone(),
                pr_number: event_ref.pr_number,
                head_sha: context.head_sha.clone(),
            };
            publisher
                .publish(&result, &target, &context.linked_tickets)
                .await;

            state
                .workflows
                .complete(
                    record.id,
                    WorkflowOutcome::Completed {
                        health_score: result.health_score,
                    },
                )
                .await;
            react(state, event_ref, success_reaction()).await;
            state
                .notifier
                .notify_review_complete(
                    &event_ref.repo,
                    event_ref.pr_number,
                    &workflow_id,
                    result.health_score,
                )
                .await;
        }
        Err(e) => {
            fail_workflow(
                state,
                event_ref,
                record.id,
                &workflow_id,
                Some(&context.head_sha),
                e,
            )
            .await;
        }
    }
}

/// The failure boundary: one explanatory comment, a confused reaction, an
/// error status when the commit is known, a notification, and a failed
/// workflow record. No partial report is ever posted.
async fn fail_workflow(
    state: &Arc<AppState>,
    event_ref: &EventRef,
    record_id: crate::registry::WorkflowId,
    workflow_id: &str,
    head_sha: Option<&str>,
    error: anyhow::Error,
) {
    let message = format!("{:#}", error);
    error!(
        "Review workflow {} failed for PR #{} in {}: {}",
        workflow_id, event_ref.pr_number, event_ref.repo, message
    );

    post_comment(state, event_ref, &render_error_comment(&message)).await;
    react(state, event_ref, failure_reaction()).await;
    if let Some(sha) = head_sha {
        post_status(state, event_ref, sha, CommitStatusState::Error, "Review failed").await;
    }
    state
        .notifier
        .notify_error(&event_ref.repo, event_ref.pr_number, workflow_id, &message)
        .await;
    state
        .workflows
        .complete(record_id, WorkflowOutcome::Failed { error: message })
        .await;
}

/// `/resolve-conflicts`: run the conflict stage alone and report, without a
/// full review workflow.
async fn resolve_conflicts(state: &Arc<AppState>, event_ref: &EventRef, force: bool) {
    let collector = ContextCollector {
        github: state.github_client.as_ref(),
        tracker: None,
    };
    let context = match collector
        .gather(
            event_ref.installation_id,
            &event_ref.repo,
            event_ref.pr_number,
            event_ref.event_kind,
            event_ref.sender.clone(),
        )
        .await
    {
        Ok(context) => context,
        Err(e) => {
            error!("Conflict check failed for PR #{}: {:#}", event_ref.pr_number, e);
            post_comment(state, event_ref, &render_error_comment(&format!("{:#}", e))).await;
            react(state, event_ref, failure_reaction()).await;
            return;
        }
    };

    // A clean merge short-circuits unless --force asked for the full report
    if context.mergeable == Some(true) && !force {
        post_comment(
            state,
            event_ref,
            "✅ No merge conflicts detected; nothing to resolve.",
        )
        .await;
        react(state, event_ref, success_reaction()).await;
        return;
    }

    let findings = conflict_check(&context);
    let mut body = String::from("🔀 **Conflict check**\n\n");
    for finding in &findings {
        body.push_str(&format!("- **{}**: {}\n", finding.title, finding.message));
    }
    post_comment(state, event_ref, &body).await;
    react(state, event_ref, success_reaction()).await;
}

async fn render_status(state: &Arc<AppState>, event_ref: &EventRef) -> String {
    let key = event_ref.workflow_key();
    let recent = state.workflows.recent(&key, 5).await;
    if recent.is_empty() {
        return "No review workflows recorded for this pull request within the retention window."
            .to_string();
    }

    let mut body = String::from("📋 **Review workflows for this pull request**\n\n");
    for record in recent {
        let score = record
            .health_score
            .map(|s| format!(", health {}/100", s))
            .unwrap_or_default();
        let error = record
            .error
            .map(|e| format!(", error: {}", e))
            .unwrap_or_default();
        body.push_str(&format!(
            "- `{}` - {} (started {}, trigger {}{}{})\n",
            record.id,
            record.status.as_str(),
            record.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            record.trigger,
            score,
            error
        ));
    }
    body
}

fn publish_settings(state: &AppState) -> PublishSettings {
    PublishSettings {
        display_cap: state.config.display_cap,
        inline_comments_per_file: state.config.inline_comments_per_file,
        inline_comments_total: state.config.inline_comments_total,
        health_failure_threshold: state.config.health_failure_threshold,
        coverage_threshold: state.config.coverage_threshold,
    }
}

async fn post_comment(state: &Arc<AppState>, event_ref: &EventRef, body: &str) {
    best_effort(
        "issue comment",
        state.github_client.create_issue_comment(
            event_ref.installation_id,
            &event_ref.repo,
            event_ref.pr_number,
            body,
        ),
    )
    .await;
}

async fn post_status(
    state: &Arc<AppState>,
    event_ref: &EventRef,
    sha: &str,
    status: CommitStatusState,
    description: &str,
) {
    let request = CommitStatusRequest {
        installation_id: event_ref.installation_id,
        repo: &event_ref.repo,
        sha,
        state: status,
        target_url: None,
        description: Some(description),
        context: COMMIT_STATUS_CONTEXT,
    };
    best_effort("commit status", state.github_client.post_commit_status(&request)).await;
}

async fn react(state: &Arc<AppState>, event_ref: &EventRef, reaction: Reaction) {
    match event_ref.comment_id {
        Some(comment_id) => {
            best_effort(
                "comment reaction",
                state.github_client.create_comment_reaction(
                    event_ref.installation_id,
                    &event_ref.repo,
                    comment_id,
                    reaction,
                ),
            )
            .await;
        }
        None => {
            best_effort(
                "issue reaction",
                state.github_client.create_issue_reaction(
                    event_ref.installation_id,
                    &event_ref.repo,
                    event_ref.pr_number,
                    reaction,
                ),
            )
            .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::PullRequestDetails;

    fn pr_event(action: PrAction, draft: bool) -> WebhookEvent {
        WebhookEvent::PullRequest {
            action,
            repo: RepoRef::new("acme", "widgets"),
            installation_id: 77,
            sender: "dev".to_string(),
            pr: PullRequestDetails {
                number: 12,
                draft,
                title: "Change".to_string(),
                head_sha: "abc".to_string(),
                base_sha: "def".to_string(),
                branch: "feature/x".to_string(),
            },
        }
    }

    fn comment_event(body: &str, on_pull_request: bool) -> WebhookEvent {
        WebhookEvent::Comment {
            repo: RepoRef::new("acme", "widgets"),
            installation_id: 77,
            sender: "dev".to_string(),
            issue_number: 12,
            comment_id: 900,
            body: body.to_string(),
            on_pull_request,
        }
    }

    #[test]
    fn test_draft_pr_is_skipped_without_collaborator_calls() {
        // evaluate is pure: skipping implies zero collaborator calls
        for action in [PrAction::Opened, PrAction::Synchronize, PrAction::Reopened] {
            assert_eq!(
                evaluate(&pr_event(action, true)),
                Gate::Skip("draft pull request")
            );
        }
    }

    #[test]
    fn test_ready_for_review_proceeds_even_when_draft_flagged() {
        assert_eq!(
            evaluate(&pr_event(PrAction::ReadyForReview, true)),
            Gate::Proceed(Trigger::Review { focus: None })
        );
    }

    #[test]
    fn test_non_draft_pr_proceeds() {
        assert_eq!(
            evaluate(&pr_event(PrAction::Opened, false)),
            Gate::Proceed(Trigger::Review { focus: None })
        );
    }

    #[test]
    fn test_comment_off_pull_request_skipped() {
        assert_eq!(
            evaluate(&comment_event("/ai-review", false)),
            Gate::Skip("comment is not on a pull request")
        );
    }

    #[test]
    fn test_non_command_comment_skipped() {
        assert_eq!(
            evaluate(&comment_event("Nice change!", true)),
            Gate::Skip("comment is not a command")
        );
    }

    #[test]
    fn test_command_comment_proceeds() {
        assert_eq!(
            evaluate(&comment_event("/ai-review security", true)),
            Gate::Proceed(Trigger::Review {
                focus: Some("security".to_string())
            })
        );
        assert_eq!(
            evaluate(&comment_event("/resolve-conflicts --force", true)),
            Gate::Proceed(Trigger::ResolveConflicts { force: true })
        );
        assert_eq!(
            evaluate(&comment_event("/ai-status", true)),
            Gate::Proceed(Trigger::Status)
        );
    }

    #[test]
    fn test_unknown_command_proceeds_for_help_pointer() {
        assert_eq!(
            evaluate(&comment_event("/deploy", true)),
            Gate::Proceed(Trigger::UnknownCommand {
                attempted: "/deploy".to_string()
            })
        );
    }

    #[test]
    fn test_review_event_with_command_proceeds() {
        let event = WebhookEvent::Review {
            repo: RepoRef::new("acme", "widgets"),
            installation_id: 77,
            sender: "dev".to_string(),
            pr_number: 12,
            body: Some("/suggest improvements".to_string()),
        };
        assert_eq!(
            evaluate(&event),
            Gate::Proceed(Trigger::SuggestImprovements)
        );
    }

    #[test]
    fn test_review_event_without_command_skipped() {
        let event = WebhookEvent::Review {
            repo: RepoRef::new("acme", "widgets"),
            installation_id: 77,
            sender: "dev".to_string(),
            pr_number: 12,
            body: Some("Looks good to me".to_string()),
        };
        assert_eq!(evaluate(&event), Gate::Skip("review body is not a command"));

        let empty = WebhookEvent::Review {
            repo: RepoRef::new("acme", "widgets"),
            installation_id: 77,
            sender: "dev".to_string(),
            pr_number: 12,
            body: None,
        };
        assert_eq!(evaluate(&empty), Gate::Skip("review has no body"));
    }

    #[test]
    fn test_installation_event_skipped() {
        let event = WebhookEvent::Installation {
            action: "created".to_string(),
            account: Some("acme".to_string()),
        };
        assert!(matches!(evaluate(&event), Gate::Skip(_)));
    }

    #[test]
    fn test_event_ref_targets_comment_for_reactions() {
        let event_ref = EventRef::from_event(&comment_event("/ai-review", true)).unwrap();
        assert_eq!(event_ref.comment_id, Some(900));
        assert_eq!(event_ref.pr_number, 12);

        let event_ref = EventRef::from_event(&pr_event(PrAction::Opened, false)).unwrap();
        assert_eq!(event_ref.comment_id, None);
        assert_eq!(event_ref.workflow_key(), WorkflowKey::new("acme/widgets", 12));
    }
}
