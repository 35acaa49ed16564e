//! Result publishing.
//!
//! Renders one `ReviewResult` into channel-specific payloads and fans out
//! to the five sinks: summary comment, batched inline comments, labels,
//! commit status, and tracker comments. Sinks run concurrently; each sink's
//! failure is logged individually and never blocks the others.

use tracing::{info, warn};

use magpie_core::{
    Finding, ReviewResult, ScoreBucket, TicketRef, has_security_findings, truncate_for_display,
};

use crate::github::{
    CommitStatusRequest, CommitStatusState, GitHubClient, Reaction, ReviewComment,
};
use crate::tracker::TrackerClient;

pub const COMMIT_STATUS_CONTEXT: &str = "magpie/review";

pub const LABEL_CRITICAL_ISSUES: &str = "review/critical-issues";
pub const LABEL_NEEDS_TESTS: &str = "review/needs-tests";
pub const LABEL_SECURITY: &str = "review/security";

/// Presentation knobs, sourced from configuration.
#[derive(Debug, Clone, Copy)]
pub struct PublishSettings {
    pub display_cap: usize,
    pub inline_comments_per_file: usize,
    pub inline_comments_total: usize,
    pub health_failure_threshold: u8,
    pub coverage_threshold: f32,
}

/// Where the result goes.
#[derive(Debug, Clone)]
pub struct PublishTarget {
    pub installation_id: u64,
    pub repo: magpie_core::RepoRef,
    pub pr_number: u64,
    pub head_sha: String,
}

fn render_finding_line(finding: &Finding) -> String {
    let location = match (&finding.file, finding.line) {
        (Some(file), Some(line)) => format!(" (`{}:{}`)", file, line),
        (Some(file), None) => format!(" (`{}`)", file),
        _ => String::new(),
    };
    format!("- **{}**{}: {}", finding.title, location, finding.message)
}

fn render_finding_section(
    out: &mut String,
    heading: &str,
    findings: &[Finding],
    display_cap: usize,
) {
    if findings.is_empty() {
        return;
    }
    out.push_str(&format!("\n### {} ({})\n\n", heading, findings.len()));
    let (visible, hidden) = truncate_for_display(findings, display_cap);
    for finding in visible {
        out.push_str(&render_finding_line(finding));
        out.push('\n');
    }
    if hidden > 0 {
        out.push_str(&format!("- _…and {} more_\n", hidden));
    }
}

fn render_recommendation_section(out: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("\n**{}**\n", heading));
    for item in items {
        out.push_str(&format!("- {}\n", item));
    }
}

/// Render the summary comment markdown. Pure; truncation here never touches
/// the result itself.
pub fn render_summary(result: &ReviewResult, settings: &PublishSettings) -> String {
    let bucket = ScoreBucket::for_score(result.health_score);
    let mut out = format!(
        "🤖 **Code review complete**\n\n**Health score:** {}/100 ({})\n\n{}\n",
        result.health_score,
        bucket.describe(),
        result.summary
    );

    render_finding_section(
        &mut out,
        "Critical",
        &result.findings.critical,
        settings.display_cap,
    );
    render_finding_section(
        &mut out,
        "Warnings",
        &result.findings.warnings,
        settings.display_cap,
    );
    render_finding_section(
        &mut out,
        "Suggestions",
        &result.findings.suggestions,
        settings.display_cap,
    );
    render_finding_section(
        &mut out,
        "Positive",
        &result.findings.positive,
        settings.display_cap,
    );

    if !result.recommendations.is_empty() {
        out.push_str("\n### Recommendations\n");
        render_recommendation_section(&mut out, "Immediate", &result.recommendations.immediate);
        render_recommendation_section(&mut out, "Short term", &result.recommendations.short_term);
        render_recommendation_section(&mut out, "Long term", &result.recommendations.long_term);
    }

    if let Some(coverage) = result.test_coverage {
        out.push_str(&format!(
            "\n**Test coverage of change:** {:.0}%\n",
            coverage * 100.0
        ));
    }

    out.push_str("\n<details>\n<summary>Stage performance</summary>\n\n");
    for (stage, perf) in &result.stage_performance {
        let marker = if perf.success { "✅" } else { "❌" };
        out.push_str(&format!("- {} {} ({}ms)\n", marker, stage, perf.duration_ms));
    }
    out.push_str(&format!(
        "\nTotal: {}ms · Workflow: `{}`\n</details>\n",
        result.total_duration_ms, result.workflow_id
    ));

    out
}

/// Pick the findings to post inline: anything actionable with a file and
/// line, most severe first, capped per file and globally.
pub fn select_inline_comments(result: &ReviewResult, settings: &PublishSettings) -> Vec<ReviewComment> {
    let mut candidates: Vec<&Finding> = result
        .findings
        .critical
        .iter()
        .chain(result.findings.warnings.iter())
        .chain(result.findings.suggestions.iter())
        .filter(|finding| finding.is_inline())
        .collect();
    candidates.sort_by_key(|finding| finding.severity);

    let mut per_file: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    let mut comments = Vec::new();

    for finding in candidates {
        if comments.len() >= settings.inline_comments_total {
            break;
        }
        let file = finding.file.as_deref().unwrap_or_default();
        let count = per_file.entry(file).or_insert(0);
        if *count >= settings.inline_comments_per_file {
            continue;
        }
        *count += 1;

        let mut body = format!("**{}**\n\n{}", finding.title, finding.message);
        if let Some(code) = &finding.suggested_code {
            body.push_str(&format!("\n\n```suggestion\n{}\n```", code));
        }
        comments.push(ReviewComment {
            path: file.to_string(),
            line: finding.line.unwrap_or(1),
            side: "RIGHT".to_string(),
            body,
        });
    }

    comments
}

/// Labels derived deterministically from the result.
pub fn derive_labels(result: &ReviewResult, settings: &PublishSettings) -> Vec<String> {
    let mut labels = vec![ScoreBucket::for_score(result.health_score).label().to_string()];

    if !result.findings.critical.is_empty() {
        labels.push(LABEL_CRITICAL_ISSUES.to_string());
    }
    if result
        .test_coverage
        .is_some_and(|coverage| coverage < settings.coverage_threshold)
    {
        labels.push(LABEL_NEEDS_TESTS.to_string());
    }
    if has_security_findings(&result.findings) {
        labels.push(LABEL_SECURITY.to_string());
    }

    labels
}

/// Terminal commit status for the result: failure below the configured
/// health threshold even absent a hard error.
pub fn status_for_result(result: &ReviewResult, settings: &PublishSettings) -> CommitStatusState {
    if result.health_score >= settings.health_failure_threshold {
        CommitStatusState::Success
    } else {
        CommitStatusState::Failure
    }
}

fn render_ticket_comment(result: &ReviewResult, target: &PublishTarget) -> String {
    format!(
        "Automated review of https://github.com/{}/pull/{} completed with health score {}/100.",
        target.repo.full_name(),
        target.pr_number,
        result.health_score
    )
}

pub struct ResultPublisher<'a> {
    pub github: &'a GitHubClient,
    pub tracker: Option<&'a TrackerClient>,
    pub settings: PublishSettings,
}

impl ResultPublisher<'_> {
    /// Fan the result out to every sink. Best-effort throughout: a failed
    /// sink is logged and the rest still run.
    pub async fn publish(
        &self,
        result: &ReviewResult,
        target: &PublishTarget,
        tickets: &[TicketRef],
    ) {
        let summary_sink = async {
            let body = render_summary(result, &self.settings);
            if let Err(e) = self
                .github
                .create_issue_comment(
                    target.installation_id,
                    &target.repo,
                    target.pr_number,
                    &body,
                )
                .await
            {
                warn!("Summary comment sink failed: {:#}", e);
            }
        };

        let inline_sink = async {
            let comments = select_inline_comments(result, &self.settings);
            if comments.is_empty() {
                return;
            }
            let count = comments.len();
            if let Err(e) = self
                .github
                .create_review(
                    target.installation_id,
                    &target.repo,
                    target.pr_number,
                    "Inline findings from the automated review.",
                    comments,
                )
                .await
            {
                warn!("Inline comment sink failed ({} comments): {:#}", count, e);
            }
        };

        let label_sink = async {
            let labels = derive_labels(result, &self.settings);
            if let Err(e) = self
                .github
                .add_labels(target.installation_id, &target.repo, target.pr_number, &labels)
                .await
            {
                warn!("Label sink failed: {:#}", e);
            }
        };

        let status_sink = async {
            let state = status_for_result(result, &self.settings);
            let description = format!("Health score: {}/100", result.health_score);
            let request = CommitStatusRequest {
                installation_id: target.installation_id,
                repo: &target.repo,
                sha: &target.head_sha,
                state,
                target_url: None,
                description: Some(&description),
                context: COMMIT_STATUS_CONTEXT,
            };
            if let Err(e) = self.github.post_commit_status(&request).await {
                warn!("Status sink failed: {:#}", e);
            }
        };

        let tracker_sink = async {
            let Some(tracker) = self.tracker else { return };
            let body = render_ticket_comment(result, target);
            for ticket in tickets {
                // One ticket failing must not block the others
                if let Err(e) = tracker.add_comment(&ticket.key, &body).await {
                    warn!("Tracker sink failed for {}: {:#}", ticket.key, e);
                }
            }
        };

        // Sink order is unspecified; all five settle regardless of failures
        futures::join!(summary_sink, inline_sink, label_sink, status_sink, tracker_sink);

        info!(
            "Published review result {} for PR #{} in {}",
            result.workflow_id, target.pr_number, target.repo
        );
    }
}

/// Error comment for a pipeline-fatal failure. Either this or a full result
/// is published for an event, never both.
pub fn render_error_comment(message: &str) -> String {
    format!(
        "❌ **Code review failed**\n\n\
         I encountered an error while analyzing this pull request.\n\n\
         **Error:** {}\n\
         **Timestamp:** {}\n\n\
         You can retry with `/ai-review` once the cause is resolved.",
        message,
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// Acknowledgment and completion reactions, named for their semantics.
pub fn ack_reaction() -> Reaction {
    Reaction::Eyes
}

pub fn success_reaction() -> Reaction {
    Reaction::Rocket
}

pub fn failure_reaction() -> Reaction {
    Reaction::Confused
}
