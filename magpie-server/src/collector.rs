//! Context collection.
//!
//! Builds the immutable `ReviewContext` for one triggering event. The PR
//! detail and file listing are the primary fetches and fail the pipeline;
//! every ticket lookup degrades individually to a bare key.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use magpie_core::{
    ChangedFile, EventKind, FileStatus, RepoRef, ReviewContext, TicketRef, summarize_changes,
};

use crate::github::GitHubClient;
use crate::tracker::TrackerClient;

static TICKET_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z][A-Z0-9]+-\d+)\b").expect("ticket key regex is valid"));

/// Scan free text for issue-tracker keys like `PROJ-123`, preserving first
/// appearance order and deduplicating.
pub fn extract_ticket_keys<'a>(texts: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut keys = Vec::new();
    for text in texts {
        for capture in TICKET_KEY_RE.captures_iter(text) {
            let key = capture[1].to_string();
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
    keys
}

pub struct ContextCollector<'a> {
    pub github: &'a GitHubClient,
    pub tracker: Option<&'a TrackerClient>,
}

impl ContextCollector<'_> {
    /// Gather everything the pipeline needs about one pull request.
    ///
    /// The same PR at the same commit may still yield different ticket
    /// content across calls: tickets mutate, and nothing is cached beyond
    /// this single gather.
    pub async fn gather(
        &self,
        installation_id: u64,
        repo: &RepoRef,
        pr_number: u64,
        event: EventKind,
        requested_by: Option<String>,
    ) -> Result<ReviewContext> {
        let pr = self
            .github
            .get_pull_request(installation_id, repo, pr_number)
            .await
            .context("Failed to fetch pull request detail")?;

        let files = self
            .github
            .list_pull_request_files(installation_id, repo, pr_number)
            .await
            .context("Failed to fetch pull request files")?;

        let changed_files: Vec<ChangedFile> = files
            .into_iter()
            .map(|file| {
                ChangedFile::new(
                    file.filename,
                    FileStatus::from_api(&file.status),
                    file.additions,
                    file.deletions,
                    file.patch,
                )
            })
            .collect();

        let diff_summary = summarize_changes(&changed_files);

        let title = pr.title.unwrap_or_default();
        let keys = extract_ticket_keys(
            [
                title.as_str(),
                pr.body.as_deref().unwrap_or_default(),
                pr.head.ref_name.as_str(),
            ]
            .into_iter(),
        );

        let mut linked_tickets = Vec::with_capacity(keys.len());
        for key in keys {
            let summary = match self.tracker {
                Some(tracker) => match tracker.get_summary(&key).await {
                    Ok(summary) => summary,
                    Err(e) => {
                        // Degrade to a bare key; the review proceeds
                        warn!("Failed to fetch ticket {}: {:#}", key, e);
                        None
                    }
                },
                None => None,
            };
            linked_tickets.push(TicketRef { key, summary });
        }

        info!(
            "Gathered context for PR #{} in {}: {} files, {} tickets",
            pr_number,
            repo,
            changed_files.len(),
            linked_tickets.len()
        );

        Ok(ReviewContext {
            repo: repo.clone(),
            pr_number,
            head_sha: pr.head.sha,
            base_sha: pr.base.sha,
            title,
            body: pr.body,
            branch: pr.head.ref_name,
            mergeable: pr.mergeable,
            changed_files,
            diff_summary,
            linked_tickets,
            event,
            requested_by,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_ticket_keys() {
        let keys = extract_ticket_keys(["Fixes PROJ-123 and WID-7", "branch/proj-999"]);
        assert_eq!(keys, vec!["PROJ-123", "WID-7"]);
    }

    #[test]
    fn test_extract_ticket_keys_dedupes_preserving_order() {
        let keys = extract_ticket_keys(["WID-7 then PROJ-1", "PROJ-1 again WID-7"]);
        assert_eq!(keys, vec!["WID-7", "PROJ-1"]);
    }

    #[test]
    fn test_extract_ticket_keys_ignores_near_misses() {
        // Lowercase, single-letter prefixes, and bare numbers do not match
        let keys = extract_ticket_keys(["proj-123", "A-1", "v1-2", "issue 42"]);
        assert!(keys.is_empty());
    }

    #[test]
    fn test_extract_ticket_keys_empty_input() {
        let keys = extract_ticket_keys(["", "no tickets here"]);
        assert!(keys.is_empty());
    }
}
