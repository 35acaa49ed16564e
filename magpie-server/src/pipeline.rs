//! The analysis pipeline.
//!
//! Three named stages run against one `ReviewContext`: the conflict check,
//! codebase learning, and the AI review. The conflict check is independent
//! and runs concurrently with the learning→AI chain; the AI review is
//! ordered after learning because the knowledge feeds its prompt. Stages
//! settle rather than fail fast: a throwing stage contributes nothing and is
//! marked unsuccessful, and the pipeline errors only when every stage fails.

use anyhow::{Result, anyhow};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use magpie_core::{
    CodebaseKnowledge, CompletionService, Finding, FindingBuckets, HealthWeights,
    KnowledgeProvider, Recommendations, ReviewContext, ReviewResult, Severity, StagePerformance,
    basic_insights, compute_health_score, create_user_prompt, get_system_prompt,
    parse_review_payload, test_coverage_ratio,
};

pub const STAGE_CONFLICT_CHECK: &str = "conflictCheck";
pub const STAGE_CODEBASE_LEARNING: &str = "codebaseLearning";
pub const STAGE_AI_REVIEW: &str = "aiReview";

pub struct AnalysisPipeline<'a> {
    pub knowledge_provider: &'a dyn KnowledgeProvider,
    pub completion: &'a dyn CompletionService,
    pub weights: HealthWeights,
    pub llm_timeout: Duration,
}

struct StageRun {
    performance: StagePerformance,
    findings: Vec<Finding>,
    summary: Option<String>,
    recommendations: Option<Recommendations>,
}

impl StageRun {
    fn failed(duration_ms: u64) -> Self {
        Self {
            performance: StagePerformance {
                success: false,
                duration_ms,
            },
            findings: Vec::new(),
            summary: None,
            recommendations: None,
        }
    }

    fn succeeded(duration_ms: u64, findings: Vec<Finding>) -> Self {
        Self {
            performance: StagePerformance {
                success: true,
                duration_ms,
            },
            findings,
            summary: None,
            recommendations: None,
        }
    }
}

/// Pure conflict analysis over the gathered context: the host's mergeable
/// flag plus committed conflict markers in the patches.
pub fn conflict_check(context: &ReviewContext) -> Vec<Finding> {
    let mut findings = Vec::new();

    if context.mergeable == Some(false) {
        findings.push(Finding::new(
            Severity::Critical,
            "Merge conflict with base branch",
            "The host reports this pull request cannot be merged cleanly. Rebase onto the \
             base branch and resolve the conflicts before review feedback can land.",
        ));
    }

    for file in &context.changed_files {
        let Some(patch) = &file.patch else { continue };
        let has_markers = patch.lines().any(|line| {
            line.starts_with("+<<<<<<<") || line.starts_with("+=======") || line.starts_with("+>>>>>>>")
        });
        if has_markers {
            findings.push(
                Finding::new(
                    Severity::Critical,
                    "Conflict markers committed",
                    format!(
                        "{} adds unresolved conflict markers. Remove them and re-resolve the \
                         merge before this can be reviewed meaningfully.",
                        file.path
                    ),
                )
                .at(file.path.clone(), None),
            );
        }
    }

    if findings.is_empty() {
        findings.push(Finding::new(
            Severity::Positive,
            "No merge conflicts detected",
            "The change set merges cleanly against its base.",
        ));
    }

    findings
}

impl AnalysisPipeline<'_> {
    pub async fn run(
        &self,
        workflow_id: &str,
        context: &ReviewContext,
        focus: Option<&str>,
    ) -> Result<ReviewResult> {
        let pipeline_started = Instant::now();
        info!(
            "Starting analysis pipeline {} for PR #{} in {}",
            workflow_id, context.pr_number, context.repo
        );

        let conflict_task = async {
            let started = Instant::now();
            let findings = conflict_check(context);
            StageRun::succeeded(started.elapsed().as_millis() as u64, findings)
        };

        // aiReview depends on codebaseLearning's output, so the two form a
        // chain; the chain settles alongside the conflict check.
        let chain_task = async {
            let started = Instant::now();
            let (learning_run, knowledge) = match self.knowledge_provider.learn(context).await {
                Ok(knowledge) => {
                    let run = StageRun::succeeded(started.elapsed().as_millis() as u64, Vec::new());
                    (run, knowledge)
                }
                Err(e) => {
                    warn!("Stage {} failed: {:#}", STAGE_CODEBASE_LEARNING, e);
                    let run = StageRun::failed(started.elapsed().as_millis() as u64);
                    (run, CodebaseKnowledge::default())
                }
            };

            let ai_run = self.ai_review(context, &knowledge, focus).await;
            (learning_run, ai_run)
        };

        let (conflict_run, (learning_run, ai_run)) = tokio::join!(conflict_task, chain_task);

        let all_failed = !conflict_run.performance.success
            && !learning_run.performance.success
            && !ai_run.performance.success;
        if all_failed {
            return Err(anyhow!("All analysis stages failed"));
        }

        let mut stage_performance = BTreeMap::new();
        stage_performance.insert(
            STAGE_CONFLICT_CHECK.to_string(),
            conflict_run.performance.clone(),
        );
        stage_performance.insert(
            STAGE_CODEBASE_LEARNING.to_string(),
            learning_run.performance.clone(),
        );
        stage_performance.insert(STAGE_AI_REVIEW.to_string(), ai_run.performance.clone());

        let mut findings = FindingBuckets::default();
        findings.extend(conflict_run.findings);
        findings.extend(learning_run.findings);
        findings.extend(ai_run.findings);

        let summary = ai_run
            .summary
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| {
                format!(
                    "Automated review completed with {} finding(s).",
                    findings.total()
                )
            });

        let mut recommendations = ai_run.recommendations.unwrap_or_default();
        if !findings.critical.is_empty() && recommendations.immediate.is_empty() {
            recommendations.immediate.push(format!(
                "Address the {} critical finding(s) before merging.",
                findings.critical.len()
            ));
        }

        let health_score = compute_health_score(&findings, self.weights);
        let total_duration_ms = pipeline_started.elapsed().as_millis() as u64;

        info!(
            "Pipeline {} finished in {}ms with health score {}",
            workflow_id, total_duration_ms, health_score
        );

        Ok(ReviewResult {
            workflow_id: workflow_id.to_string(),
            health_score,
            summary,
            findings,
            recommendations,
            stage_performance,
            total_duration_ms,
            test_coverage: test_coverage_ratio(&context.changed_files),
        })
    }

    /// The AI stage never fails the pipeline: a failed or unparseable
    /// completion degrades to the deterministic basic insights derived from
    /// the codebase knowledge.
    async fn ai_review(
        &self,
        context: &ReviewContext,
        knowledge: &CodebaseKnowledge,
        focus: Option<&str>,
    ) -> StageRun {
        let started = Instant::now();
        let system_prompt = get_system_prompt();
        let user_prompt = create_user_prompt(context, knowledge, focus);

        let completion = tokio::time::timeout(
            self.llm_timeout,
            self.completion.complete(&system_prompt, &user_prompt),
        )
        .await;

        let payload = match completion {
            Ok(Ok(text)) => match parse_review_payload(&text) {
                Ok(payload) => Some(payload),
                Err(e) => {
                    warn!("Completion text was not parseable: {:#}", e);
                    None
                }
            },
            Ok(Err(e)) => {
                warn!("Completion call failed: {:#}", e);
                None
            }
            Err(_) => {
                warn!(
                    "Completion call timed out after {}s",
                    self.llm_timeout.as_secs()
                );
                None
            }
        };

        let (summary, findings, recommendations) = match payload {
            Some(payload) => {
                let (summary, findings, recommendations) = payload.into_domain();
                (summary, findings, Some(recommendations))
            }
            None => {
                let (summary, findings) = basic_insights(knowledge);
                (summary, findings, None)
            }
        };

        StageRun {
            performance: StagePerformance {
                success: true,
                duration_ms: started.elapsed().as_millis() as u64,
            },
            findings,
            summary: Some(summary),
            recommendations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use magpie_core::{ChangedFile, EventKind, FileStatus, RepoRef};

    struct FakeKnowledge {
        result: Option<CodebaseKnowledge>,
    }

    #[async_trait]
    impl KnowledgeProvider for FakeKnowledge {
        async fn learn(&self, _context: &ReviewContext) -> Result<CodebaseKnowledge> {
            self.result
                .clone()
                .ok_or_else(|| anyhow!("tree fetch failed"))
        }
    }

    struct FakeCompletion {
        response: Option<String>,
    }

    #[async_trait]
    impl CompletionService for FakeCompletion {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            self.response
                .clone()
                .ok_or_else(|| anyhow!("completion unavailable"))
        }
    }

    fn context(mergeable: Option<bool>) -> ReviewContext {
        let changed_files = vec![ChangedFile::new(
            "src/lib.rs",
            FileStatus::Modified,
            5,
            1,
            Some("@@ -1 +1,2 @@\n+fn noop() {}".to_string()),
        )];
        let diff_summary = magpie_core::summarize_changes(&changed_files);
        ReviewContext {
            repo: RepoRef::new("acme", "widgets"),
            pr_number: 3,
            head_sha: "abc".to_string(),
            base_sha: "def".to_string(),
            title: "Change".to_string(),
            body: None,
            branch: "feature/x".to_string(),
            mergeable,
            changed_files,
            diff_summary,
            linked_tickets: Vec::new(),
            event: EventKind::PullRequestOpened,
            requested_by: None,
        }
    }

    fn knowledge() -> CodebaseKnowledge {
        CodebaseKnowledge {
            related_files: vec!["src/util.rs".to_string()],
            functions: vec!["noop_twice".to_string()],
            constants: vec![],
            patterns: vec![],
        }
    }

    const GOOD_RESPONSE: &str = r#"{
        "summary": "One small issue.",
        "findings": [
            {"title": "Dead code", "message": "noop is unused", "severity": "suggestion",
             "file": "src/lib.rs", "line": 2}
        ],
        "recommendations": {"immediate": [], "shortTerm": ["Remove noop"], "longTerm": []}
    }"#;

    fn pipeline<'a>(
        knowledge_provider: &'a FakeKnowledge,
        completion: &'a FakeCompletion,
    ) -> AnalysisPipeline<'a> {
        AnalysisPipeline {
            knowledge_provider,
            completion,
            weights: HealthWeights::default(),
            llm_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_happy_path_uses_ai_payload() {
        let kp = FakeKnowledge {
            result: Some(knowledge()),
        };
        let cc = FakeCompletion {
            response: Some(GOOD_RESPONSE.to_string()),
        };
        let result = pipeline(&kp, &cc).run("wf-1", &context(Some(true)), None).await.unwrap();

        assert_eq!(result.summary, "One small issue.");
        assert_eq!(result.findings.suggestions.len(), 1);
        assert_eq!(result.recommendations.short_term, vec!["Remove noop"]);
        assert!(result.stage_performance.values().all(|p| p.success));
        assert_eq!(result.stage_performance.len(), 3);
        // Clean merge plus a single suggestion
        assert_eq!(result.findings.positive.len(), 1);
        assert_eq!(result.health_score, 97);
    }

    #[tokio::test]
    async fn test_learning_failure_still_produces_result() {
        let kp = FakeKnowledge { result: None };
        let cc = FakeCompletion {
            response: Some(GOOD_RESPONSE.to_string()),
        };
        let result = pipeline(&kp, &cc).run("wf-2", &context(Some(true)), None).await.unwrap();

        assert!(!result.stage_performance[STAGE_CODEBASE_LEARNING].success);
        assert!(result.stage_performance[STAGE_CONFLICT_CHECK].success);
        assert!(result.stage_performance[STAGE_AI_REVIEW].success);
        // The other stages still contributed findings
        assert!(result.findings.total() > 0);
    }

    #[tokio::test]
    async fn test_unparseable_completion_falls_back_to_basic_insights() {
        let kp = FakeKnowledge {
            result: Some(knowledge()),
        };
        let cc = FakeCompletion {
            response: Some("Sorry, I cannot help with that.".to_string()),
        };
        let result = pipeline(&kp, &cc).run("wf-3", &context(Some(true)), None).await.unwrap();

        let (expected_summary, expected_findings) = basic_insights(&knowledge());
        assert_eq!(result.summary, expected_summary);
        let fallback_titles: Vec<&str> = result
            .findings
            .suggestions
            .iter()
            .map(|f| f.title.as_str())
            .collect();
        let expected_titles: Vec<&str> =
            expected_findings.iter().map(|f| f.title.as_str()).collect();
        assert_eq!(fallback_titles, expected_titles);
        // Degradation is not a stage failure
        assert!(result.stage_performance[STAGE_AI_REVIEW].success);
    }

    #[tokio::test]
    async fn test_failed_completion_falls_back_identically() {
        let kp = FakeKnowledge {
            result: Some(knowledge()),
        };
        let erroring = FakeCompletion { response: None };
        let unparseable = FakeCompletion {
            response: Some("not json".to_string()),
        };

        let from_error = pipeline(&kp, &erroring)
            .run("wf-4", &context(Some(true)), None)
            .await
            .unwrap();
        let from_garbage = pipeline(&kp, &unparseable)
            .run("wf-5", &context(Some(true)), None)
            .await
            .unwrap();

        assert_eq!(from_error.summary, from_garbage.summary);
        assert_eq!(from_error.findings, from_garbage.findings);
    }

    #[tokio::test]
    async fn test_conflict_detected_adds_critical_finding() {
        let kp = FakeKnowledge {
            result: Some(CodebaseKnowledge::default()),
        };
        let cc = FakeCompletion { response: None };
        let result = pipeline(&kp, &cc).run("wf-6", &context(Some(false)), None).await.unwrap();

        assert_eq!(result.findings.critical.len(), 1);
        assert!(result.health_score < 100);
        // A default immediate recommendation points at the criticals
        assert!(!result.recommendations.immediate.is_empty());
    }

    #[test]
    fn test_conflict_check_flags_committed_markers() {
        let mut ctx = context(Some(true));
        ctx.changed_files[0].patch =
            Some("@@ -1 +1,3 @@\n+<<<<<<< HEAD\n+theirs\n+>>>>>>> main".to_string());
        let findings = conflict_check(&ctx);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Critical);
        assert_eq!(findings[0].file.as_deref(), Some("src/lib.rs"));
    }

    #[test]
    fn test_conflict_check_clean_merge_is_positive() {
        let findings = conflict_check(&context(Some(true)));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Positive);
    }
}
