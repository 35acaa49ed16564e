//! Codebase-knowledge contract.
//!
//! The provider is an external collaborator: implementations scan the
//! repository around the changed files and surface artifacts the reviewer
//! should know about. This module owns the data contract, the injectable
//! seam, and the deterministic fallback the AI stage degrades to when the
//! completion service fails.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::ReviewContext;
use crate::review::{Finding, Severity};

/// Artifacts discovered in files related to the change set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodebaseKnowledge {
    pub related_files: Vec<String>,
    pub functions: Vec<String>,
    pub constants: Vec<String>,
    pub patterns: Vec<String>,
}

impl CodebaseKnowledge {
    pub fn is_empty(&self) -> bool {
        self.related_files.is_empty()
            && self.functions.is_empty()
            && self.constants.is_empty()
            && self.patterns.is_empty()
    }
}

/// Injectable seam for codebase learning, so the pipeline can be exercised
/// with an in-memory fake.
#[async_trait]
pub trait KnowledgeProvider: Send + Sync {
    async fn learn(&self, context: &ReviewContext) -> Result<CodebaseKnowledge>;
}

const FALLBACK_ITEM_CAP: usize = 5;

/// Deterministic, non-AI insights derived mechanically from the codebase
/// knowledge. Used verbatim when the completion call fails or returns an
/// unparseable payload: for a fixed input the output is always identical.
pub fn basic_insights(knowledge: &CodebaseKnowledge) -> (String, Vec<Finding>) {
    if knowledge.is_empty() {
        let summary =
            "Automated analysis completed without AI assistance; no related codebase artifacts \
             were available to compare against."
                .to_string();
        return (summary, Vec::new());
    }

    let mut findings = Vec::new();

    if !knowledge.functions.is_empty() {
        let mut names = knowledge.functions.clone();
        names.sort();
        names.dedup();
        names.truncate(FALLBACK_ITEM_CAP);
        findings.push(Finding::new(
            Severity::Suggestion,
            "Align with existing helpers",
            format!(
                "Related files already define: {}. Check whether the change can reuse them \
                 instead of introducing parallel implementations.",
                names.join(", ")
            ),
        ));
    }

    if !knowledge.constants.is_empty() {
        let mut names = knowledge.constants.clone();
        names.sort();
        names.dedup();
        names.truncate(FALLBACK_ITEM_CAP);
        findings.push(Finding::new(
            Severity::Suggestion,
            "Reuse established constants",
            format!(
                "Constants defined nearby: {}. Prefer these over new literals for the same \
                 values.",
                names.join(", ")
            ),
        ));
    }

    if !knowledge.related_files.is_empty() {
        let mut files = knowledge.related_files.clone();
        files.sort();
        files.dedup();
        files.truncate(FALLBACK_ITEM_CAP);
        findings.push(Finding::new(
            Severity::Suggestion,
            "Related files worth checking",
            format!(
                "These files share a directory with the change set and may need matching \
                 updates: {}.",
                files.join(", ")
            ),
        ));
    }

    if !knowledge.patterns.is_empty() {
        let mut patterns = knowledge.patterns.clone();
        patterns.sort();
        patterns.dedup();
        patterns.truncate(FALLBACK_ITEM_CAP);
        findings.push(Finding::new(
            Severity::Suggestion,
            "Follow local conventions",
            format!("Conventions observed in related code: {}.", patterns.join(", ")),
        ));
    }

    let summary = format!(
        "Automated analysis completed without AI assistance. {} related file(s), {} function(s), \
         and {} constant(s) were surfaced from the surrounding codebase.",
        knowledge.related_files.len(),
        knowledge.functions.len(),
        knowledge.constants.len()
    );

    (summary, findings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_knowledge() -> CodebaseKnowledge {
        CodebaseKnowledge {
            related_files: vec!["src/auth/session.rs".to_string(), "src/auth/mod.rs".to_string()],
            functions: vec!["validate_token".to_string(), "refresh_session".to_string()],
            constants: vec!["SESSION_TTL_SECS".to_string()],
            patterns: vec!["snake_case modules".to_string()],
        }
    }

    #[test]
    fn test_basic_insights_empty_knowledge() {
        let (summary, findings) = basic_insights(&CodebaseKnowledge::default());
        assert!(summary.contains("without AI assistance"));
        assert!(findings.is_empty());
    }

    #[test]
    fn test_basic_insights_lists_artifacts() {
        let (summary, findings) = basic_insights(&sample_knowledge());
        assert!(summary.contains("2 related file(s)"));
        assert_eq!(findings.len(), 4);
        assert!(findings.iter().all(|f| f.severity == Severity::Suggestion));
        assert!(findings[0].message.contains("refresh_session"));
        assert!(findings[0].message.contains("validate_token"));
    }

    #[test]
    fn test_basic_insights_deterministic() {
        let knowledge = sample_knowledge();
        let first = basic_insights(&knowledge);
        let second = basic_insights(&knowledge);
        assert_eq!(first.0, second.0);
        assert_eq!(first.1, second.1);
    }

    #[test]
    fn test_basic_insights_sorted_regardless_of_input_order() {
        let mut shuffled = sample_knowledge();
        shuffled.functions.reverse();
        let (_, findings) = basic_insights(&shuffled);
        let (_, baseline) = basic_insights(&sample_knowledge());
        assert_eq!(findings, baseline);
    }
}
