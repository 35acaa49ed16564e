//! Codebase knowledge gathered from the repository tree.
//!
//! Walks the directories touched by the change set, surfaces sibling files,
//! and pulls function/constant names from a bounded sample of them. This is
//! a deliberately shallow scan: its job is to feed names into the prompt
//! and the deterministic fallback, not to understand the code.

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

use magpie_core::{CodebaseKnowledge, KnowledgeProvider, ReviewContext};

use crate::github::GitHubClient;

/// Sibling files surfaced per review.
const RELATED_FILE_CAP: usize = 20;
/// Files whose contents are sampled for names.
const SAMPLE_FILE_CAP: usize = 5;

static FUNCTION_RE: Lazy<Regex> = Lazy::new(|| {
    // Covers fn/def/func/function declarations across the common languages.
    Regex::new(r"(?m)^\s*(?:pub\s+)?(?:async\s+)?(?:fn|def|func|function)\s+([A-Za-z_][A-Za-z0-9_]*)")
        .expect("function regex is valid")
});

static CONSTANT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:pub\s+)?(?:const|static|final)?\s*([A-Z][A-Z0-9_]{2,})\s*(?::[^=\n]+)?=")
        .expect("constant regex is valid")
});

/// Extract function names from file contents.
pub fn extract_functions(content: &str) -> Vec<String> {
    let names: BTreeSet<String> = FUNCTION_RE
        .captures_iter(content)
        .map(|c| c[1].to_string())
        .collect();
    names.into_iter().collect()
}

/// Extract UPPER_SNAKE constant names from file contents.
pub fn extract_constants(content: &str) -> Vec<String> {
    let names: BTreeSet<String> = CONSTANT_RE
        .captures_iter(content)
        .map(|c| c[1].to_string())
        .collect();
    names.into_iter().collect()
}

/// Naming and layout conventions observable from a set of paths.
pub fn observe_patterns(paths: &[String]) -> Vec<String> {
    let mut patterns = BTreeSet::new();
    for path in paths {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        if file_name == "mod.rs" {
            patterns.insert("mod.rs module layout".to_string());
        }
        if path.contains("/tests/") || path.starts_with("tests/") {
            patterns.insert("dedicated tests/ directories".to_string());
        }
        if file_name.contains(".spec.") || file_name.contains(".test.") {
            patterns.insert("colocated spec/test files".to_string());
        }
        if let Some((stem, _ext)) = file_name.rsplit_once('.') {
            if stem.contains('_') && stem.to_lowercase() == *stem {
                patterns.insert("snake_case file names".to_string());
            }
        }
    }
    patterns.into_iter().collect()
}

/// Knowledge provider backed by the repository tree at the PR head commit.
pub struct TreeKnowledgeProvider {
    github: Arc<GitHubClient>,
    installation_id: u64,
}

impl TreeKnowledgeProvider {
    pub fn new(github: Arc<GitHubClient>, installation_id: u64) -> Self {
        Self {
            github,
            installation_id,
        }
    }
}

#[async_trait]
impl KnowledgeProvider for TreeKnowledgeProvider {
    async fn learn(&self, context: &ReviewContext) -> Result<CodebaseKnowledge> {
        let tree = self
            .github
            .get_repository_tree(self.installation_id, &context.repo, &context.head_sha)
            .await?;

        let changed_paths: BTreeSet<&str> = context
            .changed_files
            .iter()
            .map(|f| f.path.as_str())
            .collect();
        let changed_dirs: BTreeSet<&str> = context
            .changed_files
            .iter()
            .map(|f| f.directory.as_str())
            .collect();

        // Sibling files: same directory as a change, not itself changed.
        let mut related_files: Vec<String> = tree
            .iter()
            .filter(|entry| {
                let dir = match entry.path.rsplit_once('/') {
                    Some((dir, _)) => dir,
                    None => ".",
                };
                changed_dirs.contains(dir) && !changed_paths.contains(entry.path.as_str())
            })
            .map(|entry| entry.path.clone())
            .collect();
        related_files.sort();
        related_files.truncate(RELATED_FILE_CAP);

        let mut functions = BTreeSet::new();
        let mut constants = BTreeSet::new();
        for path in related_files.iter().take(SAMPLE_FILE_CAP) {
            match self
                .github
                .get_file_contents(self.installation_id, &context.repo, path, &context.head_sha)
                .await
            {
                Ok(content) => {
                    functions.extend(extract_functions(&content));
                    constants.extend(extract_constants(&content));
                }
                Err(e) => {
                    // Binary or oversized files are expected here
                    warn!("Skipping knowledge sample {}: {:#}", path, e);
                }
            }
        }

        let patterns = observe_patterns(&related_files);

        info!(
            "Codebase learning found {} related files, {} functions, {} constants",
            related_files.len(),
            functions.len(),
            constants.len()
        );

        Ok(CodebaseKnowledge {
            related_files,
            functions: functions.into_iter().collect(),
            constants: constants.into_iter().collect(),
            patterns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_functions_across_languages() {
        let rust = "pub fn parse_token(s: &str) {}\nasync fn fetch_all() {}";
        assert_eq!(extract_functions(rust), vec!["fetch_all", "parse_token"]);

        let python = "def validate(self):\n    pass\ndef _private():\n    pass";
        assert_eq!(extract_functions(python), vec!["_private", "validate"]);

        let js = "function renderList(items) {}\n  const x = 1;";
        assert_eq!(extract_functions(js), vec!["renderList"]);

        let go = "func HandleRequest(w http.ResponseWriter) {}";
        assert_eq!(extract_functions(go), vec!["HandleRequest"]);
    }

    #[test]
    fn test_extract_functions_dedupes() {
        let content = "fn retry() {}\nfn retry() {}";
        assert_eq!(extract_functions(content), vec!["retry"]);
    }

    #[test]
    fn test_extract_constants() {
        let content = "const MAX_RETRIES: u32 = 3;\nstatic DEFAULT_TTL = 60\nlet lowercase = 1;";
        assert_eq!(extract_constants(content), vec!["DEFAULT_TTL", "MAX_RETRIES"]);
    }

    #[test]
    fn test_observe_patterns() {
        let paths = vec![
            "src/auth/mod.rs".to_string(),
            "src/token_cache.rs".to_string(),
            "tests/auth.rs".to_string(),
            "web/app.spec.ts".to_string(),
        ];
        let patterns = observe_patterns(&paths);
        assert!(patterns.contains(&"mod.rs module layout".to_string()));
        assert!(patterns.contains(&"snake_case file names".to_string()));
        assert!(patterns.contains(&"dedicated tests/ directories".to_string()));
        assert!(patterns.contains(&"colocated spec/test files".to_string()));
    }
}
