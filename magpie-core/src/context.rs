use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a repository by owner and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Change status of a file in a pull request diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl FileStatus {
    /// Map the status string from the host API ("added", "modified",
    /// "removed", "renamed", "changed", ...) onto the internal enum.
    pub fn from_api(status: &str) -> Self {
        match status {
            "added" => FileStatus::Added,
            "removed" => FileStatus::Deleted,
            "renamed" => FileStatus::Renamed,
            _ => FileStatus::Modified,
        }
    }
}

/// One file touched by the pull request, derived from the diff listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangedFile {
    pub path: String,
    pub status: FileStatus,
    pub additions: u32,
    pub deletions: u32,
    pub language: Option<String>,
    pub directory: String,
    /// Unified diff hunk for this file, when the host API provides one
    /// (binary and very large files come without a patch).
    pub patch: Option<String>,
}

impl ChangedFile {
    pub fn new(
        path: impl Into<String>,
        status: FileStatus,
        additions: u32,
        deletions: u32,
        patch: Option<String>,
    ) -> Self {
        let path = path.into();
        let language = language_for_path(&path);
        let directory = directory_of(&path);
        Self {
            path,
            status,
            additions,
            deletions,
            language,
            directory,
            patch,
        }
    }

    /// Heuristic: does this path look like a test file?
    pub fn is_test(&self) -> bool {
        let lower = self.path.to_lowercase();
        lower.starts_with("tests/")
            || lower.contains("/tests/")
            || lower.contains("/test/")
            || lower.contains("_test.")
            || lower.contains(".test.")
            || lower.contains(".spec.")
            || lower
                .rsplit('/')
                .next()
                .is_some_and(|name| name.starts_with("test_"))
    }
}

/// Best-effort language detection from the file extension.
pub fn language_for_path(path: &str) -> Option<String> {
    let ext = path.rsplit('.').next()?;
    let language = match ext {
        "rs" => "Rust",
        "py" => "Python",
        "js" | "jsx" | "mjs" => "JavaScript",
        "ts" | "tsx" => "TypeScript",
        "go" => "Go",
        "java" => "Java",
        "kt" | "kts" => "Kotlin",
        "rb" => "Ruby",
        "c" | "h" => "C",
        "cpp" | "cc" | "hpp" => "C++",
        "cs" => "C#",
        "swift" => "Swift",
        "php" => "PHP",
        "sh" | "bash" => "Shell",
        "sql" => "SQL",
        "tf" => "Terraform",
        "yaml" | "yml" => "YAML",
        "toml" => "TOML",
        "json" => "JSON",
        "md" => "Markdown",
        _ => return None,
    };
    Some(language.to_string())
}

/// Parent directory of a path, or "." for top-level files.
pub fn directory_of(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, _)) => dir.to_string(),
        None => ".".to_string(),
    }
}

/// A ticket in the external issue tracker linked to the pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRef {
    pub key: String,
    pub summary: Option<String>,
}

/// The webhook event that triggered a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    PullRequestOpened,
    PullRequestSynchronize,
    PullRequestReopened,
    PullRequestReadyForReview,
    IssueComment,
    ReviewComment,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::PullRequestOpened => "pull_request.opened",
            EventKind::PullRequestSynchronize => "pull_request.synchronize",
            EventKind::PullRequestReopened => "pull_request.reopened",
            EventKind::PullRequestReadyForReview => "pull_request.ready_for_review",
            EventKind::IssueComment => "issue_comment.created",
            EventKind::ReviewComment => "pull_request_review.submitted",
        };
        write!(f, "{}", name)
    }
}

/// Everything the analysis pipeline needs to know about one pull request.
/// Built once per triggering event and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct ReviewContext {
    pub repo: RepoRef,
    pub pr_number: u64,
    pub head_sha: String,
    pub base_sha: String,
    pub title: String,
    pub body: Option<String>,
    pub branch: String,
    /// Mergeability as reported by the host, when it has computed it.
    pub mergeable: Option<bool>,
    pub changed_files: Vec<ChangedFile>,
    pub diff_summary: String,
    pub linked_tickets: Vec<TicketRef>,
    pub event: EventKind,
    pub requested_by: Option<String>,
}

/// One-paragraph description of the change set, used in the prompt and in
/// the published summary.
pub fn summarize_changes(files: &[ChangedFile]) -> String {
    let additions: u32 = files.iter().map(|f| f.additions).sum();
    let deletions: u32 = files.iter().map(|f| f.deletions).sum();
    let mut summary = format!(
        "{} file(s) changed, +{} / -{}",
        files.len(),
        additions,
        deletions
    );
    for file in files {
        let marker = match file.status {
            FileStatus::Added => "A",
            FileStatus::Modified => "M",
            FileStatus::Deleted => "D",
            FileStatus::Renamed => "R",
        };
        summary.push_str(&format!(
            "\n{} {} (+{} / -{})",
            marker, file.path, file.additions, file.deletions
        ));
    }
    summary
}

/// Ratio of changed test files to changed source files, or `None` when the
/// change set contains no source files to measure against.
pub fn test_coverage_ratio(files: &[ChangedFile]) -> Option<f32> {
    let source = files
        .iter()
        .filter(|f| f.language.is_some() && !f.is_test() && f.status != FileStatus::Deleted)
        .count();
    if source == 0 {
        return None;
    }
    let tests = files
        .iter()
        .filter(|f| f.is_test() && f.status != FileStatus::Deleted)
        .count();
    Some(tests as f32 / source as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_status_from_api() {
        assert_eq!(FileStatus::from_api("added"), FileStatus::Added);
        assert_eq!(FileStatus::from_api("removed"), FileStatus::Deleted);
        assert_eq!(FileStatus::from_api("renamed"), FileStatus::Renamed);
        assert_eq!(FileStatus::from_api("modified"), FileStatus::Modified);
        // Unknown statuses degrade to Modified rather than failing
        assert_eq!(FileStatus::from_api("changed"), FileStatus::Modified);
    }

    #[test]
    fn test_changed_file_derives_language_and_directory() {
        let file = ChangedFile::new("src/server/handlers.rs", FileStatus::Modified, 10, 2, None);
        assert_eq!(file.language.as_deref(), Some("Rust"));
        assert_eq!(file.directory, "src/server");
    }

    #[test]
    fn test_top_level_file_directory() {
        let file = ChangedFile::new("README.md", FileStatus::Modified, 1, 0, None);
        assert_eq!(file.directory, ".");
    }

    #[test]
    fn test_is_test_detection() {
        let cases = [
            ("tests/integration.rs", true),
            ("src/tests/mod.rs", true),
            ("src/parser_test.go", true),
            ("web/app.spec.ts", true),
            ("src/test_utils_helper/main.rs", false),
            ("pkg/test_helpers.py", true),
            ("src/parser.rs", false),
        ];
        for (path, expected) in cases {
            let file = ChangedFile::new(path, FileStatus::Modified, 1, 1, None);
            assert_eq!(file.is_test(), expected, "path: {}", path);
        }
    }

    #[test]
    fn test_summarize_changes() {
        let files = vec![
            ChangedFile::new("src/lib.rs", FileStatus::Modified, 12, 3, None),
            ChangedFile::new("src/new.rs", FileStatus::Added, 40, 0, None),
        ];
        let summary = summarize_changes(&files);
        assert!(summary.starts_with("2 file(s) changed, +52 / -3"));
        assert!(summary.contains("M src/lib.rs (+12 / -3)"));
        assert!(summary.contains("A src/new.rs (+40 / -0)"));
    }

    #[test]
    fn test_coverage_ratio_no_source_files() {
        let files = vec![ChangedFile::new("README.md", FileStatus::Modified, 1, 0, None)];
        // Markdown counts as a source language; docs-only changes still measure.
        assert_eq!(test_coverage_ratio(&files), Some(0.0));

        let files = vec![ChangedFile::new("LICENSE", FileStatus::Modified, 1, 0, None)];
        assert_eq!(test_coverage_ratio(&files), None);
    }

    #[test]
    fn test_coverage_ratio_counts_tests() {
        let files = vec![
            ChangedFile::new("src/parser.rs", FileStatus::Modified, 10, 2, None),
            ChangedFile::new("src/lexer.rs", FileStatus::Modified, 5, 1, None),
            ChangedFile::new("tests/parser.rs", FileStatus::Added, 30, 0, None),
        ];
        assert_eq!(test_coverage_ratio(&files), Some(0.5));
    }

    #[test]
    fn test_event_kind_display() {
        assert_eq!(
            EventKind::PullRequestOpened.to_string(),
            "pull_request.opened"
        );
        assert_eq!(EventKind::IssueComment.to_string(), "issue_comment.created");
    }
}
