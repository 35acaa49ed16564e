use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Severity of a single review finding.
///
/// Ordering is by urgency: `Critical` sorts before `Warning`, which sorts
/// before `Suggestion` and `Positive`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Suggestion,
    Positive,
}

impl Severity {
    /// Parse a severity label from model output. Unknown labels map to
    /// `None` so callers can pick their own default.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "critical" | "error" | "blocker" | "high" => Some(Severity::Critical),
            "warning" | "warn" | "medium" => Some(Severity::Warning),
            "suggestion" | "info" | "low" | "nit" => Some(Severity::Suggestion),
            "positive" | "praise" => Some(Severity::Positive),
            _ => None,
        }
    }
}

/// One finding produced by an analysis stage. Findings are never mutated
/// after creation, only aggregated into buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "suggestedCode")]
    pub suggested_code: Option<String>,
}

impl Finding {
    pub fn new(severity: Severity, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            file: None,
            line: None,
            severity,
            reasoning: None,
            suggested_code: None,
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: Option<u64>) -> Self {
        self.file = Some(file.into());
        self.line = line;
        self
    }

    /// True when the finding carries both a file path and a line number, the
    /// prerequisite for posting it as an inline review comment.
    pub fn is_inline(&self) -> bool {
        self.file.is_some() && self.line.is_some()
    }
}

/// Findings grouped by severity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindingBuckets {
    pub critical: Vec<Finding>,
    pub warnings: Vec<Finding>,
    pub suggestions: Vec<Finding>,
    pub positive: Vec<Finding>,
}

impl FindingBuckets {
    pub fn push(&mut self, finding: Finding) {
        match finding.severity {
            Severity::Critical => self.critical.push(finding),
            Severity::Warning => self.warnings.push(finding),
            Severity::Suggestion => self.suggestions.push(finding),
            Severity::Positive => self.positive.push(finding),
        }
    }

    pub fn extend(&mut self, findings: impl IntoIterator<Item = Finding>) {
        for finding in findings {
            self.push(finding);
        }
    }

    pub fn total(&self) -> usize {
        self.critical.len() + self.warnings.len() + self.suggestions.len() + self.positive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// All findings in severity order (critical first).
    pub fn iter_all(&self) -> impl Iterator<Item = &Finding> {
        self.critical
            .iter()
            .chain(self.warnings.iter())
            .chain(self.suggestions.iter())
            .chain(self.positive.iter())
    }
}

/// Follow-up actions grouped by horizon.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
    pub immediate: Vec<String>,
    #[serde(rename = "shortTerm")]
    pub short_term: Vec<String>,
    #[serde(rename = "longTerm")]
    pub long_term: Vec<String>,
}

impl Recommendations {
    pub fn is_empty(&self) -> bool {
        self.immediate.is_empty() && self.short_term.is_empty() && self.long_term.is_empty()
    }
}

/// Timing and outcome of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagePerformance {
    pub success: bool,
    pub duration_ms: u64,
}

/// The complete outcome of one review run. Owned by the pipeline until it
/// is handed to the publisher; read-only thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResult {
    pub workflow_id: String,
    pub health_score: u8,
    pub summary: String,
    pub findings: FindingBuckets,
    pub recommendations: Recommendations,
    pub stage_performance: BTreeMap<String, StagePerformance>,
    pub total_duration_ms: u64,
    /// Ratio of changed test files to changed source files, when measurable.
    pub test_coverage: Option<f32>,
}

/// Split a list at the display cap. Returns the visible prefix and the
/// count of hidden items. Truncation is a presentation concern: the full
/// list stays on the `ReviewResult`.
pub fn truncate_for_display<T>(items: &[T], cap: usize) -> (&[T], usize) {
    if items.len() <= cap {
        (items, 0)
    } else {
        (&items[..cap], items.len() - cap)
    }
}

const SECURITY_KEYWORDS: &[&str] = &[
    "security",
    "vulnerab",
    "injection",
    "xss",
    "csrf",
    "secret",
    "credential",
    "hardcoded password",
    "unsanitized",
];

/// True when any critical or warning finding reads as security-relevant.
pub fn has_security_findings(buckets: &FindingBuckets) -> bool {
    buckets
        .critical
        .iter()
        .chain(buckets.warnings.iter())
        .any(|finding| {
            let text = format!("{} {}", finding.title, finding.message).to_lowercase();
            SECURITY_KEYWORDS.iter().any(|kw| text.contains(kw))
        })
}
