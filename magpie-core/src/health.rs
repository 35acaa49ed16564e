//! Health scoring for a review result.
//!
//! The exact weights are policy, not contract: they are carried as
//! configuration with conservative defaults. The load-bearing properties are
//! that critical findings cost more than warnings, warnings more than
//! suggestions, and a finding-free pull request scores 100.

use crate::review::FindingBuckets;

/// Per-severity penalty weights. Positives never reduce the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthWeights {
    pub critical: u32,
    pub warning: u32,
    pub suggestion: u32,
}

impl Default for HealthWeights {
    fn default() -> Self {
        Self {
            critical: 25,
            warning: 10,
            suggestion: 3,
        }
    }
}

/// Compute the 0-100 composite health score for a set of findings.
pub fn compute_health_score(buckets: &FindingBuckets, weights: HealthWeights) -> u8 {
    let penalty = buckets.critical.len() as u32 * weights.critical
        + buckets.warnings.len() as u32 * weights.warning
        + buckets.suggestions.len() as u32 * weights.suggestion;
    100u32.saturating_sub(penalty) as u8
}

/// Score bucket used for the quality label on the pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBucket {
    Excellent,
    Good,
    NeedsImprovement,
    Poor,
}

impl ScoreBucket {
    pub fn for_score(score: u8) -> Self {
        match score {
            90..=100 => ScoreBucket::Excellent,
            75..=89 => ScoreBucket::Good,
            60..=74 => ScoreBucket::NeedsImprovement,
            _ => ScoreBucket::Poor,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScoreBucket::Excellent => "review/excellent",
            ScoreBucket::Good => "review/good",
            ScoreBucket::NeedsImprovement => "review/needs-improvement",
            ScoreBucket::Poor => "review/poor",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ScoreBucket::Excellent => "excellent",
            ScoreBucket::Good => "good",
            ScoreBucket::NeedsImprovement => "needs improvement",
            ScoreBucket::Poor => "poor",
        }
    }
}
