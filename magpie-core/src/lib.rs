pub mod completion;
pub mod context;
pub mod health;
pub mod knowledge;
pub mod prompt;
pub mod review;

pub use completion::{
    AiReviewPayload, CompletionClient, CompletionService, parse_review_payload,
};
pub use context::{
    ChangedFile, EventKind, FileStatus, RepoRef, ReviewContext, TicketRef, summarize_changes,
    test_coverage_ratio,
};
pub use health::{HealthWeights, ScoreBucket, compute_health_score};
pub use knowledge::{CodebaseKnowledge, KnowledgeProvider, basic_insights};
pub use prompt::{create_user_prompt, get_system_prompt};
pub use review::{
    Finding, FindingBuckets, Recommendations, ReviewResult, Severity, StagePerformance,
    has_security_findings, truncate_for_display,
};
