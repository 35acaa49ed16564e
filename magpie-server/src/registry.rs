//! Workflow registry.
//!
//! Short-lived records of in-flight and completed review workflows. The
//! store is injectable so tests can drive eviction deterministically; the
//! only background state in the system is the in-memory map plus the sweep
//! loop that keeps it from leaking.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkflowId(Uuid);

impl WorkflowId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies the pull request a workflow runs for. At most one workflow
/// may be `Running` per key at any time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkflowKey {
    pub repo: String,
    pub pr_number: u64,
}

impl WorkflowKey {
    pub fn new(repo: impl Into<String>, pr_number: u64) -> Self {
        Self {
            repo: repo.into(),
            pr_number,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowRecord {
    pub id: WorkflowId,
    pub key: WorkflowKey,
    pub trigger: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: WorkflowStatus,
    pub health_score: Option<u8>,
    pub error: Option<String>,
}

/// Terminal outcome reported to `complete`.
#[derive(Debug, Clone)]
pub enum WorkflowOutcome {
    Completed { health_score: u8 },
    Failed { error: String },
}

/// Injectable store for workflow records.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Create a `Running` record for the key, or `None` when one is already
    /// running (concurrent-run policy: reject, not queue).
    async fn begin(&self, key: WorkflowKey, trigger: &str) -> Option<WorkflowRecord>;

    /// Finalize a record. Unknown IDs are logged and ignored: the record may
    /// already have been swept.
    async fn complete(&self, id: WorkflowId, outcome: WorkflowOutcome);

    async fn get_running(&self, key: &WorkflowKey) -> Option<WorkflowRecord>;

    /// Records for a key, most recent first.
    async fn recent(&self, key: &WorkflowKey, limit: usize) -> Vec<WorkflowRecord>;

    /// Evict records older than the retention window regardless of status.
    /// Returns the eviction count.
    async fn sweep_older_than(&self, retention: Duration) -> usize;
}

/// In-memory store. All records are lost on restart, which is acceptable:
/// the registry is leak prevention, not an audit log.
pub struct InMemoryWorkflowStore {
    records: RwLock<HashMap<WorkflowId, WorkflowRecord>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    async fn sweep_at(&self, now: DateTime<Utc>, retention: Duration) -> usize {
        let cutoff = now - retention;
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| record.started_at >= cutoff);
        before - records.len()
    }
}

impl Default for InMemoryWorkflowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn begin(&self, key: WorkflowKey, trigger: &str) -> Option<WorkflowRecord> {
        let mut records = self.records.write().await;
        let already_running = records
            .values()
            .any(|record| record.key == key && record.status == WorkflowStatus::Running);
        if already_running {
            return None;
        }

        let record = WorkflowRecord {
            id: WorkflowId::new(),
            key,
            trigger: trigger.to_string(),
            started_at: Utc::now(),
            completed_at: None,
            status: WorkflowStatus::Running,
            health_score: None,
            error: None,
        };
        records.insert(record.id, record.clone());
        Some(record)
    }

    async fn complete(&self, id: WorkflowId, outcome: WorkflowOutcome) {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(&id) else {
            warn!("Completing unknown workflow {}", id);
            return;
        };
        record.completed_at = Some(Utc::now());
        match outcome {
            WorkflowOutcome::Completed { health_score } => {
                record.status = WorkflowStatus::Completed;
                record.health_score = Some(health_score);
            }
            WorkflowOutcome::Failed { error } => {
                record.status = WorkflowStatus::Failed;
                record.error = Some(error);
            }
        }
    }

    async fn get_running(&self, key: &WorkflowKey) -> Option<WorkflowRecord> {
        let records = self.records.read().await;
        records
            .values()
            .find(|record| &record.key == key && record.status == WorkflowStatus::Running)
            .cloned()
    }

    async fn recent(&self, key: &WorkflowKey, limit: usize) -> Vec<WorkflowRecord> {
        let records = self.records.read().await;
        let mut matching: Vec<WorkflowRecord> = records
            .values()
            .filter(|record| &record.key == key)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        matching.truncate(limit);
        matching
    }

    async fn sweep_older_than(&self, retention: Duration) -> usize {
        self.sweep_at(Utc::now(), retention).await
    }
}

/// Background eviction loop. Runs until the process exits.
pub async fn sweep_loop(
    store: Arc<dyn WorkflowStore>,
    interval_secs: u64,
    retention_secs: u64,
) {
    let mut ticker = interval(std::time::Duration::from_secs(interval_secs));
    let retention = Duration::seconds(retention_secs as i64);

    loop {
        ticker.tick().await;
        let evicted = store.sweep_older_than(retention).await;
        if evicted > 0 {
            info!("Swept {} stale workflow record(s)", evicted);
        }
    }
}
