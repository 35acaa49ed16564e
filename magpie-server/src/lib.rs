pub mod collector;
pub mod command;
pub mod config;
pub mod events;
pub mod github;
pub mod knowledge;
pub mod notify;
pub mod pipeline;
pub mod publisher;
pub mod registry;
pub mod router;
pub mod tracker;
pub mod webhook;

use std::sync::Arc;

use magpie_core::CompletionService;

use crate::config::Config;
use crate::github::GitHubClient;
use crate::notify::Notifier;
use crate::registry::WorkflowStore;
use crate::tracker::TrackerClient;

/// Shared state for the webhook server. Everything here is either immutable
/// configuration, a client with its own interior synchronization, or the
/// workflow store - the only shared state mutated across events.
pub struct AppState {
    pub config: Config,
    pub github_client: Arc<GitHubClient>,
    pub completion: Arc<dyn CompletionService>,
    pub tracker: Option<Arc<TrackerClient>>,
    pub notifier: Notifier,
    pub workflows: Arc<dyn WorkflowStore>,
}
