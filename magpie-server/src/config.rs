use anyhow::{Context, Result};
use std::env;

use magpie_core::HealthWeights;

#[derive(Clone)]
pub struct Config {
    pub github_app_id: u64,
    pub github_private_key: String,
    pub github_webhook_secret: String,
    pub llm_api_key: String,
    pub llm_model: String,
    pub llm_timeout_secs: u64,
    /// Issue-tracker base URL; when unset the tracker sink is inert.
    pub tracker_base_url: Option<String>,
    pub tracker_token: Option<String>,
    /// Notification webhook URL; when unset notifications are inert.
    pub notify_url: Option<String>,
    pub port: u16,
    /// Commit status is set to failure below this health score.
    pub health_failure_threshold: u8,
    /// Per-severity penalty weights for the health score. Policy, not
    /// contract: only the severity ordering is load-bearing.
    pub health_weights: HealthWeights,
    /// The needs-tests label is applied below this test-coverage ratio.
    pub coverage_threshold: f32,
    /// Findings shown per section of the summary comment.
    pub display_cap: usize,
    pub inline_comments_per_file: usize,
    pub inline_comments_total: usize,
    pub workflow_retention_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let github_app_id = env::var("GITHUB_APP_ID")
            .context("GITHUB_APP_ID environment variable is required")?
            .parse::<u64>()
            .context("GITHUB_APP_ID must be a valid number")?;

        let github_private_key = env::var("GITHUB_PRIVATE_KEY")
            .context("GITHUB_PRIVATE_KEY environment variable is required")?
            .replace("\\n", "\n");

        let github_webhook_secret = env::var("GITHUB_WEBHOOK_SECRET")
            .context("GITHUB_WEBHOOK_SECRET environment variable is required")?;

        let llm_api_key =
            env::var("LLM_API_KEY").context("LLM_API_KEY environment variable is required")?;

        let llm_model = env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());

        let llm_timeout_secs = env::var("LLM_TIMEOUT_SECS")
            .unwrap_or_else(|_| "120".to_string())
            .parse::<u64>()
            .context("LLM_TIMEOUT_SECS must be a valid number")?;

        let tracker_base_url = parse_optional_setting(env::var("TRACKER_BASE_URL").ok());
        let tracker_token = parse_optional_setting(env::var("TRACKER_TOKEN").ok());
        let notify_url = parse_optional_setting(env::var("NOTIFY_URL").ok());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let health_failure_threshold = env::var("HEALTH_FAILURE_THRESHOLD")
            .unwrap_or_else(|_| "60".to_string())
            .parse::<u8>()
            .context("HEALTH_FAILURE_THRESHOLD must be a number between 0 and 100")?;

        let defaults = HealthWeights::default();
        let health_weights = HealthWeights {
            critical: env::var("HEALTH_WEIGHT_CRITICAL")
                .unwrap_or_else(|_| defaults.critical.to_string())
                .parse::<u32>()
                .context("HEALTH_WEIGHT_CRITICAL must be a valid number")?,
            warning: env::var("HEALTH_WEIGHT_WARNING")
                .unwrap_or_else(|_| defaults.warning.to_string())
                .parse::<u32>()
                .context("HEALTH_WEIGHT_WARNING must be a valid number")?,
            suggestion: env::var("HEALTH_WEIGHT_SUGGESTION")
                .unwrap_or_else(|_| defaults.suggestion.to_string())
                .parse::<u32>()
                .context("HEALTH_WEIGHT_SUGGESTION must be a valid number")?,
        };

        let coverage_threshold = env::var("COVERAGE_THRESHOLD")
            .unwrap_or_else(|_| "0.5".to_string())
            .parse::<f32>()
            .context("COVERAGE_THRESHOLD must be a valid ratio")?;

        let display_cap = env::var("DISPLAY_CAP")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<usize>()
            .context("DISPLAY_CAP must be a valid number")?;

        let inline_comments_per_file = env::var("INLINE_COMMENTS_PER_FILE")
            .unwrap_or_else(|_| "3".to_string())
            .parse::<usize>()
            .context("INLINE_COMMENTS_PER_FILE must be a valid number")?;

        let inline_comments_total = env::var("INLINE_COMMENTS_TOTAL")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<usize>()
            .context("INLINE_COMMENTS_TOTAL must be a valid number")?;

        let workflow_retention_secs = env::var("WORKFLOW_RETENTION_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse::<u64>()
            .context("WORKFLOW_RETENTION_SECS must be a valid number")?;

        let sweep_interval_secs = env::var("SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse::<u64>()
            .context("SWEEP_INTERVAL_SECS must be a valid number")?;

        Ok(Config {
            github_app_id,
            github_private_key,
            github_webhook_secret,
            llm_api_key,
            llm_model,
            llm_timeout_secs,
            tracker_base_url,
            tracker_token,
            notify_url,
            port,
            health_failure_threshold,
            health_weights,
            coverage_threshold,
            display_cap,
            inline_comments_per_file,
            inline_comments_total,
            workflow_retention_secs,
            sweep_interval_secs,
        })
    }
}

/// Normalize an optional setting: missing, empty, or whitespace-only values
/// all read as unset, so an empty TRACKER_BASE_URL does not produce a
/// half-configured client.
pub fn parse_optional_setting(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_optional_setting_none() {
        assert_eq!(parse_optional_setting(None), None);
    }

    #[test]
    fn test_parse_optional_setting_empty() {
        assert_eq!(parse_optional_setting(Some("".to_string())), None);
        assert_eq!(parse_optional_setting(Some("   ".to_string())), None);
        assert_eq!(parse_optional_setting(Some("\t\n".to_string())), None);
    }

    #[test]
    fn test_parse_optional_setting_valid() {
        assert_eq!(
            parse_optional_setting(Some("https://tracker.example.com".to_string())),
            Some("https://tracker.example.com".to_string())
        );
    }
}
