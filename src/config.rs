//! Engine, server and provider configuration read from the environment

use crate::state_machine::WorkflowState;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Policies of the workflow engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Scheduled posts must be at least this far in the future
    pub min_lead_time: chrono::Duration,
    /// Scheduled posts must not be further out than this
    pub max_schedule_horizon: chrono::Duration,
    /// Non-terminal contexts idle for longer than this are expired
    pub inactivity_timeout: chrono::Duration,
    /// Error snapshots older than this are purged
    pub snapshot_retention: chrono::Duration,
    /// Bound for handlers that never leave the process
    pub handler_timeout: Duration,
    /// Bound for handlers that call generation or media collaborators
    pub collaborator_timeout: Duration,
    /// Bound for each per-platform publish call
    pub publish_timeout: Duration,
    /// Bound for writing one error snapshot
    pub snapshot_write_timeout: Duration,
    /// How long a delivery id is remembered for deduplication
    pub dedup_window: chrono::Duration,
    /// Delivery ids remembered per client
    pub dedup_capacity: usize,
    /// Where a "no" at confirmation sends the client
    pub restart_state: WorkflowState,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_lead_time: chrono::Duration::minutes(10),
            max_schedule_horizon: chrono::Duration::days(90),
            inactivity_timeout: chrono::Duration::minutes(60),
            snapshot_retention: chrono::Duration::days(14),
            handler_timeout: Duration::from_secs(5),
            collaborator_timeout: Duration::from_secs(30),
            publish_timeout: Duration::from_secs(60),
            snapshot_write_timeout: Duration::from_secs(2),
            dedup_window: chrono::Duration::minutes(10),
            dedup_capacity: 64,
            restart_state: WorkflowState::ContentTypeSelection,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let restart_state = std::env::var("POSTFLOW_RESTART_STATE")
            .ok()
            .and_then(|s| s.parse::<WorkflowState>().ok())
            .filter(|s| !s.is_terminal())
            .unwrap_or(defaults.restart_state);

        Self {
            min_lead_time: env_delta(
                "POSTFLOW_MIN_LEAD_MINUTES",
                chrono::Duration::try_minutes,
                defaults.min_lead_time,
            ),
            max_schedule_horizon: env_delta(
                "POSTFLOW_MAX_SCHEDULE_DAYS",
                chrono::Duration::try_days,
                defaults.max_schedule_horizon,
            ),
            inactivity_timeout: env_delta(
                "POSTFLOW_INACTIVITY_MINUTES",
                chrono::Duration::try_minutes,
                defaults.inactivity_timeout,
            ),
            snapshot_retention: env_delta(
                "POSTFLOW_SNAPSHOT_RETENTION_DAYS",
                chrono::Duration::try_days,
                defaults.snapshot_retention,
            ),
            collaborator_timeout: env_parse("POSTFLOW_COLLABORATOR_TIMEOUT_SECS")
                .map_or(defaults.collaborator_timeout, Duration::from_secs),
            restart_state,
            ..defaults
        }
    }
}

/// HTTP server and storage settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
    pub sweep_interval: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let db_path = std::env::var("POSTFLOW_DB_PATH").map_or_else(
            |_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(format!("{home}/.postflow/errors.db"))
            },
            PathBuf::from,
        );

        Self {
            port: env_parse("POSTFLOW_PORT").unwrap_or(8080),
            db_path,
            sweep_interval: Duration::from_secs(
                env_parse::<u64>("POSTFLOW_SWEEP_SECS").unwrap_or(60).max(1),
            ),
        }
    }
}

/// Credentials for the production collaborator adapters
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub openai_api_key: Option<String>,
    pub openai_model: Option<String>,
    pub openai_base_url: Option<String>,
    pub unsplash_access_key: Option<String>,
    pub pexels_api_key: Option<String>,
    pub pixabay_api_key: Option<String>,
    pub switchboard_api_key: Option<String>,
    pub switchboard_base_url: Option<String>,
    pub switchboard_template: Option<String>,
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        Self {
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            openai_model: std::env::var("OPENAI_MODEL").ok(),
            openai_base_url: std::env::var("OPENAI_BASE_URL").ok(),
            unsplash_access_key: std::env::var("UNSPLASH_ACCESS_KEY").ok(),
            pexels_api_key: std::env::var("PEXELS_API_KEY").ok(),
            pixabay_api_key: std::env::var("PIXABAY_API_KEY").ok(),
            switchboard_api_key: std::env::var("SWITCHBOARD_API_KEY").ok(),
            switchboard_base_url: std::env::var("SWITCHBOARD_BASE_URL").ok(),
            switchboard_template: std::env::var("SWITCHBOARD_TEMPLATE").ok(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_delta(
    key: &str,
    unit: fn(i64) -> Option<chrono::Duration>,
    default: chrono::Duration,
) -> chrono::Duration {
    delta_or(env_parse(key), unit, default)
}

/// `amount` of `unit`, or `default` when absent, negative or out of range
fn delta_or(
    amount: Option<i64>,
    unit: fn(i64) -> Option<chrono::Duration>,
    default: chrono::Duration,
) -> chrono::Duration {
    amount
        .filter(|n| *n >= 0)
        .and_then(unit)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = EngineConfig::default();
        assert!(config.min_lead_time > chrono::Duration::zero());
        assert!(config.max_schedule_horizon > config.min_lead_time);
        assert!(config.collaborator_timeout > config.handler_timeout);
        assert!(!config.restart_state.is_terminal());
    }

    #[test]
    fn test_out_of_range_durations_fall_back() {
        let default = chrono::Duration::days(14);
        assert_eq!(
            delta_or(Some(i64::MAX), chrono::Duration::try_days, default),
            default
        );
        assert_eq!(
            delta_or(Some(-3), chrono::Duration::try_minutes, default),
            default
        );
        assert_eq!(delta_or(None, chrono::Duration::try_days, default), default);
        assert_eq!(
            delta_or(Some(30), chrono::Duration::try_minutes, default),
            chrono::Duration::minutes(30)
        );
    }
}
