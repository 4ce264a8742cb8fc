use tokio::time::Duration;

use crate::util::errors::{Result, StdError};

pub const MACHINE_WAIT_ENV: &str = "METAL_CLUSTER_MACHINE_WAIT_SECONDS";
pub const CONFLICT_REQUEUE_ENV: &str = "METAL_CLUSTER_CONFLICT_REQUEUE_SECONDS";
pub const ERROR_REQUEUE_ENV: &str = "METAL_CLUSTER_ERROR_REQUEUE_SECONDS";
pub const BIND_ADDRESS_ENV: &str = "METAL_CLUSTER_BIND_ADDRESS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Requeue delay while machines of a deleting cluster still exist.
pub const DEFAULT_RECONCILER_REQUEUE: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Tunables of the cluster controller and its process.
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerConfig {
    /// Poll interval while a deleting cluster waits for its machines.
    pub machine_wait_requeue: Duration,
    /// Retry delay after a write lost an optimistic concurrency race.
    pub conflict_requeue: Duration,
    /// Retry delay for any other failed reconcile.
    pub error_requeue: Duration,
    pub bind_address: String,
    pub log_format: LogFormat,
    pub controller_name: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            machine_wait_requeue: DEFAULT_RECONCILER_REQUEUE,
            conflict_requeue: Duration::from_secs(1),
            error_requeue: Duration::from_secs(5 * 60),
            bind_address: "0.0.0.0:8080".to_string(),
            log_format: LogFormat::Compact,
            controller_name: "metalcluster".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, falling back to defaults for unset keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let seconds = |key: &str, default: Duration| -> Result<Duration> {
            match lookup(key) {
                None => Ok(default),
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|e| StdError::InvalidArgument(format!("{key}={raw:?}: {e}")).into()),
            }
        };

        let log_format = match lookup(LOG_FORMAT_ENV).as_deref().map(str::trim) {
            None | Some("") | Some("compact") => LogFormat::Compact,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(StdError::InvalidArgument(format!(
                    "{LOG_FORMAT_ENV}={other:?}: expected compact or json"
                ))
                .into())
            }
        };

        Ok(Self {
            machine_wait_requeue: seconds(MACHINE_WAIT_ENV, defaults.machine_wait_requeue)?,
            conflict_requeue: seconds(CONFLICT_REQUEUE_ENV, defaults.conflict_requeue)?,
            error_requeue: seconds(ERROR_REQUEUE_ENV, defaults.error_requeue)?,
            bind_address: lookup(BIND_ADDRESS_ENV).unwrap_or(defaults.bind_address),
            log_format,
            controller_name: defaults.controller_name,
        })
    }
}
