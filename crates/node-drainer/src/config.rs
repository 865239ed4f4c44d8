//! Runtime configuration.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Default tag carrying the owning cluster name.
pub const DEFAULT_OWNERSHIP_TAG: &str = "KubernetesCluster";

/// Default pause between cordoning and listing pods.
pub const DEFAULT_SETTLE_DELAY_SECS: u64 = 2;

/// Default pause before completing the lifecycle action.
pub const DEFAULT_COMPLETION_DELAY_SECS: u64 = 10;

/// Default directory for the host-local credential cache.
pub const DEFAULT_CACHE_DIR: &str = "/tmp";

const ENV_REGION: &str = "AWS_REGION";
const ENV_DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";
const ENV_GRACE_PERIOD: &str = "DRAIN_GRACE_PERIOD_SECONDS";
const ENV_COMPLETION_DELAY: &str = "LIFECYCLE_COMPLETION_DELAY_SECONDS";
const ENV_SETTLE_DELAY: &str = "DRAIN_SETTLE_DELAY_SECONDS";
const ENV_OWNERSHIP_TAG: &str = "CLUSTER_OWNERSHIP_TAG";
const ENV_CACHE_DIR: &str = "DRAINER_CACHE_DIR";
const ENV_COMPLETE_ON_MISSING_TAG: &str = "COMPLETE_ON_MISSING_TAG";
const ENV_ENDPOINT_URL: &str = "AWS_ENDPOINT_URL";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    /// A variable is set but cannot be parsed.
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Settings for one drainer process.
#[derive(Debug, Clone)]
pub struct DrainerConfig {
    /// AWS region of the Auto Scaling group and cluster.
    pub region: String,
    /// Overrides each pod's termination grace period when set.
    pub grace_period: Option<u32>,
    /// Pause before completing the lifecycle action; `None` disables it.
    pub completion_delay: Option<Duration>,
    /// Pause between cordon and pod enumeration.
    pub settle_delay: Duration,
    /// Tag key whose value names the owning cluster.
    pub ownership_tag: String,
    /// Directory holding the cached kubeconfig.
    pub cache_dir: PathBuf,
    /// Resolve the hook even when the ownership tag is missing.
    pub complete_on_missing_tag: bool,
    /// Single endpoint override for all AWS services.
    pub endpoint_url: Option<String>,
}

impl Default for DrainerConfig {
    fn default() -> Self {
        Self {
            region: String::new(),
            grace_period: None,
            completion_delay: Some(Duration::from_secs(DEFAULT_COMPLETION_DELAY_SECS)),
            settle_delay: Duration::from_secs(DEFAULT_SETTLE_DELAY_SECS),
            ownership_tag: DEFAULT_OWNERSHIP_TAG.to_string(),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            complete_on_missing_tag: false,
            endpoint_url: None,
        }
    }
}

impl DrainerConfig {
    /// Create configuration from environment variables.
    ///
    /// # Required Environment Variables
    /// - `AWS_REGION` or `AWS_DEFAULT_REGION`
    ///
    /// # Optional Environment Variables
    /// - `DRAIN_GRACE_PERIOD_SECONDS`: pod grace period override (default: pod value)
    /// - `LIFECYCLE_COMPLETION_DELAY_SECONDS`: delay before completing (default: 10, `0` disables)
    /// - `DRAIN_SETTLE_DELAY_SECONDS`: delay after cordon (default: 2)
    /// - `CLUSTER_OWNERSHIP_TAG`: ownership tag key (default: `KubernetesCluster`)
    /// - `DRAINER_CACHE_DIR`: kubeconfig cache directory (default: `/tmp`)
    /// - `COMPLETE_ON_MISSING_TAG`: resolve the hook for untagged instances (default: false)
    /// - `AWS_ENDPOINT_URL`: endpoint override for all AWS services
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let region = get(ENV_REGION)
            .or_else(|| get(ENV_DEFAULT_REGION))
            .ok_or(ConfigError::Missing(ENV_DEFAULT_REGION))?;

        let grace_period = get(ENV_GRACE_PERIOD)
            .map(|v| parse_number::<u32>(ENV_GRACE_PERIOD, &v))
            .transpose()?;

        let completion_delay = match get(ENV_COMPLETION_DELAY) {
            Some(v) => match parse_number::<u64>(ENV_COMPLETION_DELAY, &v)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            None => Some(Duration::from_secs(DEFAULT_COMPLETION_DELAY_SECS)),
        };

        let settle_delay = get(ENV_SETTLE_DELAY)
            .map(|v| parse_number::<u64>(ENV_SETTLE_DELAY, &v))
            .transpose()?
            .map_or(
                Duration::from_secs(DEFAULT_SETTLE_DELAY_SECS),
                Duration::from_secs,
            );

        let complete_on_missing_tag = match get(ENV_COMPLETE_ON_MISSING_TAG) {
            Some(v) => parse_bool(ENV_COMPLETE_ON_MISSING_TAG, &v)?,
            None => false,
        };

        Ok(Self {
            region,
            grace_period,
            completion_delay,
            settle_delay,
            ownership_tag: get(ENV_OWNERSHIP_TAG)
                .unwrap_or_else(|| DEFAULT_OWNERSHIP_TAG.to_string()),
            cache_dir: get(ENV_CACHE_DIR)
                .map_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR), PathBuf::from),
            complete_on_missing_tag,
            endpoint_url: get(ENV_ENDPOINT_URL),
        })
    }
}

fn parse_number<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: value.to_string(),
    })
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        }),
    }
}
