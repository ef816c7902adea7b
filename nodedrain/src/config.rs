//! Tunables of the drain protocol.
use crate::constants::{
    DEFAULT_POD_ALLOWANCE, DEFAULT_POLL_INTERVAL, GRACE_PERIOD_MULTIPLIER, GRACE_PERIOD_PADDING,
};
use crate::retry::RetryPolicy;

use snafu::{ensure, ResultExt};
use std::env;
use tokio::time::Duration;

const POLL_INTERVAL_ENV_VAR: &str = "DRAIN_POLL_INTERVAL_SECONDS";
const DEFAULT_POD_ALLOWANCE_ENV_VAR: &str = "DRAIN_DEFAULT_POD_ALLOWANCE_SECONDS";
const RETRY_ATTEMPTS_ENV_VAR: &str = "DRAIN_CONFLICT_RETRY_ATTEMPTS";

/// Use `DrainConfig::default()` or `DrainConfig::try_from_env()`, then the `with_*` setters. The setters reject
/// values the drain cannot run with, such as a zero poll interval.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DrainConfig {
    /// Interval between checks on whether evicted Pods have terminated.
    pub(crate) poll_interval: Duration,
    /// Wait allowance for an evicted Pod without a termination grace period.
    pub(crate) default_pod_allowance: Duration,
    pub(crate) grace_period_multiplier: u32,
    pub(crate) grace_period_padding: Duration,
    /// Policy for retrying conflicting or throttled writes.
    pub(crate) retry: RetryPolicy,
}

impl Default for DrainConfig {
    fn default() -> Self {
        DrainConfig {
            poll_interval: DEFAULT_POLL_INTERVAL,
            default_pod_allowance: DEFAULT_POD_ALLOWANCE,
            grace_period_multiplier: GRACE_PERIOD_MULTIPLIER,
            grace_period_padding: GRACE_PERIOD_PADDING,
            retry: RetryPolicy::default(),
        }
    }
}

impl DrainConfig {
    /// Builds a config from the defaults, overridden by any `DRAIN_*` environment variables that are set.
    pub fn try_from_env() -> Result<Self> {
        Self::try_from_lookup(|var| env::var(var).ok())
    }

    fn try_from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = DrainConfig::default();

        if let Some(seconds) = positive_from(&lookup, POLL_INTERVAL_ENV_VAR)? {
            config.poll_interval = Duration::from_secs(seconds);
        }
        if let Some(seconds) = positive_from(&lookup, DEFAULT_POD_ALLOWANCE_ENV_VAR)? {
            config.default_pod_allowance = Duration::from_secs(seconds);
        }
        if let Some(attempts) = positive_from(&lookup, RETRY_ATTEMPTS_ENV_VAR)? {
            config.retry.attempts = attempts as usize;
        }

        Ok(config)
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Result<Self> {
        ensure!(
            !poll_interval.is_zero(),
            error::ZeroDurationSnafu {
                setting: "poll_interval"
            }
        );
        self.poll_interval = poll_interval;
        Ok(self)
    }

    pub fn with_default_pod_allowance(mut self, allowance: Duration) -> Result<Self> {
        ensure!(
            !allowance.is_zero(),
            error::ZeroDurationSnafu {
                setting: "default_pod_allowance"
            }
        );
        self.default_pod_allowance = allowance;
        Ok(self)
    }

    /// Sets the total number of attempts for a conflicting or throttled write, including the first one.
    pub fn with_retry_attempts(mut self, attempts: usize) -> Result<Self> {
        ensure!(attempts > 0, error::ZeroAttemptsSnafu);
        self.retry.attempts = attempts;
        Ok(self)
    }

    pub fn with_grace_period_allowance(mut self, multiplier: u32, padding: Duration) -> Self {
        self.grace_period_multiplier = multiplier;
        self.grace_period_padding = padding;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn default_pod_allowance(&self) -> Duration {
        self.default_pod_allowance
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }
}

fn positive_from<F>(lookup: &F, var: &'static str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .map(|value| -> Result<u64> {
            let parsed: u64 = value.trim().parse().context(error::ParseEnvSnafu {
                var,
                value: value.clone(),
            })?;
            ensure!(parsed > 0, error::ZeroValueSnafu { var });
            Ok(parsed)
        })
        .transpose()
}

pub mod error {
    use snafu::Snafu;
    use std::num::ParseIntError;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub))]
    pub enum ConfigError {
        #[snafu(display(
            "Could not parse environment variable '{}={}': '{}'",
            var,
            value,
            source
        ))]
        ParseEnv {
            source: ParseIntError,
            var: &'static str,
            value: String,
        },

        #[snafu(display("Environment variable '{}' must be greater than zero", var))]
        ZeroValue { var: &'static str },

        #[snafu(display("Drain setting '{}' must be greater than zero", setting))]
        ZeroDuration { setting: &'static str },

        #[snafu(display("A write must be attempted at least once"))]
        ZeroAttempts,
    }
}

type Result<T> = std::result::Result<T, ConfigError>;
pub use error::ConfigError;
