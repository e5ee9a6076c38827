// Runtime Settings
// Environment-driven configuration shared by the runtime and the worker binary.

use crate::application::worker::constants::{
    DEFAULT_PARALLEL_AMOUNT, IDLE_SLEEP_DURATION, MAX_PARALLEL_AMOUNT,
};
use crate::domain::QueueNaming;
use crate::error::{AppError, Result};
use std::time::Duration;

pub const ENV_QUEUE_PREFIX: &str = "QUIVER_QUEUE_PREFIX";
pub const ENV_QUEUE_SUFFIX: &str = "QUIVER_QUEUE_SUFFIX";
pub const ENV_ENVIRONMENT: &str = "QUIVER_ENV";
pub const ENV_FAKER: &str = "QUIVER_FAKER";
pub const ENV_REGION: &str = "QUIVER_REGION";
pub const ENV_ACCESS_KEY_ID: &str = "QUIVER_ACCESS_KEY_ID";
pub const ENV_SECRET_ACCESS_KEY: &str = "QUIVER_SECRET_ACCESS_KEY";
pub const ENV_ENDPOINT_URL: &str = "QUIVER_ENDPOINT_URL";
pub const ENV_IDLE_SLEEP_SECS: &str = "QUIVER_IDLE_SLEEP_SECS";
pub const ENV_PARALLEL_AMOUNT: &str = "QUIVER_PARALLEL_AMOUNT";

/// Process-wide settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub queue_prefix: Option<String>,
    pub queue_suffix: Option<String>,
    pub environment: Option<String>,
    /// Use the in-memory broker instead of the real one
    pub faker: bool,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint_url: Option<String>,
    /// Back-off after a worker cycle that processed nothing
    pub idle_sleep: Duration,
    /// Executor count for parallel consumers
    pub parallel_amount: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            queue_prefix: None,
            queue_suffix: None,
            environment: None,
            faker: false,
            region: None,
            access_key_id: None,
            secret_access_key: None,
            endpoint_url: None,
            idle_sleep: IDLE_SLEEP_DURATION,
            parallel_amount: DEFAULT_PARALLEL_AMOUNT,
        }
    }
}

impl Settings {
    /// Load settings from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary key lookup (testable)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let faker = match non_blank(ENV_FAKER) {
            Some(raw) => parse_bool(ENV_FAKER, &raw)?,
            None => defaults.faker,
        };

        let idle_sleep = match non_blank(ENV_IDLE_SLEEP_SECS) {
            Some(raw) => Duration::from_secs(raw.trim().parse().map_err(|_| {
                AppError::Config(format!("{} must be a number of seconds: {}", ENV_IDLE_SLEEP_SECS, raw))
            })?),
            None => defaults.idle_sleep,
        };

        let parallel_amount = match non_blank(ENV_PARALLEL_AMOUNT) {
            Some(raw) => {
                let amount: usize = raw.trim().parse().map_err(|_| {
                    AppError::Config(format!("{} must be an integer: {}", ENV_PARALLEL_AMOUNT, raw))
                })?;
                if amount == 0 || amount > MAX_PARALLEL_AMOUNT {
                    return Err(AppError::Config(format!(
                        "{} must be between 1 and {}: {}",
                        ENV_PARALLEL_AMOUNT, MAX_PARALLEL_AMOUNT, amount
                    )));
                }
                amount
            }
            None => defaults.parallel_amount,
        };

        Ok(Self {
            queue_prefix: non_blank(ENV_QUEUE_PREFIX),
            queue_suffix: non_blank(ENV_QUEUE_SUFFIX),
            environment: non_blank(ENV_ENVIRONMENT),
            faker,
            region: non_blank(ENV_REGION),
            access_key_id: non_blank(ENV_ACCESS_KEY_ID),
            secret_access_key: non_blank(ENV_SECRET_ACCESS_KEY),
            endpoint_url: non_blank(ENV_ENDPOINT_URL),
            idle_sleep,
            parallel_amount,
        })
    }

    /// Queue naming derived from prefix/suffix
    pub fn naming(&self) -> QueueNaming {
        QueueNaming::new(self.queue_prefix.clone(), self.queue_suffix.clone())
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::Config(format!("{} must be a boolean: {}", key, raw))),
    }
}
