//! Bus configuration.
//!
//! [`BusConfig`] collects the knobs that change how an
//! [`EventBus`](crate::EventBus) registers and dispatches. It can be built in
//! code, deserialized as part of a host application's configuration, or read
//! from `KAWA_*` environment variables with [`BusConfig::from_env`].

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::shared::BusError;

pub const ENV_FAILURE_MODE: &str = "KAWA_FAILURE_MODE";
pub const ENV_DUPLICATE_POLICY: &str = "KAWA_DUPLICATE_POLICY";
pub const ENV_CATCH_PANICS: &str = "KAWA_CATCH_PANICS";
pub const ENV_DEFAULT_PRIORITY: &str = "KAWA_DEFAULT_PRIORITY";

/// What the dispatcher does when a listener fails
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureMode {
    /// Report the failure to the error handler and keep dispatching
    #[default]
    Continue,
    /// Stop at the first failure and return it to the publisher
    FailFast,
}

/// What register does with a subscription identical to an existing one
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Hand back the existing subscription's handle
    #[default]
    Ignore,
    /// Fail with [`BusError::DuplicateRegistration`]
    Reject,
    /// Store the duplicate as an independent subscription
    Allow,
}

/// Settings shared by the registry and dispatcher of one bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub failure_mode: FailureMode,
    pub duplicate_policy: DuplicatePolicy,
    /// Turn listener panics into [`ListenerError::Panicked`](crate::ListenerError::Panicked)
    pub catch_panics: bool,
    /// Priority for subscriptions that do not set one
    pub default_priority: i32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            failure_mode: FailureMode::Continue,
            duplicate_policy: DuplicatePolicy::Ignore,
            catch_panics: true,
            default_priority: 0,
        }
    }
}

impl BusConfig {
    /// Defaults overridden by any `KAWA_*` variables present in the environment
    pub fn from_env() -> Result<Self, BusError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the `KAWA_*` keys
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BusError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_FAILURE_MODE) {
            config.failure_mode = parse(ENV_FAILURE_MODE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_DUPLICATE_POLICY) {
            config.duplicate_policy = parse(ENV_DUPLICATE_POLICY, &raw)?;
        }
        if let Some(raw) = lookup(ENV_CATCH_PANICS) {
            config.catch_panics = parse(ENV_CATCH_PANICS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_DEFAULT_PRIORITY) {
            config.default_priority = parse(ENV_DEFAULT_PRIORITY, &raw)?;
        }

        Ok(config)
    }
}

fn parse<T>(key: &str, raw: &str) -> Result<T, BusError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .to_ascii_lowercase()
        .parse()
        .map_err(|e| BusError::Config(format!("{key}={raw:?}: {e}")))
}
