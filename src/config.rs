use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::{domain::entities::environment::Environment, errors::VerifyError};

/// Resolved verifier configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VerifierConfig {
    /// App-specific shared secret, sent as `password`. Required for receipts
    /// that contain auto-renewable subscriptions.
    pub secret: Option<String>,
    /// Drop purchases whose expiration date is in the past.
    pub ignore_expired: bool,
    /// Environments to try, in the order given by the caller.
    pub environment: Vec<Environment>,
    /// Dump requests and responses at debug level.
    pub verbose: bool,
    /// Enrich purchases with subscription and renewal metadata.
    pub extended: bool,
    /// Accept status 21006 (expired subscription) as a soft success.
    pub ignore_expired_error: bool,
    /// Ask the platform to only return the latest renewal transaction.
    pub exclude_old_transactions: bool,
    /// Keep purchases without an expiration date in the final result.
    #[serde(alias = "doNotRemoveNonSubscriptions")]
    pub keep_non_subscriptions: bool,
    pub request_defaults: RequestDefaults,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestDefaults {
    /// Request timeout in milliseconds.
    pub timeout: Option<u64>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            secret: None,
            ignore_expired: true,
            environment: vec![Environment::Production],
            verbose: false,
            extended: false,
            ignore_expired_error: false,
            exclude_old_transactions: false,
            keep_non_subscriptions: false,
            request_defaults: RequestDefaults::default(),
        }
    }
}

impl VerifierConfig {
    /// Returns a copy of `self` with every value set in `overrides` replaced.
    pub fn merged(&self, overrides: &ConfigOverrides) -> Self {
        Self {
            secret: overrides.secret.clone().or_else(|| self.secret.clone()),
            ignore_expired: overrides.ignore_expired.unwrap_or(self.ignore_expired),
            environment: overrides
                .environment
                .clone()
                .unwrap_or_else(|| self.environment.clone()),
            verbose: overrides.verbose.unwrap_or(self.verbose),
            extended: overrides.extended.unwrap_or(self.extended),
            ignore_expired_error: overrides
                .ignore_expired_error
                .unwrap_or(self.ignore_expired_error),
            exclude_old_transactions: overrides
                .exclude_old_transactions
                .unwrap_or(self.exclude_old_transactions),
            keep_non_subscriptions: overrides
                .keep_non_subscriptions
                .unwrap_or(self.keep_non_subscriptions),
            request_defaults: RequestDefaults {
                timeout: overrides.timeout.or(self.request_defaults.timeout),
            },
        }
    }

    /// Applies the checks `ConfigOverrides::from_value` makes on JSON input to
    /// a configuration built in code.
    pub fn validate(&self) -> Result<(), VerifyError> {
        if self.environment.is_empty() || self.environment.len() > 2 {
            return Err(VerifyError::input(
                "environment",
                "\"environment\" must contain between 1 and 2 items",
            ));
        }
        if self.environment.len() == 2 && self.environment[0] == self.environment[1] {
            return Err(VerifyError::input(
                "environment",
                "\"environment\" contains a duplicate value",
            ));
        }
        if self.request_defaults.timeout == Some(0) {
            return Err(VerifyError::input(
                "requestDefaults.timeout",
                "\"requestDefaults.timeout\" must be greater than or equal to 1",
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_defaults.timeout.map(Duration::from_millis)
    }
}

/// Partial configuration. Unset values fall through to the next layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub secret: Option<String>,
    pub ignore_expired: Option<bool>,
    pub environment: Option<Vec<Environment>>,
    pub verbose: Option<bool>,
    pub extended: Option<bool>,
    pub ignore_expired_error: Option<bool>,
    pub exclude_old_transactions: Option<bool>,
    pub keep_non_subscriptions: Option<bool>,
    /// Milliseconds.
    pub timeout: Option<u64>,
}

const BOOLEAN_KEYS: &[&str] = &[
    "verbose",
    "extended",
    "ignoreExpiredError",
    "ignoreExpired",
    "excludeOldTransactions",
    "keepNonSubscriptions",
    "doNotRemoveNonSubscriptions",
];

impl ConfigOverrides {
    /// Validates a JSON options object. Unknown keys are logged and ignored.
    pub fn from_value(value: &Value) -> Result<Self, VerifyError> {
        let map = value
            .as_object()
            .ok_or_else(|| VerifyError::input("value", "\"value\" must be of type object"))?;
        Self::from_map(map, &[])
    }

    /// Like [`ConfigOverrides::from_value`], without warning about the keys in
    /// `extra_keys`, which the caller handles itself.
    pub(crate) fn from_map(map: &Map<String, Value>, extra_keys: &[&str]) -> Result<Self, VerifyError> {
        let mut overrides = Self::default();
        for (key, value) in map {
            match key.as_str() {
                "secret" => overrides.secret = Some(expect_string(key, value)?),
                "environment" => overrides.environment = Some(parse_environments(value)?),
                "requestDefaults" => overrides.timeout = parse_request_defaults(value)?,
                k if BOOLEAN_KEYS.contains(&k) => {
                    let flag = Some(expect_bool(key, value)?);
                    match k {
                        "verbose" => overrides.verbose = flag,
                        "extended" => overrides.extended = flag,
                        "ignoreExpiredError" => overrides.ignore_expired_error = flag,
                        "ignoreExpired" => overrides.ignore_expired = flag,
                        "excludeOldTransactions" => overrides.exclude_old_transactions = flag,
                        _ => overrides.keep_non_subscriptions = flag,
                    }
                }
                k if extra_keys.contains(&k) => {}
                _ => warn!("Unsupported receipt verification option \"{key}\" found"),
            }
        }
        Ok(overrides)
    }
}

pub(crate) fn expect_string(key: &str, value: &Value) -> Result<String, VerifyError> {
    value
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| VerifyError::input(key, format!("\"{key}\" must be a string")))
}

fn expect_bool(key: &str, value: &Value) -> Result<bool, VerifyError> {
    value
        .as_bool()
        .ok_or_else(|| VerifyError::input(key, format!("\"{key}\" must be a boolean")))
}

fn parse_environments(value: &Value) -> Result<Vec<Environment>, VerifyError> {
    const KEY: &str = "environment";
    let parse_one = |v: &Value| {
        v.as_str().and_then(Environment::parse).ok_or_else(|| {
            VerifyError::input(KEY, "\"environment\" must be one of [production, sandbox]")
        })
    };
    match value {
        Value::String(_) => Ok(vec![parse_one(value)?]),
        Value::Array(items) => {
            if items.is_empty() || items.len() > 2 {
                return Err(VerifyError::input(
                    KEY,
                    "\"environment\" must contain between 1 and 2 items",
                ));
            }
            let mut environments = Vec::with_capacity(items.len());
            for item in items {
                let env = parse_one(item)?;
                if environments.contains(&env) {
                    return Err(VerifyError::input(
                        KEY,
                        "\"environment\" contains a duplicate value",
                    ));
                }
                environments.push(env);
            }
            Ok(environments)
        }
        _ => Err(VerifyError::input(
            KEY,
            "\"environment\" must be a string or an array",
        )),
    }
}

fn parse_request_defaults(value: &Value) -> Result<Option<u64>, VerifyError> {
    const KEY: &str = "requestDefaults.timeout";
    let map = value.as_object().ok_or_else(|| {
        VerifyError::input("requestDefaults", "\"requestDefaults\" must be of type object")
    })?;
    let Some(timeout) = map.get("timeout") else {
        return Ok(None);
    };
    let millis = timeout
        .as_f64()
        .ok_or_else(|| VerifyError::input(KEY, format!("\"{KEY}\" must be a number")))?;
    if millis < 1.0 {
        return Err(VerifyError::input(
            KEY,
            format!("\"{KEY}\" must be greater than or equal to 1"),
        ));
    }
    Ok(Some(millis.ceil() as u64))
}

/// Holds the defaults applied to every validation. Replaces a process-wide
/// mutable configuration: the owner decides its lifetime, and validations
/// work on a copy taken when they start.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    current: VerifierConfig,
    initialized: bool,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layers `overrides` on top of the current configuration and marks the
    /// store as initialized.
    pub fn configure(&mut self, overrides: &ConfigOverrides) {
        self.current = self.current.merged(overrides);
        self.initialized = true;
    }

    pub fn config(&self) -> VerifierConfig {
        self.current.clone()
    }

    /// Restores the defaults. A store that was initialized stays initialized.
    pub fn reset(&mut self) {
        self.current = VerifierConfig::default();
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub(crate) fn snapshot(&self) -> Result<VerifierConfig, VerifyError> {
        if !self.initialized {
            return Err(VerifyError::not_configured());
        }
        Ok(self.current.clone())
    }
}
