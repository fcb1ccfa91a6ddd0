use base64::{prelude::BASE64_STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::{
    config::{expect_string, ConfigOverrides, VerifierConfig},
    domain::entities::environment::{canonical_attempt_order, Environment},
    errors::VerifyError,
};

static DEVICE_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9]{8}-[A-Za-z0-9]{4}-[A-Za-z0-9]{4}-[A-Za-z0-9]{4}-[A-Za-z0-9]{12}$")
        .expect("invalid device id pattern")
});

/// A single call to validate a receipt.
#[derive(Debug, Clone, Default)]
pub struct ValidateRequest {
    /// Base64-encoded receipt, as read from the app bundle on the device.
    pub receipt: String,
    /// Identifier of the device the receipt was read on, for the local
    /// cross-check.
    pub device: Option<String>,
    /// Per-call values that win over the configured defaults.
    pub overrides: ConfigOverrides,
}

impl ValidateRequest {
    pub fn new(receipt: impl Into<String>) -> Self {
        Self {
            receipt: receipt.into(),
            ..Default::default()
        }
    }

    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    /// Parses a JSON request: every configuration key, plus `receipt` and
    /// `device`.
    pub fn from_value(value: &Value) -> Result<Self, VerifyError> {
        let map = value
            .as_object()
            .ok_or_else(|| VerifyError::input("value", "\"value\" must be of type object"))?;
        let receipt = map
            .get("receipt")
            .ok_or_else(|| VerifyError::input("receipt", "\"receipt\" is required"))
            .and_then(|r| expect_string("receipt", r))?;
        let device = map
            .get("device")
            .map(|d| expect_string("device", d))
            .transpose()?;
        Ok(Self {
            receipt,
            device,
            overrides: ConfigOverrides::from_map(map, &["receipt", "device"])?,
        })
    }
}

/// Options of one validation, resolved against the configured defaults. Never
/// changes once the validation has started.
#[derive(Debug, Clone)]
pub struct ValidationOptions {
    pub receipt: String,
    pub device: Option<String>,
    pub config: VerifierConfig,
}

impl ValidationOptions {
    pub(crate) fn resolve(
        request: ValidateRequest,
        defaults: &VerifierConfig,
    ) -> Result<Self, VerifyError> {
        if request.receipt.is_empty() {
            return Err(VerifyError::input(
                "receipt",
                "\"receipt\" is not allowed to be empty",
            ));
        }
        if BASE64_STANDARD.decode(&request.receipt).is_err() {
            return Err(VerifyError::input(
                "receipt",
                "\"receipt\" must be a valid base64 string",
            ));
        }
        if let Some(device) = &request.device {
            if !DEVICE_ID_PATTERN.is_match(device) {
                return Err(VerifyError::input(
                    "device",
                    format!("\"device\" with value \"{device}\" fails to match the required pattern"),
                ));
            }
        }
        let mut config = defaults.merged(&request.overrides);
        config.validate()?;
        config.environment = canonical_attempt_order(&config.environment);
        Ok(Self {
            receipt: request.receipt,
            device: request.device,
            config,
        })
    }

    pub fn environments(&self) -> &[Environment] {
        &self.config.environment
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions::from(&self.config)
    }
}

/// Options controlling purchase extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    pub ignore_expired: bool,
    pub extended: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self::from(&VerifierConfig::default())
    }
}

impl From<&VerifierConfig> for ExtractOptions {
    fn from(config: &VerifierConfig) -> Self {
        Self {
            ignore_expired: config.ignore_expired,
            extended: config.extended,
        }
    }
}
