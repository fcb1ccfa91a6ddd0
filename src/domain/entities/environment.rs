use std::fmt;

use serde::{Deserialize, Serialize};

const PRODUCTION_URL: &str = "https://buy.itunes.apple.com/verifyReceipt";
const SANDBOX_URL: &str = "https://sandbox.itunes.apple.com/verifyReceipt";

/// Verification endpoint variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Sandbox,
}

impl Environment {
    /// Parses a configuration value. Case-insensitive, exact names only.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "production" => Some(Self::Production),
            "sandbox" => Some(Self::Sandbox),
            _ => None,
        }
    }

    /// Normalizes the `environment` label found in a verification response.
    /// Missing or unrecognized labels resolve to `fallback`.
    pub(crate) fn from_response_label(label: Option<&str>, fallback: Self) -> Self {
        match label.map(str::to_lowercase).as_deref() {
            Some("production") | Some("prod") => Self::Production,
            Some("sandbox") => Self::Sandbox,
            _ => fallback,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Sandbox => "sandbox",
        }
    }

    pub fn verify_receipt_url(&self) -> &'static str {
        match self {
            Self::Production => PRODUCTION_URL,
            Self::Sandbox => SANDBOX_URL,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Orders the environments to attempt. Production always goes first when both
/// are requested, since the sandbox attempt only makes sense after production
/// reported a wrong-environment status.
pub(crate) fn canonical_attempt_order(environments: &[Environment]) -> Vec<Environment> {
    let mut ordered = Vec::with_capacity(2);
    for candidate in [Environment::Production, Environment::Sandbox] {
        if environments.contains(&candidate) {
            ordered.push(candidate);
        }
    }
    ordered
}
