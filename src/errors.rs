use serde_json::Value;
use thiserror::Error;

/// Error returned by every fallible operation of this crate.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The verifier was used before any configuration was applied.
    #[error("{0}")]
    Configuration(String),

    /// A request or configuration option failed schema validation.
    #[error("{message}")]
    Input { field: String, message: String },

    /// The verification endpoint could not be reached, or replied with
    /// something that is not JSON.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The endpoint replied, but the receipt did not validate.
    #[error(transparent)]
    Validation(#[from] ValidationFailure),
}

impl VerifyError {
    pub(crate) fn not_configured() -> Self {
        Self::Configuration("Module not initialized".to_owned())
    }

    pub(crate) fn input(field: &str, message: impl Into<String>) -> Self {
        Self::Input {
            field: field.to_owned(),
            message: message.into(),
        }
    }

    /// Platform status code associated with the failure, if any.
    pub fn status(&self) -> Option<i64> {
        match self {
            Self::Validation(f) => f.status(),
            Self::Configuration(_) | Self::Input { .. } | Self::Transport(_) => None,
        }
    }

    /// Whether retrying later may succeed: the platform's hint for
    /// validation failures, the kind of failure for transport errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable,
            Self::Validation(ValidationFailure::FatalStatus { is_retryable, .. })
            | Self::Validation(ValidationFailure::ExpiredSubscription { is_retryable, .. }) => {
                *is_retryable
            }
            _ => false,
        }
    }

    /// Raw response body returned by the platform, if any was received.
    pub fn response(&self) -> Option<&Value> {
        match self {
            Self::Validation(f) => f.response(),
            Self::Configuration(_) | Self::Input { .. } | Self::Transport(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection, TLS or proxy failure.
    Network,
    /// The request exceeded the configured timeout.
    Timeout,
    /// 5xx reply whose body was not JSON.
    ServiceUnavailable,
    /// Non-5xx reply whose body was not JSON.
    InvalidBody,
    /// The HTTP client itself could not be built.
    Client,
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    /// HTTP status of the reply, when one was received.
    pub http_status: Option<u16>,
    /// True for network failures, timeouts and 5xx replies.
    pub is_retryable: bool,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            http_status: None,
            is_retryable: matches!(
                kind,
                TransportErrorKind::Network
                    | TransportErrorKind::Timeout
                    | TransportErrorKind::ServiceUnavailable
            ),
        }
    }

    pub(crate) fn with_http_status(mut self, http_status: u16) -> Self {
        self.http_status = Some(http_status);
        self
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == TransportErrorKind::Timeout
    }
}

#[derive(Debug, Error)]
pub enum ValidationFailure {
    /// Status 21006 without `ignore_expired_error`. The response still holds
    /// the decoded receipt.
    #[error("{message}")]
    ExpiredSubscription {
        status: i64,
        message: String,
        is_retryable: bool,
        response: Value,
    },

    /// The platform reported success for a receipt that bought nothing. This
    /// usually means the receipt was tampered with.
    #[error("{message}")]
    EmptyPurchase {
        message: String,
        application_version: Option<String>,
        original_application_version: Option<String>,
        response: Value,
    },

    #[error("{message}")]
    FatalStatus {
        status: i64,
        message: String,
        is_retryable: bool,
        response: Value,
    },

    #[error("device cross-check failed: {output}")]
    DeviceCheckFailed { output: String },
}

impl ValidationFailure {
    pub fn status(&self) -> Option<i64> {
        match self {
            Self::ExpiredSubscription { status, .. } | Self::FatalStatus { status, .. } => {
                Some(*status)
            }
            Self::EmptyPurchase { .. } => Some(crate::status_codes::VALID_BUT_EMPTY),
            Self::DeviceCheckFailed { .. } => None,
        }
    }

    pub fn response(&self) -> Option<&Value> {
        match self {
            Self::ExpiredSubscription { response, .. }
            | Self::EmptyPurchase { response, .. }
            | Self::FatalStatus { response, .. } => Some(response),
            Self::DeviceCheckFailed { .. } => None,
        }
    }
}
