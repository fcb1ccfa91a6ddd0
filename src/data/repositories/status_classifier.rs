use serde_json::Value;

use crate::{
    data::models::verify_receipt::{
        scalar::parse_loose_bool, verify_receipt_response_model::VerifyReceiptResponseModel,
    },
    domain::entities::environment::Environment,
    errors::ValidationFailure,
    status_codes::{self, status_message},
};

/// Meaning of a `verifyReceipt` status for the environment it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Classification {
    Success,
    /// Status 21006 with `ignore_expired_error`: the decoded receipt is used
    /// as if validation had succeeded.
    AcceptedExpired,
    /// The receipt belongs to the other environment. Try the next one.
    WrongEnvironment,
    ExpiredSubscription,
    Fatal,
}

pub(crate) fn classify(
    status: Option<i64>,
    environment: Environment,
    ignore_expired_error: bool,
) -> Classification {
    let Some(status) = status else {
        return Classification::Fatal;
    };
    match (status, environment) {
        (status_codes::SUCCESS, _) => Classification::Success,
        (status_codes::TEST_RECEIPT, Environment::Production)
        | (status_codes::INVALID_RECEIPT_DATA, _) => Classification::WrongEnvironment,
        (status_codes::EXPIRED_SUBSCRIPTION, _) if ignore_expired_error => {
            Classification::AcceptedExpired
        }
        (status_codes::EXPIRED_SUBSCRIPTION, _) => Classification::ExpiredSubscription,
        _ => Classification::Fatal,
    }
}

/// Builds the error for a response that ended the attempt sequence without
/// success.
pub(crate) fn failure_for(
    classification: Classification,
    model: &VerifyReceiptResponseModel,
    response: Value,
) -> ValidationFailure {
    let status = model.status().unwrap_or(1);
    let is_retryable = parse_loose_bool(model.is_retryable.as_ref());
    match classification {
        Classification::ExpiredSubscription => ValidationFailure::ExpiredSubscription {
            status,
            message: status_message(status),
            is_retryable,
            response,
        },
        _ if model.status().is_none() => invalid_response(model, response),
        _ => ValidationFailure::FatalStatus {
            status,
            message: status_message(status),
            is_retryable,
            response,
        },
    }
}

/// For replies that lack a status, or report success without a receipt.
pub(crate) fn invalid_response(
    model: &VerifyReceiptResponseModel,
    response: Value,
) -> ValidationFailure {
    ValidationFailure::FatalStatus {
        status: 1,
        message: "invalid server response".to_owned(),
        is_retryable: parse_loose_bool(model.is_retryable.as_ref()),
        response,
    }
}

/// True when a verified reply carries no decoded receipt object.
pub(crate) fn is_missing_receipt(model: &VerifyReceiptResponseModel) -> bool {
    model.receipt.is_none()
}

/// True when the platform reported success for a modern receipt whose
/// purchase list is empty.
pub(crate) fn is_empty_purchase(model: &VerifyReceiptResponseModel) -> bool {
    model.status() == Some(status_codes::SUCCESS)
        && model
            .receipt
            .as_ref()
            .and_then(|r| r.in_app.as_ref())
            .is_some_and(Vec::is_empty)
}
