#![allow(dead_code)]

use serde::Deserialize;
use serde_json::Value;
use serde_with::{serde_as, DefaultOnError};

use super::scalar::Scalar;

/// Response body of the `verifyReceipt` endpoint.
///
/// https://developer.apple.com/documentation/appstorereceipts/responsebody
///
/// Every field is optional, and a field with an unexpected type reads as
/// absent, so that deserializing any JSON object succeeds.
#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct VerifyReceiptResponseModel {
    /// Either 0 if the receipt is valid, or a status code if there is an
    /// error.
    #[serde_as(as = "DefaultOnError")]
    pub(crate) status: Option<Scalar>,
    /// The environment for which the receipt was generated. Possible values:
    /// Sandbox, Production.
    #[serde_as(as = "DefaultOnError")]
    pub(crate) environment: Option<String>,
    /// An indicator that an error occurred during the request. A value of 1
    /// indicates a temporary issue; retry validation for this receipt at a
    /// later time. A value of 0 indicates an unresolvable issue.
    #[serde(rename = "is-retryable")]
    #[serde_as(as = "DefaultOnError")]
    pub(crate) is_retryable: Option<Scalar>,
    /// A JSON representation of the receipt that was sent for verification.
    #[serde_as(as = "DefaultOnError")]
    pub(crate) receipt: Option<ReceiptModel>,
    /// An array that contains all in-app purchase transactions. Only returned
    /// for receipts that contain auto-renewable subscriptions.
    #[serde_as(as = "DefaultOnError<Option<Vec<DefaultOnError>>>")]
    pub(crate) latest_receipt_info: Option<Vec<InAppModel>>,
    /// An array where each element contains the pending renewal information
    /// for each auto-renewable subscription identified by the
    /// product_id.
    #[serde_as(as = "DefaultOnError")]
    pub(crate) pending_renewal_info: Option<Vec<Value>>,
    /// Renewal status of iOS 6 style transaction receipts.
    #[serde_as(as = "DefaultOnError")]
    pub(crate) auto_renew_status: Option<Scalar>,
    /// Product the iOS 6 style subscription renews to.
    #[serde_as(as = "DefaultOnError")]
    pub(crate) auto_renew_product_id: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    pub(crate) cancellation_reason: Option<String>,
}

impl VerifyReceiptResponseModel {
    pub(crate) fn status(&self) -> Option<i64> {
        self.status.as_ref().and_then(Scalar::as_i64)
    }
}

/// The decoded receipt. Modern receipts list purchases under `in_app`; iOS 6
/// style receipts carry a single purchase in the receipt itself.
#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ReceiptModel {
    #[serde_as(as = "DefaultOnError")]
    pub(crate) bundle_id: Option<String>,
    /// Bundle identifier on iOS 6 style receipts.
    #[serde_as(as = "DefaultOnError")]
    pub(crate) bid: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    pub(crate) application_version: Option<String>,
    /// Application version on iOS 6 style receipts.
    #[serde_as(as = "DefaultOnError")]
    pub(crate) bvrs: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    pub(crate) original_application_version: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    pub(crate) app_account_token: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    pub(crate) preorder_date_ms: Option<Scalar>,
    #[serde_as(as = "DefaultOnError")]
    pub(crate) preorder_date: Option<Scalar>,
    /// An array that contains the in-app purchase receipt fields for all
    /// in-app purchase transactions.
    #[serde_as(as = "DefaultOnError<Option<Vec<DefaultOnError>>>")]
    pub(crate) in_app: Option<Vec<InAppModel>>,
    /// Purchase fields of iOS 6 style receipts.
    #[serde(flatten)]
    pub(crate) purchase: InAppModel,
}

/// A single in-app purchase transaction.
///
/// https://developer.apple.com/documentation/appstorereceipts/responsebody/receipt/in_app
#[serde_as]
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct InAppModel {
    #[serde_as(as = "DefaultOnError")]
    pub(crate) transaction_id: Option<Scalar>,
    #[serde_as(as = "DefaultOnError")]
    pub(crate) original_transaction_id: Option<Scalar>,
    #[serde_as(as = "DefaultOnError")]
    pub(crate) product_id: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    pub(crate) quantity: Option<Scalar>,
    #[serde_as(as = "DefaultOnError")]
    pub(crate) purchase_date_ms: Option<Scalar>,
    #[serde_as(as = "DefaultOnError")]
    pub(crate) purchase_date: Option<Scalar>,
    #[serde_as(as = "DefaultOnError")]
    pub(crate) original_purchase_date_ms: Option<Scalar>,
    #[serde_as(as = "DefaultOnError")]
    pub(crate) original_purchase_date: Option<Scalar>,
    #[serde_as(as = "DefaultOnError")]
    pub(crate) expires_date_ms: Option<Scalar>,
    #[serde_as(as = "DefaultOnError")]
    pub(crate) expires_date: Option<Scalar>,
    #[serde_as(as = "DefaultOnError")]
    pub(crate) cancellation_date_ms: Option<Scalar>,
    #[serde_as(as = "DefaultOnError")]
    pub(crate) cancellation_date: Option<Scalar>,
    #[serde_as(as = "DefaultOnError")]
    pub(crate) cancellation_reason: Option<Scalar>,
    #[serde_as(as = "DefaultOnError")]
    pub(crate) is_trial_period: Option<Scalar>,
    #[serde_as(as = "DefaultOnError")]
    pub(crate) is_in_intro_offer_period: Option<Scalar>,
    #[serde_as(as = "DefaultOnError")]
    pub(crate) web_order_line_item_id: Option<Scalar>,
    #[serde_as(as = "DefaultOnError")]
    pub(crate) promotional_offer_id: Option<Scalar>,
    #[serde_as(as = "DefaultOnError")]
    pub(crate) app_account_token: Option<String>,
}
