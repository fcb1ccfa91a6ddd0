use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::environment::Environment;

/// A single purchase, normalized from a verified receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRecord {
    pub transaction_id: String,
    pub original_transaction_id: Option<String>,
    pub bundle_id: Option<String>,
    pub product_id: Option<String>,
    /// Epoch milliseconds.
    pub purchase_date: i64,
    /// Epoch milliseconds, or 0 for purchases that never expire.
    pub expiration_date: i64,
    pub quantity: Option<i64>,
    /// The unique identifier of subscription purchase events across devices,
    /// including subscription renewals.
    pub web_order_line_item_id: Option<String>,
    /// Epoch milliseconds. Only present for pre-ordered apps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preorder_date: Option<i64>,

    /// Present iff extended mode was requested.
    #[serde(default, flatten, skip_serializing_if = "Option::is_none")]
    pub extended: Option<ExtendedPurchaseInfo>,
}

impl PurchaseRecord {
    pub fn is_subscription(&self) -> bool {
        self.expiration_date != 0
    }
}

/// Subscription and renewal metadata, returned in extended mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedPurchaseInfo {
    pub is_trial_period: bool,
    pub is_in_intro_offer_period: bool,
    pub environment: Environment,
    /// Epoch milliseconds.
    pub original_purchase_date: i64,
    pub application_version: Option<String>,
    pub original_application_version: Option<String>,
    /// A UUID the app associated with the purchase on the device.
    pub app_account_token: Option<String>,
    /// The identifier of the subscription offer redeemed by the user.
    pub promotional_offer_id: Option<String>,
    /// Epoch milliseconds. Set when Apple customer support refunded the
    /// transaction.
    pub cancellation_date: Option<i64>,
    pub cancellation_reason: Option<String>,
    /// Renewal-intent objects, copied verbatim from the response (or
    /// synthesized for legacy receipts).
    pub pending_renewal_info: Option<Vec<Value>>,
}
