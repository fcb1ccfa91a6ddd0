use async_trait::async_trait;
use serde_json::Value;

use crate::{
    domain::entities::{
        purchase_record::PurchaseRecord,
        validate_request::{ExtractOptions, ValidationOptions},
    },
    errors::VerifyError,
};

#[async_trait]
pub trait ReceiptRepository: Send + Sync {
    /// Verifies the receipt against each configured environment in turn and
    /// returns its normalized purchases.
    async fn validate(&self, options: &ValidationOptions)
        -> Result<Vec<PurchaseRecord>, VerifyError>;

    /// Normalizes the purchases of an already verified response. Fails only
    /// if `response` is not a JSON object.
    fn extract(
        &self,
        response: &Value,
        options: ExtractOptions,
    ) -> Result<Vec<PurchaseRecord>, VerifyError>;
}
