use serde::Serialize;

/// Request body of the `verifyReceipt` endpoint.
///
/// https://developer.apple.com/documentation/appstorereceipts/requestbody
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct VerifyReceiptRequestModel {
    /// The Base64-encoded receipt data.
    pub(crate) receipt_data: String,
    /// Your app’s shared secret, which is a hexadecimal string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) password: Option<String>,
    /// Set this value to true for the response to include only the latest
    /// renewal transaction for any subscriptions. Only sent when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) exclude_old_transactions: Option<bool>,
}

impl VerifyReceiptRequestModel {
    pub(crate) fn new(
        receipt_data: &str,
        password: Option<&str>,
        exclude_old_transactions: bool,
    ) -> Self {
        Self {
            receipt_data: receipt_data.to_owned(),
            password: password.map(str::to_owned),
            exclude_old_transactions: exclude_old_transactions.then_some(true),
        }
    }

    /// Copy of the body that is safe to log.
    pub(crate) fn redacted(&self) -> Self {
        Self {
            password: self.password.as_ref().map(|_| "******".to_owned()),
            ..self.clone()
        }
    }
}
