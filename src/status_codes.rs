//! Status codes returned by the `verifyReceipt` endpoint:
//! https://developer.apple.com/documentation/appstorereceipts/status

/// The receipt validated successfully.
pub const SUCCESS: i64 = 0;
/// The receipt is valid, but purchased nothing.
pub const VALID_BUT_EMPTY: i64 = 2;
/// The App Store could not read the JSON object you provided.
pub const INVALID_JSON: i64 = 21000;
/// The data in the receipt-data property was malformed or missing.
pub const INVALID_RECEIPT_DATA: i64 = 21002;
/// The receipt could not be authenticated.
pub const COULD_NOT_AUTHENTICATE: i64 = 21003;
/// The shared secret you provided does not match the shared secret on file
/// for your account.
pub const INVALID_SECRET: i64 = 21004;
/// The receipt server is not currently available.
pub const UNAVAILABLE: i64 = 21005;
/// This receipt is valid but the subscription has expired. When this status
/// code is returned, the receipt data is also decoded and returned as part of
/// the response. Only returned for iOS 6 style transaction receipts for
/// auto-renewable subscriptions.
pub const EXPIRED_SUBSCRIPTION: i64 = 21006;
/// This receipt is from the test environment, but it was sent to the
/// production environment for verification.
pub const TEST_RECEIPT: i64 = 21007;
/// This receipt is from the production environment, but it was sent to the
/// test environment for verification.
pub const PROD_RECEIPT: i64 = 21008;
/// This receipt could not be authorized. Treat this the same as if a purchase
/// was never made.
pub const COULD_NOT_AUTHORIZE: i64 = 21010;

/// Human-readable description of a known status code.
pub fn known_status_message(status: i64) -> Option<&'static str> {
    Some(match status {
        INVALID_JSON => "The App Store could not read the JSON object you provided.",
        INVALID_RECEIPT_DATA => "The data in the receipt-data property was malformed.",
        COULD_NOT_AUTHENTICATE => "The receipt could not be authenticated.",
        INVALID_SECRET => {
            "The shared secret you provided does not match the shared secret on file for your account."
        }
        UNAVAILABLE => "The receipt server is not currently available.",
        EXPIRED_SUBSCRIPTION => {
            "This receipt is valid but the subscription has expired. When this status code is returned to your server, the receipt data is also decoded and returned as part of the response."
        }
        TEST_RECEIPT => {
            "This receipt is a sandbox receipt, but it was sent to the production service for verification."
        }
        PROD_RECEIPT => {
            "This receipt is a production receipt, but it was sent to the sandbox service for verification."
        }
        VALID_BUT_EMPTY => "The receipt is valid, but purchased nothing.",
        COULD_NOT_AUTHORIZE => {
            "This receipt could not be authorized. Treat this the same as if a purchase was never made."
        }
        _ => return None,
    })
}

/// Like [`known_status_message`], with a generic fallback for unknown codes.
pub fn status_message(status: i64) -> String {
    known_status_message(status)
        .map(str::to_owned)
        .unwrap_or_else(|| format!("Receipt validation status = {status}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes_have_messages() {
        for code in [
            VALID_BUT_EMPTY,
            INVALID_JSON,
            INVALID_RECEIPT_DATA,
            COULD_NOT_AUTHENTICATE,
            INVALID_SECRET,
            UNAVAILABLE,
            EXPIRED_SUBSCRIPTION,
            TEST_RECEIPT,
            PROD_RECEIPT,
            COULD_NOT_AUTHORIZE,
        ] {
            assert!(known_status_message(code).is_some(), "missing message for {code}");
        }
        assert!(known_status_message(SUCCESS).is_none());
    }

    #[test]
    fn test_unknown_code_fallback() {
        assert_eq!(status_message(21199), "Receipt validation status = 21199");
        assert_eq!(
            status_message(COULD_NOT_AUTHENTICATE),
            "The receipt could not be authenticated."
        );
    }
}
