use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime};
use serde_json::{Map, Value};

use crate::{
    data::models::verify_receipt::{
        scalar::{parse_loose_bool, Scalar},
        verify_receipt_response_model::{InAppModel, ReceiptModel, VerifyReceiptResponseModel},
    },
    domain::entities::{
        environment::Environment,
        purchase_record::{ExtendedPurchaseInfo, PurchaseRecord},
        validate_request::ExtractOptions,
    },
};

/// Digit strings up to this length are epoch seconds, longer ones epoch
/// milliseconds.
const MAX_EPOCH_SECONDS_DIGITS: usize = 10;

/// Time zone suffixes the platform appends to formatted dates that mean UTC.
const UTC_SUFFIXES: &[&str] = &[" Etc/GMT", " Etc/UTC", " GMT", " UTC"];

/// Normalizes the purchases of a verified receipt.
///
/// The result holds at most one record per transaction id: the revision with
/// the latest purchase date, placed where that id first appeared.
///
/// `environment` is reported on extended records when the response does not
/// name a recognizable one.
pub(crate) fn extract_purchases(
    response: &VerifyReceiptResponseModel,
    options: ExtractOptions,
    environment: Environment,
    now_ms: i64,
) -> Vec<PurchaseRecord> {
    let Some(receipt) = &response.receipt else {
        return Vec::new();
    };
    match &receipt.in_app {
        Some(in_app) => {
            let items = in_app
                .iter()
                .chain(response.latest_receipt_info.iter().flatten());
            extract_modern(response, receipt, items, options, environment, now_ms)
        }
        None => extract_legacy(response, receipt, options, environment, now_ms)
            .into_iter()
            .collect(),
    }
}

fn extract_modern<'a>(
    response: &VerifyReceiptResponseModel,
    receipt: &ReceiptModel,
    items: impl Iterator<Item = &'a InAppModel>,
    options: ExtractOptions,
    environment: Environment,
    now_ms: i64,
) -> Vec<PurchaseRecord> {
    let preorder_date = preorder_date(receipt);
    let mut records: Vec<PurchaseRecord> = Vec::new();
    // transaction id -> (purchase date, slot in `records`)
    let mut slots: HashMap<String, (i64, usize)> = HashMap::new();

    for item in items {
        let expiration_date = resolve_date(item.expires_date_ms.as_ref(), item.expires_date.as_ref());
        if options.ignore_expired && is_expired(expiration_date, now_ms) {
            continue;
        }
        let purchase_date =
            resolve_date(item.purchase_date_ms.as_ref(), item.purchase_date.as_ref());

        let record = PurchaseRecord {
            transaction_id: text(&item.transaction_id).unwrap_or_default(),
            original_transaction_id: text(&item.original_transaction_id),
            bundle_id: receipt.bundle_id.clone(),
            product_id: item.product_id.clone(),
            purchase_date,
            expiration_date,
            quantity: item.quantity.as_ref().and_then(Scalar::as_i64),
            web_order_line_item_id: text(&item.web_order_line_item_id),
            preorder_date,
            extended: options.extended.then(|| ExtendedPurchaseInfo {
                is_trial_period: parse_loose_bool(item.is_trial_period.as_ref()),
                is_in_intro_offer_period: parse_loose_bool(item.is_in_intro_offer_period.as_ref()),
                environment: Environment::from_response_label(
                    response.environment.as_deref(),
                    environment,
                ),
                original_purchase_date: resolve_date(
                    item.original_purchase_date_ms.as_ref(),
                    item.original_purchase_date.as_ref(),
                ),
                application_version: receipt.application_version.clone(),
                original_application_version: receipt.original_application_version.clone(),
                app_account_token: receipt
                    .app_account_token
                    .clone()
                    .or_else(|| item.app_account_token.clone()),
                promotional_offer_id: string_only(&item.promotional_offer_id),
                cancellation_date: cancellation_date(item),
                cancellation_reason: cancellation_date(item)
                    .and_then(|_| string_only(&item.cancellation_reason)),
                pending_renewal_info: pending_renewal_info(response),
            }),
        };

        match slots.get_mut(&record.transaction_id) {
            Some((seen_purchase_date, slot)) => {
                if purchase_date >= *seen_purchase_date {
                    *seen_purchase_date = purchase_date;
                    records[*slot] = record;
                }
            }
            None => {
                slots.insert(record.transaction_id.clone(), (purchase_date, records.len()));
                records.push(record);
            }
        }
    }
    records
}

/// iOS 6 style receipts carry a single purchase in the receipt itself.
fn extract_legacy(
    response: &VerifyReceiptResponseModel,
    receipt: &ReceiptModel,
    options: ExtractOptions,
    environment: Environment,
    now_ms: i64,
) -> Option<PurchaseRecord> {
    let item = &receipt.purchase;
    let expiration_date = resolve_date(item.expires_date_ms.as_ref(), item.expires_date.as_ref());
    if options.ignore_expired && is_expired(expiration_date, now_ms) {
        return None;
    }

    Some(PurchaseRecord {
        transaction_id: text(&item.transaction_id).unwrap_or_default(),
        original_transaction_id: text(&item.original_transaction_id),
        bundle_id: receipt.bundle_id.clone().or_else(|| receipt.bid.clone()),
        product_id: item.product_id.clone(),
        purchase_date: resolve_date(item.purchase_date_ms.as_ref(), item.purchase_date.as_ref()),
        expiration_date,
        quantity: item.quantity.as_ref().and_then(Scalar::as_i64),
        web_order_line_item_id: text(&item.web_order_line_item_id),
        preorder_date: preorder_date(receipt),
        extended: options.extended.then(|| ExtendedPurchaseInfo {
            is_trial_period: parse_loose_bool(item.is_trial_period.as_ref()),
            is_in_intro_offer_period: parse_loose_bool(item.is_in_intro_offer_period.as_ref()),
            environment: Environment::from_response_label(
                response.environment.as_deref(),
                environment,
            ),
            original_purchase_date: resolve_date(
                item.original_purchase_date_ms.as_ref(),
                item.original_purchase_date.as_ref(),
            ),
            application_version: receipt
                .application_version
                .clone()
                .or_else(|| receipt.bvrs.clone()),
            original_application_version: Some(
                receipt
                    .original_application_version
                    .clone()
                    .unwrap_or_else(|| "1.0".to_owned()),
            ),
            app_account_token: receipt.app_account_token.clone(),
            promotional_offer_id: string_only(&item.promotional_offer_id),
            cancellation_date: cancellation_date(item),
            cancellation_reason: cancellation_date(item).and_then(|_| {
                string_only(&item.cancellation_reason).or_else(|| response.cancellation_reason.clone())
            }),
            pending_renewal_info: pending_renewal_info(response),
        }),
    })
}

fn is_expired(expiration_date: i64, now_ms: i64) -> bool {
    expiration_date != 0 && expiration_date <= now_ms
}

fn preorder_date(receipt: &ReceiptModel) -> Option<i64> {
    let date = resolve_date(receipt.preorder_date_ms.as_ref(), receipt.preorder_date.as_ref());
    (date != 0).then_some(date)
}

/// Only set when Apple reports a cancellation date as a string.
fn cancellation_date(item: &InAppModel) -> Option<i64> {
    let is_text = |field: &Option<Scalar>| field.as_ref().is_some_and(Scalar::is_text);
    (is_text(&item.cancellation_date_ms) || is_text(&item.cancellation_date)).then(|| {
        resolve_date(
            item.cancellation_date_ms.as_ref(),
            item.cancellation_date.as_ref(),
        )
    })
}

/// Renewal info from the response, or one entry synthesized from the iOS 6
/// style `auto_renew_status` / `auto_renew_product_id` fields.
fn pending_renewal_info(response: &VerifyReceiptResponseModel) -> Option<Vec<Value>> {
    if let Some(info) = &response.pending_renewal_info {
        return Some(info.clone());
    }
    let status = response.auto_renew_status.as_ref()?.as_text().into_owned();
    let mut entry = Map::new();
    entry.insert("auto_renew_status".to_owned(), Value::String(status.clone()));
    entry.insert("autoRenewStatus".to_owned(), Value::String(status));
    if let Some(product_id) = &response.auto_renew_product_id {
        entry.insert("product_id".to_owned(), Value::String(product_id.clone()));
        entry.insert("productId".to_owned(), Value::String(product_id.clone()));
    }
    Some(vec![Value::Object(entry)])
}

fn text(field: &Option<Scalar>) -> Option<String> {
    field.as_ref().map(|s| s.as_text().into_owned())
}

fn string_only(field: &Option<Scalar>) -> Option<String> {
    match field {
        Some(Scalar::Text(s)) => Some(s.clone()),
        _ => None,
    }
}

/// Resolves a date to epoch milliseconds. Prefers the millisecond field; the
/// other field may hold an epoch value as digits or a formatted date, which
/// is rounded up to the next whole second. Returns 0 when neither resolves.
pub(crate) fn resolve_date(millis: Option<&Scalar>, formatted: Option<&Scalar>) -> i64 {
    if let Some(ms) = millis.and_then(Scalar::as_i64) {
        return ms;
    }
    let Some(formatted) = formatted else {
        return 0;
    };
    let value = formatted.as_text();
    let value = value.trim();
    if value.is_empty() {
        return 0;
    }
    if value.bytes().all(|b| b.is_ascii_digit()) {
        return match value.parse::<i64>() {
            Ok(n) if value.len() <= MAX_EPOCH_SECONDS_DIGITS => n * 1000,
            Ok(n) => n,
            Err(_) => 0,
        };
    }
    parse_formatted_date(value)
        .map(|ms| (ms + 999).div_euclid(1000) * 1000)
        .unwrap_or(0)
}

fn parse_formatted_date(value: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.timestamp_millis());
    }
    let naive = UTC_SUFFIXES
        .iter()
        .find_map(|suffix| value.strip_suffix(suffix))
        .unwrap_or(value);
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(naive, format).ok())
        .map(|dt| dt.and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    // 2024-01-01T00:00:00Z
    const NOW_MS: i64 = 1_704_067_200_000;
    const FUTURE_MS: i64 = NOW_MS + 86_400_000;
    const PAST_MS: i64 = NOW_MS - 86_400_000;

    fn model(value: Value) -> VerifyReceiptResponseModel {
        serde_json::from_value(value).expect("object")
    }

    fn item(transaction_id: &str, purchase_ms: i64, expires_ms: i64) -> Value {
        json!({
            "transaction_id": transaction_id,
            "original_transaction_id": "1000",
            "product_id": "com.myapp.monthly",
            "quantity": "1",
            "purchase_date_ms": purchase_ms.to_string(),
            "expires_date_ms": expires_ms.to_string(),
            "is_trial_period": "false",
        })
    }

    fn extract(value: Value, ignore_expired: bool, extended: bool) -> Vec<PurchaseRecord> {
        extract_purchases(
            &model(value),
            ExtractOptions {
                ignore_expired,
                extended,
            },
            Environment::Production,
            NOW_MS,
        )
    }

    #[test]
    fn test_resolve_date_prefers_millis() {
        let ms = Scalar::Text("1526649071000".to_owned());
        let formatted = Scalar::Text("2018-05-18 13:11:11 Etc/GMT".to_owned());
        assert_eq!(resolve_date(Some(&ms), Some(&formatted)), 1526649071000);
    }

    #[test]
    fn test_resolve_date_from_digits() {
        let millis = Scalar::Text("1526908271000".to_owned());
        assert_eq!(resolve_date(None, Some(&millis)), 1526908271000);
        let seconds = Scalar::Text("1526908271".to_owned());
        assert_eq!(resolve_date(None, Some(&seconds)), 1526908271000);
    }

    #[test]
    fn test_resolve_date_from_formatted_string() {
        let formatted = Scalar::Text("2018-05-18 13:11:11 Etc/GMT".to_owned());
        assert_eq!(resolve_date(None, Some(&formatted)), 1526649071000);
        let fractional = Scalar::Text("2018-05-18T13:11:11.200Z".to_owned());
        assert_eq!(resolve_date(None, Some(&fractional)), 1526649072000);
        let garbage = Scalar::Text("someday".to_owned());
        assert_eq!(resolve_date(None, Some(&garbage)), 0);
        assert_eq!(resolve_date(None, None), 0);
    }

    #[test]
    fn test_missing_receipt_yields_nothing() {
        assert!(extract(json!({ "status": 0 }), true, false).is_empty());
    }

    #[test]
    fn test_merges_latest_receipt_info() {
        let records = extract(
            json!({
                "status": 0,
                "receipt": { "bundle_id": "com.myapp", "in_app": [item("1", PAST_MS, FUTURE_MS)] },
                "latest_receipt_info": [item("2", NOW_MS, FUTURE_MS)],
            }),
            true,
            false,
        );
        let ids: Vec<_> = records.iter().map(|r| r.transaction_id.as_str()).collect();
        assert_eq!(ids, ["1", "2"]);
        assert!(records.iter().all(|r| r.bundle_id.as_deref() == Some("com.myapp")));
        assert!(records.iter().all(|r| r.extended.is_none()));
    }

    #[test]
    fn test_duplicates_keep_latest_purchase_in_first_slot() {
        let records = extract(
            json!({
                "status": 0,
                "receipt": { "in_app": [
                    item("1", PAST_MS, FUTURE_MS),
                    item("2", PAST_MS, FUTURE_MS),
                ] },
                "latest_receipt_info": [
                    item("1", NOW_MS, FUTURE_MS + 1),
                    item("2", PAST_MS - 1, FUTURE_MS + 2),
                ],
            }),
            true,
            false,
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].transaction_id, "1");
        assert_eq!(records[0].purchase_date, NOW_MS);
        assert_eq!(records[0].expiration_date, FUTURE_MS + 1);
        assert_eq!(records[1].transaction_id, "2");
        assert_eq!(records[1].purchase_date, PAST_MS);
        assert_eq!(records[1].expiration_date, FUTURE_MS);
    }

    #[test]
    fn test_ignore_expired_drops_expired_items_only() {
        let response = json!({
            "status": 0,
            "receipt": { "in_app": [
                item("1", PAST_MS, PAST_MS),
                item("2", PAST_MS, FUTURE_MS),
                item("3", PAST_MS, 0),
            ] },
        });
        let kept = extract(response.clone(), true, false);
        let ids: Vec<_> = kept.iter().map(|r| r.transaction_id.as_str()).collect();
        assert_eq!(ids, ["2", "3"]);
        assert_eq!(extract(response, false, false).len(), 3);
    }

    #[test]
    fn test_extreme_expiration_dates() {
        let mut ancient = item("1", PAST_MS, 0);
        ancient["expires_date_ms"] = json!(i64::MIN + 1);
        let mut far_future = item("2", PAST_MS, 0);
        far_future["expires_date_ms"] = json!(i64::MAX);
        let mut huge_digits = item("3", PAST_MS, 0);
        huge_digits["expires_date_ms"] = json!("-9223372036854775807");
        let records = extract(
            json!({ "status": 0, "receipt": { "in_app": [ancient, far_future, huge_digits] } }),
            true,
            false,
        );
        let ids: Vec<_> = records.iter().map(|r| r.transaction_id.as_str()).collect();
        assert_eq!(ids, ["2"]);
    }

    #[test]
    fn test_extended_fields() {
        let mut cancelled = item("1", PAST_MS, FUTURE_MS);
        cancelled["cancellation_date_ms"] = json!(NOW_MS.to_string());
        cancelled["cancellation_reason"] = json!("1");
        cancelled["is_in_intro_offer_period"] = json!("true");
        cancelled["promotional_offer_id"] = json!("offer");
        cancelled["app_account_token"] = json!("item-token");
        let records = extract(
            json!({
                "status": 0,
                "environment": "Sandbox",
                "receipt": {
                    "application_version": "2.0",
                    "original_application_version": "1.1",
                    "in_app": [cancelled, item("2", PAST_MS, FUTURE_MS)],
                },
                "pending_renewal_info": [{ "auto_renew_status": "1" }],
            }),
            true,
            true,
        );
        let first = records[0].extended.as_ref().expect("extended");
        assert_eq!(first.environment, Environment::Sandbox);
        assert!(!first.is_trial_period);
        assert!(first.is_in_intro_offer_period);
        assert_eq!(first.application_version.as_deref(), Some("2.0"));
        assert_eq!(first.original_application_version.as_deref(), Some("1.1"));
        assert_eq!(first.app_account_token.as_deref(), Some("item-token"));
        assert_eq!(first.promotional_offer_id.as_deref(), Some("offer"));
        assert_eq!(first.cancellation_date, Some(NOW_MS));
        assert_eq!(first.cancellation_reason.as_deref(), Some("1"));
        assert_eq!(
            first.pending_renewal_info,
            Some(vec![json!({ "auto_renew_status": "1" })])
        );

        let second = records[1].extended.as_ref().expect("extended");
        assert_eq!(second.cancellation_date, None);
        assert_eq!(second.cancellation_reason, None);
    }

    #[test]
    fn test_extended_environment_is_always_normalized() {
        for (label, expected) in [
            (json!("Production"), Environment::Production),
            (json!("prod"), Environment::Production),
            (json!("SANDBOX"), Environment::Sandbox),
            (json!(null), Environment::Production),
        ] {
            let records = extract(
                json!({
                    "status": 0,
                    "environment": label,
                    "receipt": { "in_app": [item("1", PAST_MS, FUTURE_MS)] },
                }),
                true,
                true,
            );
            assert_eq!(records[0].extended.as_ref().map(|e| e.environment), Some(expected));
        }
    }

    #[test]
    fn test_legacy_receipt() {
        let response = json!({
            "status": 21006,
            "auto_renew_status": 0,
            "auto_renew_product_id": "com.myapp.product",
            "receipt": {
                "bid": "com.myapp",
                "bvrs": "1.18.100",
                "transaction_id": "250000287737863",
                "original_transaction_id": "250000287737863",
                "product_id": "com.myapp.product",
                "quantity": "1",
                "purchase_date_ms": "1526649071000",
                "expires_date": "1526908271000",
                "original_purchase_date_ms": "1526649072000",
                "is_trial_period": "true",
                "web_order_line_item_id": "251200091943117",
                "app_account_token": "1",
            },
        });
        assert!(extract(response.clone(), true, true).is_empty());

        let records = extract(response, false, true);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.bundle_id.as_deref(), Some("com.myapp"));
        assert_eq!(record.purchase_date, 1526649071000);
        assert_eq!(record.expiration_date, 1526908271000);
        assert_eq!(record.quantity, Some(1));
        assert_eq!(record.web_order_line_item_id.as_deref(), Some("251200091943117"));

        let extended = record.extended.as_ref().expect("extended");
        assert!(extended.is_trial_period);
        assert_eq!(extended.application_version.as_deref(), Some("1.18.100"));
        assert_eq!(extended.original_application_version.as_deref(), Some("1.0"));
        assert_eq!(extended.original_purchase_date, 1526649072000);
        assert_eq!(extended.app_account_token.as_deref(), Some("1"));
        assert_eq!(
            extended.pending_renewal_info,
            Some(vec![json!({
                "auto_renew_status": "0",
                "autoRenewStatus": "0",
                "product_id": "com.myapp.product",
                "productId": "com.myapp.product",
            })])
        );
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let response = model(json!({
            "status": 0,
            "receipt": { "in_app": [item("1", PAST_MS, FUTURE_MS), item("1", NOW_MS, FUTURE_MS)] },
        }));
        let options = ExtractOptions {
            ignore_expired: true,
            extended: true,
        };
        assert_eq!(
            extract_purchases(&response, options, Environment::Sandbox, NOW_MS),
            extract_purchases(&response, options, Environment::Sandbox, NOW_MS)
        );
    }

    #[test]
    fn test_preorder_date() {
        let records = extract(
            json!({
                "status": 0,
                "receipt": { "preorder_date_ms": "1526649071000", "in_app": [item("1", PAST_MS, FUTURE_MS)] },
            }),
            true,
            false,
        );
        assert_eq!(records[0].preorder_date, Some(1526649071000));
    }
}
