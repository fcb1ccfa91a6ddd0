use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::{
    data::{
        datasources::{
            device_check_datasource::DeviceCheckDatasource,
            verify_receipt_datasource::{VerifyReceiptDatasource, VerifyReceiptRequestBody},
        },
        models::verify_receipt::{
            verify_receipt_request_model::VerifyReceiptRequestModel,
            verify_receipt_response_model::VerifyReceiptResponseModel,
        },
        repositories::{
            purchase_extractor::extract_purchases,
            status_classifier::{
                classify, failure_for, invalid_response, is_empty_purchase, is_missing_receipt,
                Classification,
            },
        },
    },
    domain::{
        entities::{
            environment::Environment,
            purchase_record::PurchaseRecord,
            validate_request::{ExtractOptions, ValidationOptions},
        },
        repositories::receipt_repository::ReceiptRepository,
    },
    errors::{TransportError, TransportErrorKind, ValidationFailure, VerifyError},
};

pub struct ReceiptRepositoryImpl<V: VerifyReceiptDatasource> {
    verify_receipt_datasource: V,
    device_check_datasource: Option<Box<dyn DeviceCheckDatasource>>,
}

#[async_trait]
impl<V: VerifyReceiptDatasource> ReceiptRepository for ReceiptRepositoryImpl<V> {
    async fn validate(
        &self,
        options: &ValidationOptions,
    ) -> Result<Vec<PurchaseRecord>, VerifyError> {
        let result = self.validate_inner(options).await;
        if let Err(e) = &result {
            if options.config.verbose {
                error!("Receipt validation failed: {e}");
            }
        }
        result
    }

    fn extract(
        &self,
        response: &Value,
        options: ExtractOptions,
    ) -> Result<Vec<PurchaseRecord>, VerifyError> {
        let model = parse_response(response)?;
        Ok(extract_purchases(
            &model,
            options,
            Environment::Production,
            Utc::now().timestamp_millis(),
        ))
    }
}

impl<V: VerifyReceiptDatasource> ReceiptRepositoryImpl<V> {
    pub(crate) fn new(
        verify_receipt_datasource: V,
        device_check_datasource: Option<Box<dyn DeviceCheckDatasource>>,
    ) -> Self {
        Self {
            verify_receipt_datasource,
            device_check_datasource,
        }
    }

    async fn validate_inner(
        &self,
        options: &ValidationOptions,
    ) -> Result<Vec<PurchaseRecord>, VerifyError> {
        let config = &options.config;
        if let Some(device) = &options.device {
            self.check_device(device, &options.receipt).await?;
        }

        let body = VerifyReceiptRequestBody(VerifyReceiptRequestModel::new(
            &options.receipt,
            config.secret.as_deref(),
            config.exclude_old_transactions,
        ));
        if config.verbose {
            debug!(
                "Apple receipt validation request={}",
                serde_json::to_string(&body.0.redacted()).unwrap_or_default()
            );
        }

        // The last response that did not succeed, with its classification.
        let mut last_failure: Option<(Classification, Value)> = None;
        let mut verified: Option<(Environment, Value)> = None;
        for &environment in options.environments() {
            let response = self
                .verify_receipt_datasource
                .verify_receipt(environment, &body, config.request_timeout())
                .await?;
            if config.verbose {
                debug!("Apple receipt validation environment={environment} response={response}");
            }
            if !response.is_object() {
                return Err(TransportError::new(
                    TransportErrorKind::InvalidBody,
                    format!("{environment} replied with a non-object body: {response}"),
                )
                .into());
            }

            let model = parse_response(&response)?;
            match classify(model.status(), environment, config.ignore_expired_error) {
                Classification::Success | Classification::AcceptedExpired => {
                    verified = Some((environment, response));
                    break;
                }
                Classification::WrongEnvironment => {
                    debug!("Receipt rejected by {environment}, trying the next environment");
                    last_failure = Some((Classification::WrongEnvironment, response));
                }
                classification @ (Classification::ExpiredSubscription | Classification::Fatal) => {
                    return Err(failure_for(classification, &model, response).into());
                }
            }
        }

        let Some((environment, response)) = verified else {
            return Err(match last_failure {
                Some((classification, response)) => {
                    let model = parse_response(&response)?;
                    failure_for(classification, &model, response).into()
                }
                None => VerifyError::input("environment", "\"environment\" must not be empty"),
            });
        };

        let model = parse_response(&response)?;
        if is_missing_receipt(&model) {
            return Err(invalid_response(&model, response).into());
        }
        if is_empty_purchase(&model) {
            let receipt = model.receipt.as_ref();
            return Err(ValidationFailure::EmptyPurchase {
                message: "failed to validate for empty purchased list".to_owned(),
                application_version: receipt.and_then(|r| r.application_version.clone()),
                original_application_version: receipt
                    .and_then(|r| r.original_application_version.clone()),
                response,
            }
            .into());
        }

        let mut purchases = extract_purchases(
            &model,
            options.extract_options(),
            environment,
            Utc::now().timestamp_millis(),
        );
        if !config.keep_non_subscriptions {
            purchases.retain(PurchaseRecord::is_subscription);
        }
        Ok(unique_by_transaction_id(purchases))
    }

    async fn check_device(&self, device: &str, receipt: &str) -> Result<(), VerifyError> {
        let Some(checker) = &self.device_check_datasource else {
            warn!("Device check requested for {device} but no device checker is configured");
            return Ok(());
        };
        match checker.check_device(device, receipt).await {
            Ok(outcome) if outcome.passed => Ok(()),
            Ok(outcome) => Err(ValidationFailure::DeviceCheckFailed {
                output: outcome.output,
            }
            .into()),
            Err(e) => {
                warn!("Device check could not run, continuing without it: {e}");
                Ok(())
            }
        }
    }
}

fn parse_response(response: &Value) -> Result<VerifyReceiptResponseModel, VerifyError> {
    if !response.is_object() {
        return Err(VerifyError::input(
            "response",
            "\"response\" must be of type object",
        ));
    }
    serde_json::from_value(response.clone())
        .map_err(|e| VerifyError::input("response", format!("\"response\" is malformed: {e}")))
}

/// Keeps the last record seen for each transaction id, in order.
fn unique_by_transaction_id(purchases: Vec<PurchaseRecord>) -> Vec<PurchaseRecord> {
    let mut seen = HashSet::new();
    let mut unique: Vec<PurchaseRecord> = purchases
        .into_iter()
        .rev()
        .filter(|p| seen.insert(p.transaction_id.clone()))
        .collect();
    unique.reverse();
    unique
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::{
        config::VerifierConfig,
        domain::entities::device_check_outcome::DeviceCheckOutcome,
    };

    const RECEIPT: &str = "YWJjMTIzIT8kKiYoKSctPUB+";
    const DEVICE: &str = "A112340D-26DD-4FEA-BE40-F0B8E168EB1C";

    struct FakeVerifyReceipt {
        replies: Vec<(Environment, Result<Value, TransportErrorKind>)>,
        calls: Mutex<Vec<(Environment, Value)>>,
    }

    impl FakeVerifyReceipt {
        fn new(replies: Vec<(Environment, Result<Value, TransportErrorKind>)>) -> Self {
            Self {
                replies,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl VerifyReceiptDatasource for FakeVerifyReceipt {
        async fn verify_receipt(
            &self,
            environment: Environment,
            body: &VerifyReceiptRequestBody,
            _timeout: Option<Duration>,
        ) -> Result<Value, TransportError> {
            self.calls
                .lock()
                .expect("lock")
                .push((environment, body.to_json()));
            let (_, reply) = self
                .replies
                .iter()
                .find(|(env, _)| *env == environment)
                .expect("unexpected environment");
            reply
                .clone()
                .map_err(|kind| TransportError::new(kind, "scripted failure"))
        }
    }

    struct FakeDeviceCheck(Result<bool, String>);

    #[async_trait]
    impl DeviceCheckDatasource for FakeDeviceCheck {
        async fn check_device(
            &self,
            _device: &str,
            _receipt: &str,
        ) -> Result<DeviceCheckOutcome, String> {
            self.0.clone().map(|passed| DeviceCheckOutcome {
                passed,
                output: format!("{{\"status\":{}}}", u8::from(passed)),
            })
        }
    }

    fn options(config: VerifierConfig, device: Option<&str>) -> ValidationOptions {
        ValidationOptions {
            receipt: RECEIPT.to_owned(),
            device: device.map(str::to_owned),
            config,
        }
    }

    fn both_environments() -> VerifierConfig {
        VerifierConfig {
            environment: vec![Environment::Production, Environment::Sandbox],
            ..Default::default()
        }
    }

    fn subscription(transaction_id: &str) -> Value {
        let future = (Utc::now().timestamp_millis() + 86_400_000).to_string();
        json!({
            "transaction_id": transaction_id,
            "product_id": "com.myapp.monthly",
            "purchase_date_ms": "1526649071000",
            "expires_date_ms": future,
        })
    }

    #[tokio::test]
    async fn test_falls_back_to_sandbox() {
        let repository = ReceiptRepositoryImpl::new(
            FakeVerifyReceipt::new(vec![
                (Environment::Production, Ok(json!({ "status": 21007 }))),
                (
                    Environment::Sandbox,
                    Ok(json!({ "status": 0, "receipt": { "in_app": [subscription("1")] } })),
                ),
            ]),
            None,
        );
        let purchases = repository
            .validate(&options(both_environments(), None))
            .await
            .expect("valid");
        assert_eq!(purchases.len(), 1);
        let calls = repository.verify_receipt_datasource.calls.lock().expect("lock");
        let environments: Vec<_> = calls.iter().map(|(env, _)| *env).collect();
        assert_eq!(environments, [Environment::Production, Environment::Sandbox]);
    }

    #[tokio::test]
    async fn test_wrong_environment_on_last_attempt_is_fatal() {
        let repository = ReceiptRepositoryImpl::new(
            FakeVerifyReceipt::new(vec![(
                Environment::Production,
                Ok(json!({ "status": 21007 })),
            )]),
            None,
        );
        let error = repository
            .validate(&options(VerifierConfig::default(), None))
            .await
            .expect_err("sandbox receipt");
        assert_eq!(error.status(), Some(21007));
        assert!(error.to_string().starts_with("This receipt is a sandbox receipt"));
    }

    #[tokio::test]
    async fn test_transport_error_is_surfaced() {
        let repository = ReceiptRepositoryImpl::new(
            FakeVerifyReceipt::new(vec![(Environment::Production, Err(TransportErrorKind::Timeout))]),
            None,
        );
        match repository.validate(&options(both_environments(), None)).await {
            Err(VerifyError::Transport(e)) => assert!(e.is_timeout()),
            other => panic!("expected transport error, got {other:?}"),
        }
        assert_eq!(repository.verify_receipt_datasource.calls.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn test_non_subscriptions_are_dropped_unless_kept() {
        let mut consumable = subscription("2");
        consumable["expires_date_ms"] = json!(null);
        let reply = json!({
            "status": 0,
            "receipt": { "in_app": [subscription("1"), consumable] },
        });
        let repository = ReceiptRepositoryImpl::new(
            FakeVerifyReceipt::new(vec![(Environment::Production, Ok(reply))]),
            None,
        );
        let purchases = repository
            .validate(&options(VerifierConfig::default(), None))
            .await
            .expect("valid");
        assert_eq!(purchases.len(), 1);

        let config = VerifierConfig {
            keep_non_subscriptions: true,
            ..Default::default()
        };
        let purchases = repository.validate(&options(config, None)).await.expect("valid");
        assert_eq!(purchases.len(), 2);
    }

    #[tokio::test]
    async fn test_device_check() {
        let reply = json!({ "status": 0, "receipt": { "in_app": [subscription("1")] } });
        let scripted = || FakeVerifyReceipt::new(vec![(Environment::Production, Ok(reply.clone()))]);

        let failing = ReceiptRepositoryImpl::new(scripted(), Some(Box::new(FakeDeviceCheck(Ok(false)))));
        match failing.validate(&options(VerifierConfig::default(), Some(DEVICE))).await {
            Err(VerifyError::Validation(ValidationFailure::DeviceCheckFailed { .. })) => {}
            other => panic!("expected device check failure, got {other:?}"),
        }
        assert!(failing.verify_receipt_datasource.calls.lock().expect("lock").is_empty());

        let broken = ReceiptRepositoryImpl::new(
            scripted(),
            Some(Box::new(FakeDeviceCheck(Err("no tool".to_owned())))),
        );
        assert!(broken
            .validate(&options(VerifierConfig::default(), Some(DEVICE)))
            .await
            .is_ok());

        let passing = ReceiptRepositoryImpl::new(scripted(), Some(Box::new(FakeDeviceCheck(Ok(true)))));
        assert!(passing
            .validate(&options(VerifierConfig::default(), Some(DEVICE)))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_success_without_receipt_is_invalid_response() {
        for reply in [json!({ "status": 0 }), json!({ "status": 0, "receipt": [1, 2] })] {
            let repository = ReceiptRepositoryImpl::new(
                FakeVerifyReceipt::new(vec![(Environment::Production, Ok(reply.clone()))]),
                None,
            );
            match repository.validate(&options(VerifierConfig::default(), None)).await {
                Err(VerifyError::Validation(ValidationFailure::FatalStatus {
                    status,
                    message,
                    response,
                    ..
                })) => {
                    assert_eq!(status, 1);
                    assert_eq!(message, "invalid server response");
                    assert_eq!(response, reply);
                }
                other => panic!("expected invalid server response, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_extract_rejects_non_objects() {
        let repository = ReceiptRepositoryImpl::new(FakeVerifyReceipt::new(Vec::new()), None);
        assert!(matches!(
            repository.extract(&json!("nope"), ExtractOptions::default()),
            Err(VerifyError::Input { .. })
        ));
        assert!(repository
            .extract(&json!({}), ExtractOptions::default())
            .expect("object")
            .is_empty());
    }
}
