use serde_json::Value;

use crate::{
    config::{ConfigOverrides, ConfigStore, VerifierConfig},
    data::{
        datasources::{
            device_check_datasource::DeviceCheckDatasource,
            verify_receipt_datasource::{VerifyReceiptDatasource, VerifyReceiptDatasourceImpl},
        },
        repositories::receipt_repository_impl::ReceiptRepositoryImpl,
    },
    domain::{
        entities::{
            purchase_record::PurchaseRecord,
            validate_request::{ExtractOptions, ValidateRequest, ValidationOptions},
        },
        repositories::receipt_repository::ReceiptRepository,
    },
    errors::VerifyError,
};

/// Validates App Store receipts.
///
/// Holds the configured defaults. `configure` must be called at least once
/// before `validate`; each validation works on a copy of the defaults taken
/// when it starts.
pub struct ReceiptVerifyUtil<R: ReceiptRepository> {
    receipt_repository: R,
    config_store: ConfigStore,
}

impl<R: ReceiptRepository> ReceiptVerifyUtil<R> {
    /// Layers `overrides` on top of the current defaults.
    pub fn configure(&mut self, overrides: &ConfigOverrides) {
        self.config_store.configure(overrides);
    }

    /// Like [`ReceiptVerifyUtil::configure`], from a JSON options object.
    pub fn configure_from_value(&mut self, value: &Value) -> Result<(), VerifyError> {
        let overrides = ConfigOverrides::from_value(value)?;
        self.configure(&overrides);
        Ok(())
    }

    pub fn config(&self) -> VerifierConfig {
        self.config_store.config()
    }

    /// Restores the default configuration.
    pub fn reset_config(&mut self) {
        self.config_store.reset();
    }

    pub async fn validate(
        &self,
        request: ValidateRequest,
    ) -> Result<Vec<PurchaseRecord>, VerifyError> {
        let defaults = self.config_store.snapshot()?;
        let options = ValidationOptions::resolve(request, &defaults)?;
        self.receipt_repository.validate(&options).await
    }

    /// Normalizes the purchases of a response obtained elsewhere. Does not
    /// need configuration.
    pub fn extract(
        &self,
        response: &Value,
        options: ExtractOptions,
    ) -> Result<Vec<PurchaseRecord>, VerifyError> {
        self.receipt_repository.extract(response, options)
    }
}

impl<V: VerifyReceiptDatasource> ReceiptVerifyUtil<ReceiptRepositoryImpl<V>> {
    /// Uses `datasource` to reach the verification endpoints.
    pub fn with_datasource(datasource: V) -> Self {
        Self {
            receipt_repository: ReceiptRepositoryImpl::new(datasource, None),
            config_store: ConfigStore::new(),
        }
    }

    /// Like [`ReceiptVerifyUtil::with_datasource`], cross-checking receipts
    /// against the device they were read on whenever a request names one.
    pub fn with_device_check(
        datasource: V,
        device_check: impl DeviceCheckDatasource + 'static,
    ) -> Self {
        Self {
            receipt_repository: ReceiptRepositoryImpl::new(
                datasource,
                Some(Box::new(device_check)),
            ),
            config_store: ConfigStore::new(),
        }
    }
}

impl ReceiptVerifyUtil<ReceiptRepositoryImpl<VerifyReceiptDatasourceImpl>> {
    /// Talks to Apple's production and sandbox endpoints over HTTPS.
    pub fn new() -> Result<Self, VerifyError> {
        Ok(Self::with_datasource(VerifyReceiptDatasourceImpl::new()?))
    }
}
