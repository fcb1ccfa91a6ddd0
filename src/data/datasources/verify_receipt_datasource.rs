use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::{
    data::{
        datasources::utils::{proxy_from_env, strip_markup},
        models::verify_receipt::verify_receipt_request_model::VerifyReceiptRequestModel,
    },
    domain::entities::environment::Environment,
    errors::{TransportError, TransportErrorKind},
};

/// Sends receipts to Apple's `verifyReceipt` endpoint:
/// https://developer.apple.com/documentation/appstorereceipts/verifyreceipt
#[async_trait]
pub trait VerifyReceiptDatasource: Send + Sync {
    /// Posts `body` to the endpoint of `environment` and returns the parsed
    /// JSON reply, whatever its HTTP status.
    ///
    /// timeout:
    ///   Optional per-request timeout. Exceeding it yields a transport error
    ///   of kind `Timeout`.
    async fn verify_receipt(
        &self,
        environment: Environment,
        body: &VerifyReceiptRequestBody,
        timeout: Option<Duration>,
    ) -> Result<Value, TransportError>;
}

/// Opaque request body handed to a [`VerifyReceiptDatasource`].
#[derive(Debug, Clone)]
pub struct VerifyReceiptRequestBody(pub(crate) VerifyReceiptRequestModel);

impl VerifyReceiptRequestBody {
    pub fn to_json(&self) -> Value {
        serde_json::to_value(&self.0).unwrap_or(Value::Null)
    }
}

pub struct VerifyReceiptDatasourceImpl {
    client: reqwest::Client,
}

#[async_trait]
impl VerifyReceiptDatasource for VerifyReceiptDatasourceImpl {
    async fn verify_receipt(
        &self,
        environment: Environment,
        body: &VerifyReceiptRequestBody,
        timeout: Option<Duration>,
    ) -> Result<Value, TransportError> {
        let url = environment.verify_receipt_url();
        let mut request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .json(&body.0);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| {
            let kind = if e.is_timeout() {
                TransportErrorKind::Timeout
            } else {
                TransportErrorKind::Network
            };
            TransportError::new(kind, format!("callout to {url} failed to send: {e}"))
        })?;

        let http_status = response.status();
        let text = response.text().await.map_err(|e| {
            let kind = if e.is_timeout() {
                TransportErrorKind::Timeout
            } else {
                TransportErrorKind::Network
            };
            TransportError::new(kind, format!("failed to read response from {url}: {e}"))
                .with_http_status(http_status.as_u16())
        })?;
        parse_reply(url, http_status, &text)
    }
}

/// Maps an HTTP reply to its JSON body. JSON is accepted whatever the HTTP
/// status; anything else is a transport error.
fn parse_reply(url: &str, http_status: StatusCode, text: &str) -> Result<Value, TransportError> {
    match serde_json::from_str(text) {
        Ok(json) => Ok(json),
        Err(_) if http_status.is_server_error() => Err(TransportError::new(
            TransportErrorKind::ServiceUnavailable,
            strip_markup(text),
        )
        .with_http_status(http_status.as_u16())),
        Err(e) => Err(TransportError::new(
            TransportErrorKind::InvalidBody,
            format!("failed to parse response from {url} (HTTP {http_status}): {e}: {text}"),
        )
        .with_http_status(http_status.as_u16())),
    }
}

impl VerifyReceiptDatasourceImpl {
    /// Builds the HTTP client, routing through the proxy named by
    /// `http_proxy` / `HTTP_PROXY` when set. The proxy URL's scheme decides
    /// whether the connection to the proxy itself uses TLS.
    pub fn new() -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder().no_proxy();
        if let Some(proxy_url) = proxy_from_env() {
            debug!(
                "Routing receipt validation through {} proxy",
                if proxy_url.starts_with("https://") {
                    "https"
                } else {
                    "http"
                }
            );
            let proxy = reqwest::Proxy::all(&proxy_url).map_err(|e| {
                TransportError::new(
                    TransportErrorKind::Client,
                    format!("invalid proxy url {proxy_url}: {e}"),
                )
            })?;
            builder = builder.proxy(proxy);
        }
        let client = builder.build().map_err(|e| {
            TransportError::new(
                TransportErrorKind::Client,
                format!("failed to build HTTP client: {e}"),
            )
        })?;
        Ok(Self { client })
    }
}
