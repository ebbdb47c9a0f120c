//! REST client for the dispatch service.
//!
//! Wraps the service's marketing endpoints using [`reqwest`]. The opaque
//! credential travels in the [`CREDENTIAL_HEADER`] header and is never
//! inspected here.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use broadcast_core::dispatch::{
    Credential, DispatchGateway, DispatchRequest, DispatchResponse, GatewayResult, Recipient,
    SendStatus, CREDENTIAL_HEADER,
};
use broadcast_core::error::CoreError;

use crate::config::GatewayConfig;

pub const SEND_SINGLE_PATH: &str = "/marketing/send-single";
pub const SEND_BATCH_PATH: &str = "/marketing/send-batch";
pub const VERIFY_PIN_PATH: &str = "/marketing/verify-pin";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors from the dispatch service HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, decode).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("Dispatch service error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl GatewayError {
    /// Message fit for an end user: the service's `detail` field when it
    /// sent one, otherwise a generic description.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Request(e) if e.is_timeout() => {
                "The SMS service did not respond in time. Please try again.".to_string()
            }
            GatewayError::Request(_) => {
                "Could not reach the SMS service. Please try again.".to_string()
            }
            GatewayError::Api { status, body } => serde_json::from_str::<ErrorBody>(body)
                .map(|b| b.detail)
                .unwrap_or_else(|_| format!("SMS service returned HTTP {status}")),
        }
    }
}

impl From<GatewayError> for CoreError {
    fn from(err: GatewayError) -> Self {
        match &err {
            GatewayError::Api { status: 401 | 403, .. } => {
                CoreError::Unauthorized(err.user_message())
            }
            _ => CoreError::Transport(err.user_message()),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

#[derive(Debug, Serialize)]
struct SingleSmsRequest<'a> {
    name: &'a str,
    phone: &'a str,
    message: &'a str,
}

#[derive(Debug, Deserialize)]
struct SingleSmsResponse {
    success: bool,
    #[serde(default)]
    sid: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct VerifyPinRequest<'a> {
    pin: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifyPinResponse {
    valid: bool,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for one dispatch service.
#[derive(Debug, Clone)]
pub struct HttpDispatchGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDispatchGateway {
    /// Build a client with the configured timeout.
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self::with_client(client, config.base_url.clone()))
    }

    /// Create a gateway reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send one message via `POST /marketing/send-single`.
    ///
    /// The service answers `{success, sid?, error?}`; it is normalised to a
    /// single [`GatewayResult`].
    pub async fn send_single(
        &self,
        recipient: &Recipient,
        message: &str,
        credential: &Credential,
    ) -> Result<GatewayResult, GatewayError> {
        let body = SingleSmsRequest {
            name: &recipient.name,
            phone: &recipient.phone,
            message,
        };

        let response = self
            .client
            .post(self.url(SEND_SINGLE_PATH))
            .header(CREDENTIAL_HEADER, credential.expose())
            .json(&body)
            .send()
            .await?;

        let reply: SingleSmsResponse = Self::ensure_success(response).await?.json().await?;

        Ok(GatewayResult {
            name: recipient.name.clone(),
            phone: recipient.phone.clone(),
            status: if reply.success {
                SendStatus::Sent
            } else {
                SendStatus::Failed
            },
            sid: reply.sid,
            error: reply.error,
        })
    }

    /// Send to many recipients via `POST /marketing/send-batch`.
    pub async fn send_batch(
        &self,
        request: &DispatchRequest,
        credential: &Credential,
    ) -> Result<DispatchResponse, GatewayError> {
        let response = self
            .client
            .post(self.url(SEND_BATCH_PATH))
            .header(CREDENTIAL_HEADER, credential.expose())
            .json(request)
            .send()
            .await?;

        Ok(Self::ensure_success(response).await?.json().await?)
    }

    /// Check a PIN via `POST /marketing/verify-pin`.
    pub async fn verify_pin(&self, credential: &Credential) -> Result<bool, GatewayError> {
        let response = self
            .client
            .post(self.url(VERIFY_PIN_PATH))
            .json(&VerifyPinRequest {
                pin: credential.expose(),
            })
            .send()
            .await?;

        let reply: VerifyPinResponse = Self::ensure_success(response).await?.json().await?;
        Ok(reply.valid)
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Pass 2xx responses through; turn anything else into
    /// [`GatewayError::Api`] carrying the status and body text.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(GatewayError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl DispatchGateway for HttpDispatchGateway {
    async fn send(
        &self,
        request: &DispatchRequest,
        credential: &Credential,
    ) -> Result<DispatchResponse, CoreError> {
        let recipients = request.recipients.len();
        tracing::info!(recipients, base_url = %self.base_url, "Dispatching SMS");

        let outcome = match request.recipients.as_slice() {
            [single] => self
                .send_single(single, &request.message, credential)
                .await
                .map(|result| DispatchResponse {
                    results: vec![result],
                }),
            _ => self.send_batch(request, credential).await,
        };

        match outcome {
            Ok(response) => {
                let results = &response.results;
                tracing::info!(
                    recipients,
                    sent = count_status(results, SendStatus::Sent),
                    failed = count_status(results, SendStatus::Failed),
                    pending = count_status(results, SendStatus::Pending),
                    "Dispatch completed"
                );
                Ok(response)
            }
            Err(e) => {
                tracing::error!(recipients, error = %e, "Dispatch failed");
                Err(e.into())
            }
        }
    }

    async fn verify_credential(&self, credential: &Credential) -> Result<bool, CoreError> {
        let valid = self.verify_pin(credential).await?;
        if valid {
            tracing::info!("Dispatch credential verified");
        } else {
            tracing::warn!("Dispatch credential rejected");
        }
        Ok(valid)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

fn count_status(results: &[GatewayResult], status: SendStatus) -> usize {
    results.iter().filter(|r| r.status == status).count()
}
