use crate::domain::gateway::{ChargeData, CheckoutRequest, CheckoutSession, GatewayVerification};
use crate::domain::ports::{PaymentGateway, SignatureVerifier};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use sha2::Sha512;
use std::time::Duration;
use tracing::{debug, warn};

type HmacSha512 = Hmac<Sha512>;

pub const DEFAULT_GATEWAY_URL: &str = "https://api.paystack.co";

/// Connection settings for the hosted gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub secret_key: String,
    pub callback_url: Option<String>,
    pub timeout: Duration,
}

/// Checks webhook signatures: lowercase hex HMAC-SHA512 of the raw request
/// body, keyed by the gateway secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Vec<u8>,
}

impl WebhookVerifier {
    /// Refuses a blank secret: anyone could forge signatures keyed by it.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self> {
        let secret = secret.as_ref();
        if secret.iter().all(u8::is_ascii_whitespace) {
            return Err(PaymentError::ValidationError(
                "webhook secret is not configured".to_string(),
            ));
        }
        Ok(Self {
            secret: secret.to_vec(),
        })
    }

    pub fn sign(&self, raw_payload: &[u8]) -> String {
        let mut mac = HmacSha512::new_from_slice(&self.secret)
            .expect("HMAC can take key of any size");
        mac.update(raw_payload);
        hex::encode(mac.finalize().into_bytes())
    }
}

impl SignatureVerifier for WebhookVerifier {
    /// Must be given the bytes exactly as received, before any JSON parsing.
    fn verify(&self, raw_payload: &[u8], signature_header: &str) -> bool {
        let Ok(expected) = hex::decode(signature_header.trim()) else {
            return false;
        };
        let Ok(mut mac) = HmacSha512::new_from_slice(&self.secret) else {
            return false;
        };
        mac.update(raw_payload);
        // Constant-time comparison.
        mac.verify_slice(&expected).is_ok()
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    reference: String,
}

/// REST client for the hosted gateway.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl HttpGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        if config.secret_key.trim().is_empty() {
            return Err(PaymentError::ValidationError(
                "gateway secret key is not configured".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PaymentError::InternalError(Box::new(e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
        })
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(PaymentError::GatewayUnreachable(format!(
                "gateway answered {}",
                status
            )));
        }

        let body = response.bytes().await.map_err(classify_transport_error)?;
        let envelope: Envelope<T> = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                return Err(PaymentError::GatewayError(format!(
                    "unreadable gateway response: {}",
                    e
                )));
            }
            Err(_) => return Err(PaymentError::GatewayError(status_message(status))),
        };

        if !status.is_success() || !envelope.status {
            return Err(PaymentError::GatewayError(envelope.message));
        }
        envelope.data.ok_or_else(|| {
            PaymentError::GatewayError(format!(
                "gateway response carried no data: {}",
                envelope.message
            ))
        })
    }
}

fn classify_transport_error(error: reqwest::Error) -> PaymentError {
    if error.is_timeout() || error.is_connect() || error.is_request() || error.is_body() {
        warn!(error = %error, "Gateway unreachable");
        PaymentError::GatewayUnreachable(error.to_string())
    } else {
        PaymentError::GatewayError(error.to_string())
    }
}

fn status_message(status: StatusCode) -> String {
    format!(
        "gateway answered {}",
        status.canonical_reason().unwrap_or(status.as_str())
    )
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn initialize(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        let body = json!({
            "email": request.payer_email,
            "amount": request.amount.to_subunits(),
            "currency": request.currency.code(),
            "reference": request.reference,
            "callback_url": request.callback_url,
            "metadata": request.metadata,
        });
        debug!(reference = %request.reference, "Opening gateway checkout");

        let data: InitializeData = self
            .send(
                self.client
                    .post(format!("{}/transaction/initialize", self.base_url))
                    .json(&body),
            )
            .await?;

        Ok(CheckoutSession {
            authorization_url: data.authorization_url,
            gateway_session_ref: data.reference,
        })
    }

    async fn verify(&self, reference: &str) -> Result<GatewayVerification> {
        debug!(reference, "Verifying charge with gateway");
        let data: ChargeData = self
            .send(
                self.client
                    .get(format!("{}/transaction/verify/{}", self.base_url, reference)),
            )
            .await?;
        Ok(data.into_verification())
    }
}
