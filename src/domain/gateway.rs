use super::money::{Amount, Currency};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request to open a checkout session with the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub amount: Amount,
    pub currency: Currency,
    pub payer_email: String,
    /// Our session reference; the gateway echoes it back on verify and webhooks.
    pub reference: String,
    pub callback_url: Option<String>,
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub authorization_url: String,
    pub gateway_session_ref: String,
}

/// Charge status as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayStatus {
    Success,
    Failed,
    Reversed,
    /// The payer left the checkout. The charge may still complete later.
    Abandoned,
    Pending,
}

impl GatewayStatus {
    pub fn from_gateway(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "success" => GatewayStatus::Success,
            "failed" => GatewayStatus::Failed,
            "reversed" => GatewayStatus::Reversed,
            "abandoned" => GatewayStatus::Abandoned,
            _ => GatewayStatus::Pending,
        }
    }
}

/// The gateway's view of a charge.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayVerification {
    pub status: GatewayStatus,
    pub gateway_transaction_ref: Option<String>,
    pub amount_subunits: Option<i64>,
    pub currency: Option<String>,
    pub gateway_response: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub metadata: Value,
}

/// A charge as the gateway describes it, both in verify responses and in
/// webhook event payloads.
#[derive(Debug, Clone, Deserialize)]
pub struct ChargeData {
    pub id: Option<Value>,
    pub status: String,
    pub reference: String,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub gateway_response: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Value,
}

impl ChargeData {
    /// Charge ids arrive as numbers from some endpoints and strings from others.
    pub fn transaction_ref(&self) -> Option<String> {
        match &self.id {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn into_verification(self) -> GatewayVerification {
        GatewayVerification {
            status: GatewayStatus::from_gateway(&self.status),
            gateway_transaction_ref: self.transaction_ref(),
            amount_subunits: self.amount,
            currency: self.currency,
            gateway_response: self.gateway_response,
            paid_at: self.paid_at,
            metadata: self.metadata,
        }
    }
}

/// A signed webhook delivery, once its signature has been checked.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayEvent {
    pub event: String,
    pub data: ChargeData,
}
