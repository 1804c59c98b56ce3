use super::reconciler::{ReconciliationEngine, ReportedOutcome};
use crate::domain::gateway::GatewayEvent;
use crate::domain::ports::{ExpiringKeyStoreRef, SignatureVerifierRef};
use crate::error::{PaymentError, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const CHARGE_SUCCESS: &str = "charge.success";
pub const CHARGE_FAILED: &str = "charge.failed";

pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// How a webhook delivery was handled. Every variant is acknowledged to the
/// gateway as success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "disposition", content = "detail", rename_all = "snake_case")]
pub enum WebhookAck {
    Processed,
    /// Seen recently; the ledger was not consulted.
    Duplicate,
    /// Unknown event type or unreadable body.
    Ignored(String),
    /// A business error was recorded for operators.
    Failed(String),
}

/// Trust gate in front of the reconciliation engine for gateway callbacks.
pub struct WebhookIngress {
    verifier: SignatureVerifierRef,
    engine: Arc<ReconciliationEngine>,
    deliveries: ExpiringKeyStoreRef,
    dedup_ttl: Duration,
}

impl WebhookIngress {
    pub fn new(
        verifier: SignatureVerifierRef,
        engine: Arc<ReconciliationEngine>,
        deliveries: ExpiringKeyStoreRef,
    ) -> Self {
        Self {
            verifier,
            engine,
            deliveries,
            dedup_ttl: DEFAULT_DEDUP_TTL,
        }
    }

    pub fn with_dedup_ttl(mut self, ttl: Duration) -> Self {
        self.dedup_ttl = ttl;
        self
    }

    /// Only an `Err(SignatureInvalid)` should be answered with a rejection.
    pub async fn receive(&self, raw_body: &[u8], signature_header: &str) -> Result<WebhookAck> {
        if !self.verifier.verify(raw_body, signature_header) {
            warn!(bytes = raw_body.len(), "Rejected webhook with invalid signature");
            return Err(PaymentError::SignatureInvalid);
        }

        let event: GatewayEvent = match serde_json::from_slice(raw_body) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Signed webhook body could not be parsed");
                return Ok(WebhookAck::Ignored(format!("unreadable body: {}", e)));
            }
        };

        let outcome = match event.event.as_str() {
            CHARGE_SUCCESS => ReportedOutcome::Success {
                gateway_transaction_ref: event.data.transaction_ref(),
                amount_subunits: event.data.amount,
                currency: event.data.currency.clone(),
                paid_at: event.data.paid_at,
                metadata: event.data.metadata.clone(),
            },
            CHARGE_FAILED => ReportedOutcome::Failure {
                reason: event
                    .data
                    .gateway_response
                    .clone()
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| "charge failed".to_string()),
            },
            other => {
                info!(event = other, "Ignoring webhook event");
                return Ok(WebhookAck::Ignored(format!("unhandled event {}", other)));
            }
        };

        let reference = event.data.reference.as_str();
        let delivery_key = format!("{}:{}", event.event, reference);
        match self.deliveries.contains(&delivery_key).await {
            Ok(true) => {
                debug!(event = %event.event, reference, "Duplicate webhook delivery");
                return Ok(WebhookAck::Duplicate);
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Delivery cache unavailable; reconciling anyway"),
        }

        match self.engine.reconcile(reference, outcome).await {
            Ok(reconciliation) => {
                if let Err(e) = self.deliveries.put(&delivery_key, self.dedup_ttl).await {
                    warn!(error = %e, "Could not remember webhook delivery");
                }
                if let Some(effect_error) = reconciliation.effect_error {
                    return Ok(WebhookAck::Failed(effect_error.to_string()));
                }
                Ok(WebhookAck::Processed)
            }
            Err(e) => {
                error!(
                    event = %event.event,
                    reference,
                    error = %e,
                    "Webhook reconciliation failed"
                );
                Ok(WebhookAck::Failed(e.to_string()))
            }
        }
    }
}
