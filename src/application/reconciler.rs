use super::effects::{EffectApplicator, EffectOutcome};
use crate::domain::payment::{Payment, SuccessDetails, Transition};
use crate::domain::ports::PaymentLedgerRef;
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

/// An outcome as reported by one of the triggers (verify poll or webhook).
#[derive(Debug, Clone, PartialEq)]
pub enum ReportedOutcome {
    Success {
        gateway_transaction_ref: Option<String>,
        /// What the gateway says it charged, in subunits, when it says so.
        amount_subunits: Option<i64>,
        currency: Option<String>,
        paid_at: Option<DateTime<Utc>>,
        metadata: Value,
    },
    Failure {
        reason: String,
    },
}

/// Result of one `reconcile` call.
#[derive(Debug)]
pub struct Reconciliation {
    /// The payment as stored after the call.
    pub payment: Payment,
    /// Whether this call performed the terminal transition.
    pub applied: bool,
    /// The payment was already terminal, or a concurrent caller got there first.
    pub already_processed: bool,
    pub effect: Option<EffectOutcome>,
    /// Set when effects failed after the payment was durably recorded as `success`.
    pub effect_error: Option<PaymentError>,
}

impl Reconciliation {
    fn unchanged(payment: Payment) -> Self {
        Self {
            payment,
            applied: false,
            already_processed: true,
            effect: None,
            effect_error: None,
        }
    }
}

/// Turns gateway-reported outcomes into exactly one terminal transition and
/// at most one effect application per payment.
///
/// Holds no state of its own: the ledger's guarded transition decides which
/// caller wins, so any number of engines may run side by side.
pub struct ReconciliationEngine {
    ledger: PaymentLedgerRef,
    effects: Arc<dyn EffectApplicator>,
}

impl ReconciliationEngine {
    pub fn new(ledger: PaymentLedgerRef, effects: Arc<dyn EffectApplicator>) -> Self {
        Self { ledger, effects }
    }

    pub async fn reconcile(
        &self,
        gateway_session_ref: &str,
        outcome: ReportedOutcome,
    ) -> Result<Reconciliation> {
        let payment = self
            .ledger
            .find_by_gateway_session_ref(gateway_session_ref)
            .await?
            .ok_or_else(|| {
                PaymentError::NotFound(format!("payment with reference {}", gateway_session_ref))
            })?;

        if payment.is_terminal() {
            info!(
                payment_id = %payment.id,
                reference = gateway_session_ref,
                status = %payment.status,
                "Payment already processed"
            );
            return Ok(Reconciliation::unchanged(payment));
        }

        match check_settlement(&payment, outcome) {
            ReportedOutcome::Success {
                gateway_transaction_ref,
                paid_at,
                metadata,
                ..
            } => {
                let details = SuccessDetails {
                    gateway_transaction_ref,
                    metadata,
                    paid_at: paid_at.unwrap_or_else(Utc::now),
                };
                let transition = self
                    .ledger
                    .transition_to_success(payment.id, details)
                    .await?;
                self.after_success(transition).await
            }
            ReportedOutcome::Failure { reason } => {
                let transition = self
                    .ledger
                    .transition_to_failure(payment.id, &reason)
                    .await?;
                if transition.applied {
                    info!(
                        payment_id = %transition.payment.id,
                        reason = %reason,
                        "Payment failed"
                    );
                }
                Ok(settled(transition))
            }
        }
    }

    async fn after_success(&self, transition: Transition) -> Result<Reconciliation> {
        if !transition.applied {
            info!(
                payment_id = %transition.payment.id,
                "Concurrent reconciliation already settled this payment"
            );
            return Ok(settled(transition));
        }

        let payment = transition.payment;
        info!(
            payment_id = %payment.id,
            net_amount = %payment.net_amount,
            target_type = %payment.target_type,
            "Payment succeeded"
        );

        // The money has moved at the gateway: a failing effect is reported
        // but the payment stays `success`.
        let (effect, effect_error) = match self.effects.apply(&payment).await {
            Ok(outcome) => (Some(outcome), None),
            Err(e) => {
                error!(
                    payment_id = %payment.id,
                    error = %e,
                    "Effect application failed after successful payment"
                );
                (None, Some(e))
            }
        };

        Ok(Reconciliation {
            payment,
            applied: true,
            already_processed: false,
            effect,
            effect_error,
        })
    }
}

fn settled(transition: Transition) -> Reconciliation {
    Reconciliation {
        already_processed: !transition.applied,
        applied: transition.applied,
        payment: transition.payment,
        effect: None,
        effect_error: None,
    }
}

/// Downgrades a reported success to a failure when the gateway charged a
/// different amount or currency than the payment asked for.
fn check_settlement(payment: &Payment, outcome: ReportedOutcome) -> ReportedOutcome {
    let ReportedOutcome::Success {
        amount_subunits,
        currency,
        ..
    } = &outcome
    else {
        return outcome;
    };

    if let Some(charged) = amount_subunits
        && *charged != payment.amount.to_subunits()
    {
        warn!(
            payment_id = %payment.id,
            expected = payment.amount.to_subunits(),
            charged,
            "Gateway charged a different amount"
        );
        return ReportedOutcome::Failure {
            reason: format!(
                "amount mismatch: expected {} subunits, gateway charged {}",
                payment.amount.to_subunits(),
                charged
            ),
        };
    }

    if let Some(currency) = currency
        && !currency.eq_ignore_ascii_case(payment.currency.code())
    {
        warn!(
            payment_id = %payment.id,
            expected = %payment.currency,
            charged = %currency,
            "Gateway charged a different currency"
        );
        return ReportedOutcome::Failure {
            reason: format!(
                "currency mismatch: expected {}, gateway charged {}",
                payment.currency, currency
            ),
        };
    }

    outcome
}
