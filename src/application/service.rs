use super::reconciler::{Reconciliation, ReconciliationEngine, ReportedOutcome};
use crate::domain::fees::FeeSchedule;
use crate::domain::gateway::{CheckoutRequest, GatewayStatus, GatewayVerification};
use crate::domain::history::{HistoryQuery, Page};
use crate::domain::money::{Amount, Currency, Fees};
use crate::domain::payment::{Payment, PaymentDraft, PaymentId, PaymentStatus, TargetType};
use crate::domain::ports::{PaymentGatewayRef, PaymentLedgerRef};
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Client request to start a payment.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeRequest {
    pub payer_id: String,
    pub payer_email: String,
    pub amount: Decimal,
    pub currency: String,
    pub payment_type: String,
    pub target_ref: String,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitializedPayment {
    pub payment_id: PaymentId,
    pub authorization_url: String,
    pub gateway_session_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum VerifyVerdict {
    Succeeded,
    Failed(String),
    /// The gateway has not settled the charge yet.
    StillPending,
    AlreadyProcessed,
}

impl VerifyVerdict {
    pub fn message(&self) -> String {
        match self {
            VerifyVerdict::Succeeded => "Payment successful".to_string(),
            VerifyVerdict::Failed(reason) => {
                format!("The payment provider reported a failure: {}", reason)
            }
            VerifyVerdict::StillPending => "Payment not completed yet".to_string(),
            VerifyVerdict::AlreadyProcessed => "Payment already processed".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifyResponse {
    pub payment_id: PaymentId,
    pub status: PaymentStatus,
    pub amount: Amount,
    pub currency: Currency,
    pub fees: Fees,
    pub net_amount: Decimal,
    pub verdict: VerifyVerdict,
    pub message: String,
}

impl VerifyResponse {
    fn new(payment: &Payment, verdict: VerifyVerdict) -> Self {
        Self {
            payment_id: payment.id,
            status: payment.status,
            amount: payment.amount,
            currency: payment.currency.clone(),
            fees: payment.fees,
            net_amount: payment.net_amount,
            message: verdict.message(),
            verdict,
        }
    }
}

/// Client-facing payment operations: start a payment, poll its outcome,
/// browse history.
pub struct PaymentService {
    ledger: PaymentLedgerRef,
    gateway: PaymentGatewayRef,
    engine: Arc<ReconciliationEngine>,
    fees: FeeSchedule,
    callback_url: Option<String>,
}

impl PaymentService {
    pub fn new(
        ledger: PaymentLedgerRef,
        gateway: PaymentGatewayRef,
        engine: Arc<ReconciliationEngine>,
        fees: FeeSchedule,
    ) -> Self {
        Self {
            ledger,
            gateway,
            engine,
            fees,
            callback_url: None,
        }
    }

    pub fn with_callback_url(mut self, callback_url: Option<String>) -> Self {
        self.callback_url = callback_url;
        self
    }

    pub async fn initialize(&self, request: InitializeRequest) -> Result<InitializedPayment> {
        let amount = Amount::new(request.amount)?;
        let currency = Currency::new(&request.currency)?;
        let target_type: TargetType = request.payment_type.parse()?;
        if request.payer_id.trim().is_empty() {
            return Err(PaymentError::ValidationError("payer is required".to_string()));
        }
        if request.target_ref.trim().is_empty() {
            return Err(PaymentError::ValidationError(
                "target reference is required".to_string(),
            ));
        }
        if !request.payer_email.contains('@') {
            return Err(PaymentError::ValidationError(format!(
                "invalid payer email: '{}'",
                request.payer_email
            )));
        }
        let metadata = match request.metadata {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };

        let draft = PaymentDraft::new(
            request.payer_id,
            target_type,
            request.target_ref,
            amount,
            currency.clone(),
            &self.fees,
        )
        .with_metadata(metadata.clone());
        let payment = self.ledger.create(draft).await?;

        let checkout = CheckoutRequest {
            amount,
            currency,
            payer_email: request.payer_email,
            reference: payment.gateway_session_ref.clone(),
            callback_url: self.callback_url.clone(),
            metadata,
        };
        let session = match self.gateway.initialize(&checkout).await {
            Ok(session) => session,
            Err(e) => {
                // No checkout exists, so this payment can never be paid.
                error!(payment_id = %payment.id, error = %e, "Gateway refused checkout");
                self.ledger
                    .transition_to_failure(payment.id, &format!("initialization failed: {}", e))
                    .await?;
                return Err(e);
            }
        };

        if session.gateway_session_ref != payment.gateway_session_ref {
            warn!(
                payment_id = %payment.id,
                ours = %payment.gateway_session_ref,
                theirs = %session.gateway_session_ref,
                "Gateway echoed a different reference; keeping ours"
            );
        }
        info!(
            payment_id = %payment.id,
            reference = %payment.gateway_session_ref,
            amount = %payment.amount,
            currency = %payment.currency,
            "Payment initialized"
        );

        Ok(InitializedPayment {
            payment_id: payment.id,
            authorization_url: session.authorization_url,
            gateway_session_ref: payment.gateway_session_ref,
        })
    }

    /// Client-side poll. Asks the gateway for the charge status and feeds it
    /// through reconciliation.
    pub async fn verify(&self, gateway_session_ref: &str) -> Result<VerifyResponse> {
        let payment = self
            .ledger
            .find_by_gateway_session_ref(gateway_session_ref)
            .await?
            .ok_or_else(|| {
                PaymentError::NotFound(format!("payment with reference {}", gateway_session_ref))
            })?;
        if payment.is_terminal() {
            return Ok(VerifyResponse::new(&payment, VerifyVerdict::AlreadyProcessed));
        }

        let verification = self.gateway.verify(gateway_session_ref).await?;
        let Some(outcome) = reported_outcome(verification) else {
            return Ok(VerifyResponse::new(&payment, VerifyVerdict::StillPending));
        };

        let reconciliation = self.engine.reconcile(gateway_session_ref, outcome).await?;
        Ok(VerifyResponse::new(
            &reconciliation.payment,
            verdict_for(&reconciliation),
        ))
    }

    pub async fn history(&self, query: &HistoryQuery) -> Result<Page<Payment>> {
        self.ledger.query(query).await
    }
}

/// `None` while the gateway has not settled the charge.
pub fn reported_outcome(verification: GatewayVerification) -> Option<ReportedOutcome> {
    match verification.status {
        GatewayStatus::Success => Some(ReportedOutcome::Success {
            gateway_transaction_ref: verification.gateway_transaction_ref,
            amount_subunits: verification.amount_subunits,
            currency: verification.currency,
            paid_at: verification.paid_at,
            metadata: verification.metadata,
        }),
        GatewayStatus::Failed | GatewayStatus::Reversed => Some(ReportedOutcome::Failure {
            reason: verification
                .gateway_response
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| format!("charge {:?}", verification.status).to_lowercase()),
        }),
        GatewayStatus::Abandoned | GatewayStatus::Pending => None,
    }
}

fn verdict_for(reconciliation: &Reconciliation) -> VerifyVerdict {
    if reconciliation.already_processed {
        return VerifyVerdict::AlreadyProcessed;
    }
    match reconciliation.payment.status {
        PaymentStatus::Success => VerifyVerdict::Succeeded,
        PaymentStatus::Failed => VerifyVerdict::Failed(
            reconciliation
                .payment
                .failure_reason
                .clone()
                .unwrap_or_default(),
        ),
        PaymentStatus::Pending => VerifyVerdict::StillPending,
    }
}
