use super::fees::FeeSchedule;
use super::money::{Amount, Currency, Fees};
use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type PaymentId = Uuid;

/// Prefix of every gateway session reference minted by the ledger.
pub const REFERENCE_PREFIX: &str = "pay_";

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    /// `success` and `failed` are never left once reached.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "success" => Ok(PaymentStatus::Success),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(PaymentError::ValidationError(format!(
                "Unknown payment status: '{}'",
                other
            ))),
        }
    }
}

/// What a payment is paying for.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TargetType {
    AdoptionFunding,
    ProjectBacking,
    VisitFee,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::AdoptionFunding => "adoption-funding",
            TargetType::ProjectBacking => "project-backing",
            TargetType::VisitFee => "visit-fee",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetType {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "adoption-funding" => Ok(TargetType::AdoptionFunding),
            "project-backing" => Ok(TargetType::ProjectBacking),
            "visit-fee" => Ok(TargetType::VisitFee),
            other => Err(PaymentError::ValidationError(format!(
                "Unknown payment type: '{}'",
                other
            ))),
        }
    }
}

/// Everything needed to open a payment, before the ledger assigns identity.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentDraft {
    pub payer_id: String,
    pub target_type: TargetType,
    pub target_ref: String,
    pub amount: Amount,
    pub currency: Currency,
    pub fees: Fees,
    pub metadata: Value,
}

impl PaymentDraft {
    pub fn new(
        payer_id: impl Into<String>,
        target_type: TargetType,
        target_ref: impl Into<String>,
        amount: Amount,
        currency: Currency,
        schedule: &FeeSchedule,
    ) -> Self {
        Self {
            payer_id: payer_id.into(),
            target_type,
            target_ref: target_ref.into(),
            amount,
            currency,
            fees: schedule.calculate(amount),
            metadata: Value::Object(Map::new()),
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Gateway facts recorded when a payment succeeds.
#[derive(Debug, Clone, PartialEq)]
pub struct SuccessDetails {
    pub gateway_transaction_ref: Option<String>,
    pub metadata: Value,
    pub paid_at: DateTime<Utc>,
}

/// One attempt to move money from a payer to the platform.
///
/// Status moves at most once, from `Pending` into a terminal state. The
/// session reference is minted on creation and never rewritten.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Payment {
    pub id: PaymentId,
    pub payer_id: String,
    pub target_type: TargetType,
    pub target_ref: String,
    pub amount: Amount,
    pub currency: Currency,
    pub fees: Fees,
    pub net_amount: Decimal,
    pub status: PaymentStatus,
    pub gateway_session_ref: String,
    pub gateway_transaction_ref: Option<String>,
    pub failure_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Opens a pending payment with a fresh id and session reference.
    pub fn open(draft: PaymentDraft) -> Self {
        let id = Uuid::new_v4();
        let now = Utc::now();
        Self {
            id,
            net_amount: draft.fees.net_of(draft.amount),
            payer_id: draft.payer_id,
            target_type: draft.target_type,
            target_ref: draft.target_ref,
            amount: draft.amount,
            currency: draft.currency,
            fees: draft.fees,
            status: PaymentStatus::Pending,
            gateway_session_ref: format!("{}{}", REFERENCE_PREFIX, Uuid::new_v4().simple()),
            gateway_transaction_ref: None,
            failure_reason: None,
            paid_at: None,
            metadata: draft.metadata,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Moves a pending payment to `Success`. Returns `false` and leaves the
    /// payment untouched when it is already terminal.
    pub fn mark_succeeded(&mut self, details: SuccessDetails) -> bool {
        if self.status != PaymentStatus::Pending {
            return false;
        }
        self.status = PaymentStatus::Success;
        self.gateway_transaction_ref = details.gateway_transaction_ref;
        self.paid_at = Some(details.paid_at);
        if !details.metadata.is_null() {
            match &mut self.metadata {
                Value::Object(map) => {
                    map.insert("gateway".to_string(), details.metadata);
                }
                other => {
                    let mut map = Map::new();
                    map.insert("request".to_string(), other.take());
                    map.insert("gateway".to_string(), details.metadata);
                    *other = Value::Object(map);
                }
            }
        }
        self.updated_at = Utc::now();
        true
    }

    /// Moves a pending payment to `Failed`. Same guard as `mark_succeeded`.
    pub fn mark_failed(&mut self, reason: &str) -> bool {
        if self.status != PaymentStatus::Pending {
            return false;
        }
        self.status = PaymentStatus::Failed;
        self.failure_reason = Some(reason.to_string());
        self.updated_at = Utc::now();
        true
    }
}

/// Result of a guarded transition: whether this call moved the payment, and
/// the payment as stored afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub applied: bool,
    pub payment: Payment,
}
