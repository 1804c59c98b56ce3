use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum AdoptionStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
}

impl AdoptionStatus {
    pub fn accepts_funds(&self) -> bool {
        matches!(self, AdoptionStatus::Pending | AdoptionStatus::Active)
    }
}

/// A sponsor's funding relationship with a single recipient.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Adoption {
    pub id: String,
    pub sponsor_id: String,
    pub recipient_id: String,
    pub status: AdoptionStatus,
    pub total_paid: Decimal,
    /// Successful payments credited so far. Reaches 1 on the first funding.
    pub payments_received: u32,
    pub activated_at: Option<DateTime<Utc>>,
    pub last_funded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Adoption {
    pub fn new(
        id: impl Into<String>,
        sponsor_id: impl Into<String>,
        recipient_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            sponsor_id: sponsor_id.into(),
            recipient_id: recipient_id.into(),
            status: AdoptionStatus::Pending,
            total_paid: Decimal::ZERO,
            payments_received: 0,
            activated_at: None,
            last_funded_at: None,
            created_at: Utc::now(),
        }
    }

    /// Credits a net amount. A pending adoption becomes active on its first funding.
    pub fn apply_funding(&mut self, net: Decimal, at: DateTime<Utc>) -> Result<(), PaymentError> {
        if !self.status.accepts_funds() {
            return Err(PaymentError::ValidationError(format!(
                "adoption {} is {:?} and does not accept funds",
                self.id, self.status
            )));
        }
        self.total_paid += net;
        self.payments_received += 1;
        self.last_funded_at = Some(at);
        if self.status == AdoptionStatus::Pending {
            self.status = AdoptionStatus::Active;
            self.activated_at = Some(at);
        }
        Ok(())
    }

    pub fn is_first_funding(&self) -> bool {
        self.payments_received == 1
    }
}
