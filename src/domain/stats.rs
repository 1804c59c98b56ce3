use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Running totals for someone receiving sponsorship.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct RecipientStats {
    pub recipient_id: String,
    pub total_received: Decimal,
    pub payments_received: u32,
    pub active_sponsors: u32,
    pub last_payment_at: Option<DateTime<Utc>>,
}

impl RecipientStats {
    pub fn new(recipient_id: impl Into<String>) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            total_received: Decimal::ZERO,
            payments_received: 0,
            active_sponsors: 0,
            last_payment_at: None,
        }
    }

    pub fn record_payment(&mut self, net: Decimal, at: DateTime<Utc>, new_sponsor: bool) {
        self.total_received += net;
        self.payments_received += 1;
        if new_sponsor {
            self.active_sponsors += 1;
        }
        self.last_payment_at = Some(at);
    }
}

/// Running totals for a payer.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct BackerStats {
    pub backer_id: String,
    pub total_contributed: Decimal,
    pub payments_made: u32,
    pub recipients_supported: u32,
    pub projects_backed: u32,
    pub last_payment_at: Option<DateTime<Utc>>,
}

/// Which kind of relationship a contribution opened, if any.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum NewRelationship {
    None,
    Recipient,
    Project,
}

impl BackerStats {
    pub fn new(backer_id: impl Into<String>) -> Self {
        Self {
            backer_id: backer_id.into(),
            total_contributed: Decimal::ZERO,
            payments_made: 0,
            recipients_supported: 0,
            projects_backed: 0,
            last_payment_at: None,
        }
    }

    pub fn record_contribution(
        &mut self,
        net: Decimal,
        at: DateTime<Utc>,
        relationship: NewRelationship,
    ) {
        self.total_contributed += net;
        self.payments_made += 1;
        match relationship {
            NewRelationship::Recipient => self.recipients_supported += 1,
            NewRelationship::Project => self.projects_backed += 1,
            NewRelationship::None => {}
        }
        self.last_payment_at = Some(at);
    }
}
