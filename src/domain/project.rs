use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Active,
    Funded,
    Closed,
}

impl ProjectStatus {
    pub fn accepts_funds(&self) -> bool {
        matches!(self, ProjectStatus::Active | ProjectStatus::Funded)
    }
}

/// One payer's accumulated contribution to a project.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Backer {
    pub backer_id: String,
    pub amount: Decimal,
    pub contributions: u32,
    pub first_backed_at: DateTime<Utc>,
    pub last_backed_at: DateTime<Utc>,
}

/// A crowdfunding project recipients raise money for.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Project {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub goal_amount: Decimal,
    pub current_amount: Decimal,
    /// `current / goal` as a percentage, clamped to 100.
    pub percent_funded: Decimal,
    pub status: ProjectStatus,
    pub backers: Vec<Backer>,
    pub funded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// What a single backing did to the project.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct BackingOutcome {
    pub new_backer: bool,
    pub reached_goal: bool,
}

impl Project {
    pub fn new(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        title: impl Into<String>,
        goal_amount: Decimal,
    ) -> Result<Self, PaymentError> {
        if goal_amount <= Decimal::ZERO {
            return Err(PaymentError::ValidationError(
                "Project goal must be positive".to_string(),
            ));
        }
        Ok(Self {
            id: id.into(),
            owner_id: owner_id.into(),
            title: title.into(),
            goal_amount,
            current_amount: Decimal::ZERO,
            percent_funded: Decimal::ZERO,
            status: ProjectStatus::Active,
            backers: Vec::new(),
            funded_at: None,
            created_at: Utc::now(),
        })
    }

    pub fn backer(&self, backer_id: &str) -> Option<&Backer> {
        self.backers.iter().find(|b| b.backer_id == backer_id)
    }

    /// Credits a backing, merging into the payer's existing backer entry.
    pub fn apply_backing(
        &mut self,
        backer_id: &str,
        net: Decimal,
        at: DateTime<Utc>,
    ) -> Result<BackingOutcome, PaymentError> {
        if !self.status.accepts_funds() {
            return Err(PaymentError::ValidationError(format!(
                "project {} is {:?} and does not accept funds",
                self.id, self.status
            )));
        }

        let new_backer = match self.backers.iter_mut().find(|b| b.backer_id == backer_id) {
            Some(existing) => {
                existing.amount += net;
                existing.contributions += 1;
                existing.last_backed_at = at;
                false
            }
            None => {
                self.backers.push(Backer {
                    backer_id: backer_id.to_string(),
                    amount: net,
                    contributions: 1,
                    first_backed_at: at,
                    last_backed_at: at,
                });
                true
            }
        };

        self.current_amount += net;
        self.percent_funded = percent_of(self.current_amount, self.goal_amount);

        let mut reached_goal = false;
        if self.status == ProjectStatus::Active && self.current_amount >= self.goal_amount {
            self.status = ProjectStatus::Funded;
            self.funded_at = Some(at);
            reached_goal = true;
        }

        Ok(BackingOutcome {
            new_backer,
            reached_goal,
        })
    }
}

fn percent_of(current: Decimal, goal: Decimal) -> Decimal {
    (current / goal * Decimal::ONE_HUNDRED)
        .min(Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
