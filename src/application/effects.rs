use crate::domain::adoption::Adoption;
use crate::domain::payment::{Payment, TargetType};
use crate::domain::ports::{AdoptionRepositoryRef, ProjectRepositoryRef, StatsRepositoryRef};
use crate::domain::project::{BackingOutcome, Project};
use crate::domain::stats::{BackerStats, NewRelationship, RecipientStats};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

/// What effect application did for one successful payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectOutcome {
    Applied,
    /// The target aggregate does not exist. The charge already went through,
    /// so this needs out-of-band reconciliation.
    TargetNotFound,
    /// The target exists but is in a state that does not accept funds.
    TargetRejected(String),
    /// The payment type has no aggregate to credit.
    NoEffect,
}

/// Maps a successful payment onto the aggregates it pays for.
///
/// Implementations read the payment and never write it back.
#[async_trait]
pub trait EffectApplicator: Send + Sync {
    async fn apply(&self, payment: &Payment) -> Result<EffectOutcome>;
}

/// Effect applicator backed by the aggregate repositories.
pub struct DomainEffects {
    adoptions: AdoptionRepositoryRef,
    projects: ProjectRepositoryRef,
    stats: StatsRepositoryRef,
}

impl DomainEffects {
    pub fn new(
        adoptions: AdoptionRepositoryRef,
        projects: ProjectRepositoryRef,
        stats: StatsRepositoryRef,
    ) -> Self {
        Self {
            adoptions,
            projects,
            stats,
        }
    }

    pub async fn for_adoption_funding(&self, payment: &Payment) -> Result<EffectOutcome> {
        let net = payment.net_amount;
        let at = paid_at(payment);

        let update = self
            .adoptions
            .update(
                &payment.target_ref,
                Box::new(move |adoption: &mut Adoption| adoption.apply_funding(net, at)),
            )
            .await;
        let adoption = match update {
            Ok(Some(adoption)) => adoption,
            Ok(None) => return Ok(target_not_found(payment)),
            Err(PaymentError::ValidationError(reason)) => {
                return Ok(target_rejected(payment, reason));
            }
            Err(e) => return Err(e),
        };

        let first_funding = adoption.is_first_funding();
        if first_funding {
            info!(
                payment_id = %payment.id,
                adoption_id = %adoption.id,
                "Adoption activated by first funding"
            );
        }

        let mut failures = Vec::new();
        if let Err(e) = self
            .stats
            .upsert_recipient(
                &adoption.recipient_id,
                Box::new(move |stats: &mut RecipientStats| -> Result<()> {
                    stats.record_payment(net, at, first_funding);
                    Ok(())
                }),
            )
            .await
        {
            failures.push(format!("recipient stats {}: {}", adoption.recipient_id, e));
        }

        let relationship = if first_funding {
            NewRelationship::Recipient
        } else {
            NewRelationship::None
        };
        if let Err(e) = self.record_backer(&payment.payer_id, net, at, relationship).await {
            failures.push(format!("backer stats {}: {}", payment.payer_id, e));
        }

        settle(payment, failures)
    }

    pub async fn for_project_backing(&self, payment: &Payment) -> Result<EffectOutcome> {
        let net = payment.net_amount;
        let at = paid_at(payment);

        let (project, outcome) = match self.back_project(payment, net, at).await {
            Ok(Some(backed)) => backed,
            Ok(None) => return Ok(target_not_found(payment)),
            Err(PaymentError::ValidationError(reason)) => {
                return Ok(target_rejected(payment, reason));
            }
            Err(e) => return Err(e),
        };

        if outcome.reached_goal {
            info!(
                payment_id = %payment.id,
                project_id = %project.id,
                "Project reached its funding goal"
            );
        }

        let relationship = if outcome.new_backer {
            NewRelationship::Project
        } else {
            NewRelationship::None
        };

        let mut failures = Vec::new();
        if let Err(e) = self.record_backer(&payment.payer_id, net, at, relationship).await {
            failures.push(format!("backer stats {}: {}", payment.payer_id, e));
        }

        settle(payment, failures)
    }

    /// Credits the project and reports what the backing changed.
    async fn back_project(
        &self,
        payment: &Payment,
        net: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Option<(Project, BackingOutcome)>> {
        let backer_id = payment.payer_id.clone();
        let (tx, mut rx) = oneshot::channel();

        let project = self
            .projects
            .update(
                &payment.target_ref,
                Box::new(move |project: &mut Project| -> Result<()> {
                    let outcome = project.apply_backing(&backer_id, net, at)?;
                    let _ = tx.send(outcome);
                    Ok(())
                }),
            )
            .await?;
        // The mutation runs at most once and only sends on success.
        Ok(project.map(|project| (project, rx.try_recv().unwrap_or_default())))
    }

    async fn record_backer(
        &self,
        backer_id: &str,
        net: Decimal,
        at: DateTime<Utc>,
        relationship: NewRelationship,
    ) -> Result<BackerStats> {
        self.stats
            .upsert_backer(
                backer_id,
                Box::new(move |stats: &mut BackerStats| -> Result<()> {
                    stats.record_contribution(net, at, relationship);
                    Ok(())
                }),
            )
            .await
    }
}

#[async_trait]
impl EffectApplicator for DomainEffects {
    async fn apply(&self, payment: &Payment) -> Result<EffectOutcome> {
        match payment.target_type {
            TargetType::AdoptionFunding => self.for_adoption_funding(payment).await,
            TargetType::ProjectBacking => self.for_project_backing(payment).await,
            TargetType::VisitFee => Ok(EffectOutcome::NoEffect),
        }
    }
}

fn paid_at(payment: &Payment) -> DateTime<Utc> {
    payment.paid_at.unwrap_or(payment.updated_at)
}

fn target_not_found(payment: &Payment) -> EffectOutcome {
    warn!(
        payment_id = %payment.id,
        target_type = %payment.target_type,
        target_ref = %payment.target_ref,
        "Payment target not found; needs out-of-band reconciliation"
    );
    EffectOutcome::TargetNotFound
}

fn target_rejected(payment: &Payment, reason: String) -> EffectOutcome {
    warn!(
        payment_id = %payment.id,
        target_ref = %payment.target_ref,
        reason = %reason,
        "Payment target refused funds"
    );
    EffectOutcome::TargetRejected(reason)
}

/// Steps that succeeded stay applied; the rest are reported together.
fn settle(payment: &Payment, failures: Vec<String>) -> Result<EffectOutcome> {
    if failures.is_empty() {
        return Ok(EffectOutcome::Applied);
    }
    for failure in &failures {
        error!(payment_id = %payment.id, failure = %failure, "Effect step failed");
    }
    Err(PaymentError::EffectApplicationError(failures.join("; ")))
}
