use crate::domain::adoption::Adoption;
use crate::domain::history::{HistoryQuery, Page};
use crate::domain::payment::{Payment, PaymentDraft, PaymentId, SuccessDetails, Transition};
use crate::domain::ports::{
    AdoptionRepository, ExpiringKeyStore, Mutation, PaymentLedger, ProjectRepository,
    StatsRepository,
};
use crate::domain::project::Project;
use crate::domain::stats::{BackerStats, RecipientStats};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Default)]
struct LedgerState {
    payments: HashMap<PaymentId, Payment>,
    by_reference: HashMap<String, PaymentId>,
}

/// A thread-safe in-memory payment ledger.
///
/// Transitions hold the write lock across the status check and the write, so
/// the lock is the per-payment mutual exclusion that makes them first-caller-wins.
#[derive(Default, Clone)]
pub struct InMemoryPaymentLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryPaymentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    async fn transition<F>(&self, id: PaymentId, apply: F) -> Result<Transition>
    where
        F: FnOnce(&mut Payment) -> bool + Send,
    {
        let mut state = self.state.write().await;
        let payment = state
            .payments
            .get_mut(&id)
            .ok_or_else(|| PaymentError::NotFound(format!("payment {}", id)))?;
        let applied = apply(payment);
        Ok(Transition {
            applied,
            payment: payment.clone(),
        })
    }
}

#[async_trait]
impl PaymentLedger for InMemoryPaymentLedger {
    async fn create(&self, draft: PaymentDraft) -> Result<Payment> {
        let payment = Payment::open(draft);
        let mut state = self.state.write().await;
        if state.by_reference.contains_key(&payment.gateway_session_ref) {
            return Err(PaymentError::ValidationError(format!(
                "duplicate session reference {}",
                payment.gateway_session_ref
            )));
        }
        state
            .by_reference
            .insert(payment.gateway_session_ref.clone(), payment.id);
        state.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        let state = self.state.read().await;
        Ok(state.payments.get(&id).cloned())
    }

    async fn find_by_gateway_session_ref(&self, reference: &str) -> Result<Option<Payment>> {
        let state = self.state.read().await;
        Ok(state
            .by_reference
            .get(reference)
            .and_then(|id| state.payments.get(id))
            .cloned())
    }

    async fn transition_to_success(
        &self,
        id: PaymentId,
        details: SuccessDetails,
    ) -> Result<Transition> {
        self.transition(id, move |payment| payment.mark_succeeded(details))
            .await
    }

    async fn transition_to_failure(&self, id: PaymentId, reason: &str) -> Result<Transition> {
        self.transition(id, |payment| payment.mark_failed(reason)).await
    }

    async fn query(&self, query: &HistoryQuery) -> Result<Page<Payment>> {
        let state = self.state.read().await;
        Ok(query.paginate(state.payments.values().cloned()))
    }
}

/// Applies `mutation` to a copy so a failed mutation never leaks a partial write.
async fn update_row<T: Clone>(
    rows: &RwLock<HashMap<String, T>>,
    id: &str,
    mutation: Mutation<T>,
) -> Result<Option<T>> {
    let mut rows = rows.write().await;
    let Some(row) = rows.get_mut(id) else {
        return Ok(None);
    };
    let mut working = row.clone();
    mutation(&mut working)?;
    *row = working.clone();
    Ok(Some(working))
}

async fn upsert_row<T: Clone>(
    rows: &RwLock<HashMap<String, T>>,
    id: &str,
    init: impl FnOnce() -> T,
    mutation: Mutation<T>,
) -> Result<T> {
    let mut rows = rows.write().await;
    let mut working = rows.get(id).cloned().unwrap_or_else(init);
    mutation(&mut working)?;
    rows.insert(id.to_string(), working.clone());
    Ok(working)
}

#[derive(Default, Clone)]
pub struct InMemoryAdoptionRepository {
    adoptions: Arc<RwLock<HashMap<String, Adoption>>>,
}

impl InMemoryAdoptionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AdoptionRepository for InMemoryAdoptionRepository {
    async fn store(&self, adoption: Adoption) -> Result<()> {
        let mut adoptions = self.adoptions.write().await;
        adoptions.insert(adoption.id.clone(), adoption);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Adoption>> {
        let adoptions = self.adoptions.read().await;
        Ok(adoptions.get(id).cloned())
    }

    async fn update(&self, id: &str, mutation: Mutation<Adoption>) -> Result<Option<Adoption>> {
        update_row(&self.adoptions, id, mutation).await
    }
}

#[derive(Default, Clone)]
pub struct InMemoryProjectRepository {
    projects: Arc<RwLock<HashMap<String, Project>>>,
}

impl InMemoryProjectRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectRepository for InMemoryProjectRepository {
    async fn store(&self, project: Project) -> Result<()> {
        let mut projects = self.projects.write().await;
        projects.insert(project.id.clone(), project);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Project>> {
        let projects = self.projects.read().await;
        Ok(projects.get(id).cloned())
    }

    async fn update(&self, id: &str, mutation: Mutation<Project>) -> Result<Option<Project>> {
        update_row(&self.projects, id, mutation).await
    }
}

#[derive(Default, Clone)]
pub struct InMemoryStatsRepository {
    recipients: Arc<RwLock<HashMap<String, RecipientStats>>>,
    backers: Arc<RwLock<HashMap<String, BackerStats>>>,
}

impl InMemoryStatsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatsRepository for InMemoryStatsRepository {
    async fn recipient(&self, recipient_id: &str) -> Result<Option<RecipientStats>> {
        let recipients = self.recipients.read().await;
        Ok(recipients.get(recipient_id).cloned())
    }

    async fn backer(&self, backer_id: &str) -> Result<Option<BackerStats>> {
        let backers = self.backers.read().await;
        Ok(backers.get(backer_id).cloned())
    }

    async fn upsert_recipient(
        &self,
        recipient_id: &str,
        mutation: Mutation<RecipientStats>,
    ) -> Result<RecipientStats> {
        upsert_row(
            &self.recipients,
            recipient_id,
            || RecipientStats::new(recipient_id),
            mutation,
        )
        .await
    }

    async fn upsert_backer(
        &self,
        backer_id: &str,
        mutation: Mutation<BackerStats>,
    ) -> Result<BackerStats> {
        upsert_row(
            &self.backers,
            backer_id,
            || BackerStats::new(backer_id),
            mutation,
        )
        .await
    }
}

/// Process-local expiring keys, measured on the tokio clock.
#[derive(Default, Clone)]
pub struct InMemoryExpiringKeys {
    entries: Arc<RwLock<HashMap<String, Instant>>>,
}

impl InMemoryExpiringKeys {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExpiringKeyStore for InMemoryExpiringKeys {
    async fn put(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), Instant::now() + ttl);
        Ok(())
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        let expires_at = self.entries.read().await.get(key).copied();
        match expires_at {
            Some(expires_at) if expires_at > Instant::now() => Ok(true),
            Some(_) => {
                let mut entries = self.entries.write().await;
                // Re-check: the key may have been refreshed meanwhile.
                if entries.get(key).is_some_and(|at| *at <= Instant::now()) {
                    entries.remove(key);
                }
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn sweep_expired(&self) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        Ok(before - entries.len())
    }
}
