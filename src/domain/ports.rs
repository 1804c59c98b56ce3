use super::adoption::Adoption;
use super::gateway::{CheckoutRequest, CheckoutSession, GatewayVerification};
use super::history::{HistoryQuery, Page};
use super::payment::{Payment, PaymentDraft, PaymentId, SuccessDetails, Transition};
use super::project::Project;
use super::stats::{BackerStats, RecipientStats};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Closure applied atomically to a stored aggregate. Returning an error
/// aborts the update and leaves the stored value untouched.
pub type Mutation<T> = Box<dyn FnOnce(&mut T) -> Result<()> + Send>;

/// Durable record of payments with guarded, first-caller-wins transitions.
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Stores a new pending payment with a freshly minted session reference.
    async fn create(&self, draft: PaymentDraft) -> Result<Payment>;
    async fn get(&self, id: PaymentId) -> Result<Option<Payment>>;
    async fn find_by_gateway_session_ref(&self, reference: &str) -> Result<Option<Payment>>;
    /// Compare-and-set from `Pending` to `Success`. Exactly one concurrent
    /// caller observes `applied == true`.
    async fn transition_to_success(&self, id: PaymentId, details: SuccessDetails)
    -> Result<Transition>;
    async fn transition_to_failure(&self, id: PaymentId, reason: &str) -> Result<Transition>;
    async fn query(&self, query: &HistoryQuery) -> Result<Page<Payment>>;
}

#[async_trait]
pub trait AdoptionRepository: Send + Sync {
    async fn store(&self, adoption: Adoption) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Adoption>>;
    /// Returns `None` when no adoption has this id.
    async fn update(&self, id: &str, mutation: Mutation<Adoption>) -> Result<Option<Adoption>>;
}

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn store(&self, project: Project) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Project>>;
    async fn update(&self, id: &str, mutation: Mutation<Project>) -> Result<Option<Project>>;
}

/// Statistics are created on first touch.
#[async_trait]
pub trait StatsRepository: Send + Sync {
    async fn recipient(&self, recipient_id: &str) -> Result<Option<RecipientStats>>;
    async fn backer(&self, backer_id: &str) -> Result<Option<BackerStats>>;
    async fn upsert_recipient(
        &self,
        recipient_id: &str,
        mutation: Mutation<RecipientStats>,
    ) -> Result<RecipientStats>;
    async fn upsert_backer(
        &self,
        backer_id: &str,
        mutation: Mutation<BackerStats>,
    ) -> Result<BackerStats>;
}

/// Network side of the external payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize(&self, request: &CheckoutRequest) -> Result<CheckoutSession>;
    /// Read-only; safe to retry on `GatewayUnreachable`.
    async fn verify(&self, reference: &str) -> Result<GatewayVerification>;
}

/// Authenticates webhook deliveries against the raw request bytes.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, raw_payload: &[u8], signature_header: &str) -> bool;
}

/// Keys that disappear after a time-to-live. Expired keys are treated as
/// absent on read and removed by `sweep_expired`.
#[async_trait]
pub trait ExpiringKeyStore: Send + Sync {
    async fn put(&self, key: &str, ttl: Duration) -> Result<()>;
    async fn contains(&self, key: &str) -> Result<bool>;
    async fn sweep_expired(&self) -> Result<usize>;
}

pub type PaymentLedgerRef = Arc<dyn PaymentLedger>;
pub type AdoptionRepositoryRef = Arc<dyn AdoptionRepository>;
pub type ProjectRepositoryRef = Arc<dyn ProjectRepository>;
pub type StatsRepositoryRef = Arc<dyn StatsRepository>;
pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
pub type ExpiringKeyStoreRef = Arc<dyn ExpiringKeyStore>;
pub type SignatureVerifierRef = Arc<dyn SignatureVerifier>;
