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
use chrono::Utc;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, TransactionDB,
    TransactionDBOptions,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Column Family for payments, keyed by payment id.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family mapping gateway session references to payment ids.
pub const CF_PAYMENT_REFS: &str = "payment_refs";
pub const CF_ADOPTIONS: &str = "adoptions";
pub const CF_PROJECTS: &str = "projects";
pub const CF_RECIPIENT_STATS: &str = "recipient_stats";
pub const CF_BACKER_STATS: &str = "backer_stats";
/// Column Family for expiring keys; values are expiry instants in epoch millis.
pub const CF_EXPIRING_KEYS: &str = "expiring_keys";

const COLUMN_FAMILIES: [&str; 7] = [
    CF_PAYMENTS,
    CF_PAYMENT_REFS,
    CF_ADOPTIONS,
    CF_PROJECTS,
    CF_RECIPIENT_STATS,
    CF_BACKER_STATS,
    CF_EXPIRING_KEYS,
];

/// A persistent store implementation using a transactional RocksDB.
///
/// Every read-modify-write goes through a RocksDB transaction that takes the
/// row lock with `get_for_update`, which is what makes the payment transitions
/// first-caller-wins and keeps aggregate updates atomic.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<TransactionDB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<TransactionDB>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating the
    /// required column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();

        let db = TransactionDB::open_cf_descriptors(
            &opts,
            &TransactionDBOptions::default(),
            path,
            descriptors,
        )?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            PaymentError::InternalError(Box::new(std::io::Error::other(format!(
                "{} column family not found",
                name
            ))))
        })
    }

    fn read<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        self.db.put_cf(cf, key, serde_json::to_vec(value)?)?;
        Ok(())
    }

    /// Locks the row, hands it to `apply` and commits whatever `apply` wrote.
    /// `apply` receives `None` for a missing row; returning `Ok((None, _))`
    /// commits nothing.
    fn locked_update<T, R, F>(&self, cf_name: &str, key: &[u8], apply: F) -> Result<R>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Option<T>) -> Result<(Option<T>, R)>,
    {
        let cf = self.cf(cf_name)?;
        let txn = self.db.transaction();
        let current = match txn.get_for_update_cf(cf, key, true)? {
            Some(bytes) => Some(serde_json::from_slice(&bytes)?),
            None => None,
        };
        let (next, result) = apply(current)?;
        if let Some(next) = next {
            txn.put_cf(cf, key, serde_json::to_vec(&next)?)?;
            txn.commit()?;
        }
        Ok(result)
    }

    fn insert_payment(&self, payment: &Payment) -> Result<()> {
        let refs = self.cf(CF_PAYMENT_REFS)?;
        let payments = self.cf(CF_PAYMENTS)?;
        let txn = self.db.transaction();
        if txn
            .get_for_update_cf(refs, payment.gateway_session_ref.as_bytes(), true)?
            .is_some()
        {
            return Err(PaymentError::ValidationError(format!(
                "duplicate session reference {}",
                payment.gateway_session_ref
            )));
        }
        txn.put_cf(
            refs,
            payment.gateway_session_ref.as_bytes(),
            payment.id.as_bytes(),
        )?;
        txn.put_cf(payments, payment.id.as_bytes(), serde_json::to_vec(payment)?)?;
        txn.commit()?;
        Ok(())
    }

    fn transition(
        &self,
        id: PaymentId,
        apply: impl FnOnce(&mut Payment) -> bool,
    ) -> Result<Transition> {
        self.locked_update(CF_PAYMENTS, id.as_bytes(), |current: Option<Payment>| {
            let mut payment =
                current.ok_or_else(|| PaymentError::NotFound(format!("payment {}", id)))?;
            let applied = apply(&mut payment);
            let next = applied.then(|| payment.clone());
            Ok((next, Transition { applied, payment }))
        })
    }

    fn find_by_reference(&self, reference: &str) -> Result<Option<Payment>> {
        let refs = self.cf(CF_PAYMENT_REFS)?;
        let Some(id) = self.db.get_cf(refs, reference.as_bytes())? else {
            return Ok(None);
        };
        self.read(CF_PAYMENTS, &id)
    }

    fn all_payments(&self) -> Result<Vec<Payment>> {
        let cf = self.cf(CF_PAYMENTS)?;
        let mut payments = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            payments.push(serde_json::from_slice(&value)?);
        }
        Ok(payments)
    }

    fn update_aggregate<T>(
        &self,
        cf_name: &str,
        id: &str,
        mutation: Mutation<T>,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Clone,
    {
        self.locked_update(cf_name, id.as_bytes(), |current: Option<T>| {
            let Some(mut row) = current else {
                return Ok((None, None));
            };
            mutation(&mut row)?;
            Ok((Some(row.clone()), Some(row)))
        })
    }

    fn upsert_aggregate<T>(
        &self,
        cf_name: &str,
        id: &str,
        init: impl FnOnce() -> T,
        mutation: Mutation<T>,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Clone,
    {
        self.locked_update(cf_name, id.as_bytes(), |current: Option<T>| {
            let mut row = current.unwrap_or_else(init);
            mutation(&mut row)?;
            Ok((Some(row.clone()), row))
        })
    }
}

#[async_trait]
impl PaymentLedger for RocksDBStore {
    async fn create(&self, draft: PaymentDraft) -> Result<Payment> {
        let payment = Payment::open(draft);
        self.insert_payment(&payment)?;
        Ok(payment)
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        self.read(CF_PAYMENTS, id.as_bytes())
    }

    async fn find_by_gateway_session_ref(&self, reference: &str) -> Result<Option<Payment>> {
        self.find_by_reference(reference)
    }

    async fn transition_to_success(
        &self,
        id: PaymentId,
        details: SuccessDetails,
    ) -> Result<Transition> {
        self.transition(id, move |payment| payment.mark_succeeded(details))
    }

    async fn transition_to_failure(&self, id: PaymentId, reason: &str) -> Result<Transition> {
        self.transition(id, |payment| payment.mark_failed(reason))
    }

    async fn query(&self, query: &HistoryQuery) -> Result<Page<Payment>> {
        Ok(query.paginate(self.all_payments()?))
    }
}

#[async_trait]
impl AdoptionRepository for RocksDBStore {
    async fn store(&self, adoption: Adoption) -> Result<()> {
        self.write(CF_ADOPTIONS, adoption.id.as_bytes(), &adoption)
    }

    async fn get(&self, id: &str) -> Result<Option<Adoption>> {
        self.read(CF_ADOPTIONS, id.as_bytes())
    }

    async fn update(&self, id: &str, mutation: Mutation<Adoption>) -> Result<Option<Adoption>> {
        self.update_aggregate(CF_ADOPTIONS, id, mutation)
    }
}

#[async_trait]
impl ProjectRepository for RocksDBStore {
    async fn store(&self, project: Project) -> Result<()> {
        self.write(CF_PROJECTS, project.id.as_bytes(), &project)
    }

    async fn get(&self, id: &str) -> Result<Option<Project>> {
        self.read(CF_PROJECTS, id.as_bytes())
    }

    async fn update(&self, id: &str, mutation: Mutation<Project>) -> Result<Option<Project>> {
        self.update_aggregate(CF_PROJECTS, id, mutation)
    }
}

#[async_trait]
impl StatsRepository for RocksDBStore {
    async fn recipient(&self, recipient_id: &str) -> Result<Option<RecipientStats>> {
        self.read(CF_RECIPIENT_STATS, recipient_id.as_bytes())
    }

    async fn backer(&self, backer_id: &str) -> Result<Option<BackerStats>> {
        self.read(CF_BACKER_STATS, backer_id.as_bytes())
    }

    async fn upsert_recipient(
        &self,
        recipient_id: &str,
        mutation: Mutation<RecipientStats>,
    ) -> Result<RecipientStats> {
        self.upsert_aggregate(
            CF_RECIPIENT_STATS,
            recipient_id,
            || RecipientStats::new(recipient_id),
            mutation,
        )
    }

    async fn upsert_backer(
        &self,
        backer_id: &str,
        mutation: Mutation<BackerStats>,
    ) -> Result<BackerStats> {
        self.upsert_aggregate(
            CF_BACKER_STATS,
            backer_id,
            || BackerStats::new(backer_id),
            mutation,
        )
    }
}

#[async_trait]
impl ExpiringKeyStore for RocksDBStore {
    async fn put(&self, key: &str, ttl: Duration) -> Result<()> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| PaymentError::ValidationError(format!("TTL out of range: {}", e)))?;
        let expires_at = (Utc::now() + ttl).timestamp_millis();
        self.write(CF_EXPIRING_KEYS, key.as_bytes(), &expires_at)
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        let now = Utc::now().timestamp_millis();
        match self.read::<i64>(CF_EXPIRING_KEYS, key.as_bytes())? {
            Some(expires_at) if expires_at > now => Ok(true),
            Some(_) => {
                let cf = self.cf(CF_EXPIRING_KEYS)?;
                self.db.delete_cf(cf, key.as_bytes())?;
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn sweep_expired(&self) -> Result<usize> {
        let cf = self.cf(CF_EXPIRING_KEYS)?;
        let now = Utc::now().timestamp_millis();
        let mut expired = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            let expires_at: i64 = serde_json::from_slice(&value)?;
            if expires_at <= now {
                expired.push(key);
            }
        }
        for key in &expired {
            self.db.delete_cf(cf, key)?;
        }
        Ok(expired.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fees::FeeSchedule;
    use crate::domain::money::{Amount, Currency};
    use crate::domain::payment::{PaymentStatus, TargetType};
    use rust_decimal_macros::dec;
    use serde_json::Value;
    use tempfile::tempdir;

    fn draft() -> PaymentDraft {
        PaymentDraft::new(
            "sponsor-1",
            TargetType::ProjectBacking,
            "project-1",
            Amount::new(dec!(1000)).unwrap(),
            Currency::new("KES").unwrap(),
            &FeeSchedule::default(),
        )
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        for name in COLUMN_FAMILIES {
            assert!(store.db.cf_handle(name).is_some(), "missing {}", name);
        }
    }

    #[tokio::test]
    async fn test_rocksdb_payment_lifecycle() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        let payment = PaymentLedger::create(&store, draft()).await.unwrap();
        let found = store
            .find_by_gateway_session_ref(&payment.gateway_session_ref)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, payment);

        let details = SuccessDetails {
            gateway_transaction_ref: Some("txn-1".to_string()),
            metadata: Value::Null,
            paid_at: Utc::now(),
        };
        let first = store
            .transition_to_success(payment.id, details.clone())
            .await
            .unwrap();
        let second = store.transition_to_success(payment.id, details).await.unwrap();
        let late = store.transition_to_failure(payment.id, "late").await.unwrap();

        assert!(first.applied);
        assert!(!second.applied);
        assert!(!late.applied);
        assert_eq!(late.payment.status, PaymentStatus::Success);

        let page = store.query(&HistoryQuery::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].status, PaymentStatus::Success);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_rocksdb_racing_transitions_apply_once() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let payment = PaymentLedger::create(&store, draft()).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    if i % 2 == 0 {
                        let details = SuccessDetails {
                            gateway_transaction_ref: Some(format!("txn-{}", i)),
                            metadata: Value::Null,
                            paid_at: Utc::now(),
                        };
                        store.transition_to_success(payment.id, details).await
                    } else {
                        store.transition_to_failure(payment.id, "Declined").await
                    }
                })
            })
            .collect();

        let mut applied = 0;
        let mut finals = Vec::new();
        for handle in handles {
            let result = handle.await.unwrap().unwrap();
            if result.applied {
                applied += 1;
            }
            finals.push(result.payment);
        }

        assert_eq!(applied, 1);
        assert!(finals.iter().all(|p| *p == finals[0]));
        assert_ne!(finals[0].status, PaymentStatus::Pending);
        let stored = PaymentLedger::get(&store, payment.id).await.unwrap().unwrap();
        assert_eq!(stored, finals[0]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_rocksdb_concurrent_backings_are_not_lost() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let project = Project::new("p-1", "owner", "Clinic", dec!(100000)).unwrap();
        ProjectRepository::store(&store, project).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    ProjectRepository::update(
                        &store,
                        "p-1",
                        Box::new(|p: &mut Project| -> Result<()> {
                            p.apply_backing("sponsor-1", dec!(100), Utc::now())?;
                            Ok(())
                        }),
                    )
                    .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap().unwrap();
        }

        let project = ProjectRepository::get(&store, "p-1").await.unwrap().unwrap();
        assert_eq!(project.current_amount, dec!(800));
        assert_eq!(project.backers.len(), 1);
        assert_eq!(project.backers[0].contributions, 8);
    }

    #[tokio::test]
    async fn test_rocksdb_survives_reopen() {
        let dir = tempdir().unwrap();
        let reference = {
            let store = RocksDBStore::open(dir.path()).unwrap();
            let payment = PaymentLedger::create(&store, draft()).await.unwrap();
            payment.gateway_session_ref
        };

        let store = RocksDBStore::open(dir.path()).unwrap();
        let payment = store
            .find_by_gateway_session_ref(&reference)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_rocksdb_project_update() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let project = Project::new("p-1", "owner", "Clinic", dec!(1000)).unwrap();
        ProjectRepository::store(&store, project).await.unwrap();

        let updated = ProjectRepository::update(
            &store,
            "p-1",
            Box::new(|p: &mut Project| -> Result<()> {
                p.apply_backing("sponsor-1", dec!(935), Utc::now())?;
                Ok(())
            }),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(updated.current_amount, dec!(935));

        let reloaded = ProjectRepository::get(&store, "p-1").await.unwrap().unwrap();
        assert_eq!(reloaded, updated);
    }

    #[tokio::test]
    async fn test_rocksdb_expiring_keys() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        store.put("live", Duration::from_secs(3600)).await.unwrap();
        store.put("dead", Duration::ZERO).await.unwrap();

        assert!(store.contains("live").await.unwrap());
        assert!(!store.contains("dead").await.unwrap());
        store.put("dead-again", Duration::ZERO).await.unwrap();
        assert_eq!(store.sweep_expired().await.unwrap(), 1);
    }
}
