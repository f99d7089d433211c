use crate::domain::enrollment::{Enrollment, EnrollmentKey, EnrollmentStatus};
use crate::domain::identity::UserId;
use crate::domain::ports::{EnrollmentStore, TransactionStore};
use crate::domain::transaction::{StatusChange, Transaction};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for payment transactions.
///
/// Uses `Arc<RwLock<HashMap<String, Transaction>>>`; every transition runs
/// under the write lock, which makes the status check and the update atomic.
/// Clones share the same map.
#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    transactions: Arc<RwLock<HashMap<String, Transaction>>>,
}

impl InMemoryTransactionStore {
    /// Creates a new, empty in-memory transaction store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn insert(&self, tx: Transaction) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        match transactions.entry(tx.reference.clone()) {
            Entry::Occupied(_) => Err(EngineError::DuplicateReference(tx.reference)),
            Entry::Vacant(slot) => {
                slot.insert(tx);
                Ok(())
            }
        }
    }

    async fn find(&self, reference: &str) -> Result<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.get(reference).cloned())
    }

    async fn transition(&self, reference: &str, change: StatusChange) -> Result<Transaction> {
        let mut transactions = self.transactions.write().await;
        let current = transactions
            .get_mut(reference)
            .ok_or_else(|| EngineError::NotFound(format!("transaction {reference}")))?;

        let mut next = current.clone();
        next.apply(change)?;
        *current = next.clone();
        Ok(next)
    }
}

/// A thread-safe in-memory store for enrollments.
///
/// Ordered by (user, course) so listings come back in a stable order.
#[derive(Default, Clone)]
pub struct InMemoryEnrollmentStore {
    enrollments: Arc<RwLock<BTreeMap<EnrollmentKey, Enrollment>>>,
}

impl InMemoryEnrollmentStore {
    /// Creates a new, empty in-memory enrollment store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EnrollmentStore for InMemoryEnrollmentStore {
    async fn insert_if_absent(&self, enrollment: Enrollment) -> Result<Enrollment> {
        let mut enrollments = self.enrollments.write().await;
        let key = enrollment.key();
        if let Some(existing) = enrollments.get(&key)
            && !existing.is_replaced_by(&enrollment)
        {
            return Ok(existing.clone());
        }
        enrollments.insert(key, enrollment.clone());
        Ok(enrollment)
    }

    async fn find(&self, key: &EnrollmentKey) -> Result<Option<Enrollment>> {
        let enrollments = self.enrollments.read().await;
        Ok(enrollments.get(key).cloned())
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Enrollment>> {
        let enrollments = self.enrollments.read().await;
        Ok(enrollments
            .values()
            .filter(|e| &e.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn revoke(&self, key: &EnrollmentKey) -> Result<Enrollment> {
        let mut enrollments = self.enrollments.write().await;
        let enrollment = enrollments
            .get_mut(key)
            .ok_or_else(|| EngineError::NotFound(format!("enrollment {key}")))?;
        enrollment.status = EnrollmentStatus::Revoked;
        Ok(enrollment.clone())
    }
}
