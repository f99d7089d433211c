use super::enrollment::{Enrollment, EnrollmentKey};
use super::events::EnrollmentEvent;
use super::gateway::GatewayOutcome;
use super::identity::{CourseId, UserId};
use super::money::{Amount, Currency};
use super::transaction::{FailureReason, StatusChange, Transaction};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Durable payment attempts, keyed by reference.
///
/// Adapters provide `insert`, `find` and `transition`. `transition` must be a
/// single conditional update against the backing store: the change is applied
/// only if the persisted status still equals `change.source()`, so that two
/// service instances racing on the same reference cannot both win.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Fails with `DuplicateReference` if the reference already exists.
    async fn insert(&self, tx: Transaction) -> Result<()>;
    async fn find(&self, reference: &str) -> Result<Option<Transaction>>;
    /// Fails with `NotFound` or `InvalidTransition`; returns the updated record.
    async fn transition(&self, reference: &str, change: StatusChange) -> Result<Transaction>;

    async fn create(
        &self,
        reference: &str,
        user_id: UserId,
        course_id: CourseId,
        amount: Amount,
        currency: Currency,
    ) -> Result<Transaction> {
        let tx = Transaction::new(reference, user_id, course_id, amount, currency)?;
        self.insert(tx.clone()).await?;
        Ok(tx)
    }

    async fn get(&self, reference: &str) -> Result<Transaction> {
        self.find(reference)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("transaction {reference}")))
    }

    async fn begin_verification(&self, reference: &str) -> Result<Transaction> {
        self.transition(reference, StatusChange::BeginVerification { at: Utc::now() })
            .await
    }

    async fn reclaim_stale_verification(
        &self,
        reference: &str,
        stale_before: DateTime<Utc>,
    ) -> Result<Transaction> {
        self.transition(
            reference,
            StatusChange::ReclaimVerification {
                stale_before,
                at: Utc::now(),
            },
        )
        .await
    }

    /// VERIFYING -> PAID for the holder of `lease`.
    async fn mark_paid(
        &self,
        reference: &str,
        lease: u32,
        verified_amount: Amount,
        raw_response: Value,
    ) -> Result<Transaction> {
        self.transition(
            reference,
            StatusChange::Paid {
                lease,
                verified_amount,
                raw_response,
                at: Utc::now(),
            },
        )
        .await
    }

    async fn mark_failed(
        &self,
        reference: &str,
        lease: u32,
        reason: FailureReason,
        raw_response: Option<Value>,
    ) -> Result<Transaction> {
        self.transition(
            reference,
            StatusChange::Failed {
                lease,
                reason,
                raw_response,
                at: Utc::now(),
            },
        )
        .await
    }

    /// Compensating VERIFYING -> PENDING move after the gateway gave no verdict.
    async fn rollback_verification(&self, reference: &str, lease: u32) -> Result<Transaction> {
        self.transition(reference, StatusChange::Rollback { lease })
            .await
    }
}

/// Durable enrollments, unique per (user, course).
#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    /// Atomically stores `enrollment` unless its key is already taken.
    ///
    /// An ACTIVE record is returned as is. A REVOKED record is returned as is
    /// when it came from the same transaction, and is replaced only when a
    /// different transaction pays for the pair again.
    async fn insert_if_absent(&self, enrollment: Enrollment) -> Result<Enrollment>;
    async fn find(&self, key: &EnrollmentKey) -> Result<Option<Enrollment>>;
    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Enrollment>>;
    /// Marks the enrollment REVOKED. Fails with `NotFound` if absent.
    async fn revoke(&self, key: &EnrollmentKey) -> Result<Enrollment>;
}

/// Verify-by-reference against the external payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn verify(&self, reference: &str) -> GatewayOutcome;
}

/// Downstream listeners (toasts, listing refresh) for verification outcomes.
#[async_trait]
pub trait EnrollmentNotifier: Send + Sync {
    async fn publish(&self, event: EnrollmentEvent);
}

pub type TransactionStoreBox = Box<dyn TransactionStore>;
pub type EnrollmentStoreBox = Box<dyn EnrollmentStore>;
pub type PaymentGatewayBox = Box<dyn PaymentGateway>;
pub type EnrollmentNotifierBox = Box<dyn EnrollmentNotifier>;
