use crate::domain::identity::{CourseId, UserId};
use crate::domain::money::{Amount, Currency};
use crate::domain::ports::TransactionStoreBox;
use crate::domain::transaction::Transaction;
use crate::error::Result;
use tracing::info;
use uuid::Uuid;

pub const DEFAULT_REFERENCE_PREFIX: &str = "TXN";

/// Records a payment attempt before the student is redirected to the gateway.
pub struct CheckoutService {
    transactions: TransactionStoreBox,
    reference_prefix: String,
}

impl CheckoutService {
    pub fn new(transactions: TransactionStoreBox) -> Self {
        Self {
            transactions,
            reference_prefix: DEFAULT_REFERENCE_PREFIX.to_string(),
        }
    }

    pub fn with_reference_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.reference_prefix = prefix.into();
        self
    }

    /// Mints a fresh reference and stores a PENDING transaction under it.
    pub async fn initialize(
        &self,
        user_id: UserId,
        course_id: CourseId,
        amount: Amount,
        currency: Currency,
    ) -> Result<Transaction> {
        let reference = self.mint_reference();
        self.initialize_with_reference(&reference, user_id, course_id, amount, currency)
            .await
    }

    /// Stores a PENDING transaction under a gateway-assigned reference.
    ///
    /// Fails with `DuplicateReference` if the reference was used before.
    pub async fn initialize_with_reference(
        &self,
        reference: &str,
        user_id: UserId,
        course_id: CourseId,
        amount: Amount,
        currency: Currency,
    ) -> Result<Transaction> {
        let tx = self
            .transactions
            .create(reference, user_id, course_id, amount, currency)
            .await?;
        info!(
            reference = %tx.reference,
            user_id = %tx.user_id,
            course_id = %tx.course_id,
            amount = %tx.amount,
            currency = %tx.currency,
            "checkout initialized"
        );
        Ok(tx)
    }

    fn mint_reference(&self) -> String {
        let id = Uuid::new_v4().simple().to_string().to_ascii_uppercase();
        if self.reference_prefix.is_empty() {
            id
        } else {
            format!("{}-{}", self.reference_prefix, id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transaction::TransactionStatus;
    use crate::error::EngineError;
    use crate::infrastructure::in_memory::InMemoryTransactionStore;
    use rust_decimal_macros::dec;

    fn args() -> (UserId, CourseId, Amount, Currency) {
        (
            UserId::new("user-1").unwrap(),
            CourseId::new("course-1").unwrap(),
            Amount::new(dec!(5000)).unwrap(),
            Currency::new("NGN").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_initialize_mints_unique_pending_references() {
        let service = CheckoutService::new(Box::new(InMemoryTransactionStore::new()));

        let (user, course, amount, currency) = args();
        let first = service
            .initialize(user.clone(), course.clone(), amount, currency.clone())
            .await
            .unwrap();
        let second = service
            .initialize(user, course, amount, currency)
            .await
            .unwrap();

        assert_eq!(first.status, TransactionStatus::Pending);
        assert!(first.reference.starts_with("TXN-"));
        assert_ne!(first.reference, second.reference);
    }

    #[tokio::test]
    async fn test_custom_prefix() {
        let service = CheckoutService::new(Box::new(InMemoryTransactionStore::new()))
            .with_reference_prefix("LMS");
        let (user, course, amount, currency) = args();
        let tx = service.initialize(user, course, amount, currency).await.unwrap();
        assert!(tx.reference.starts_with("LMS-"));
    }

    #[tokio::test]
    async fn test_duplicate_supplied_reference() {
        let service = CheckoutService::new(Box::new(InMemoryTransactionStore::new()));
        let (user, course, amount, currency) = args();
        service
            .initialize_with_reference(
                "TXN-1",
                user.clone(),
                course.clone(),
                amount,
                currency.clone(),
            )
            .await
            .unwrap();

        let result = service
            .initialize_with_reference("TXN-1", user, course, amount, currency)
            .await;
        assert!(matches!(result, Err(EngineError::DuplicateReference(_))));
    }
}
