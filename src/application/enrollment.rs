use crate::domain::enrollment::{Enrollment, EnrollmentKey};
use crate::domain::identity::{CourseId, UserId};
use crate::domain::money::{Amount, Currency};
use crate::domain::ports::EnrollmentStoreBox;
use crate::error::Result;
use tracing::{debug, info};

/// Grants course access once a payment is confirmed.
///
/// The only component that creates enrollments. Creation is an idempotent
/// write: repeating it for a (user, course) pair that is already enrolled
/// returns the existing record untouched.
pub struct EnrollmentWriter {
    store: EnrollmentStoreBox,
}

impl EnrollmentWriter {
    pub fn new(store: EnrollmentStoreBox) -> Self {
        Self { store }
    }

    /// Returns the ACTIVE enrollment for the pair, creating it if needed.
    ///
    /// There is no "already enrolled" error; the existing record keeps its
    /// original price, date and transaction reference.
    pub async fn ensure_enrollment(
        &self,
        user_id: UserId,
        course_id: CourseId,
        transaction_reference: &str,
        price_paid: Amount,
        currency: Currency,
    ) -> Result<Enrollment> {
        let candidate = Enrollment::new(
            user_id,
            course_id,
            transaction_reference,
            price_paid,
            currency,
        );
        let enrolled_at = candidate.enrolled_at;
        let stored = self.store.insert_if_absent(candidate).await?;

        if stored.transaction_reference == transaction_reference
            && stored.enrolled_at == enrolled_at
        {
            info!(
                user_id = %stored.user_id,
                course_id = %stored.course_id,
                reference = transaction_reference,
                "enrollment created"
            );
        } else {
            debug!(
                user_id = %stored.user_id,
                course_id = %stored.course_id,
                reference = transaction_reference,
                existing_reference = %stored.transaction_reference,
                "enrollment already exists"
            );
        }
        Ok(stored)
    }

    pub async fn enrollment(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<Enrollment>> {
        self.store
            .find(&EnrollmentKey::new(user_id.clone(), course_id.clone()))
            .await
    }

    /// All enrollments of a user, active and revoked, ordered by course.
    pub async fn enrollments_for(&self, user_id: &UserId) -> Result<Vec<Enrollment>> {
        self.store.list_for_user(user_id).await
    }

    /// Withdraws access, e.g. after a refund. Revoking twice is a no-op.
    pub async fn revoke(&self, user_id: &UserId, course_id: &CourseId) -> Result<Enrollment> {
        let key = EnrollmentKey::new(user_id.clone(), course_id.clone());
        let revoked = self.store.revoke(&key).await?;
        info!(user_id = %user_id, course_id = %course_id, "enrollment revoked");
        Ok(revoked)
    }
}
