use super::identity::{CourseId, UserId};
use super::money::{Amount, Currency};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentStatus {
    Active,
    Revoked,
}

/// Course access granted to one user, unique per (user, course).
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Enrollment {
    pub user_id: UserId,
    pub course_id: CourseId,
    /// The transaction that paid for this enrollment. Not an ownership link.
    pub transaction_reference: String,
    pub price_paid: Amount,
    pub currency: Currency,
    pub enrolled_at: DateTime<Utc>,
    pub status: EnrollmentStatus,
}

impl Enrollment {
    pub fn new(
        user_id: UserId,
        course_id: CourseId,
        transaction_reference: impl Into<String>,
        price_paid: Amount,
        currency: Currency,
    ) -> Self {
        Self {
            user_id,
            course_id,
            transaction_reference: transaction_reference.into(),
            price_paid,
            currency,
            enrolled_at: Utc::now(),
            status: EnrollmentStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == EnrollmentStatus::Active
    }

    /// Whether `candidate` may take this record's key: only a REVOKED record
    /// paid by a different transaction is superseded.
    pub fn is_replaced_by(&self, candidate: &Enrollment) -> bool {
        !self.is_active() && self.transaction_reference != candidate.transaction_reference
    }

    pub fn key(&self) -> EnrollmentKey {
        EnrollmentKey::new(self.user_id.clone(), self.course_id.clone())
    }
}

/// The uniqueness key of an enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnrollmentKey {
    pub user_id: UserId,
    pub course_id: CourseId,
}

impl EnrollmentKey {
    pub fn new(user_id: UserId, course_id: CourseId) -> Self {
        Self { user_id, course_id }
    }

    /// Byte encoding used by ordered key-value stores.
    ///
    /// User id first so that a prefix scan lists one user's enrollments.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut key = Self::user_prefix(&self.user_id);
        key.extend_from_slice(self.course_id.as_str().as_bytes());
        key
    }

    pub fn user_prefix(user_id: &UserId) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(user_id.as_str().len() + 1);
        prefix.extend_from_slice(user_id.as_str().as_bytes());
        prefix.push(0);
        prefix
    }
}

impl std::fmt::Display for EnrollmentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.user_id, self.course_id)
    }
}
