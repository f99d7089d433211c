use super::enrollment::Enrollment;
use super::transaction::FailureReason;
use serde::Serialize;

/// Published after a verification reaches a definitive outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EnrollmentEvent {
    EnrollmentConfirmed {
        enrollment: Enrollment,
    },
    VerificationFailed {
        reference: String,
        reason: FailureReason,
    },
}
