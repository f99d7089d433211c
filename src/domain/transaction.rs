use super::identity::{CourseId, UserId};
use super::money::{Amount, Currency};
use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Verifying,
    Paid,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Paid | Self::Failed)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Verifying => "VERIFYING",
            Self::Paid => "PAID",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Why a verification ended without an enrollment.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The reference was never initialized on this system.
    UnknownReference,
    /// The gateway confirmed a payment whose amount or currency differs from checkout.
    AmountMismatch,
    /// The gateway reported the payment as failed, abandoned or reversed.
    GatewayDeclined,
    /// The gateway has no record of the reference.
    GatewayUnknownReference,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownReference => "unknown_reference",
            Self::AmountMismatch => "amount_mismatch",
            Self::GatewayDeclined => "gateway_declined",
            Self::GatewayUnknownReference => "gateway_unknown_reference",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested status change, applied by a store as one conditional update.
///
/// Each change names the single status it may be applied from; the store
/// rejects it with `InvalidTransition` when the persisted status differs.
/// Changes that end a verification also carry the `lease` they were issued
/// under (the `attempts` value when it was taken) and are rejected once the
/// lease has been reclaimed by another caller.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusChange {
    /// PENDING -> VERIFYING, taking the verification lease.
    BeginVerification { at: DateTime<Utc> },
    /// VERIFYING -> VERIFYING, taking over a lease started before `stale_before`.
    ReclaimVerification {
        stale_before: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    /// VERIFYING -> PAID.
    Paid {
        lease: u32,
        verified_amount: Amount,
        raw_response: Value,
        at: DateTime<Utc>,
    },
    /// VERIFYING -> FAILED.
    Failed {
        lease: u32,
        reason: FailureReason,
        raw_response: Option<Value>,
        at: DateTime<Utc>,
    },
    /// VERIFYING -> PENDING. Only used when the gateway could not give an answer.
    Rollback { lease: u32 },
}

impl StatusChange {
    pub fn source(&self) -> TransactionStatus {
        match self {
            Self::BeginVerification { .. } => TransactionStatus::Pending,
            _ => TransactionStatus::Verifying,
        }
    }

    pub fn target(&self) -> TransactionStatus {
        match self {
            Self::BeginVerification { .. } | Self::ReclaimVerification { .. } => {
                TransactionStatus::Verifying
            }
            Self::Paid { .. } => TransactionStatus::Paid,
            Self::Failed { .. } => TransactionStatus::Failed,
            Self::Rollback { .. } => TransactionStatus::Pending,
        }
    }

    /// The lease a terminal or rollback change was issued under.
    pub fn lease(&self) -> Option<u32> {
        match self {
            Self::Paid { lease, .. } | Self::Failed { lease, .. } | Self::Rollback { lease } => {
                Some(*lease)
            }
            Self::BeginVerification { .. } | Self::ReclaimVerification { .. } => None,
        }
    }
}

/// One payment attempt, keyed by the gateway reference.
///
/// Records are never deleted; terminal records are the audit trail.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Transaction {
    pub reference: String,
    pub user_id: UserId,
    pub course_id: CourseId,
    pub amount: Amount,
    pub currency: Currency,
    pub status: TransactionStatus,
    /// Gateway payload kept for audit. Never interpreted outside the gateway adapter.
    pub gateway_raw_response: Option<Value>,
    pub failure_reason: Option<FailureReason>,
    /// How many times the verification lease was taken. The current value
    /// identifies the lease held while VERIFYING.
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub verification_started_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn new(
        reference: impl Into<String>,
        user_id: UserId,
        course_id: CourseId,
        amount: Amount,
        currency: Currency,
    ) -> Result<Self> {
        let reference = reference.into();
        if reference.is_empty() {
            return Err(EngineError::ValidationError(
                "Reference must not be empty".to_string(),
            ));
        }
        Ok(Self {
            reference,
            user_id,
            course_id,
            amount,
            currency,
            status: TransactionStatus::Pending,
            gateway_raw_response: None,
            failure_reason: None,
            attempts: 0,
            created_at: Utc::now(),
            verification_started_at: None,
            verified_at: None,
        })
    }

    /// Applies `change` in place if the current status allows it.
    ///
    /// Store adapters call this inside their atomic read-modify-write section.
    pub fn apply(&mut self, change: StatusChange) -> Result<()> {
        if self.status != change.source() {
            return Err(self.invalid(change.target()));
        }
        let target = change.target();
        if let Some(lease) = change.lease()
            && lease != self.attempts
        {
            return Err(self.invalid(target));
        }

        match change {
            StatusChange::BeginVerification { at } => {
                self.attempts += 1;
                self.verification_started_at = Some(at);
            }
            StatusChange::ReclaimVerification { stale_before, at } => {
                match self.verification_started_at {
                    Some(started) if started < stale_before => {}
                    _ => return Err(self.invalid(TransactionStatus::Verifying)),
                }
                self.attempts += 1;
                self.verification_started_at = Some(at);
            }
            StatusChange::Paid {
                verified_amount,
                raw_response,
                at,
                ..
            } => {
                if verified_amount != self.amount {
                    return Err(EngineError::ValidationError(format!(
                        "Verified amount {} does not match stored amount {} for {}",
                        verified_amount, self.amount, self.reference
                    )));
                }
                self.gateway_raw_response = Some(raw_response);
                self.verification_started_at = None;
                self.verified_at = Some(at);
            }
            StatusChange::Failed {
                reason,
                raw_response,
                at,
                ..
            } => {
                if raw_response.is_some() {
                    self.gateway_raw_response = raw_response;
                }
                self.failure_reason = Some(reason);
                self.verification_started_at = None;
                self.verified_at = Some(at);
            }
            StatusChange::Rollback { .. } => {
                self.verification_started_at = None;
            }
        }

        self.status = target;
        Ok(())
    }

    fn invalid(&self, to: TransactionStatus) -> EngineError {
        EngineError::InvalidTransition {
            reference: self.reference.clone(),
            from: self.status,
            to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn pending(reference: &str) -> Transaction {
        Transaction::new(
            reference,
            UserId::new("user-1").unwrap(),
            CourseId::new("course-1").unwrap(),
            Amount::new(dec!(5000)).unwrap(),
            Currency::new("NGN").unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut tx = pending("TXN-1");
        tx.apply(StatusChange::BeginVerification { at: Utc::now() })
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Verifying);
        assert_eq!(tx.attempts, 1);
        assert!(tx.verification_started_at.is_some());

        tx.apply(StatusChange::Paid {
            lease: 1,
            verified_amount: Amount::new(dec!(5000.00)).unwrap(),
            raw_response: json!({"status": "success"}),
            at: Utc::now(),
        })
        .unwrap();
        assert_eq!(tx.status, TransactionStatus::Paid);
        assert!(tx.verified_at.is_some());
        assert!(tx.verification_started_at.is_none());
        assert_eq!(tx.gateway_raw_response, Some(json!({"status": "success"})));
    }

    #[test]
    fn test_begin_twice_is_rejected() {
        let mut tx = pending("TXN-1");
        tx.apply(StatusChange::BeginVerification { at: Utc::now() })
            .unwrap();
        let err = tx
            .apply(StatusChange::BeginVerification { at: Utc::now() })
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidTransition {
                from: TransactionStatus::Verifying,
                to: TransactionStatus::Verifying,
                ..
            }
        ));
        assert_eq!(tx.attempts, 1);
    }

    #[test]
    fn test_terminal_states_are_immutable() {
        let mut tx = pending("TXN-2");
        tx.apply(StatusChange::BeginVerification { at: Utc::now() })
            .unwrap();
        tx.apply(StatusChange::Failed {
            lease: 1,
            reason: FailureReason::GatewayDeclined,
            raw_response: None,
            at: Utc::now(),
        })
        .unwrap();

        let snapshot = tx.clone();
        for change in [
            StatusChange::BeginVerification { at: Utc::now() },
            StatusChange::Rollback { lease: 1 },
            StatusChange::Paid {
                lease: 1,
                verified_amount: Amount::new(dec!(5000)).unwrap(),
                raw_response: json!({}),
                at: Utc::now(),
            },
        ] {
            assert!(matches!(
                tx.apply(change),
                Err(EngineError::InvalidTransition {
                    from: TransactionStatus::Failed,
                    ..
                })
            ));
        }
        assert_eq!(tx, snapshot);
    }

    #[test]
    fn test_mark_paid_requires_matching_amount() {
        let mut tx = pending("TXN-3");
        tx.apply(StatusChange::BeginVerification { at: Utc::now() })
            .unwrap();
        let result = tx.apply(StatusChange::Paid {
            lease: 1,
            verified_amount: Amount::new(dec!(4000)).unwrap(),
            raw_response: json!({}),
            at: Utc::now(),
        });
        assert!(matches!(result, Err(EngineError::ValidationError(_))));
        assert_eq!(tx.status, TransactionStatus::Verifying);
    }

    #[test]
    fn test_rollback_only_from_verifying() {
        let mut tx = pending("TXN-4");
        assert!(tx.apply(StatusChange::Rollback { lease: 0 }).is_err());

        tx.apply(StatusChange::BeginVerification { at: Utc::now() })
            .unwrap();
        tx.apply(StatusChange::Rollback { lease: 1 }).unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert!(tx.verification_started_at.is_none());
        assert!(tx.failure_reason.is_none());
    }

    #[test]
    fn test_reclaim_requires_stale_lease() {
        let mut tx = pending("TXN-5");
        let started = Utc::now() - Duration::seconds(600);
        tx.apply(StatusChange::BeginVerification { at: started })
            .unwrap();

        let fresh_cutoff = started - Duration::seconds(1);
        assert!(
            tx.apply(StatusChange::ReclaimVerification {
                stale_before: fresh_cutoff,
                at: Utc::now(),
            })
            .is_err()
        );

        tx.apply(StatusChange::ReclaimVerification {
            stale_before: Utc::now() - Duration::seconds(60),
            at: Utc::now(),
        })
        .unwrap();
        assert_eq!(tx.status, TransactionStatus::Verifying);
        assert_eq!(tx.attempts, 2);
        assert!(tx.verification_started_at.unwrap() > started);
    }

    #[test]
    fn test_reclaimed_lease_rejects_previous_owner() {
        let mut tx = pending("TXN-7");
        tx.apply(StatusChange::BeginVerification {
            at: Utc::now() - Duration::seconds(600),
        })
        .unwrap();
        tx.apply(StatusChange::ReclaimVerification {
            stale_before: Utc::now() - Duration::seconds(60),
            at: Utc::now(),
        })
        .unwrap();
        let snapshot = tx.clone();

        for change in [
            StatusChange::Rollback { lease: 1 },
            StatusChange::Failed {
                lease: 1,
                reason: FailureReason::GatewayDeclined,
                raw_response: None,
                at: Utc::now(),
            },
            StatusChange::Paid {
                lease: 1,
                verified_amount: Amount::new(dec!(5000)).unwrap(),
                raw_response: json!({}),
                at: Utc::now(),
            },
        ] {
            assert!(matches!(
                tx.apply(change),
                Err(EngineError::InvalidTransition {
                    from: TransactionStatus::Verifying,
                    ..
                })
            ));
        }
        assert_eq!(tx, snapshot);

        tx.apply(StatusChange::Rollback { lease: 2 }).unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
    }

    #[test]
    fn test_status_serialization() {
        let tx = pending("TXN-6");
        let value = serde_json::to_value(&tx).unwrap();
        assert_eq!(value["status"], "PENDING");
        assert_eq!(value["currency"], "NGN");
        let back: Transaction = serde_json::from_value(value).unwrap();
        assert_eq!(back, tx);
    }
}
