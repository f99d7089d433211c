use super::enrollment::EnrollmentWriter;
use crate::domain::enrollment::Enrollment;
use crate::domain::events::EnrollmentEvent;
use crate::domain::gateway::{GatewayOutcome, GatewayStatus};
use crate::domain::ports::{EnrollmentNotifierBox, PaymentGatewayBox, TransactionStoreBox};
use crate::domain::transaction::{FailureReason, Transaction, TransactionStatus};
use crate::error::{EngineError, Result};
use crate::infrastructure::notifier::NoopNotifier;
use chrono::{Duration, Utc};
use serde::Serialize;
use std::fmt;
use tracing::{debug, error, info, warn};

/// How long one attempt may hold VERIFYING before another caller may take over.
pub const DEFAULT_VERIFICATION_LEASE_SECS: i64 = 120;

/// Why the caller should invoke `verify` again later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryReason {
    /// Another call currently owns the verification of this reference.
    VerificationInProgress,
    /// The gateway could not be reached; the transaction is PENDING again.
    GatewayUnreachable,
    /// The gateway has not settled the payment yet; the transaction is PENDING again.
    GatewayPending,
}

impl RetryReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VerificationInProgress => "verification_in_progress",
            Self::GatewayUnreachable => "gateway_unreachable",
            Self::GatewayPending => "gateway_pending",
        }
    }
}

impl fmt::Display for RetryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified answer returned to the redirect page or the webhook.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationResult {
    Paid { enrollment: Enrollment },
    Failed { reason: FailureReason },
    Retry { reason: RetryReason },
}

impl VerificationResult {
    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Paid { .. })
    }
}

enum Acquisition {
    /// This call holds the VERIFYING lease.
    Owned(Transaction),
    /// Another call already drove the transaction to a terminal state.
    Settled(Transaction),
    Busy,
}

/// Reconciles a gateway reference into exactly one enrollment.
///
/// Holds no state of its own. Concurrent calls for the same reference are
/// serialized by the store's PENDING -> VERIFYING conditional update: only the
/// call that wins it contacts the gateway, every other call either sees the
/// terminal result or is told to retry.
pub struct VerificationOrchestrator {
    transactions: TransactionStoreBox,
    enrollments: EnrollmentWriter,
    gateway: PaymentGatewayBox,
    notifier: EnrollmentNotifierBox,
    lease: Duration,
}

impl VerificationOrchestrator {
    pub fn new(
        transactions: TransactionStoreBox,
        enrollments: EnrollmentWriter,
        gateway: PaymentGatewayBox,
    ) -> Self {
        Self {
            transactions,
            enrollments,
            gateway,
            notifier: Box::new(NoopNotifier),
            lease: Duration::seconds(DEFAULT_VERIFICATION_LEASE_SECS),
        }
    }

    pub fn with_notifier(mut self, notifier: EnrollmentNotifierBox) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_verification_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn enrollments(&self) -> &EnrollmentWriter {
        &self.enrollments
    }

    /// Verifies `reference` and, on success, returns its enrollment.
    ///
    /// Safe to call any number of times, concurrently, from the redirect
    /// callback and the webhook alike. `Err` is only returned for storage
    /// failures; every business outcome is a `VerificationResult`.
    pub async fn verify(&self, reference: &str) -> Result<VerificationResult> {
        let result = self.reconcile(reference).await?;

        let event = match &result {
            // A replay for a refunded enrollment confirms nothing.
            VerificationResult::Paid { enrollment } if enrollment.is_active() => {
                Some(EnrollmentEvent::EnrollmentConfirmed {
                    enrollment: enrollment.clone(),
                })
            }
            VerificationResult::Paid { .. } => None,
            VerificationResult::Failed { reason } => Some(EnrollmentEvent::VerificationFailed {
                reference: reference.to_string(),
                reason: *reason,
            }),
            VerificationResult::Retry { .. } => None,
        };
        if let Some(event) = event {
            self.notifier.publish(event).await;
        }

        Ok(result)
    }

    async fn reconcile(&self, reference: &str) -> Result<VerificationResult> {
        let Some(tx) = self.transactions.find(reference).await? else {
            warn!(reference, "verification requested for unknown reference");
            return Ok(VerificationResult::Failed {
                reason: FailureReason::UnknownReference,
            });
        };

        if tx.status.is_terminal() {
            debug!(reference, status = %tx.status, "transaction already settled");
            return self.settle(tx).await;
        }

        match self.acquire(reference).await? {
            Acquisition::Owned(tx) => self.verify_with_gateway(tx).await,
            Acquisition::Settled(tx) => self.settle(tx).await,
            Acquisition::Busy => Ok(VerificationResult::Retry {
                reason: RetryReason::VerificationInProgress,
            }),
        }
    }

    async fn acquire(&self, reference: &str) -> Result<Acquisition> {
        match self.transactions.begin_verification(reference).await {
            Ok(tx) => return Ok(Acquisition::Owned(tx)),
            Err(EngineError::InvalidTransition { .. }) => {}
            Err(e) => return Err(e),
        }

        let current = self.transactions.get(reference).await?;
        match current.status {
            TransactionStatus::Paid | TransactionStatus::Failed => {
                Ok(Acquisition::Settled(current))
            }
            TransactionStatus::Pending => Ok(Acquisition::Busy),
            TransactionStatus::Verifying => {
                let stale_before = Utc::now() - self.lease;
                let is_stale = current
                    .verification_started_at
                    .is_some_and(|started| started < stale_before);
                if !is_stale {
                    return Ok(Acquisition::Busy);
                }

                match self
                    .transactions
                    .reclaim_stale_verification(reference, stale_before)
                    .await
                {
                    Ok(tx) => {
                        warn!(reference, attempts = tx.attempts, "reclaimed stale verification");
                        Ok(Acquisition::Owned(tx))
                    }
                    Err(EngineError::InvalidTransition { .. }) => Ok(Acquisition::Busy),
                    Err(e) => Err(e),
                }
            }
        }
    }

    async fn verify_with_gateway(&self, tx: Transaction) -> Result<VerificationResult> {
        let reference = tx.reference.as_str();
        let lease = tx.attempts;

        let written = match self.gateway.verify(reference).await {
            GatewayOutcome::Determined(verification) => match verification.status {
                GatewayStatus::Paid => match verification.amount {
                    Some(verified) if verification.confirms(tx.amount, &tx.currency) => {
                        self.transactions
                            .mark_paid(reference, lease, verified, verification.raw_response)
                            .await
                    }
                    _ => {
                        warn!(
                            reference,
                            expected_amount = %tx.amount,
                            expected_currency = %tx.currency,
                            reported_amount = ?verification.amount.map(|a| a.to_string()),
                            reported_currency =
                                ?verification.currency.as_ref().map(|c| c.to_string()),
                            "gateway confirmed a different amount"
                        );
                        self.transactions
                            .mark_failed(
                                reference,
                                lease,
                                FailureReason::AmountMismatch,
                                Some(verification.raw_response),
                            )
                            .await
                    }
                },
                GatewayStatus::Failed => {
                    self.transactions
                        .mark_failed(
                            reference,
                            lease,
                            FailureReason::GatewayDeclined,
                            Some(verification.raw_response),
                        )
                        .await
                }
                GatewayStatus::Unknown => {
                    self.transactions
                        .mark_failed(
                            reference,
                            lease,
                            FailureReason::GatewayUnknownReference,
                            Some(verification.raw_response),
                        )
                        .await
                }
            },
            GatewayOutcome::Unsettled { .. } => {
                info!(reference, "gateway has not settled the payment yet");
                return self
                    .release(reference, lease, RetryReason::GatewayPending)
                    .await;
            }
            GatewayOutcome::Unreachable { reason } => {
                warn!(reference, %reason, "gateway unreachable");
                return self
                    .release(reference, lease, RetryReason::GatewayUnreachable)
                    .await;
            }
        };

        let settled = match written {
            Ok(tx) => tx,
            Err(EngineError::InvalidTransition { .. }) => {
                // The lease was reclaimed while the gateway call was in flight.
                let current = self.transactions.get(reference).await?;
                if !current.status.is_terminal() {
                    return Ok(VerificationResult::Retry {
                        reason: RetryReason::VerificationInProgress,
                    });
                }
                current
            }
            Err(e) => {
                if let Err(rollback) = self
                    .transactions
                    .rollback_verification(reference, lease)
                    .await
                {
                    error!(reference, error = %rollback, "failed to release verification lease");
                }
                return Err(e);
            }
        };

        info!(reference, status = %settled.status, "verification settled");
        self.settle(settled).await
    }

    /// Hands the transaction back to PENDING so a later call can retry.
    ///
    /// A lease that was reclaimed meanwhile belongs to another caller and is
    /// left alone.
    async fn release(
        &self,
        reference: &str,
        lease: u32,
        reason: RetryReason,
    ) -> Result<VerificationResult> {
        match self
            .transactions
            .rollback_verification(reference, lease)
            .await
        {
            Ok(_) | Err(EngineError::InvalidTransition { .. }) => {
                Ok(VerificationResult::Retry { reason })
            }
            Err(e) => Err(e),
        }
    }

    async fn settle(&self, tx: Transaction) -> Result<VerificationResult> {
        match tx.status {
            TransactionStatus::Paid => {
                let enrollment = self
                    .enrollments
                    .ensure_enrollment(
                        tx.user_id,
                        tx.course_id,
                        &tx.reference,
                        tx.amount,
                        tx.currency,
                    )
                    .await?;
                Ok(VerificationResult::Paid { enrollment })
            }
            TransactionStatus::Failed => Ok(VerificationResult::Failed {
                reason: tx.failure_reason.unwrap_or(FailureReason::GatewayDeclined),
            }),
            TransactionStatus::Pending | TransactionStatus::Verifying => {
                Ok(VerificationResult::Retry {
                    reason: RetryReason::VerificationInProgress,
                })
            }
        }
    }
}
