//! Application layer containing the payment-to-enrollment orchestration.
//!
//! `CheckoutService` records a payment attempt before the redirect,
//! `VerificationOrchestrator` reconciles the gateway's verdict into the
//! transaction state machine, and `EnrollmentWriter` turns a confirmed
//! payment into course access. None of them hold state; the stores do.

pub mod checkout;
pub mod enrollment;
pub mod verification;
