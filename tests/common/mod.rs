#![allow(dead_code)]

use async_trait::async_trait;
use enrollpay::application::enrollment::EnrollmentWriter;
use enrollpay::application::verification::VerificationOrchestrator;
use enrollpay::domain::gateway::{GatewayOutcome, GatewayVerification};
use enrollpay::domain::identity::{CourseId, UserId};
use enrollpay::domain::money::{Amount, Currency};
use enrollpay::domain::ports::{PaymentGateway, TransactionStore};
use enrollpay::infrastructure::in_memory::{InMemoryEnrollmentStore, InMemoryTransactionStore};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::VecDeque;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Gateway double: replays queued outcomes, repeating the last one, and
/// counts how often it was asked.
#[derive(Clone)]
pub struct ScriptedGateway {
    outcomes: Arc<Mutex<VecDeque<GatewayOutcome>>>,
    calls: Arc<AtomicUsize>,
    latency: Duration,
}

impl ScriptedGateway {
    pub fn new(outcomes: Vec<GatewayOutcome>) -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(outcomes.into())),
            calls: Arc::default(),
            latency: Duration::ZERO,
        }
    }

    /// Holds every call open for `latency`, widening race windows.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn verify(&self, _reference: &str) -> GatewayOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.len() > 1 {
            outcomes.pop_front().unwrap()
        } else {
            outcomes.front().cloned().unwrap()
        }
    }
}

pub fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

pub fn course(id: &str) -> CourseId {
    CourseId::new(id).unwrap()
}

pub fn ngn() -> Currency {
    Currency::new("NGN").unwrap()
}

pub fn amount(value: Decimal) -> Amount {
    Amount::new(value).unwrap()
}

pub fn paid(value: Decimal) -> GatewayOutcome {
    GatewayOutcome::Determined(GatewayVerification::paid(
        amount(value),
        ngn(),
        json!({"data": {"status": "success"}}),
    ))
}

pub fn declined() -> GatewayOutcome {
    GatewayOutcome::Determined(GatewayVerification::failed(
        json!({"data": {"status": "failed"}}),
    ))
}

pub fn unreachable() -> GatewayOutcome {
    GatewayOutcome::Unreachable {
        reason: "connection reset".to_string(),
    }
}

/// In-memory wiring shared by the scenario tests.
pub struct Harness {
    pub transactions: InMemoryTransactionStore,
    pub enrollments: InMemoryEnrollmentStore,
    pub gateway: ScriptedGateway,
    pub orchestrator: Arc<VerificationOrchestrator>,
}

impl Harness {
    pub fn new(gateway: ScriptedGateway) -> Self {
        Self::with_lease(gateway, chrono::Duration::seconds(120))
    }

    pub fn with_lease(gateway: ScriptedGateway, lease: chrono::Duration) -> Self {
        let transactions = InMemoryTransactionStore::new();
        let enrollments = InMemoryEnrollmentStore::new();
        let orchestrator = VerificationOrchestrator::new(
            Box::new(transactions.clone()),
            EnrollmentWriter::new(Box::new(enrollments.clone())),
            Box::new(gateway.clone()),
        )
        .with_verification_lease(lease);

        Self {
            transactions,
            enrollments,
            gateway,
            orchestrator: Arc::new(orchestrator),
        }
    }

    pub async fn checkout(&self, reference: &str, user_id: &str, course_id: &str, price: Decimal) {
        self.transactions
            .create(reference, user(user_id), course(course_id), amount(price), ngn())
            .await
            .unwrap();
    }
}

/// Writes a checkout row followed by `callbacks` callback rows per reference.
pub fn generate_events_csv(path: &Path, references: usize, callbacks: usize) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().flexible(true).from_writer(file);

    wtr.write_record(["type", "reference", "user", "course", "amount", "currency"])?;

    for i in 1..=references {
        let reference = format!("TXN-{i}");
        wtr.write_record([
            "checkout",
            &reference,
            &format!("user-{i}"),
            "course-1",
            "5000",
            "NGN",
        ])?;
        for _ in 0..callbacks {
            wtr.write_record(["callback", &reference])?;
        }
    }

    wtr.flush()?;
    Ok(())
}
