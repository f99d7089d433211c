mod common;

use common::{Harness, ScriptedGateway, course, paid, unreachable, user};
use enrollpay::application::verification::{RetryReason, VerificationResult};
use enrollpay::domain::ports::TransactionStore;
use enrollpay::domain::transaction::TransactionStatus;
use futures::future::join_all;
use rand::Rng;
use rust_decimal_macros::dec;
use std::time::Duration;

async fn race(harness: &Harness, reference: &str, callers: usize) -> Vec<VerificationResult> {
    let handles = (0..callers).map(|_| {
        let orchestrator = harness.orchestrator.clone();
        let reference = reference.to_string();
        tokio::spawn(async move { orchestrator.verify(&reference).await })
    });

    join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callbacks_call_gateway_once() {
    let callers = rand::thread_rng().gen_range(2..=32);
    let gateway =
        ScriptedGateway::new(vec![paid(dec!(5000))]).with_latency(Duration::from_millis(50));
    let harness = Harness::new(gateway);
    harness.checkout("TXN-1", "user-1", "course-1", dec!(5000)).await;

    let results = race(&harness, "TXN-1", callers).await;

    assert_eq!(harness.gateway.calls(), 1, "{callers} callers");
    assert!(results.iter().any(VerificationResult::is_paid));
    for result in &results {
        assert!(
            result.is_paid()
                || *result
                    == VerificationResult::Retry {
                        reason: RetryReason::VerificationInProgress
                    },
            "unexpected result {result:?}"
        );
    }

    assert_eq!(
        harness.transactions.get("TXN-1").await.unwrap().status,
        TransactionStatus::Paid
    );
    assert!(
        harness
            .orchestrator
            .enrollments()
            .enrollment(&user("user-1"), &course("course-1"))
            .await
            .unwrap()
            .is_some()
    );

    // Callers that were told to retry now get the cached answer.
    assert!(harness.orchestrator.verify("TXN-1").await.unwrap().is_paid());
    assert_eq!(harness.gateway.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_references_for_same_course_yield_one_enrollment() {
    let references = rand::thread_rng().gen_range(2..=16);
    let harness = Harness::new(ScriptedGateway::new(vec![paid(dec!(5000))]));
    for i in 0..references {
        harness
            .checkout(&format!("TXN-{i}"), "user-1", "course-1", dec!(5000))
            .await;
    }

    let handles = (0..references).map(|i| {
        let orchestrator = harness.orchestrator.clone();
        tokio::spawn(async move { orchestrator.verify(&format!("TXN-{i}")).await })
    });
    let results: Vec<VerificationResult> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let enrollments: Vec<_> = results
        .into_iter()
        .map(|result| match result {
            VerificationResult::Paid { enrollment } => enrollment,
            other => panic!("expected PAID, got {other:?}"),
        })
        .collect();
    assert!(enrollments.windows(2).all(|pair| pair[0] == pair[1]));

    let listed = harness
        .orchestrator
        .enrollments()
        .enrollments_for(&user("user-1"))
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_outage_under_contention_releases_lease() {
    let callers = 8;
    let gateway = ScriptedGateway::new(vec![unreachable()]).with_latency(Duration::from_millis(30));
    let harness = Harness::new(gateway);
    harness.checkout("TXN-1", "user-1", "course-1", dec!(5000)).await;

    let results = race(&harness, "TXN-1", callers).await;

    assert!((1..=callers).contains(&harness.gateway.calls()));
    assert!(
        results
            .iter()
            .all(|result| matches!(result, VerificationResult::Retry { .. }))
    );
    let tx = harness.transactions.get("TXN-1").await.unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert!(tx.verification_started_at.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_late_answer_from_reclaimed_lease_is_discarded() {
    let gateway = ScriptedGateway::new(vec![unreachable(), paid(dec!(5000))])
        .with_latency(Duration::from_millis(300));
    let harness = Harness::with_lease(gateway, chrono::Duration::milliseconds(100));
    harness.checkout("TXN-1", "user-1", "course-1", dec!(5000)).await;

    let first = {
        let orchestrator = harness.orchestrator.clone();
        tokio::spawn(async move { orchestrator.verify("TXN-1").await })
    };
    tokio::time::sleep(Duration::from_millis(150)).await;
    let second = {
        let orchestrator = harness.orchestrator.clone();
        tokio::spawn(async move { orchestrator.verify("TXN-1").await })
    };

    // The first owner's outage answer arrives while the second still waits.
    assert_eq!(
        first.await.unwrap().unwrap(),
        VerificationResult::Retry {
            reason: RetryReason::GatewayUnreachable
        }
    );
    let tx = harness.transactions.get("TXN-1").await.unwrap();
    assert_eq!(tx.status, TransactionStatus::Verifying);
    assert_eq!(tx.attempts, 2);

    assert!(second.await.unwrap().unwrap().is_paid());
    assert_eq!(harness.gateway.calls(), 2);
}
