mod common;

use chrono::Utc;
use common::{Harness, charge_event, sign};
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use sponsorpay::application::reconciler::ReportedOutcome;
use sponsorpay::application::service::InitializeRequest;
use sponsorpay::domain::fees::FeeSchedule;
use sponsorpay::domain::money::Amount;
use sponsorpay::domain::payment::{PaymentStatus, SuccessDetails};
use sponsorpay::domain::ports::{PaymentLedger, ProjectRepository, StatsRepository};
use sponsorpay::domain::project::Project;
use std::sync::Arc;

fn success(amount_subunits: i64) -> ReportedOutcome {
    ReportedOutcome::Success {
        gateway_transaction_ref: Some("4099260516".to_string()),
        amount_subunits: Some(amount_subunits),
        currency: Some("KES".to_string()),
        paid_at: None,
        metadata: Value::Null,
    }
}

async fn backing_payment(h: &Harness, amount: Decimal) -> String {
    h.projects
        .store(Project::new("project-1", "recipient-1", "Library", dec!(1000000)).unwrap())
        .await
        .unwrap();
    h.service
        .initialize(InitializeRequest {
            payer_id: "sponsor-1".to_string(),
            payer_email: "sponsor@example.org".to_string(),
            amount,
            currency: "KES".to_string(),
            payment_type: "project-backing".to_string(),
            target_ref: "project-1".to_string(),
            metadata: Value::Null,
        })
        .await
        .unwrap()
        .gateway_session_ref
}

#[tokio::test]
async fn test_idempotency_across_many_reports() {
    let h = Harness::new();
    let reference = backing_payment(&h, dec!(1000)).await;

    for _ in 0..10 {
        h.engine.reconcile(&reference, success(100_000)).await.unwrap();
    }
    for _ in 0..3 {
        let body = charge_event("charge.success", &reference, 100_000);
        h.ingress.receive(&body, &sign(&body)).await.unwrap();
    }

    let project = h.projects.get("project-1").await.unwrap().unwrap();
    assert_eq!(project.current_amount, dec!(935));
    assert_eq!(project.backers[0].contributions, 1);
    let backer = h.stats.backer("sponsor-1").await.unwrap().unwrap();
    assert_eq!(backer.payments_made, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_verify_and_webhook_race_applies_once() {
    for _ in 0..20 {
        let h = Arc::new(Harness::new());
        let reference = backing_payment(&h, dec!(1000)).await;
        h.gateway.report_success(&reference, 100_000, "KES");

        let mut handles = Vec::new();
        for i in 0..6 {
            let h = h.clone();
            let reference = reference.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    h.service.verify(&reference).await.map(|r| r.status)
                } else {
                    let body = charge_event("charge.success", &reference, 100_000);
                    h.ingress
                        .receive(&body, &sign(&body))
                        .await
                        .map(|_| PaymentStatus::Success)
                }
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), PaymentStatus::Success);
        }

        let project = h.projects.get("project-1").await.unwrap().unwrap();
        assert_eq!(project.current_amount, dec!(935));
        assert_eq!(project.backers.len(), 1);
        assert_eq!(project.backers[0].contributions, 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_conflicting_reports_race_to_one_outcome() {
    let h = Arc::new(Harness::new());
    let reference = backing_payment(&h, dec!(1000)).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let h = h.clone();
        let reference = reference.clone();
        handles.push(tokio::spawn(async move {
            let outcome = if i % 2 == 0 {
                success(100_000)
            } else {
                ReportedOutcome::Failure {
                    reason: "Declined".to_string(),
                }
            };
            h.engine.reconcile(&reference, outcome).await.unwrap()
        }));
    }

    let mut applied = 0;
    let mut statuses = Vec::new();
    for handle in handles {
        let result = handle.await.unwrap();
        if result.applied {
            applied += 1;
        }
        statuses.push(result.payment.status);
    }
    assert_eq!(applied, 1);
    assert!(statuses.iter().all(|s| *s == statuses[0]));

    let project = h.projects.get("project-1").await.unwrap().unwrap();
    let expected = if statuses[0] == PaymentStatus::Success {
        dec!(935)
    } else {
        Decimal::ZERO
    };
    assert_eq!(project.current_amount, expected);
}

#[tokio::test]
async fn test_terminal_payments_are_immutable() {
    let h = Harness::new();
    let reference = backing_payment(&h, dec!(1000)).await;
    h.engine
        .reconcile(
            &reference,
            ReportedOutcome::Failure {
                reason: "Declined".to_string(),
            },
        )
        .await
        .unwrap();
    let failed = h
        .ledger
        .find_by_gateway_session_ref(&reference)
        .await
        .unwrap()
        .unwrap();

    let late = h
        .ledger
        .transition_to_success(
            failed.id,
            SuccessDetails {
                gateway_transaction_ref: Some("1".to_string()),
                metadata: Value::Null,
                paid_at: Utc::now(),
            },
        )
        .await
        .unwrap();
    assert!(!late.applied);
    assert_eq!(late.payment, failed);

    let again = h.ledger.transition_to_failure(failed.id, "Other").await.unwrap();
    assert!(!again.applied);
    assert_eq!(again.payment.failure_reason.as_deref(), Some("Declined"));
    assert!(again.payment.paid_at.is_none());
}

#[test]
fn test_fee_determinism() {
    let mut rng = rand::thread_rng();
    let schedules = [
        FeeSchedule::default(),
        FeeSchedule::new(dec!(0.029), dec!(100), Some(dec!(2000)), dec!(0.1)).unwrap(),
        FeeSchedule::new(dec!(0.5), dec!(0), None, dec!(0.9)).unwrap(),
    ];

    for _ in 0..2_000 {
        let cents: i64 = rng.gen_range(1..=100_000_000);
        let amount = Amount::new(Decimal::new(cents, 2)).unwrap();
        for schedule in &schedules {
            let fees = schedule.calculate(amount);
            assert_eq!(fees, schedule.calculate(amount));
            assert!(fees.gateway_fee >= Decimal::ZERO);
            assert!(fees.platform_fee >= Decimal::ZERO);
            assert!(fees.gateway_fee.scale() <= 2 && fees.platform_fee.scale() <= 2);

            let net = fees.net_of(amount);
            assert_eq!(
                net,
                amount.value() - fees.gateway_fee - fees.platform_fee
            );
            assert!(net >= Decimal::ZERO);
        }
    }
}
