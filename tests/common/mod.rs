#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Value, json};
use sponsorpay::application::effects::DomainEffects;
use sponsorpay::application::reconciler::ReconciliationEngine;
use sponsorpay::application::service::PaymentService;
use sponsorpay::application::webhook::WebhookIngress;
use sponsorpay::domain::fees::FeeSchedule;
use sponsorpay::domain::gateway::{
    CheckoutRequest, CheckoutSession, GatewayStatus, GatewayVerification,
};
use sponsorpay::domain::history::{HistoryQuery, Page};
use sponsorpay::domain::payment::{Payment, PaymentDraft, PaymentId, SuccessDetails, Transition};
use sponsorpay::domain::ports::PaymentLedger;
use sponsorpay::error::{PaymentError, Result};
use sponsorpay::infrastructure::gateway::WebhookVerifier;
use sponsorpay::infrastructure::in_memory::{
    InMemoryAdoptionRepository, InMemoryExpiringKeys, InMemoryPaymentLedger,
    InMemoryProjectRepository, InMemoryStatsRepository,
};
use std::collections::HashMap;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const SECRET: &str = "sk_test_integration";

/// Scripted stand-in for the hosted gateway.
#[derive(Default)]
pub struct FakeGateway {
    outcomes: Mutex<HashMap<String, GatewayVerification>>,
    refuse_checkout: Mutex<Option<String>>,
    unreachable: Mutex<bool>,
    pub initialize_calls: AtomicUsize,
    pub verify_calls: AtomicUsize,
}

impl FakeGateway {
    pub fn report(&self, reference: &str, verification: GatewayVerification) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(reference.to_string(), verification);
    }

    pub fn report_success(&self, reference: &str, amount_subunits: i64, currency: &str) {
        self.report(
            reference,
            GatewayVerification {
                status: GatewayStatus::Success,
                gateway_transaction_ref: Some("4099260516".to_string()),
                amount_subunits: Some(amount_subunits),
                currency: Some(currency.to_string()),
                gateway_response: Some("Approved".to_string()),
                paid_at: None,
                metadata: json!({"channel": "mobile_money"}),
            },
        );
    }

    pub fn report_failure(&self, reference: &str, reason: &str) {
        self.report(
            reference,
            GatewayVerification {
                status: GatewayStatus::Failed,
                gateway_transaction_ref: Some("4099260517".to_string()),
                amount_subunits: None,
                currency: None,
                gateway_response: Some(reason.to_string()),
                paid_at: None,
                metadata: Value::Null,
            },
        );
    }

    pub fn refuse_checkout(&self, message: &str) {
        *self.refuse_checkout.lock().unwrap() = Some(message.to_string());
    }

    pub fn go_offline(&self) {
        *self.unreachable.lock().unwrap() = true;
    }
}

#[async_trait]
impl sponsorpay::domain::ports::PaymentGateway for FakeGateway {
    async fn initialize(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.refuse_checkout.lock().unwrap().clone() {
            return Err(PaymentError::GatewayError(message));
        }
        Ok(CheckoutSession {
            authorization_url: format!("https://checkout.example/{}", request.reference),
            gateway_session_ref: request.reference.clone(),
        })
    }

    async fn verify(&self, reference: &str) -> Result<GatewayVerification> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        if *self.unreachable.lock().unwrap() {
            return Err(PaymentError::GatewayUnreachable("connection timed out".into()));
        }
        Ok(self
            .outcomes
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .unwrap_or(GatewayVerification {
                status: GatewayStatus::Pending,
                gateway_transaction_ref: None,
                amount_subunits: None,
                currency: None,
                gateway_response: None,
                paid_at: None,
                metadata: Value::Null,
            }))
    }
}

/// Ledger wrapper counting how often payments are looked up or transitioned.
#[derive(Default)]
pub struct CountingLedger {
    inner: InMemoryPaymentLedger,
    pub lookups: AtomicUsize,
    pub transitions: AtomicUsize,
}

impl CountingLedger {
    pub fn touched(&self) -> usize {
        self.lookups.load(Ordering::SeqCst) + self.transitions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentLedger for CountingLedger {
    async fn create(&self, draft: PaymentDraft) -> Result<Payment> {
        self.inner.create(draft).await
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.get(id).await
    }

    async fn find_by_gateway_session_ref(&self, reference: &str) -> Result<Option<Payment>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_gateway_session_ref(reference).await
    }

    async fn transition_to_success(
        &self,
        id: PaymentId,
        details: SuccessDetails,
    ) -> Result<Transition> {
        self.transitions.fetch_add(1, Ordering::SeqCst);
        self.inner.transition_to_success(id, details).await
    }

    async fn transition_to_failure(&self, id: PaymentId, reason: &str) -> Result<Transition> {
        self.transitions.fetch_add(1, Ordering::SeqCst);
        self.inner.transition_to_failure(id, reason).await
    }

    async fn query(&self, query: &HistoryQuery) -> Result<Page<Payment>> {
        self.inner.query(query).await
    }
}

/// The whole pipeline wired over in-memory stores and the fake gateway.
pub struct Harness {
    pub ledger: Arc<CountingLedger>,
    pub adoptions: Arc<InMemoryAdoptionRepository>,
    pub projects: Arc<InMemoryProjectRepository>,
    pub stats: Arc<InMemoryStatsRepository>,
    pub deliveries: Arc<InMemoryExpiringKeys>,
    pub gateway: Arc<FakeGateway>,
    pub engine: Arc<ReconciliationEngine>,
    pub service: PaymentService,
    pub ingress: WebhookIngress,
}

impl Harness {
    pub fn new() -> Self {
        let ledger = Arc::new(CountingLedger::default());
        let adoptions = Arc::new(InMemoryAdoptionRepository::new());
        let projects = Arc::new(InMemoryProjectRepository::new());
        let stats = Arc::new(InMemoryStatsRepository::new());
        let deliveries = Arc::new(InMemoryExpiringKeys::new());
        let gateway = Arc::new(FakeGateway::default());

        let effects = DomainEffects::new(adoptions.clone(), projects.clone(), stats.clone());
        let engine = Arc::new(ReconciliationEngine::new(ledger.clone(), Arc::new(effects)));
        let service = PaymentService::new(
            ledger.clone(),
            gateway.clone(),
            engine.clone(),
            FeeSchedule::default(),
        )
        .with_callback_url(Some("https://app.example/payments/return".to_string()));
        let ingress = WebhookIngress::new(
            Arc::new(WebhookVerifier::new(SECRET).unwrap()),
            engine.clone(),
            deliveries.clone(),
        );

        Self {
            ledger,
            adoptions,
            projects,
            stats,
            deliveries,
            gateway,
            engine,
            service,
            ingress,
        }
    }
}

pub fn sign(raw: &[u8]) -> String {
    WebhookVerifier::new(SECRET).unwrap().sign(raw)
}

/// A gateway event body as raw bytes.
pub fn charge_event(event: &str, reference: &str, amount_subunits: i64) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "event": event,
        "data": {
            "id": 4099260516u64,
            "status": if event == "charge.success" { "success" } else { "failed" },
            "reference": reference,
            "amount": amount_subunits,
            "currency": "KES",
            "gateway_response": if event == "charge.success" { "Approved" } else { "Declined" },
            "paid_at": "2024-08-22T09:15:02.000Z"
        }
    }))
    .unwrap()
}

pub fn generate_projects_csv(path: &Path, rows: usize) -> std::result::Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(["id", "owner", "title", "goal_amount"])?;
    for i in 1..=rows {
        wtr.write_record([
            format!("project-{}", i),
            format!("recipient-{}", i),
            format!("Project {}", i),
            "50000".to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
