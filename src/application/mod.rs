//! Application layer orchestrating the payment lifecycle.
//!
//! `PaymentService` starts and polls payments, `WebhookIngress` admits signed
//! gateway callbacks, and both funnel outcomes into the `ReconciliationEngine`,
//! which runs the `EffectApplicator` at most once per successful payment.

pub mod effects;
pub mod reconciler;
pub mod service;
pub mod webhook;
