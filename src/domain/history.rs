use super::payment::{Payment, PaymentStatus, TargetType};
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const DEFAULT_PER_PAGE: usize = 20;
pub const MAX_PER_PAGE: usize = 100;

/// Filters for the read-only payment history.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryQuery {
    pub payer_id: Option<String>,
    pub status: Option<PaymentStatus>,
    pub target_type: Option<TargetType>,
    /// Inclusive lower bound on `created_at`.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub until: Option<DateTime<Utc>>,
    /// 1-based.
    pub page: usize,
    pub per_page: usize,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            payer_id: None,
            status: None,
            target_type: None,
            since: None,
            until: None,
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl HistoryQuery {
    pub fn matches(&self, payment: &Payment) -> bool {
        self.payer_id
            .as_deref()
            .is_none_or(|payer| payment.payer_id == payer)
            && self.status.is_none_or(|status| payment.status == status)
            && self
                .target_type
                .is_none_or(|target| payment.target_type == target)
            && self.since.is_none_or(|since| payment.created_at >= since)
            && self.until.is_none_or(|until| payment.created_at < until)
    }

    /// Filters, sorts newest first and cuts out the requested page.
    pub fn paginate(&self, payments: impl IntoIterator<Item = Payment>) -> Page<Payment> {
        let mut matching: Vec<Payment> = payments.into_iter().filter(|p| self.matches(p)).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let page = self.page.max(1);
        let per_page = self.per_page.clamp(1, MAX_PER_PAGE);
        let total = matching.len();
        let items = matching
            .into_iter()
            .skip((page - 1).saturating_mul(per_page))
            .take(per_page)
            .collect();

        Page {
            items,
            page,
            per_page,
            total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
}
