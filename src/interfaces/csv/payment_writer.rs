use crate::domain::payment::Payment;
use crate::error::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct PaymentRow<'a> {
    id: String,
    reference: &'a str,
    payer: &'a str,
    #[serde(rename = "type")]
    target_type: &'static str,
    target: &'a str,
    amount: Decimal,
    currency: &'a str,
    gateway_fee: Decimal,
    platform_fee: Decimal,
    net_amount: Decimal,
    status: &'static str,
    failure_reason: Option<&'a str>,
    created_at: String,
    paid_at: Option<String>,
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl<'a> From<&'a Payment> for PaymentRow<'a> {
    fn from(payment: &'a Payment) -> Self {
        Self {
            id: payment.id.to_string(),
            reference: &payment.gateway_session_ref,
            payer: &payment.payer_id,
            target_type: payment.target_type.as_str(),
            target: &payment.target_ref,
            amount: payment.amount.value().normalize(),
            currency: payment.currency.code(),
            gateway_fee: payment.fees.gateway_fee.normalize(),
            platform_fee: payment.fees.platform_fee.normalize(),
            net_amount: payment.net_amount.normalize(),
            status: payment.status.as_str(),
            failure_reason: payment.failure_reason.as_deref(),
            created_at: timestamp(payment.created_at),
            paid_at: payment.paid_at.map(timestamp),
        }
    }
}

/// Writes payment history rows as CSV.
pub struct PaymentWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> PaymentWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// The header is written even when there are no rows.
    pub fn write_payments<'a>(
        &mut self,
        payments: impl IntoIterator<Item = &'a Payment>,
    ) -> Result<()> {
        let mut wrote_any = false;
        for payment in payments {
            self.writer.serialize(PaymentRow::from(payment))?;
            wrote_any = true;
        }
        if !wrote_any {
            self.writer.write_record(HEADER)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

pub const HEADER: [&str; 14] = [
    "id",
    "reference",
    "payer",
    "type",
    "target",
    "amount",
    "currency",
    "gateway_fee",
    "platform_fee",
    "net_amount",
    "status",
    "failure_reason",
    "created_at",
    "paid_at",
];
