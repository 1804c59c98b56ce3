use super::money::{Amount, Fees, MINOR_UNIT_SCALE};
use crate::error::PaymentError;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Pricing applied to every payment.
///
/// `calculate` is a pure function of the amount: recomputing fees for the same
/// payment always yields the same deductions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Proportional gateway charge, e.g. `0.015` for 1.5%.
    pub gateway_rate: Decimal,
    /// Fixed gateway charge added on top of the proportional part.
    pub gateway_flat: Decimal,
    /// Upper bound on the gateway charge, if the gateway caps it.
    pub gateway_cap: Option<Decimal>,
    /// Platform commission, e.g. `0.05` for 5%.
    pub platform_rate: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            gateway_rate: dec!(0.015),
            gateway_flat: Decimal::ZERO,
            gateway_cap: None,
            platform_rate: dec!(0.05),
        }
    }
}

impl FeeSchedule {
    pub fn new(
        gateway_rate: Decimal,
        gateway_flat: Decimal,
        gateway_cap: Option<Decimal>,
        platform_rate: Decimal,
    ) -> Result<Self, PaymentError> {
        let schedule = Self {
            gateway_rate,
            gateway_flat,
            gateway_cap,
            platform_rate,
        };
        schedule.validate()?;
        Ok(schedule)
    }

    pub fn validate(&self) -> Result<(), PaymentError> {
        for (name, rate) in [
            ("gateway rate", self.gateway_rate),
            ("platform rate", self.platform_rate),
        ] {
            if rate < Decimal::ZERO || rate >= Decimal::ONE {
                return Err(PaymentError::ValidationError(format!(
                    "{} must be within [0, 1), got {}",
                    name, rate
                )));
            }
        }
        if self.gateway_flat < Decimal::ZERO {
            return Err(PaymentError::ValidationError(
                "gateway flat fee must not be negative".to_string(),
            ));
        }
        if let Some(cap) = self.gateway_cap
            && cap < Decimal::ZERO
        {
            return Err(PaymentError::ValidationError(
                "gateway fee cap must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn calculate(&self, amount: Amount) -> Fees {
        let value = amount.value();

        let mut gateway_fee = round_minor(value * self.gateway_rate + self.gateway_flat);
        if let Some(cap) = self.gateway_cap {
            gateway_fee = gateway_fee.min(cap);
        }
        gateway_fee = gateway_fee.min(value);

        let platform_fee = round_minor(value * self.platform_rate).min(value - gateway_fee);

        Fees {
            gateway_fee,
            platform_fee,
        }
    }
}

fn round_minor(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MINOR_UNIT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}
