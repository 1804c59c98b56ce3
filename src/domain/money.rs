use crate::error::PaymentError;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The gateway settles in integer subunits (cents), so amounts carry at most
/// this many decimal places.
pub const MINOR_UNIT_SCALE: u32 = 2;

/// Represents a positive monetary amount requested from a payer.
///
/// Wraps `rust_decimal::Decimal` so that an `Amount` can only exist when it is
/// strictly positive and expressible in gateway subunits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, PaymentError> {
        if value <= Decimal::ZERO {
            return Err(PaymentError::ValidationError(
                "Amount must be positive".to_string(),
            ));
        }
        if value.normalize().scale() > MINOR_UNIT_SCALE {
            return Err(PaymentError::ValidationError(format!(
                "Amount {} has more than {} decimal places",
                value, MINOR_UNIT_SCALE
            )));
        }
        let fits_in_subunits = value
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|subunits| subunits.to_i64())
            .is_some();
        if !fits_in_subunits {
            return Err(PaymentError::ValidationError(format!(
                "Amount {} is too large to charge",
                value
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// The amount expressed in gateway subunits (e.g. 1000.50 -> 100050).
    ///
    /// `new` only admits amounts whose subunits fit in an `i64`.
    pub fn to_subunits(&self) -> i64 {
        let subunits = self.0 * Decimal::ONE_HUNDRED;
        subunits.to_i64().unwrap_or_default()
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A three-letter uppercase currency code such as `KES` or `NGN`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn new(code: &str) -> Result<Self, PaymentError> {
        let code = code.trim().to_ascii_uppercase();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(code))
        } else {
            Err(PaymentError::ValidationError(format!(
                "Invalid currency code: '{}'",
                code
            )))
        }
    }

    pub fn code(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Currency {
    type Error = PaymentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deductions taken from a payment before it reaches its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Fees {
    pub gateway_fee: Decimal,
    pub platform_fee: Decimal,
}

impl Fees {
    pub fn total(&self) -> Decimal {
        self.gateway_fee + self.platform_fee
    }

    /// What remains of `amount` once both fees are taken.
    pub fn net_of(&self, amount: Amount) -> Decimal {
        amount.value() - self.gateway_fee - self.platform_fee
    }
}
