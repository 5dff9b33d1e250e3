//! Transfer fees and currency conversion.

use serde::Serialize;

use crate::Amount;
use crate::model::Currency;

/// Fee charged on transfers up to and including [`PERCENTAGE_FEE_FLOOR`].
pub const FLAT_FEE: Amount = Amount::from_scaled(29_900);

/// Transfers strictly above this amount pay [`PERCENTAGE_FEE`] percent.
pub const PERCENTAGE_FEE_FLOOR: Amount = Amount::from_units(100);

pub const PERCENTAGE_FEE: i64 = 1;

pub fn calculate_fee(amount: Amount) -> Amount {
    if amount > PERCENTAGE_FEE_FLOOR {
        amount.percent(PERCENTAGE_FEE)
    } else {
        FLAT_FEE
    }
}

pub fn convert(amount: Amount, rate: f64) -> Amount {
    amount.times(rate)
}

/// Price of a transfer before it is initiated.
#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub amount: Amount,
    pub fee: Amount,
    /// Wallet debit: amount plus fee.
    pub total: Amount,
    pub currency: Currency,
    pub exchange_rate: f64,
    pub converted_amount: Amount,
}

impl Quote {
    /// `None` when amount plus fee does not fit in an [`Amount`].
    pub fn new(amount: Amount, currency: Currency, exchange_rate: f64) -> Option<Self> {
        let fee = calculate_fee(amount);
        Some(Self {
            amount,
            fee,
            total: amount.checked_add(fee)?,
            currency,
            exchange_rate,
            converted_amount: convert(amount, exchange_rate),
        })
    }
}
