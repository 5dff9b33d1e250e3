use std::collections::BTreeMap;

use serde::Serialize;

use crate::Amount;
use crate::model::Currency;

/// Per-currency balances of one user.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Wallet {
    balances: BTreeMap<Currency, Amount>,
}

/// Returned by [`Wallet::try_debit`] when the balance would go negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortfall {
    pub available: Amount,
    pub requested: Amount,
}

impl Wallet {
    pub fn with_balance(currency: Currency, amount: Amount) -> Self {
        let mut wallet = Self::default();
        wallet.credit(currency, amount);
        wallet
    }

    pub fn balance(&self, currency: &Currency) -> Amount {
        self.balances.get(currency).copied().unwrap_or_default()
    }

    pub fn balances(&self) -> &BTreeMap<Currency, Amount> {
        &self.balances
    }

    pub fn credit(&mut self, currency: Currency, amount: Amount) {
        *self.balances.entry(currency).or_default() += amount;
    }

    /// Check and debit in one step; the balance is untouched on failure.
    pub fn try_debit(&mut self, currency: &Currency, amount: Amount) -> Result<(), Shortfall> {
        let available = self.balance(currency);
        if available < amount {
            return Err(Shortfall {
                available,
                requested: amount,
            });
        }
        if let Some(balance) = self.balances.get_mut(currency) {
            *balance -= amount;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_default_is_empty() {
        let wallet = Wallet::default();
        assert_eq!(wallet.balance(&Currency::usd()), Amount::ZERO);
        assert!(wallet.balances().is_empty());
    }

    #[test]
    fn credit_accumulates() {
        let mut wallet = Wallet::with_balance(Currency::usd(), Amount::from_units(50));
        wallet.credit(Currency::usd(), Amount::from_units(60));
        assert_eq!(wallet.balance(&Currency::usd()), Amount::from_units(110));
    }

    #[test]
    fn debit_exact_balance_succeeds() {
        let mut wallet = Wallet::with_balance(Currency::usd(), Amount::from_units(50));
        wallet.try_debit(&Currency::usd(), Amount::from_units(50)).unwrap();
        assert_eq!(wallet.balance(&Currency::usd()), Amount::ZERO);
    }

    #[test]
    fn overdraft_is_refused() {
        let mut wallet = Wallet::with_balance(Currency::usd(), Amount::from_units(50));
        let err = wallet
            .try_debit(&Currency::usd(), Amount::from_units(51))
            .unwrap_err();
        assert_eq!(err.available, Amount::from_units(50));
        assert_eq!(err.requested, Amount::from_units(51));
        assert_eq!(wallet.balance(&Currency::usd()), Amount::from_units(50));
    }

    #[test]
    fn debit_in_missing_currency_is_refused() {
        let mut wallet = Wallet::with_balance(Currency::usd(), Amount::from_units(50));
        let etb = Currency::new("ETB").unwrap();
        assert!(wallet.try_debit(&etb, Amount::from_units(1)).is_err());
    }
}
