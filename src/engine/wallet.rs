//! Wallet balances, top-ups, linked bank accounts and the ledger listing.

use tracing::info;

use super::{Engine, LedgerError, TransferError, Wallet, WalletError};
use crate::Amount;
use crate::model::{
    BankAccountId, Currency, LinkedBankAccount, NewBankAccount, Transaction, TransactionFilter,
    TransactionKind, TransactionStatus, TxId, UserId, mask_account_number,
};

impl Engine {
    pub fn balance(&self, user: &UserId) -> Wallet {
        self.wallets.get(user).cloned().unwrap_or_default()
    }

    /// Credit the USD balance:
    /// - Ensure amount is positive and within the top-up limit
    /// - Append a `received` entry
    pub fn top_up(&mut self, user: &UserId, amount: Amount) -> Result<Transaction, LedgerError> {
        let result = self.apply_credit(user, amount, "Wallet top-up".to_string());
        Self::log_result("top-up", user, Some(amount), &result);
        result
    }

    pub fn top_up_from_bank(
        &mut self,
        user: &UserId,
        account: &BankAccountId,
        amount: Amount,
    ) -> Result<Transaction, LedgerError> {
        let result = self
            .owned_bank_account(user, account)
            .map(|bank| format!("{} {}", bank.bank_name, bank.masked_number))
            .and_then(|source| self.apply_credit(user, amount, source));
        Self::log_result("bank top-up", user, Some(amount), &result);
        result
    }

    /// Debit the USD balance into a linked bank account:
    /// - Ensure the account is linked to `user`
    /// - Ensure amount is positive and covered by the balance
    /// - Append a `sent` entry
    pub fn withdraw_to_bank(
        &mut self,
        user: &UserId,
        account: &BankAccountId,
        amount: Amount,
    ) -> Result<Transaction, LedgerError> {
        let result = self.apply_withdrawal(user, account, amount);
        Self::log_result("withdrawal", user, Some(amount), &result);
        result
    }

    pub fn link_bank_account(
        &mut self,
        user: &UserId,
        form: NewBankAccount,
    ) -> Result<LinkedBankAccount, LedgerError> {
        if form.bank_name.trim().is_empty() {
            return Err(WalletError::MissingField("bank_name").into());
        }
        if form.account_holder.trim().is_empty() {
            return Err(WalletError::MissingField("account_holder").into());
        }
        if form.account_number.trim().is_empty() {
            return Err(WalletError::MissingField("account_number").into());
        }

        let account = LinkedBankAccount {
            id: Self::new_id(),
            owner: user.clone(),
            bank_name: form.bank_name.trim().to_string(),
            account_holder: form.account_holder.trim().to_string(),
            masked_number: mask_account_number(&form.account_number),
            linked_at: self.now(),
        };
        self.bank_accounts
            .insert(account.id.clone(), account.clone());
        self.mirror_banks();
        info!(user = %user, account = %account.id, "bank account linked");
        Ok(account)
    }

    pub fn linked_bank_accounts(&self, user: &UserId) -> Vec<LinkedBankAccount> {
        let mut accounts: Vec<_> = self
            .bank_accounts
            .values()
            .filter(|b| &b.owner == user)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.linked_at.cmp(&b.linked_at).then_with(|| a.id.cmp(&b.id)));
        accounts
    }

    pub fn unlink_bank_account(
        &mut self,
        user: &UserId,
        account: &BankAccountId,
    ) -> Result<LinkedBankAccount, LedgerError> {
        self.owned_bank_account(user, account)?;
        let removed = self
            .bank_accounts
            .remove(account)
            .ok_or_else(|| WalletError::AccountNotFound(account.clone()))?;
        self.mirror_banks();
        info!(user = %user, account = %account, "bank account unlinked");
        Ok(removed)
    }

    /// Ledger entries of `user`, newest first.
    pub fn list_transactions(&self, user: &UserId, filter: &TransactionFilter) -> Vec<Transaction> {
        let entries = self.ledger.get(user).map(Vec::as_slice).unwrap_or_default();
        entries
            .iter()
            .rev()
            .filter(|tx| filter.matches(tx))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub fn transaction(&self, user: &UserId, id: &TxId) -> Result<Transaction, LedgerError> {
        self.ledger
            .get(user)
            .and_then(|entries| entries.iter().find(|tx| &tx.id == id))
            .cloned()
            .ok_or_else(|| TransferError::TransactionNotFound(id.clone()).into())
    }
}

impl Engine {
    fn owned_bank_account(
        &self,
        user: &UserId,
        account: &BankAccountId,
    ) -> Result<&LinkedBankAccount, LedgerError> {
        self.bank_accounts
            .get(account)
            .filter(|b| &b.owner == user)
            .ok_or_else(|| WalletError::AccountNotFound(account.clone()).into())
    }

    fn apply_credit(
        &mut self,
        user: &UserId,
        amount: Amount,
        source: String,
    ) -> Result<Transaction, LedgerError> {
        if !amount.is_positive() {
            return Err(WalletError::InvalidAmount(amount).into());
        }
        let limit = self.config.top_up_limit;
        if amount > limit {
            return Err(WalletError::LimitExceeded { amount, limit }.into());
        }

        self.wallet_mut(user).credit(Currency::usd(), amount);

        let entry = Transaction {
            id: Self::new_id(),
            kind: TransactionKind::Received,
            recipient_id: None,
            recipient_name: source,
            amount,
            currency: Currency::usd(),
            status: TransactionStatus::Completed,
            date: self.now(),
            fee: None,
            exchange_rate: None,
            message: None,
            reference_number: Some(self.reference_number()),
        };
        Ok(self.record(user, entry))
    }

    fn apply_withdrawal(
        &mut self,
        user: &UserId,
        account: &BankAccountId,
        amount: Amount,
    ) -> Result<Transaction, LedgerError> {
        let bank = self.owned_bank_account(user, account)?;
        let destination = format!("{} {}", bank.bank_name, bank.masked_number);

        if !amount.is_positive() {
            return Err(WalletError::InvalidAmount(amount).into());
        }

        let usd = Currency::usd();
        self.wallet_mut(user)
            .try_debit(&usd, amount)
            .map_err(|shortfall| WalletError::InsufficientBalance {
                currency: usd.clone(),
                available: shortfall.available,
                requested: shortfall.requested,
            })?;

        let entry = Transaction {
            id: Self::new_id(),
            kind: TransactionKind::Sent,
            recipient_id: None,
            recipient_name: destination,
            amount,
            currency: usd,
            status: TransactionStatus::Completed,
            date: self.now(),
            fee: None,
            exchange_rate: None,
            message: Some("Withdrawal to bank".to_string()),
            reference_number: Some(self.reference_number()),
        };
        Ok(self.record(user, entry))
    }
}
