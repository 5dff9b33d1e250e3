//! Send-money state machine.
//!
//! `initiate` validates and prices a transfer and parks it as a
//! [`PendingTransfer`]; transfers above the OTP threshold wait for a code sent
//! to the sender. `confirm` re-validates the parked record, checks the code
//! when one is required and only then debits the wallet.
//!
//! ```text
//! awaiting_otp ──┐
//!                ├─ confirm ─▶ completed
//! pending ───────┘        └──▶ failed (insufficient balance)
//! ```

use serde::Serialize;
use tracing::info;

use super::{Engine, LedgerError, TransferError};
use crate::Amount;
use crate::fees::{calculate_fee, convert};
use crate::model::{
    Currency, PendingTransfer, RecipientId, Transaction, TransactionKind, TransactionStatus,
    TransferId, TransferOrder, TransferStatus, UserId,
};
use crate::otp::IssuedOtp;

/// What the caller gets back after initiating a transfer.
#[derive(Debug, Clone, Serialize)]
pub struct TransferTicket {
    pub transfer: PendingTransfer,
    /// Code issued for transfers above the OTP threshold.
    pub otp: Option<IssuedOtp>,
}

impl TransferTicket {
    pub fn requires_otp(&self) -> bool {
        self.transfer.status == TransferStatus::AwaitingOtp
    }
}

impl Engine {
    /// Validate and price a transfer:
    /// - Ensure the recipient belongs to `user`
    /// - Ensure amount is positive
    /// - Ensure the USD balance covers amount plus fee
    /// - Issue an OTP when amount is above the threshold
    ///
    /// `exchange_rate` converts USD into `order.currency`.
    pub fn initiate_transfer(
        &mut self,
        user: &UserId,
        order: TransferOrder,
        exchange_rate: f64,
    ) -> Result<TransferTicket, LedgerError> {
        let amount = order.amount;
        let result = self.apply_initiate(user, order, exchange_rate);
        Self::log_result("transfer initiation", user, Some(amount), &result);
        result
    }

    /// Complete a parked transfer. `otp` is required when the transfer is
    /// awaiting one and ignored otherwise.
    pub fn confirm_transfer(
        &mut self,
        user: &UserId,
        id: &TransferId,
        otp: Option<&str>,
    ) -> Result<Transaction, LedgerError> {
        let result = self.apply_confirm(user, id, otp);
        Self::log_result("transfer confirmation", user, None, &result);
        result
    }

    /// Initiate, then confirm straight away when no OTP is needed.
    pub fn send_money(
        &mut self,
        user: &UserId,
        order: TransferOrder,
        exchange_rate: f64,
    ) -> Result<TransferTicket, LedgerError> {
        let mut ticket = self.initiate_transfer(user, order, exchange_rate)?;
        if ticket.requires_otp() {
            return Ok(ticket);
        }
        self.confirm_transfer(user, &ticket.transfer.id, None)?;
        ticket.transfer = self.transfer(user, &ticket.transfer.id)?;
        Ok(ticket)
    }

    /// Checks on an order that need no exchange rate: the recipient belongs
    /// to `user` and the amount is positive. Returns the recipient's name.
    pub fn check_order(&self, user: &UserId, order: &TransferOrder) -> Result<String, LedgerError> {
        let recipient_name = self
            .recipients
            .get(&order.recipient_id)
            .filter(|r| &r.owner == user)
            .map(|r| r.name.clone())
            .ok_or_else(|| TransferError::RecipientNotFound(order.recipient_id.clone()))?;

        if !order.amount.is_positive() {
            return Err(TransferError::InvalidAmount(order.amount).into());
        }
        Ok(recipient_name)
    }

    pub fn transfer(&self, user: &UserId, id: &TransferId) -> Result<PendingTransfer, LedgerError> {
        self.transfers
            .get(id)
            .filter(|t| &t.owner == user)
            .cloned()
            .ok_or_else(|| TransferError::TransferNotFound(id.clone()).into())
    }

    /// Ask a recipient for money. Only a `request` entry is recorded; nothing
    /// moves until the other side pays.
    pub fn request_money(
        &mut self,
        user: &UserId,
        recipient_id: &RecipientId,
        amount: Amount,
        message: Option<String>,
    ) -> Result<Transaction, LedgerError> {
        let recipient_name = self
            .recipients
            .get(recipient_id)
            .filter(|r| &r.owner == user)
            .map(|r| r.name.clone())
            .ok_or_else(|| TransferError::RecipientNotFound(recipient_id.clone()))?;
        if !amount.is_positive() {
            return Err(TransferError::InvalidAmount(amount).into());
        }

        let entry = Transaction {
            id: Self::new_id(),
            kind: TransactionKind::Request,
            recipient_id: Some(recipient_id.clone()),
            recipient_name,
            amount,
            currency: Currency::usd(),
            status: TransactionStatus::Pending,
            date: self.now(),
            fee: None,
            exchange_rate: None,
            message,
            reference_number: Some(self.reference_number()),
        };
        info!(user = %user, recipient = %recipient_id, amount = %amount, "money requested");
        Ok(self.record(user, entry))
    }
}

impl Engine {
    fn apply_initiate(
        &mut self,
        user: &UserId,
        order: TransferOrder,
        exchange_rate: f64,
    ) -> Result<TransferTicket, LedgerError> {
        let recipient_name = self.check_order(user, &order)?;

        let fee = calculate_fee(order.amount);
        let available = self.usd_balance(user);
        // a total past the representable range can never be covered
        let Some(required) = order.amount.checked_add(fee) else {
            return Err(TransferError::InsufficientBalance {
                available,
                required: Amount::MAX,
            }
            .into());
        };
        if available < required {
            return Err(TransferError::InsufficientBalance {
                available,
                required,
            }
            .into());
        }

        let requires_otp = order.amount > self.config.otp_threshold;
        let transfer = PendingTransfer {
            id: Self::new_id(),
            owner: user.clone(),
            recipient_id: order.recipient_id,
            recipient_name,
            amount: order.amount,
            fee,
            converted_amount: convert(order.amount, exchange_rate),
            currency: order.currency,
            exchange_rate,
            requires_otp,
            status: if requires_otp {
                TransferStatus::AwaitingOtp
            } else {
                TransferStatus::Pending
            },
            message: order.message,
            transaction_id: None,
            created_at: self.now(),
        };

        // shares the per-email slot with login codes; a newer code replaces it
        let otp = if requires_otp {
            let email = self.current_user(user)?.email;
            Some(self.send_otp(&email)?)
        } else {
            None
        };

        self.transfers
            .insert(transfer.id.clone(), transfer.clone());
        Ok(TransferTicket { transfer, otp })
    }

    fn apply_confirm(
        &mut self,
        user: &UserId,
        id: &TransferId,
        otp: Option<&str>,
    ) -> Result<Transaction, LedgerError> {
        let transfer = self.transfer(user, id)?;
        if !transfer.status.is_confirmable() {
            return Err(TransferError::NotPending(id.clone()).into());
        }

        if transfer.status == TransferStatus::AwaitingOtp {
            let code = otp.ok_or_else(|| TransferError::OtpRequired(id.clone()))?;
            let email = self.current_user(user)?.email;
            let now = self.now();
            let verified = self.otps.verify(&email, code, now);
            self.mirror_otps();
            verified?;
        }

        let usd = Currency::usd();
        let total = transfer.total();
        let debit = self.wallet_mut(user).try_debit(&usd, total);

        let (status, reference) = match debit {
            Ok(()) => (TransactionStatus::Completed, Some(self.reference_number())),
            Err(_) => (TransactionStatus::Failed, None),
        };
        let now = self.now();
        let entry = self.record(
            user,
            Transaction {
                id: Self::new_id(),
                kind: TransactionKind::Sent,
                recipient_id: Some(transfer.recipient_id.clone()),
                recipient_name: transfer.recipient_name.clone(),
                amount: transfer.amount,
                currency: usd,
                status,
                date: now,
                fee: Some(transfer.fee),
                exchange_rate: Some(transfer.exchange_rate),
                message: transfer.message.clone(),
                reference_number: reference,
            },
        );

        if let Some(parked) = self.transfers.get_mut(id) {
            parked.transaction_id = Some(entry.id.clone());
            parked.status = match status {
                TransactionStatus::Completed => TransferStatus::Completed,
                _ => TransferStatus::Failed,
            };
        }

        match debit {
            Ok(()) => Ok(entry),
            Err(shortfall) => Err(TransferError::InsufficientBalance {
                available: shortfall.available,
                required: shortfall.requested,
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::*;
    use super::*;
    use crate::engine::OtpError;
    use crate::model::TransactionFilter;

    fn order(recipient: &str, amount: Amount) -> TransferOrder {
        TransferOrder {
            recipient_id: recipient.to_string(),
            amount,
            currency: Currency::usd(),
            message: None,
        }
    }

    fn etb_order(recipient: &str, amount: Amount) -> TransferOrder {
        TransferOrder {
            currency: Currency::new("ETB").unwrap(),
            ..order(recipient, amount)
        }
    }

    #[test]
    fn send_debits_amount_plus_flat_fee() {
        let (mut engine, user, _) = demo();
        let ticket = engine.send_money(&user, order("1", usd(20)), 1.0).unwrap();

        assert_eq!(ticket.transfer.status, TransferStatus::Completed);
        assert_eq!(engine.usd_balance(&user), Amount::from_float(27.01));

        let ledger = engine.list_transactions(&user, &TransactionFilter::default());
        assert_eq!(ledger.len(), 1);
        let entry = &ledger[0];
        assert_eq!(entry.kind, TransactionKind::Sent);
        assert_eq!(entry.fee, Some(Amount::from_float(2.99)));
        assert_eq!(entry.amount, usd(20));
        assert_eq!(entry.recipient_name, "Abebe Kebede");
        assert!(entry.reference_number.as_ref().unwrap().starts_with("ZMN-2025-"));
        assert_eq!(ticket.transfer.transaction_id.as_ref(), Some(&entry.id));
    }

    #[test]
    fn send_rejects_non_positive_amounts() {
        let (mut engine, user, _) = demo();
        for amount in [Amount::ZERO, usd(-20)] {
            let err = engine.send_money(&user, order("1", amount), 1.0).unwrap_err();
            assert_eq!(err.kind(), "INVALID_AMOUNT");
            assert_eq!(err.code(), "TRANSACTION_001");
        }
        assert_eq!(engine.usd_balance(&user), usd(50));
        assert!(engine.transfers.is_empty());
    }

    #[test]
    fn unknown_recipient_is_rejected() {
        let (mut engine, user, _) = demo();
        assert!(matches!(
            engine.initiate_transfer(&user, order("99", usd(5)), 1.0),
            Err(LedgerError::Transfer(TransferError::RecipientNotFound(_)))
        ));
    }

    #[test]
    fn insufficient_balance_counts_the_fee() {
        let (mut engine, user, _) = demo();
        // 48 + 2.99 > 50
        let result = engine.initiate_transfer(&user, order("1", usd(48)), 1.0);
        assert!(matches!(
            result,
            Err(LedgerError::Transfer(TransferError::InsufficientBalance { .. }))
        ));
        assert_eq!(engine.usd_balance(&user), usd(50));
    }

    #[test]
    fn unrepresentable_total_is_insufficient_balance() {
        let (mut engine, user, _) = demo();
        let err = engine
            .send_money(&user, order("1", Amount::from_float(1e15)), 1.0)
            .unwrap_err();
        assert_eq!(err.kind(), "INSUFFICIENT_BALANCE");
        assert!(engine.transfers.is_empty());

        // the engine keeps serving afterwards
        engine.send_money(&user, order("1", usd(20)), 1.0).unwrap();
        assert_eq!(engine.usd_balance(&user), Amount::from_float(27.01));
    }

    #[test]
    fn converted_amount_uses_rate() {
        let (mut engine, user, _) = demo();
        let ticket = engine
            .initiate_transfer(&user, etb_order("2", usd(10)), 56.5)
            .unwrap();
        assert_eq!(ticket.transfer.converted_amount, usd(565));
        assert_eq!(ticket.transfer.currency.as_str(), "ETB");
        assert_eq!(ticket.transfer.status, TransferStatus::Pending);
        // nothing moves before confirmation
        assert_eq!(engine.usd_balance(&user), usd(50));
    }

    #[test]
    fn large_transfer_requires_otp() {
        let (mut engine, user, _) = demo();
        engine.top_up(&user, usd(1_000)).unwrap();

        let ticket = engine.send_money(&user, order("1", usd(600)), 1.0).unwrap();
        assert!(ticket.requires_otp());
        let code = ticket.otp.as_ref().unwrap().code.clone();
        assert_eq!(engine.usd_balance(&user), usd(1_050));

        assert!(matches!(
            engine.confirm_transfer(&user, &ticket.transfer.id, None),
            Err(LedgerError::Transfer(TransferError::OtpRequired(_)))
        ));

        let wrong = if code == "000000" { "111111" } else { "000000" };
        assert!(matches!(
            engine.confirm_transfer(&user, &ticket.transfer.id, Some(wrong)),
            Err(LedgerError::Otp(OtpError::Invalid))
        ));

        let entry = engine
            .confirm_transfer(&user, &ticket.transfer.id, Some(&code))
            .unwrap();
        // 600 + 1% fee
        assert_eq!(entry.fee, Some(usd(6)));
        assert_eq!(engine.usd_balance(&user), usd(444));
    }

    #[test]
    fn login_code_replaces_pending_transfer_code() {
        let (mut engine, user, _) = demo();
        engine.top_up(&user, usd(1_000)).unwrap();

        let ticket = engine.send_money(&user, order("1", usd(600)), 1.0).unwrap();
        let transfer_code = ticket.otp.as_ref().unwrap().code.clone();
        let email = engine.current_user(&user).unwrap().email;
        let login_code = engine.send_otp(&email).unwrap().code;

        if login_code != transfer_code {
            assert!(matches!(
                engine.confirm_transfer(&user, &ticket.transfer.id, Some(&transfer_code)),
                Err(LedgerError::Otp(OtpError::Invalid))
            ));
        }
        engine
            .confirm_transfer(&user, &ticket.transfer.id, Some(&login_code))
            .unwrap();
        assert_eq!(engine.usd_balance(&user), usd(444));
    }

    #[test]
    fn threshold_amount_does_not_require_otp() {
        let (mut engine, user, _) = demo();
        engine.top_up(&user, usd(1_000)).unwrap();
        let ticket = engine.send_money(&user, order("1", usd(500)), 1.0).unwrap();
        assert!(!ticket.requires_otp());
        assert!(ticket.otp.is_none());
        assert_eq!(ticket.transfer.status, TransferStatus::Completed);
    }

    #[test]
    fn confirm_looks_up_the_parked_transfer() {
        let (mut engine, user, _) = demo();
        assert!(matches!(
            engine.confirm_transfer(&user, &"made-up".to_string(), None),
            Err(LedgerError::Transfer(TransferError::TransferNotFound(_)))
        ));

        let other = engine.login("other@example.com", "pw").unwrap().user.id;
        let ticket = engine.initiate_transfer(&user, order("1", usd(5)), 1.0).unwrap();
        assert!(matches!(
            engine.confirm_transfer(&other, &ticket.transfer.id, None),
            Err(LedgerError::Transfer(TransferError::TransferNotFound(_)))
        ));
    }

    #[test]
    fn confirm_twice_is_not_pending() {
        let (mut engine, user, _) = demo();
        let ticket = engine.initiate_transfer(&user, order("1", usd(5)), 1.0).unwrap();
        engine.confirm_transfer(&user, &ticket.transfer.id, None).unwrap();

        assert!(matches!(
            engine.confirm_transfer(&user, &ticket.transfer.id, None),
            Err(LedgerError::Transfer(TransferError::NotPending(_)))
        ));
        assert_eq!(engine.usd_balance(&user), Amount::from_float(42.01));
    }

    #[test]
    fn confirm_rechecks_balance_and_records_failure() {
        let (mut engine, user, _) = demo();
        let ticket = engine.initiate_transfer(&user, order("1", usd(40)), 1.0).unwrap();
        engine
            .withdraw_to_bank(&user, &"bank-1".to_string(), usd(30))
            .unwrap();

        assert!(matches!(
            engine.confirm_transfer(&user, &ticket.transfer.id, None),
            Err(LedgerError::Transfer(TransferError::InsufficientBalance { .. }))
        ));
        assert_eq!(engine.usd_balance(&user), usd(20));
        assert_eq!(
            engine.transfer(&user, &ticket.transfer.id).unwrap().status,
            TransferStatus::Failed
        );
        let failed = engine.list_transactions(
            &user,
            &TransactionFilter {
                status: Some(TransactionStatus::Failed),
                ..Default::default()
            },
        );
        assert_eq!(failed.len(), 1);
        assert!(failed[0].reference_number.is_none());
    }

    #[test]
    fn two_confirmations_cannot_overdraw() {
        let (mut engine, user, _) = demo();
        let first = engine.initiate_transfer(&user, order("1", usd(30)), 1.0).unwrap();
        let second = engine.initiate_transfer(&user, order("2", usd(30)), 1.0).unwrap();

        engine.confirm_transfer(&user, &first.transfer.id, None).unwrap();
        assert!(engine.confirm_transfer(&user, &second.transfer.id, None).is_err());
        assert_eq!(engine.usd_balance(&user), Amount::from_float(17.01));
    }

    #[test]
    fn request_money_records_pending_entry() {
        let (mut engine, user, _) = demo();
        let entry = engine
            .request_money(&user, &"2".to_string(), usd(15), Some("dinner".into()))
            .unwrap();
        assert_eq!(entry.kind, TransactionKind::Request);
        assert_eq!(entry.status, TransactionStatus::Pending);
        assert_eq!(engine.usd_balance(&user), usd(50));

        assert!(matches!(
            engine.request_money(&user, &"2".to_string(), Amount::ZERO, None),
            Err(LedgerError::Transfer(TransferError::InvalidAmount(_)))
        ));
        assert!(matches!(
            engine.request_money(&user, &"9".to_string(), usd(1), None),
            Err(LedgerError::Transfer(TransferError::RecipientNotFound(_)))
        ));
    }
}
