//! Core domain types for the remittance ledger.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::Amount;

/// User identifier.
pub type UserId = String;

/// Recipient identifier.
pub type RecipientId = String;

/// Ledger entry identifier.
pub type TxId = String;

/// Pending transfer identifier.
pub type TransferId = String;

/// Money request identifier.
pub type RequestId = String;

/// Linked bank account identifier.
pub type BankAccountId = String;

/// Session token handed out at login.
pub type SessionToken = String;

/// ISO-4217 style three letter currency code, always upper case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn new(code: &str) -> Option<Self> {
        let code = code.trim();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Some(Currency(code.to_ascii_uppercase()))
        } else {
            None
        }
    }

    /// The wallet's settlement currency.
    pub fn usd() -> Self {
        Currency("USD".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Currency {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::new(&value).ok_or_else(|| format!("invalid currency code '{value}'"))
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycStatus {
    #[default]
    Pending,
    Verified,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub country: String,
    pub nationality: String,
    pub date_of_birth: Option<NaiveDate>,
    pub kyc_status: KycStatus,
    pub created_at: DateTime<Utc>,
}

/// Registration form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub country: String,
    pub nationality: String,
    pub date_of_birth: Option<NaiveDate>,
}

/// Identity document handed to the KYC stub.
#[derive(Debug, Clone, Deserialize)]
pub struct KycDocument {
    pub document_type: String,
    pub document_number: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Bank,
    MobileWallet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub id: RecipientId,
    pub owner: UserId,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub account_number: String,
    pub account_type: AccountType,
    pub bank_name: Option<String>,
    pub country: String,
    pub is_favorite: bool,
}

/// Fields accepted when adding a recipient.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRecipient {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub account_number: String,
    pub account_type: AccountType,
    pub bank_name: Option<String>,
    pub country: String,
}

/// Partial recipient edit; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipientUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub account_number: Option<String>,
    pub account_type: Option<AccountType>,
    pub bank_name: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Sent,
    Received,
    Request,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Completed,
    Pending,
    Failed,
}

/// An immutable ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    pub kind: TransactionKind,
    pub recipient_id: Option<RecipientId>,
    pub recipient_name: String,
    pub amount: Amount,
    pub currency: Currency,
    pub status: TransactionStatus,
    pub date: DateTime<Utc>,
    pub fee: Option<Amount>,
    pub exchange_rate: Option<f64>,
    pub message: Option<String>,
    pub reference_number: Option<String>,
}

/// Filter for ledger listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionFilter {
    pub kind: Option<TransactionKind>,
    pub status: Option<TransactionStatus>,
    pub limit: Option<usize>,
}

impl TransactionFilter {
    pub fn matches(&self, tx: &Transaction) -> bool {
        self.kind.is_none_or(|kind| kind == tx.kind)
            && self.status.is_none_or(|status| status == tx.status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Waiting for the OTP sent to the sender.
    AwaitingOtp,
    /// Ready to be confirmed.
    Pending,
    Completed,
    Failed,
}

impl TransferStatus {
    pub fn is_confirmable(self) -> bool {
        matches!(self, TransferStatus::AwaitingOtp | TransferStatus::Pending)
    }
}

/// A send-money operation between `initiate` and `confirm`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTransfer {
    pub id: TransferId,
    pub owner: UserId,
    pub recipient_id: RecipientId,
    pub recipient_name: String,
    /// Debited amount, in the wallet currency.
    pub amount: Amount,
    pub fee: Amount,
    /// Delivery currency.
    pub currency: Currency,
    pub exchange_rate: f64,
    /// What the recipient receives, in `currency`.
    pub converted_amount: Amount,
    pub requires_otp: bool,
    pub status: TransferStatus,
    pub message: Option<String>,
    pub transaction_id: Option<TxId>,
    pub created_at: DateTime<Utc>,
}

impl PendingTransfer {
    pub fn total(&self) -> Amount {
        self.amount + self.fee
    }
}

/// Send-money form.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferOrder {
    pub recipient_id: RecipientId,
    pub amount: Amount,
    pub currency: Currency,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Completed,
    Cancelled,
    Expired,
}

/// Someone asking the user to pay them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoneyRequest {
    pub id: RequestId,
    pub payer: UserId,
    pub from_name: String,
    pub from_email: String,
    pub amount: Amount,
    pub purpose: String,
    pub description: Option<String>,
    pub status: RequestStatus,
    pub due_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMoneyRequest {
    pub from_name: String,
    pub from_email: String,
    pub amount: Amount,
    pub purpose: String,
    pub description: Option<String>,
    pub due_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedBankAccount {
    pub id: BankAccountId,
    pub owner: UserId,
    pub bank_name: String,
    pub account_holder: String,
    /// Only the last four digits are kept.
    pub masked_number: String,
    pub linked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewBankAccount {
    pub bank_name: String,
    pub account_holder: String,
    pub account_number: String,
}

/// Mask everything but the last four characters of an account number.
pub fn mask_account_number(number: &str) -> String {
    let digits: Vec<char> = number.chars().filter(|c| !c.is_whitespace()).collect();
    let tail: String = digits[digits.len().saturating_sub(4)..].iter().collect();
    format!("****{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_normalizes_case() {
        assert_eq!(Currency::new("etb").unwrap().as_str(), "ETB");
        assert_eq!(Currency::new(" usd ").unwrap(), Currency::usd());
    }

    #[test]
    fn currency_rejects_bad_codes() {
        assert!(Currency::new("US").is_none());
        assert!(Currency::new("USDT").is_none());
        assert!(Currency::new("U$D").is_none());
    }

    #[test]
    fn kyc_status_default() {
        assert_eq!(KycStatus::default(), KycStatus::Pending);
    }

    #[test]
    fn masks_account_numbers() {
        assert_eq!(mask_account_number("1000 2345 6789"), "****6789");
        assert_eq!(mask_account_number("12"), "****12");
    }

    #[test]
    fn transfer_status_confirmable() {
        assert!(TransferStatus::AwaitingOtp.is_confirmable());
        assert!(TransferStatus::Pending.is_confirmable());
        assert!(!TransferStatus::Completed.is_confirmable());
        assert!(!TransferStatus::Failed.is_confirmable());
    }

    #[test]
    fn enums_serialize_snake_case() {
        let json = serde_json::to_string(&AccountType::MobileWallet).unwrap();
        assert_eq!(json, "\"mobile_wallet\"");
        let json = serde_json::to_string(&TransferStatus::AwaitingOtp).unwrap();
        assert_eq!(json, "\"awaiting_otp\"");
    }
}
