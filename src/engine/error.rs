//! Error types for ledger operations.
//!
//! Every error carries a stable `<DOMAIN>_<NNN>` code and a symbolic kind so
//! callers can branch on them without matching on variants.

use thiserror::Error;

use crate::Amount;
use crate::model::{BankAccountId, Currency, RecipientId, RequestId, TransferId, TxId};

/// Top-level error returned by every [`Engine`](super::Engine) operation.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{0}")]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Otp(#[from] OtpError),

    #[error("wallet: {0}")]
    Wallet(#[from] WalletError),

    #[error("transfer: {0}")]
    Transfer(#[from] TransferError),

    #[error("money request: {0}")]
    Request(#[from] RequestError),

    #[error("recipient: {0}")]
    Recipient(#[from] RecipientError),

    #[error("ledger is not running")]
    Unavailable,
}

impl LedgerError {
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Auth(e) => e.code(),
            LedgerError::Otp(e) => e.code(),
            LedgerError::Wallet(e) => e.code(),
            LedgerError::Transfer(e) => e.code(),
            LedgerError::Request(e) => e.code(),
            LedgerError::Recipient(e) => e.code(),
            LedgerError::Unavailable => "SYSTEM_001",
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::Auth(e) => e.kind(),
            LedgerError::Otp(e) => e.kind(),
            LedgerError::Wallet(e) => e.kind(),
            LedgerError::Transfer(e) => e.kind(),
            LedgerError::Request(e) => e.kind(),
            LedgerError::Recipient(e) => e.kind(),
            LedgerError::Unavailable => "UNAVAILABLE",
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),
    #[error("session is invalid")]
    SessionInvalid,
    #[error("session has expired")]
    SessionExpired,
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("email {0} is already registered")]
    EmailInUse(String),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidEmail(_) => "AUTH_001",
            AuthError::SessionInvalid => "AUTH_002",
            AuthError::SessionExpired => "AUTH_003",
            AuthError::MissingField(_) => "AUTH_007",
            AuthError::EmailInUse(_) => "AUTH_008",
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::InvalidEmail(_) => "INVALID_EMAIL",
            AuthError::SessionInvalid => "SESSION_INVALID",
            AuthError::SessionExpired => "SESSION_EXPIRED",
            AuthError::MissingField(_) => "MISSING_FIELD",
            AuthError::EmailInUse(_) => "EMAIL_IN_USE",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OtpError {
    #[error("no code was issued for {0}")]
    NotFound(String),
    #[error("code for {0} has expired")]
    Expired(String),
    #[error("code does not match")]
    Invalid,
}

impl OtpError {
    pub fn code(&self) -> &'static str {
        match self {
            OtpError::NotFound(_) => "AUTH_004",
            OtpError::Expired(_) => "AUTH_005",
            OtpError::Invalid => "AUTH_006",
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OtpError::NotFound(_) => "OTP_NOT_FOUND",
            OtpError::Expired(_) => "OTP_EXPIRED",
            OtpError::Invalid => "OTP_INVALID",
        }
    }
}

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("amount {0} must be positive")]
    InvalidAmount(Amount),
    #[error("insufficient {currency} balance: available {available}, requested {requested}")]
    InsufficientBalance {
        currency: Currency,
        available: Amount,
        requested: Amount,
    },
    #[error("amount {amount} exceeds the limit of {limit}")]
    LimitExceeded { amount: Amount, limit: Amount },
    #[error("bank account {0} not found")]
    AccountNotFound(BankAccountId),
    #[error("{0} is required")]
    MissingField(&'static str),
}

impl WalletError {
    pub fn code(&self) -> &'static str {
        match self {
            WalletError::InvalidAmount(_) => "WALLET_001",
            WalletError::InsufficientBalance { .. } => "WALLET_002",
            WalletError::LimitExceeded { .. } => "WALLET_003",
            WalletError::AccountNotFound(_) => "WALLET_004",
            WalletError::MissingField(_) => "WALLET_005",
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WalletError::InvalidAmount(_) => "INVALID_AMOUNT",
            WalletError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            WalletError::LimitExceeded { .. } => "LIMIT_EXCEEDED",
            WalletError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            WalletError::MissingField(_) => "MISSING_FIELD",
        }
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("amount {0} must be positive")]
    InvalidAmount(Amount),
    #[error("recipient {0} not found")]
    RecipientNotFound(RecipientId),
    #[error("insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: Amount, required: Amount },
    #[error("transfer {0} not found")]
    TransferNotFound(TransferId),
    #[error("transfer {0} requires a one-time password")]
    OtpRequired(TransferId),
    #[error("transfer {0} is not awaiting confirmation")]
    NotPending(TransferId),
    #[error("currency {0} is not supported")]
    UnsupportedCurrency(Currency),
    #[error("transaction {0} not found")]
    TransactionNotFound(TxId),
}

impl TransferError {
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::InvalidAmount(_) => "TRANSACTION_001",
            TransferError::RecipientNotFound(_) => "TRANSACTION_002",
            TransferError::InsufficientBalance { .. } => "TRANSACTION_003",
            TransferError::TransferNotFound(_) => "TRANSACTION_004",
            TransferError::OtpRequired(_) => "TRANSACTION_005",
            TransferError::NotPending(_) => "TRANSACTION_006",
            TransferError::UnsupportedCurrency(_) => "TRANSACTION_007",
            TransferError::TransactionNotFound(_) => "TRANSACTION_008",
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TransferError::InvalidAmount(_) => "INVALID_AMOUNT",
            TransferError::RecipientNotFound(_) => "RECIPIENT_NOT_FOUND",
            TransferError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            TransferError::TransferNotFound(_) => "TRANSFER_NOT_FOUND",
            TransferError::OtpRequired(_) => "OTP_REQUIRED",
            TransferError::NotPending(_) => "NOT_PENDING",
            TransferError::UnsupportedCurrency(_) => "UNSUPPORTED_CURRENCY",
            TransferError::TransactionNotFound(_) => "NOT_FOUND",
        }
    }
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("amount {0} must be positive")]
    InvalidAmount(Amount),
    #[error("due date is in the past")]
    DueDateInPast,
    #[error("request {0} not found")]
    NotFound(RequestId),
    #[error("request {0} is not pending")]
    NotPending(RequestId),
    #[error("request {0} is past its due date")]
    Expired(RequestId),
    #[error("insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: Amount, required: Amount },
}

impl RequestError {
    pub fn code(&self) -> &'static str {
        match self {
            RequestError::InvalidAmount(_) => "REQUEST_001",
            RequestError::DueDateInPast => "REQUEST_002",
            RequestError::NotFound(_) => "REQUEST_003",
            RequestError::NotPending(_) => "REQUEST_004",
            RequestError::Expired(_) => "REQUEST_005",
            RequestError::InsufficientBalance { .. } => "REQUEST_006",
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RequestError::InvalidAmount(_) => "INVALID_AMOUNT",
            RequestError::DueDateInPast => "DUE_DATE_IN_PAST",
            RequestError::NotFound(_) => "NOT_FOUND",
            RequestError::NotPending(_) => "NOT_PENDING",
            RequestError::Expired(_) => "EXPIRED",
            RequestError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
        }
    }
}

#[derive(Debug, Error)]
pub enum RecipientError {
    #[error("recipient {0} not found")]
    NotFound(RecipientId),
    #[error("{0} is required")]
    MissingField(&'static str),
}

impl RecipientError {
    pub fn code(&self) -> &'static str {
        match self {
            RecipientError::NotFound(_) => "RECIPIENT_001",
            RecipientError::MissingField(_) => "RECIPIENT_002",
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RecipientError::NotFound(_) => "NOT_FOUND",
            RecipientError::MissingField(_) => "MISSING_FIELD",
        }
    }
}
