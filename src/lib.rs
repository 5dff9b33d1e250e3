pub mod amount;
pub mod api;
pub mod client;
pub mod clock;
pub mod config;
pub mod csv;
pub mod engine;
pub mod fees;
pub mod model;
pub mod otp;
pub mod rates;
pub mod session;
pub mod storage;

pub use amount::Amount;
pub use api::{ApiError, ApiResponse};
pub use client::{Client, LedgerHandle, TransferReceipt};
pub use config::Config;
pub use engine::{Engine, LedgerError};
pub use model::{Currency, Transaction, TxId, UserId};
