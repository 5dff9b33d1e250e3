//! Ledger engine.
//!
//! The engine owns every table of the ledger (users, sessions, OTP codes,
//! recipients, wallets, transactions, transfers, money requests and linked
//! bank accounts) and exposes each operation as a synchronous `&mut self`
//! method. Concurrency is handled one level up: the engine runs on a single
//! task and receives work as a stream of [`Job`]s, so a balance check and the
//! debit that follows it can never interleave with another operation.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use crate::Amount;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::model::{
    AccountType, BankAccountId, Currency, KycStatus, LinkedBankAccount, MoneyRequest,
    PendingTransfer, Recipient, RecipientId, RequestId, Transaction, TransferId, User, UserId,
};
use crate::otp::{OtpRecord, OtpStore};
use crate::session::SessionStore;
use crate::storage::{self, KeyValueStore};

mod auth;
mod recipients;
mod requests;
mod transfer;
mod wallet;

pub use auth::SignedIn;
pub use transfer::TransferTicket;

mod state;
pub use state::{Shortfall, Wallet};

mod error;
pub use error::{
    AuthError, LedgerError, OtpError, RecipientError, RequestError, TransferError, WalletError,
};

/// Unit of work executed against the engine by the ledger task.
pub type Job = Box<dyn FnOnce(&mut Engine) + Send>;

/// Id of the account created by [`Engine::seed_demo`].
pub const DEMO_USER_ID: &str = "demo";
pub const DEMO_EMAIL: &str = "demo@example.com";

/// The ledger engine.
pub struct Engine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    mirror: Box<dyn KeyValueStore>,
    users: HashMap<UserId, User>,
    /// Lower-cased email to user id
    emails: HashMap<String, UserId>,
    sessions: SessionStore,
    otps: OtpStore,
    wallets: HashMap<UserId, Wallet>,
    recipients: HashMap<RecipientId, Recipient>,
    /// Per-user ledger in insertion order; listings reverse it
    ledger: HashMap<UserId, Vec<Transaction>>,
    transfers: HashMap<TransferId, PendingTransfer>,
    requests: HashMap<RequestId, MoneyRequest>,
    bank_accounts: HashMap<BankAccountId, LinkedBankAccount>,
}

/// Public API
impl Engine {
    /// Build an engine, restoring OTP codes and linked bank accounts from
    /// `mirror` when it holds any.
    pub fn new(config: EngineConfig, clock: Arc<dyn Clock>, mirror: Box<dyn KeyValueStore>) -> Self {
        let otp_codes: HashMap<String, OtpRecord> =
            restore(mirror.as_ref(), storage::OTP_CODES).unwrap_or_default();
        let banks: Vec<LinkedBankAccount> =
            restore(mirror.as_ref(), storage::LINKED_BANKS).unwrap_or_default();

        Self {
            sessions: SessionStore::new(config.session_ttl),
            otps: OtpStore::restore(config.otp_ttl, otp_codes),
            config,
            clock,
            mirror,
            users: HashMap::new(),
            emails: HashMap::new(),
            wallets: HashMap::new(),
            recipients: HashMap::new(),
            ledger: HashMap::new(),
            transfers: HashMap::new(),
            requests: HashMap::new(),
            bank_accounts: banks.into_iter().map(|b| (b.id.clone(), b)).collect(),
        }
    }

    /// Run the engine with the given job stream until every sender is gone.
    pub async fn run(&mut self, mut jobs: impl Stream<Item = Job> + Unpin) {
        while let Some(job) = jobs.next().await {
            job(self);
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Resolve a session token to its user. Every user-scoped operation goes
    /// through here first.
    pub fn authorize(&mut self, token: &str) -> Result<UserId, LedgerError> {
        let now = self.now();
        let result = self.sessions.validate(token, now);
        if let Err(e) = &result {
            warn!(reason = %e, "authorization refused");
        }
        Ok(result?)
    }

    /// Create the demo account with two recipients and a linked bank account.
    /// Calling it again is a no-op.
    pub fn seed_demo(&mut self) -> UserId {
        let user_id = DEMO_USER_ID.to_string();
        if self.users.contains_key(&user_id) {
            return user_id;
        }
        let now = self.now();

        self.insert_user(User {
            id: user_id.clone(),
            name: "Demo User".into(),
            email: DEMO_EMAIL.into(),
            phone: "+1 202 555 0143".into(),
            country: "United States".into(),
            nationality: "Ethiopian".into(),
            date_of_birth: None,
            kyc_status: KycStatus::Verified,
            created_at: now,
        });

        for (id, name, phone, account_number, account_type, bank_name, favorite) in [
            (
                "1",
                "Abebe Kebede",
                "+251 911 234 567",
                "1000123456789",
                AccountType::Bank,
                Some("Commercial Bank of Ethiopia"),
                true,
            ),
            (
                "2",
                "Sara Tesfaye",
                "+251 922 345 678",
                "0922345678",
                AccountType::MobileWallet,
                None,
                false,
            ),
        ] {
            self.recipients.insert(
                id.to_string(),
                Recipient {
                    id: id.to_string(),
                    owner: user_id.clone(),
                    name: name.into(),
                    phone: phone.into(),
                    email: None,
                    account_number: account_number.into(),
                    account_type,
                    bank_name: bank_name.map(Into::into),
                    country: "Ethiopia".into(),
                    is_favorite: favorite,
                },
            );
        }

        self.bank_accounts
            .entry("bank-1".to_string())
            .or_insert_with(|| LinkedBankAccount {
                id: "bank-1".into(),
                owner: user_id.clone(),
                bank_name: "Chase".into(),
                account_holder: "Demo User".into(),
                masked_number: "****4821".into(),
                linked_at: now,
            });
        self.mirror_banks();

        user_id
    }
}

/// Private API
impl Engine {
    /// Small helper to log operation results
    fn log_result<T, E: Display>(
        op: &str,
        user: &UserId,
        amount: Option<Amount>,
        result: &Result<T, E>,
    ) {
        match (result, amount) {
            (Ok(_), Some(amt)) => info!(user = %user, amount = %amt, "{op} applied"),
            (Ok(_), None) => info!(user = %user, "{op} applied"),
            (Err(e), Some(amt)) => {
                warn!(user = %user, amount = %amt, reason = %e, "{op} skipped")
            }
            (Err(e), None) => warn!(user = %user, reason = %e, "{op} skipped"),
        }
    }

    fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// `ZMN-<year>-<6 digits>`
    fn reference_number(&self) -> String {
        let digits = rand::thread_rng().gen_range(0..1_000_000u32);
        format!("ZMN-{}-{digits:06}", self.now().year())
    }

    fn insert_user(&mut self, user: User) {
        self.emails
            .insert(user.email.to_ascii_lowercase(), user.id.clone());
        self.wallets.insert(
            user.id.clone(),
            Wallet::with_balance(Currency::usd(), self.config.opening_balance),
        );
        self.users.insert(user.id.clone(), user);
    }

    fn wallet_mut(&mut self, user: &UserId) -> &mut Wallet {
        self.wallets.entry(user.clone()).or_default()
    }

    fn usd_balance(&self, user: &UserId) -> Amount {
        self.wallets
            .get(user)
            .map(|w| w.balance(&Currency::usd()))
            .unwrap_or_default()
    }

    /// Append an entry to the user's ledger.
    fn record(&mut self, user: &UserId, entry: Transaction) -> Transaction {
        self.ledger
            .entry(user.clone())
            .or_default()
            .push(entry.clone());
        entry
    }

    fn mirror_set<T: Serialize>(&mut self, key: &str, value: &T) {
        let result = serde_json::to_string(value)
            .map_err(|e| e.to_string())
            .and_then(|json| self.mirror.set(key, json).map_err(|e| e.to_string()));
        if let Err(reason) = result {
            warn!(key, %reason, "failed to mirror state");
        }
    }

    fn mirror_remove(&mut self, key: &str) {
        if let Err(e) = self.mirror.remove(key) {
            warn!(key, reason = %e, "failed to clear mirrored state");
        }
    }

    fn mirror_otps(&mut self) {
        let codes = self.otps.records().clone();
        self.mirror_set(storage::OTP_CODES, &codes);
    }

    fn mirror_banks(&mut self) {
        let mut banks: Vec<LinkedBankAccount> = self.bank_accounts.values().cloned().collect();
        banks.sort_by(|a, b| a.linked_at.cmp(&b.linked_at).then_with(|| a.id.cmp(&b.id)));
        self.mirror_set(storage::LINKED_BANKS, &banks);
    }
}

fn restore<T: DeserializeOwned>(mirror: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = mirror.get(key)?;
    serde_json::from_str(&raw)
        .inspect_err(|e| warn!(key, reason = %e, "discarding unreadable mirrored state"))
        .ok()
}

#[cfg(test)]
pub(crate) mod test_utils {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;

    pub fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap(),
        ))
    }

    pub fn engine_with(clock: Arc<ManualClock>) -> Engine {
        Engine::new(
            EngineConfig::default(),
            clock,
            Box::new(MemoryStore::default()),
        )
    }

    /// Engine seeded with the demo account (USD 50.00, recipients "1" and
    /// "2", bank account "bank-1").
    pub fn demo() -> (Engine, UserId, Arc<ManualClock>) {
        let clock = clock();
        let mut engine = engine_with(clock.clone());
        let user = engine.seed_demo();
        (engine, user, clock)
    }

    pub fn usd(units: i64) -> Amount {
        Amount::from_units(units)
    }
}
