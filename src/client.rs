//! Async client over the ledger.
//!
//! The [`Engine`] lives on its own task and is fed [`Job`]s through a bounded
//! channel; [`LedgerHandle::call`] sends a closure and awaits its result on a
//! oneshot. Every operation therefore runs to completion before the next one
//! starts. [`Client`] adds what sits outside the engine: artificial latency,
//! exchange-rate lookups and the [`ApiResponse`] envelope.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::Amount;
use crate::api::ApiResponse;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::engine::{
    DEMO_EMAIL, Engine, Job, LedgerError, SignedIn, TransferError, TransferTicket, Wallet,
};
use crate::fees::Quote;
use crate::model::{
    BankAccountId, Currency, KycDocument, LinkedBankAccount, MoneyRequest, NewBankAccount,
    NewMoneyRequest, NewRecipient, NewUser, PendingTransfer, Recipient, RecipientId,
    RecipientUpdate, RequestId, Transaction, TransactionFilter, TransferId, TransferOrder, TxId,
    User, UserId,
};
use crate::otp::OtpDispatch;
use crate::rates::{ExchangeRates, HttpRateSource, RateError, RateSource};
use crate::storage::{FileStore, KeyValueStore, MemoryStore, StorageError};

const JOB_QUEUE_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Rates(#[from] RateError),
}

/// Sending side of the ledger task.
#[derive(Clone)]
pub struct LedgerHandle {
    jobs: mpsc::Sender<Job>,
}

impl LedgerHandle {
    /// Move `engine` onto a new task. Must be called inside a tokio runtime.
    pub fn spawn(mut engine: Engine) -> Self {
        let (jobs, rx) = mpsc::channel::<Job>(JOB_QUEUE_DEPTH);
        tokio::spawn(async move {
            engine.run(ReceiverStream::new(rx)).await;
            debug!("ledger task stopped");
        });
        Self { jobs }
    }

    /// Run `f` on the ledger task and wait for its result.
    pub async fn call<T, F>(&self, f: F) -> Result<T, LedgerError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Engine) -> T + Send + 'static,
    {
        let (reply, result) = oneshot::channel();
        let job: Job = Box::new(move |engine: &mut Engine| {
            // the caller may have gone away; nothing to do then
            let _ = reply.send(f(engine));
        });
        self.jobs
            .send(job)
            .await
            .map_err(|_| LedgerError::Unavailable)?;
        result.await.map_err(|_| LedgerError::Unavailable)
    }
}

/// What the caller gets back after initiating a transfer.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TransferReceipt {
    pub transfer: PendingTransfer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<OtpDispatch>,
}

impl TransferReceipt {
    fn new(ticket: TransferTicket, reveal_otp: bool) -> Self {
        Self {
            transfer: ticket.transfer,
            otp: ticket.otp.map(|otp| otp.dispatch(reveal_otp)),
        }
    }
}

pub struct Client<S = HttpRateSource> {
    ledger: LedgerHandle,
    rates: Arc<ExchangeRates<S>>,
    clock: Arc<dyn Clock>,
    latency: Duration,
    expose_otp: bool,
}

impl<S> Clone for Client<S> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            rates: Arc::clone(&self.rates),
            clock: Arc::clone(&self.clock),
            latency: self.latency,
            expose_otp: self.expose_otp,
        }
    }
}

impl Client<HttpRateSource> {
    /// Wall-clock client talking to the configured rate provider, mirroring
    /// state to `config.state_file` when set.
    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let mirror: Box<dyn KeyValueStore> = match &config.state_file {
            Some(path) => Box::new(FileStore::open(path)?),
            None => Box::new(MemoryStore::default()),
        };
        let source = HttpRateSource::new(&config.rates)?;
        let rates = ExchangeRates::new(source, config.rates.ttl, clock.clone());
        let engine = Engine::new(config.engine.clone(), clock.clone(), mirror);

        Ok(Self::new(engine, rates, clock, config.latency, config.expose_otp))
    }
}

/// Public API
impl<S: RateSource> Client<S> {
    pub fn new(
        engine: Engine,
        rates: ExchangeRates<S>,
        clock: Arc<dyn Clock>,
        latency: Duration,
        expose_otp: bool,
    ) -> Self {
        Self {
            ledger: LedgerHandle::spawn(engine),
            rates: Arc::new(rates),
            clock,
            latency,
            expose_otp,
        }
    }

    /// Seed the demo account and sign in as it.
    pub async fn demo_session(&self) -> ApiResponse<SignedIn> {
        self.call(|engine| {
            engine.seed_demo();
            engine.login(DEMO_EMAIL, "")
        })
        .await
    }

    // auth

    pub async fn register(&self, form: NewUser) -> ApiResponse<SignedIn> {
        self.call(move |engine| engine.register(form)).await
    }

    pub async fn login(&self, email: &str, password: &str) -> ApiResponse<SignedIn> {
        let (email, password) = (email.to_string(), password.to_string());
        self.call(move |engine| engine.login(&email, &password))
            .await
    }

    pub async fn logout(&self, token: &str) -> ApiResponse<()> {
        let token = token.to_string();
        self.call(move |engine| engine.logout(&token)).await
    }

    /// Issue a login code. The code is part of the response only when the
    /// client runs with `expose_otp`.
    pub async fn send_otp(&self, email: &str) -> ApiResponse<OtpDispatch> {
        let email = email.to_string();
        let reveal = self.expose_otp;
        self.call(move |engine| engine.send_otp(&email).map(|otp| otp.dispatch(reveal)))
            .await
    }

    pub async fn verify_otp(&self, email: &str, code: &str) -> ApiResponse<SignedIn> {
        let (email, code) = (email.to_string(), code.to_string());
        self.call(move |engine| engine.verify_otp(&email, &code))
            .await
    }

    pub async fn current_user(&self, token: &str) -> ApiResponse<User> {
        self.authorized(token, |engine, user| engine.current_user(user))
            .await
    }

    pub async fn submit_kyc(&self, token: &str, document: KycDocument) -> ApiResponse<User> {
        self.authorized(token, move |engine, user| engine.submit_kyc(user, document))
            .await
    }

    // wallet

    pub async fn get_balance(&self, token: &str) -> ApiResponse<Wallet> {
        self.authorized(token, |engine, user| Ok(engine.balance(user)))
            .await
    }

    pub async fn top_up(&self, token: &str, amount: Amount) -> ApiResponse<Transaction> {
        self.authorized(token, move |engine, user| engine.top_up(user, amount))
            .await
    }

    pub async fn top_up_from_bank(
        &self,
        token: &str,
        account: &BankAccountId,
        amount: Amount,
    ) -> ApiResponse<Transaction> {
        let account = account.clone();
        self.authorized(token, move |engine, user| {
            engine.top_up_from_bank(user, &account, amount)
        })
        .await
    }

    pub async fn withdraw_to_bank(
        &self,
        token: &str,
        account: &BankAccountId,
        amount: Amount,
    ) -> ApiResponse<Transaction> {
        let account = account.clone();
        self.authorized(token, move |engine, user| {
            engine.withdraw_to_bank(user, &account, amount)
        })
        .await
    }

    pub async fn link_bank_account(
        &self,
        token: &str,
        form: NewBankAccount,
    ) -> ApiResponse<LinkedBankAccount> {
        self.authorized(token, move |engine, user| engine.link_bank_account(user, form))
            .await
    }

    pub async fn linked_bank_accounts(&self, token: &str) -> ApiResponse<Vec<LinkedBankAccount>> {
        self.authorized(token, |engine, user| Ok(engine.linked_bank_accounts(user)))
            .await
    }

    pub async fn unlink_bank_account(
        &self,
        token: &str,
        account: &BankAccountId,
    ) -> ApiResponse<LinkedBankAccount> {
        let account = account.clone();
        self.authorized(token, move |engine, user| {
            engine.unlink_bank_account(user, &account)
        })
        .await
    }

    pub async fn list_transactions(
        &self,
        token: &str,
        filter: TransactionFilter,
    ) -> ApiResponse<Vec<Transaction>> {
        self.authorized(token, move |engine, user| {
            Ok(engine.list_transactions(user, &filter))
        })
        .await
    }

    pub async fn get_transaction(&self, token: &str, id: &TxId) -> ApiResponse<Transaction> {
        let id = id.clone();
        self.authorized(token, move |engine, user| engine.transaction(user, &id))
            .await
    }

    // recipients

    pub async fn recipients(&self, token: &str, favorites_only: bool) -> ApiResponse<Vec<Recipient>> {
        self.authorized(token, move |engine, user| {
            Ok(engine.recipients(user, favorites_only))
        })
        .await
    }

    pub async fn recipient(&self, token: &str, id: &RecipientId) -> ApiResponse<Recipient> {
        let id = id.clone();
        self.authorized(token, move |engine, user| engine.recipient(user, &id))
            .await
    }

    pub async fn add_recipient(&self, token: &str, form: NewRecipient) -> ApiResponse<Recipient> {
        self.authorized(token, move |engine, user| engine.add_recipient(user, form))
            .await
    }

    pub async fn update_recipient(
        &self,
        token: &str,
        id: &RecipientId,
        update: RecipientUpdate,
    ) -> ApiResponse<Recipient> {
        let id = id.clone();
        self.authorized(token, move |engine, user| {
            engine.update_recipient(user, &id, update)
        })
        .await
    }

    pub async fn delete_recipient(&self, token: &str, id: &RecipientId) -> ApiResponse<()> {
        let id = id.clone();
        self.authorized(token, move |engine, user| engine.delete_recipient(user, &id))
            .await
    }

    pub async fn toggle_favorite(&self, token: &str, id: &RecipientId) -> ApiResponse<Recipient> {
        let id = id.clone();
        self.authorized(token, move |engine, user| engine.toggle_favorite(user, &id))
            .await
    }

    // rates

    /// Units of `to` per one unit of `from`.
    pub async fn exchange_rate(&self, from: &Currency, to: &Currency) -> ApiResponse<f64> {
        self.simulate_latency().await;
        let result = self.rate(from, to).await;
        self.respond(result)
    }

    /// Fee, total and converted amount for sending `amount` USD in `currency`.
    pub async fn quote(&self, amount: Amount, currency: &Currency) -> ApiResponse<Quote> {
        self.simulate_latency().await;
        let result = self.rate(&Currency::usd(), currency).await.and_then(|rate| {
            Quote::new(amount, currency.clone(), rate)
                .ok_or_else(|| TransferError::InvalidAmount(amount).into())
        });
        self.respond(result)
    }

    // transfers

    pub async fn initiate_transfer(
        &self,
        token: &str,
        order: TransferOrder,
    ) -> ApiResponse<TransferReceipt> {
        let rate = match self.order_rate(token, &order).await {
            Ok(rate) => rate,
            Err(e) => return self.respond(Err(e)),
        };
        let reveal = self.expose_otp;
        self.authorized(token, move |engine, user| {
            engine
                .initiate_transfer(user, order, rate)
                .map(|ticket| TransferReceipt::new(ticket, reveal))
        })
        .await
    }

    pub async fn confirm_transfer(
        &self,
        token: &str,
        id: &TransferId,
        otp: Option<&str>,
    ) -> ApiResponse<Transaction> {
        let id = id.clone();
        let otp = otp.map(str::to_string);
        self.authorized(token, move |engine, user| {
            engine.confirm_transfer(user, &id, otp.as_deref())
        })
        .await
    }

    /// Initiate and, when no code is needed, confirm in the same ledger turn.
    pub async fn send_money(&self, token: &str, order: TransferOrder) -> ApiResponse<TransferReceipt> {
        let rate = match self.order_rate(token, &order).await {
            Ok(rate) => rate,
            Err(e) => return self.respond(Err(e)),
        };
        let reveal = self.expose_otp;
        self.authorized(token, move |engine, user| {
            engine
                .send_money(user, order, rate)
                .map(|ticket| TransferReceipt::new(ticket, reveal))
        })
        .await
    }

    pub async fn get_transfer(&self, token: &str, id: &TransferId) -> ApiResponse<PendingTransfer> {
        let id = id.clone();
        self.authorized(token, move |engine, user| engine.transfer(user, &id))
            .await
    }

    pub async fn request_money(
        &self,
        token: &str,
        recipient: &RecipientId,
        amount: Amount,
        message: Option<String>,
    ) -> ApiResponse<Transaction> {
        let recipient = recipient.clone();
        self.authorized(token, move |engine, user| {
            engine.request_money(user, &recipient, amount, message)
        })
        .await
    }

    // money requests

    pub async fn create_money_request(
        &self,
        token: &str,
        form: NewMoneyRequest,
    ) -> ApiResponse<MoneyRequest> {
        self.authorized(token, move |engine, user| {
            engine.create_money_request(user, form)
        })
        .await
    }

    pub async fn money_requests(&self, token: &str) -> ApiResponse<Vec<MoneyRequest>> {
        self.authorized(token, |engine, user| Ok(engine.money_requests(user)))
            .await
    }

    pub async fn accept_money_request(&self, token: &str, id: &RequestId) -> ApiResponse<Transaction> {
        let id = id.clone();
        self.authorized(token, move |engine, user| {
            engine.accept_money_request(user, &id)
        })
        .await
    }

    pub async fn decline_money_request(
        &self,
        token: &str,
        id: &RequestId,
    ) -> ApiResponse<MoneyRequest> {
        let id = id.clone();
        self.authorized(token, move |engine, user| {
            engine.decline_money_request(user, &id)
        })
        .await
    }

    pub async fn cancel_money_request(
        &self,
        token: &str,
        id: &RequestId,
    ) -> ApiResponse<MoneyRequest> {
        let id = id.clone();
        self.authorized(token, move |engine, user| {
            engine.cancel_money_request(user, &id)
        })
        .await
    }
}

/// Private API
impl<S: RateSource> Client<S> {
    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn respond<T>(&self, result: Result<T, LedgerError>) -> ApiResponse<T> {
        ApiResponse::from_result(result, self.clock.now())
    }

    async fn rate(&self, from: &Currency, to: &Currency) -> Result<f64, LedgerError> {
        self.rates.rate(from, to).await.map_err(|e| {
            info!(%from, %to, reason = %e, "no exchange rate");
            TransferError::UnsupportedCurrency(to.clone()).into()
        })
    }

    /// Rate for `order`, fetched only once the token and the order itself
    /// have passed the checks that need no rate.
    async fn order_rate(&self, token: &str, order: &TransferOrder) -> Result<f64, LedgerError> {
        let (token, checked) = (token.to_string(), order.clone());
        self.ledger
            .call(move |engine| {
                let user = engine.authorize(&token)?;
                engine.check_order(&user, &checked)
            })
            .await??;
        self.rate(&Currency::usd(), &order.currency).await
    }

    async fn call<T, F>(&self, f: F) -> ApiResponse<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Engine) -> Result<T, LedgerError> + Send + 'static,
    {
        self.simulate_latency().await;
        let result = self.ledger.call(f).await.and_then(|r| r);
        self.respond(result)
    }

    /// Like [`Client::call`], after resolving `token` in the same ledger turn.
    async fn authorized<T, F>(&self, token: &str, f: F) -> ApiResponse<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Engine, &UserId) -> Result<T, LedgerError> + Send + 'static,
    {
        let token = token.to_string();
        self.call(move |engine| {
            let user = engine.authorize(&token)?;
            f(engine, &user)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use crate::model::{TransactionStatus, TransferStatus};
    use crate::rates::RateTable;

    struct FixedRates;

    impl RateSource for FixedRates {
        async fn fetch(&self, _base: &Currency) -> Result<RateTable, RateError> {
            Ok([("USD", 1.0), ("ETB", 56.5), ("KES", 129.0)]
                .into_iter()
                .map(|(c, r)| (Currency::new(c).unwrap(), r))
                .collect())
        }
    }

    fn client(expose_otp: bool) -> (Client<FixedRates>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
        let engine = Engine::new(
            EngineConfig::default(),
            clock.clone(),
            Box::new(MemoryStore::default()),
        );
        let rates = ExchangeRates::new(FixedRates, ChronoDuration::hours(1), clock.clone());
        (
            Client::new(engine, rates, clock.clone(), Duration::ZERO, expose_otp),
            clock,
        )
    }

    async fn demo_token(client: &Client<FixedRates>) -> String {
        client.demo_session().await.into_result().unwrap().session.token
    }

    fn order(amount: i64, currency: &str) -> TransferOrder {
        TransferOrder {
            recipient_id: "1".into(),
            amount: Amount::from_units(amount),
            currency: Currency::new(currency).unwrap(),
            message: None,
        }
    }

    fn usd_of(wallet: &Wallet) -> Amount {
        wallet.balance(&Currency::usd())
    }

    #[tokio::test]
    async fn demo_send_money_scenario() {
        let (client, _) = client(true);
        let token = demo_token(&client).await;

        let receipt = client
            .send_money(&token, order(20, "ETB"))
            .await
            .into_result()
            .unwrap();
        assert_eq!(receipt.transfer.status, TransferStatus::Completed);
        assert_eq!(receipt.transfer.exchange_rate, 56.5);
        assert_eq!(receipt.transfer.converted_amount, Amount::from_units(1_130));

        let wallet = client.get_balance(&token).await.into_result().unwrap();
        assert_eq!(usd_of(&wallet), Amount::from_float(27.01));

        let history = client
            .list_transactions(&token, TransactionFilter::default())
            .await
            .into_result()
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, TransactionStatus::Completed);
    }

    #[tokio::test]
    async fn user_scoped_calls_need_a_valid_session() {
        let (client, clock) = client(true);
        let response = client.get_balance("tok_bogus").await;
        assert!(!response.success);
        assert_eq!(response.code(), Some("AUTH_002"));

        let token = demo_token(&client).await;
        clock.advance(ChronoDuration::hours(25));
        assert_eq!(client.get_balance(&token).await.code(), Some("AUTH_003"));
    }

    #[tokio::test]
    async fn otp_code_is_hidden_unless_exposed() {
        let (hidden, _) = client(false);
        let dispatch = hidden.send_otp("ana@example.com").await.into_result().unwrap();
        assert!(dispatch.code.is_none());

        let (shown, _) = client(true);
        let dispatch = shown.send_otp("ana@example.com").await.into_result().unwrap();
        let code = dispatch.code.unwrap();
        let signed_in = shown
            .verify_otp("ana@example.com", &code)
            .await
            .into_result()
            .unwrap();
        assert_eq!(signed_in.user.email, "ana@example.com");
    }

    #[tokio::test]
    async fn large_transfer_waits_for_otp() {
        let (client, _) = client(true);
        let token = demo_token(&client).await;
        client.top_up(&token, Amount::from_units(1_000)).await.into_result().unwrap();

        let receipt = client
            .initiate_transfer(&token, order(600, "USD"))
            .await
            .into_result()
            .unwrap();
        assert_eq!(receipt.transfer.status, TransferStatus::AwaitingOtp);
        let code = receipt.otp.and_then(|o| o.code).unwrap();

        let missing = client.confirm_transfer(&token, &receipt.transfer.id, None).await;
        assert_eq!(missing.kind(), Some("OTP_REQUIRED"));

        let entry = client
            .confirm_transfer(&token, &receipt.transfer.id, Some(&code))
            .await
            .into_result()
            .unwrap();
        assert_eq!(entry.fee, Some(Amount::from_units(6)));

        let wallet = client.get_balance(&token).await.into_result().unwrap();
        assert_eq!(usd_of(&wallet), Amount::from_units(444));
    }

    #[tokio::test]
    async fn unknown_currency_is_unsupported() {
        let (client, _) = client(true);
        let token = demo_token(&client).await;

        let response = client.send_money(&token, order(10, "XYZ")).await;
        assert_eq!(response.code(), Some("TRANSACTION_007"));
        let wallet = client.get_balance(&token).await.into_result().unwrap();
        assert_eq!(usd_of(&wallet), Amount::from_units(50));
    }

    #[tokio::test]
    async fn transfer_checks_run_before_the_rate_lookup() {
        let (client, _) = client(true);
        let token = demo_token(&client).await;

        let response = client.send_money("tok_bogus", order(10, "XYZ")).await;
        assert_eq!(response.code(), Some("AUTH_002"));
        let response = client.initiate_transfer("tok_bogus", order(10, "XYZ")).await;
        assert_eq!(response.code(), Some("AUTH_002"));

        let response = client.send_money(&token, order(-5, "XYZ")).await;
        assert_eq!(response.kind(), Some("INVALID_AMOUNT"));
    }

    #[tokio::test]
    async fn huge_send_leaves_the_ledger_running() {
        let (client, _) = client(true);
        let token = demo_token(&client).await;

        let huge = TransferOrder {
            amount: Amount::from_float(1e15),
            ..order(0, "USD")
        };
        let response = client.send_money(&token, huge).await;
        assert_eq!(response.kind(), Some("INSUFFICIENT_BALANCE"));

        let wallet = client.get_balance(&token).await.into_result().unwrap();
        assert_eq!(usd_of(&wallet), Amount::from_units(50));

        let quote = client.quote(Amount::from_float(1e15), &Currency::usd()).await;
        assert_eq!(quote.kind(), Some("INVALID_AMOUNT"));
    }

    #[tokio::test]
    async fn quote_prices_without_touching_the_wallet() {
        let (client, _) = client(true);
        let quote = client
            .quote(Amount::from_units(200), &Currency::new("KES").unwrap())
            .await
            .into_result()
            .unwrap();
        assert_eq!(quote.fee, Amount::from_units(2));
        assert_eq!(quote.converted_amount, Amount::from_units(25_800));
    }

    #[tokio::test]
    async fn concurrent_sends_never_overdraw() {
        let (client, _) = client(true);
        let token = demo_token(&client).await;

        let sends: Vec<_> = (0..5)
            .map(|_| {
                let client = client.clone();
                let token = token.clone();
                tokio::spawn(async move { client.send_money(&token, order(20, "USD")).await })
            })
            .collect();

        let mut completed = 0;
        for send in sends {
            if send.await.unwrap().success {
                completed += 1;
            }
        }
        // 50 covers two sends of 20 + 2.99
        assert_eq!(completed, 2);
        let wallet = client.get_balance(&token).await.into_result().unwrap();
        assert_eq!(usd_of(&wallet), Amount::from_float(4.02));
    }
}
