use std::env;
use std::io;
use std::process::ExitCode;

use remit_ledger::csv::{ScriptOp, read_script, write_balances};
use remit_ledger::model::{TransferOrder, TransferStatus};
use remit_ledger::{ApiResponse, Client, Config};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(LevelFilter::WARN.into()))
        .with_writer(std::io::stderr)
        .init();

    let Some(path) = env::args().nth(1) else {
        error!("usage: remit-ledger <operations.csv>");
        return ExitCode::FAILURE;
    };

    if !path.ends_with(".csv") {
        warn!(path, "input file seems to not be a csv file");
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let client = match Client::from_config(&config) {
        Ok(client) => client,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let token = match client.demo_session().await.into_result() {
        Ok(signed_in) => signed_in.session.token,
        Err(e) => {
            error!(code = %e.code, "{}", e.message);
            return ExitCode::FAILURE;
        }
    };

    let script = match read_script(path) {
        Ok(script) => script,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let (op_sender, mut op_receiver) = tokio::sync::mpsc::channel(16);
    tokio::spawn(async move {
        for result in script {
            match result {
                Ok(op) => {
                    if op_sender.send(op).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    while let Some(op) = op_receiver.recv().await {
        apply(&client, &token, op).await;
    }

    let wallet = match client.get_balance(&token).await.into_result() {
        Ok(wallet) => wallet,
        Err(e) => {
            error!(code = %e.code, "{}", e.message);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = write_balances(&wallet, io::stdout().lock()) {
        error!("failed to write balances: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Apply one scripted operation. Failures are reported and skipped.
async fn apply(client: &Client, token: &str, op: ScriptOp) {
    match op {
        ScriptOp::TopUp { amount } => {
            report(client.top_up(token, amount).await);
        }
        ScriptOp::Withdraw { account, amount } => {
            report(client.withdraw_to_bank(token, &account, amount).await);
        }
        ScriptOp::Deposit { account, amount } => {
            report(client.top_up_from_bank(token, &account, amount).await);
        }
        ScriptOp::Send {
            recipient,
            amount,
            currency,
        } => {
            let order = TransferOrder {
                recipient_id: recipient,
                amount,
                currency,
                message: None,
            };
            let Some(receipt) = report(client.send_money(token, order).await) else {
                return;
            };
            if receipt.transfer.status != TransferStatus::AwaitingOtp {
                return;
            }
            // scripted runs approve large transfers with the code they were sent
            match receipt.otp.and_then(|otp| otp.code) {
                Some(code) => {
                    report(
                        client
                            .confirm_transfer(token, &receipt.transfer.id, Some(&code))
                            .await,
                    );
                }
                None => warn!(
                    transfer = %receipt.transfer.id,
                    "transfer needs a one-time password, set REMIT_EXPOSE_OTP=true to confirm"
                ),
            }
        }
    }
}

fn report<T>(response: ApiResponse<T>) -> Option<T> {
    match response.into_result() {
        Ok(data) => Some(data),
        Err(e) => {
            warn!(code = %e.code, "{}", e.message);
            None
        }
    }
}
