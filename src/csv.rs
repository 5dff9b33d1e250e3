use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::engine::Wallet;
use crate::model::{BankAccountId, Currency, RecipientId};
use crate::Amount;

/// Errors that can occur when reading an operations script
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("cannot open {path}: {source}")]
    Open { path: String, source: csv::Error },

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized operation '{op}'")]
    UnrecognizedType { line: usize, op: String },

    #[error("line {line}: {op} missing amount")]
    MissingAmount { line: usize, op: String },

    #[error("line {line}: {op} missing target")]
    MissingTarget { line: usize, op: String },

    #[error("line {line}: invalid currency '{currency}'")]
    InvalidCurrency { line: usize, currency: String },
}

/// One scripted wallet operation against the demo account.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptOp {
    TopUp {
        amount: Amount,
    },
    Send {
        recipient: RecipientId,
        amount: Amount,
        currency: Currency,
    },
    /// Wallet to linked bank account
    Withdraw {
        account: BankAccountId,
        amount: Amount,
    },
    /// Linked bank account to wallet
    Deposit {
        account: BankAccountId,
        amount: Amount,
    },
}

#[derive(Debug, Deserialize)]
struct InputRow {
    op: String,
    target: Option<String>,
    amount: Option<f64>,
    currency: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutputRow<'a> {
    currency: &'a str,
    balance: String,
}

/// Read operations from a csv file with columns `op,target,amount,currency`
pub fn read_script(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<ScriptOp, CsvError>>, CsvError> {
    let path = path.as_ref();
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| CsvError::Open {
            path: path.display().to_string(),
            source,
        })?;

    Ok(reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            parse_row(line, row)
        }))
}

fn parse_row(line: usize, row: InputRow) -> Result<ScriptOp, CsvError> {
    let op = row.op.to_ascii_lowercase();
    let amount = |op: &str| {
        row.amount
            .map(Amount::from_float)
            .ok_or_else(|| CsvError::MissingAmount {
                line,
                op: op.to_string(),
            })
    };
    let target = |op: &str| {
        row.target
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CsvError::MissingTarget {
                line,
                op: op.to_string(),
            })
    };

    match op.as_str() {
        "topup" => Ok(ScriptOp::TopUp {
            amount: amount("topup")?,
        }),
        "send" => {
            let currency = match row.currency.as_deref().filter(|c| !c.is_empty()) {
                None => Currency::usd(),
                Some(code) => Currency::new(code).ok_or_else(|| CsvError::InvalidCurrency {
                    line,
                    currency: code.to_string(),
                })?,
            };
            Ok(ScriptOp::Send {
                recipient: target("send")?,
                amount: amount("send")?,
                currency,
            })
        }
        "withdraw" => Ok(ScriptOp::Withdraw {
            account: target("withdraw")?,
            amount: amount("withdraw")?,
        }),
        "deposit" => Ok(ScriptOp::Deposit {
            account: target("deposit")?,
            amount: amount("deposit")?,
        }),
        _ => Err(CsvError::UnrecognizedType { line, op: row.op }),
    }
}

/// Write wallet balances as `currency,balance` rows
pub fn write_balances(wallet: &Wallet, out: impl io::Write) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(out);

    for (currency, amount) in wallet.balances() {
        writer.serialize(OutputRow {
            currency: currency.as_str(),
            balance: amount.to_string(),
        })?;
    }

    writer.flush()?;
    Ok(())
}
