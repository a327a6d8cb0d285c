//! Primary exchange ledger: one row per balance change.

pub mod numeric;

use crate::csv_schema::CsvField;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use cryptolot_derive::CsvSchema;
use numeric::MalformedNumberPolicy;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("cannot open ledger {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed ledger csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: invalid timestamp '{value}'")]
    InvalidTimestamp { row: usize, value: String },
    #[error("row {row}: malformed amount '{value}'")]
    MalformedNumber { row: usize, value: String },
    #[error("row {row}: missing asset symbol")]
    MissingAsset { row: usize },
}

/// Row of the exchange "Transaction History" export
#[derive(Debug, Clone, Deserialize, CsvSchema)]
pub struct LedgerCsvRecord {
    /// Time of the balance change, UTC (e.g. 2021-03-05 12:34:56)
    #[serde(rename = "UTC_Time")]
    pub utc_time: String,
    /// Free-text operation label (Deposit, Withdraw, Buy, Sell, Fee, Staking Rewards, ...)
    #[serde(rename = "Operation")]
    pub operation: String,
    /// Asset symbol (BTC, ETH, EUR, ...)
    #[serde(rename = "Coin")]
    pub coin: String,
    /// Signed amount, comma or dot decimal mark; positive credits the account
    #[serde(rename = "Change")]
    pub change: String,
}

/// Category of an operation label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Deposit,
    FiatDeposit,
    Withdraw,
    FiatWithdraw,
    Fee,
    Income,
    Trade,
}

const INCOME_MARKERS: &[&str] = &[
    "interest",
    "reward",
    "distribution",
    "staking",
    "savings",
    "airdrop",
    "mining",
    "cashback",
    "rebate",
    "earn",
];

impl OperationKind {
    pub fn classify(label: &str) -> Self {
        let label = label.trim().to_lowercase();
        if label.contains("fee") {
            return OperationKind::Fee;
        }
        match label.as_str() {
            "deposit" => OperationKind::Deposit,
            "fiat deposit" => OperationKind::FiatDeposit,
            "withdraw" | "withdrawal" => OperationKind::Withdraw,
            "fiat withdraw" | "fiat withdrawal" => OperationKind::FiatWithdraw,
            other if INCOME_MARKERS.iter().any(|m| other.contains(m)) => OperationKind::Income,
            _ => OperationKind::Trade,
        }
    }

    pub fn is_deposit(self) -> bool {
        matches!(self, OperationKind::Deposit | OperationKind::FiatDeposit)
    }

    pub fn is_withdrawal(self) -> bool {
        matches!(self, OperationKind::Withdraw | OperationKind::FiatWithdraw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub label: String,
    pub kind: OperationKind,
}

impl Operation {
    pub fn new(label: &str) -> Self {
        Operation {
            label: label.trim().to_string(),
            kind: OperationKind::classify(label),
        }
    }
}

/// One balance change of the primary ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerLeg {
    /// 1-based data row in the source file
    pub row: usize,
    pub timestamp: DateTime<Utc>,
    pub asset: String,
    pub operation: Operation,
    /// Positive = inflow, negative = outflow
    pub amount: Decimal,
}

impl LedgerLeg {
    pub fn is_inflow(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    pub fn is_outflow(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    pub fn quantity(&self) -> Decimal {
        self.amount.abs()
    }

    pub fn kind(&self) -> OperationKind {
        self.operation.kind
    }
}

/// A value replaced by zero under [`MalformedNumberPolicy::Zero`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedValue {
    pub row: usize,
    pub timestamp: DateTime<Utc>,
    pub asset: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy)]
pub struct LedgerOptions {
    pub delimiter: u8,
    pub numbers: MalformedNumberPolicy,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        LedgerOptions {
            delimiter: b',',
            numbers: MalformedNumberPolicy::Zero,
        }
    }
}

#[derive(Debug, Default)]
pub struct Ledger {
    pub legs: Vec<LedgerLeg>,
    pub malformed: Vec<MalformedValue>,
}

pub fn read_ledger_file(path: &Path, options: LedgerOptions) -> Result<Ledger, LedgerError> {
    let file = File::open(path).map_err(|source| LedgerError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    read_ledger(BufReader::new(file), options)
}

/// Read the ledger in file order. Sorting is left to the event grouper.
pub fn read_ledger<R: Read>(reader: R, options: LedgerOptions) -> Result<Ledger, LedgerError> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut ledger = Ledger::default();
    for (idx, result) in rdr.deserialize::<LedgerCsvRecord>().enumerate() {
        let row = idx + 1;
        let record = result?;

        let timestamp =
            parse_timestamp(&record.utc_time).ok_or_else(|| LedgerError::InvalidTimestamp {
                row,
                value: record.utc_time.clone(),
            })?;

        let asset = record.coin.trim().to_uppercase();
        if asset.is_empty() {
            return Err(LedgerError::MissingAsset { row });
        }

        let amount = match numeric::normalize(&record.change) {
            Ok(amount) => amount,
            Err(_) if options.numbers == MalformedNumberPolicy::Zero => {
                log::warn!(
                    "Row {}: malformed amount '{}' for {}, using 0",
                    row,
                    record.change,
                    asset
                );
                ledger.malformed.push(MalformedValue {
                    row,
                    timestamp,
                    asset: asset.clone(),
                    value: record.change.clone(),
                });
                Decimal::ZERO
            }
            Err(_) => {
                return Err(LedgerError::MalformedNumber {
                    row,
                    value: record.change,
                })
            }
        };

        ledger.legs.push(LedgerLeg {
            row,
            timestamp,
            asset,
            operation: Operation::new(&record.operation),
            amount,
        });
    }

    log::info!("Read {} ledger rows", ledger.legs.len());
    Ok(ledger)
}

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Parse a ledger timestamp, interpreting naive values as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use rust_decimal_macros::dec;

    const SAMPLE: &str = "\
User_ID,UTC_Time,Account,Operation,Coin,Change,Remark
1,2021-03-05 12:34:56,Spot,Deposit,btc,\"0,5\",
1,2021-03-06 08:00:00,Spot,Sell,BTC,-0.25,
1,2021-03-06 08:00:01,Spot,Sell,EUR,12500.00,
";

    #[test]
    fn operation_labels_classified() {
        assert_eq!(OperationKind::classify("Deposit"), OperationKind::Deposit);
        assert_eq!(OperationKind::classify("Fiat Deposit"), OperationKind::FiatDeposit);
        assert_eq!(OperationKind::classify("Withdraw"), OperationKind::Withdraw);
        assert_eq!(OperationKind::classify("Withdrawal"), OperationKind::Withdraw);
        assert_eq!(OperationKind::classify("Fiat Withdraw"), OperationKind::FiatWithdraw);
        assert_eq!(OperationKind::classify("Fee"), OperationKind::Fee);
        assert_eq!(OperationKind::classify("Transaction Fee"), OperationKind::Fee);
        assert_eq!(OperationKind::classify("Simple Earn Flexible Interest"), OperationKind::Income);
        assert_eq!(OperationKind::classify("ETH 2.0 Staking Rewards"), OperationKind::Income);
        assert_eq!(OperationKind::classify("Distribution"), OperationKind::Income);
        assert_eq!(OperationKind::classify("Buy"), OperationKind::Trade);
        assert_eq!(OperationKind::classify("Transaction Related"), OperationKind::Trade);
        assert_eq!(OperationKind::classify(""), OperationKind::Trade);
    }

    #[test]
    fn deposit_and_withdrawal_families() {
        assert!(OperationKind::FiatDeposit.is_deposit());
        assert!(OperationKind::Deposit.is_deposit());
        assert!(!OperationKind::Trade.is_deposit());
        assert!(OperationKind::FiatWithdraw.is_withdrawal());
        assert!(!OperationKind::Deposit.is_withdrawal());
    }

    #[test]
    fn reads_rows_in_file_order() {
        let ledger = read_ledger(SAMPLE.as_bytes(), LedgerOptions::default()).unwrap();
        assert_eq!(ledger.legs.len(), 3);

        let first = &ledger.legs[0];
        assert_eq!(first.row, 1);
        assert_eq!(first.asset, "BTC");
        assert_eq!(first.amount, dec!(0.5));
        assert_eq!(first.kind(), OperationKind::Deposit);
        assert!(first.is_inflow());

        let second = &ledger.legs[1];
        assert!(second.is_outflow());
        assert_eq!(second.quantity(), dec!(0.25));
        assert_eq!(ledger.legs[2].amount, dec!(12500));
        assert!(ledger.malformed.is_empty());
    }

    #[test]
    fn malformed_amount_zero_policy_records_value() {
        let csv = "UTC_Time,Operation,Coin,Change\n2021-01-01 00:00:00,Buy,BTC,oops\n";
        let ledger = read_ledger(csv.as_bytes(), LedgerOptions::default()).unwrap();
        assert_eq!(ledger.legs[0].amount, Decimal::ZERO);
        assert_eq!(ledger.malformed.len(), 1);
        assert_eq!(ledger.malformed[0].value, "oops");
    }

    #[test]
    fn malformed_amount_reject_policy_fails() {
        let csv = "UTC_Time,Operation,Coin,Change\n2021-01-01 00:00:00,Buy,BTC,oops\n";
        let options = LedgerOptions {
            numbers: MalformedNumberPolicy::Reject,
            ..LedgerOptions::default()
        };
        let err = read_ledger(csv.as_bytes(), options).unwrap_err();
        assert!(matches!(err, LedgerError::MalformedNumber { row: 1, .. }));
    }

    #[test]
    fn invalid_timestamp_is_fatal() {
        let csv = "UTC_Time,Operation,Coin,Change\nyesterday,Buy,BTC,1\n";
        let err = read_ledger(csv.as_bytes(), LedgerOptions::default()).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTimestamp { row: 1, .. }));
    }

    #[test]
    fn timestamp_formats() {
        let ts = parse_timestamp("2021-03-05 12:34:56.789").unwrap();
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (12, 34, 56));
        let ts = parse_timestamp("2021-03-05T12:34:56+01:00").unwrap();
        assert_eq!(ts.hour(), 11);
        let ts = parse_timestamp("05/03/2021 12:34").unwrap();
        assert_eq!((ts.day(), ts.month()), (5, 3));
        assert!(parse_timestamp("2021-03-05").is_some());
        assert!(parse_timestamp("not a date").is_none());
    }
}
