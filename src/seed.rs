//! Historical lots from the predecessor exchange's FIFO report.
//!
//! Only withdrawals matter: coins that left the old exchange are the ones
//! that can show up as deposits on the new one, and they carry the cost and
//! date the old exchange computed for them.

use crate::core::SeedTolerance;
use crate::csv_schema::CsvField;
use crate::ledger::numeric::{normalize_with, MalformedNumberPolicy};
use cryptolot_derive::CsvSchema;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const WITHDRAWAL_MARKERS: &[&str] = &["retirada", "withdraw"];

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// Row of the seed ledger (semicolon separated, comma decimal mark)
#[derive(Debug, Clone, Deserialize, CsvSchema)]
pub struct SeedCsvRecord {
    /// Operation label; withdrawals contain "Retirada" or "Withdraw"
    #[serde(rename = "operação")]
    pub operation: String,
    /// Asset symbol
    #[serde(rename = "Moeda")]
    pub asset: String,
    /// Quantity moved (sign ignored)
    #[serde(rename = "quantidade")]
    pub quantity: String,
    /// FIFO cost of the moved coins, in fiat
    #[serde(rename = "Valor (Custo FIFO)")]
    pub cost: String,
    /// Acquisition date, carried through verbatim
    #[serde(rename = "Data")]
    pub date: String,
}

/// A withdrawal from the seed ledger waiting to be matched to a deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedRecord {
    pub quantity: Decimal,
    pub total_cost: Decimal,
    pub date: String,
}

/// Unclaimed seed withdrawals per asset, in ledger order.
#[derive(Debug, Clone, Default)]
pub struct SeedPool {
    records: BTreeMap<String, VecDeque<SeedRecord>>,
}

impl SeedPool {
    pub fn push(&mut self, asset: &str, record: SeedRecord) {
        self.records
            .entry(asset.to_string())
            .or_default()
            .push_back(record);
    }

    /// Remove and return the first record of `asset` whose quantity is within
    /// `tolerance` of `quantity`. A record is handed out at most once.
    pub fn take_match(
        &mut self,
        asset: &str,
        quantity: Decimal,
        tolerance: &SeedTolerance,
    ) -> Option<SeedRecord> {
        let queue = self.records.get_mut(asset)?;
        let pos = queue
            .iter()
            .position(|r| tolerance.matches(r.quantity, quantity))?;
        let record = queue.remove(pos);
        if queue.is_empty() {
            self.records.remove(asset);
        }
        record
    }

    pub fn remaining(&self) -> impl Iterator<Item = (&str, &SeedRecord)> {
        self.records
            .iter()
            .flat_map(|(asset, queue)| queue.iter().map(move |r| (asset.as_str(), r)))
    }

    pub fn len(&self) -> usize {
        self.records.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Load the seed pool. A missing or unreadable seed ledger is not an error:
/// the pool is empty and every deposit counts as external.
pub fn load_seed_pool(path: Option<&Path>) -> SeedPool {
    let Some(path) = path else {
        log::info!("No seed ledger given, deposits will be treated as external");
        return SeedPool::default();
    };
    match read_seed_file(path) {
        Ok(pool) => {
            log::info!(
                "Loaded {} seed withdrawals from {}",
                pool.len(),
                path.display()
            );
            pool
        }
        Err(err) => {
            log::warn!(
                "Seed ledger {} unusable ({}), deposits will be treated as external",
                path.display(),
                err
            );
            SeedPool::default()
        }
    }
}

pub fn read_seed_file(path: &Path) -> Result<SeedPool, SeedError> {
    let file = File::open(path)?;
    read_seed(BufReader::new(file))
}

pub fn read_seed<R: Read>(reader: R) -> Result<SeedPool, SeedError> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b';')
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut pool = SeedPool::default();
    for result in rdr.deserialize::<SeedCsvRecord>() {
        let record = result?;
        let operation = record.operation.to_lowercase();
        if !WITHDRAWAL_MARKERS.iter().any(|m| operation.contains(m)) {
            continue;
        }
        let quantity = normalize_with(&record.quantity, MalformedNumberPolicy::Zero)
            .unwrap_or_default()
            .abs();
        if quantity.is_zero() {
            continue;
        }
        let total_cost = normalize_with(&record.cost, MalformedNumberPolicy::Zero)
            .unwrap_or_default()
            .abs();
        pool.push(
            &record.asset.trim().to_uppercase(),
            SeedRecord {
                quantity,
                total_cost,
                date: record.date.trim().to_string(),
            },
        );
    }
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SEED: &str = "\
operação;Moeda;quantidade;Valor (Custo FIFO);Data
Compra;BTC;0,5;9000,00;01/12/2019
Retirada;BTC;-0,5;10000,00;01/01/2020
Withdraw ETH;eth;2,0;800,50;15/02/2020
Retirada;BTC;0,5;12000,00;01/03/2020
";

    #[test]
    fn keeps_only_withdrawals() {
        let pool = read_seed(SEED.as_bytes()).unwrap();
        assert_eq!(pool.len(), 3);
        let (asset, first) = pool.remaining().next().unwrap();
        assert_eq!(asset, "BTC");
        assert_eq!(first.quantity, dec!(0.5));
        assert_eq!(first.total_cost, dec!(10000));
        assert_eq!(first.date, "01/01/2020");
    }

    #[test]
    fn matches_first_record_once() {
        let mut pool = read_seed(SEED.as_bytes()).unwrap();
        let tol = SeedTolerance::Absolute(dec!(0.00001));

        let first = pool.take_match("BTC", dec!(0.500001), &tol).unwrap();
        assert_eq!(first.date, "01/01/2020");
        let second = pool.take_match("BTC", dec!(0.5), &tol).unwrap();
        assert_eq!(second.date, "01/03/2020");
        assert!(pool.take_match("BTC", dec!(0.5), &tol).is_none());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn respects_tolerance() {
        let mut pool = read_seed(SEED.as_bytes()).unwrap();
        assert!(pool
            .take_match("ETH", dec!(1.99), &SeedTolerance::Absolute(dec!(0.00001)))
            .is_none());
        let matched = pool
            .take_match("ETH", dec!(1.99), &SeedTolerance::Relative(dec!(0.01)))
            .unwrap();
        assert_eq!(matched.total_cost, dec!(800.50));
    }

    #[test]
    fn missing_seed_ledger_is_empty_pool() {
        let pool = load_seed_pool(Some(Path::new("does/not/exist.csv")));
        assert!(pool.is_empty());
        assert!(load_seed_pool(None).is_empty());
    }
}
