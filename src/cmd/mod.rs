pub mod inventory;
pub mod run;
pub mod schema;
pub mod summary;
pub mod validate;

use crate::core::{
    reconcile, Diagnostic, EngineConfig, EventGrouper, Reconciliation, SeedTolerance,
    UnderflowPolicy,
};
use crate::ledger::{self, numeric::MalformedNumberPolicy, Ledger, LedgerOptions};
use crate::seed;
use anyhow::Context;
use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Ledger inputs and engine settings shared by every command.
#[derive(Args, Debug)]
pub struct EngineArgs {
    /// Exchange transaction history (CSV with UTC_Time, Operation, Coin, Change)
    pub ledger: PathBuf,

    /// Predecessor exchange FIFO report used to price deposits (semicolon CSV)
    #[arg(short, long)]
    pub seed: Option<PathBuf>,

    /// Grouping window in seconds; rows whose rounded times coincide form one event
    #[arg(short, long, default_value_t = 2)]
    pub window: u32,

    /// Maximum quantity difference between a deposit and a seed withdrawal
    #[arg(long, default_value = "0.00001")]
    pub seed_tolerance: Decimal,

    /// Read --seed-tolerance as a fraction of the deposit quantity
    #[arg(long)]
    pub relative_seed_tolerance: bool,

    /// What to do when an outflow exceeds the lots held
    #[arg(long, value_enum, default_value_t = UnderflowArg::Report)]
    pub underflow: UnderflowArg,

    /// Holding periods longer than this many days are exempt
    #[arg(long, default_value_t = 365)]
    pub exemption_days: i64,

    /// Currencies treated as fiat
    #[arg(long, value_delimiter = ',', default_value = "EUR,BRL,USD,GBP")]
    pub fiat: Vec<String>,

    /// Fail on unparseable amounts instead of reading them as zero
    #[arg(long)]
    pub strict_numbers: bool,

    /// Field delimiter of the ledger file
    #[arg(long, default_value_t = ',')]
    pub ledger_delimiter: char,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum UnderflowArg {
    /// Report uncovered quantity as a zero-cost row without a lot
    #[default]
    Report,
    /// Leave uncovered quantity out of the disposal report
    Truncate,
}

impl From<UnderflowArg> for UnderflowPolicy {
    fn from(arg: UnderflowArg) -> Self {
        match arg {
            UnderflowArg::Report => UnderflowPolicy::Report,
            UnderflowArg::Truncate => UnderflowPolicy::Truncate,
        }
    }
}

impl TryFrom<&EngineArgs> for EngineConfig {
    type Error = anyhow::Error;

    fn try_from(args: &EngineArgs) -> Result<Self, Self::Error> {
        let seed_tolerance = if args.relative_seed_tolerance {
            SeedTolerance::Relative(args.seed_tolerance)
        } else {
            SeedTolerance::Absolute(args.seed_tolerance)
        };
        let config = EngineConfig {
            window: chrono::Duration::seconds(i64::from(args.window)),
            seed_tolerance,
            underflow: args.underflow.into(),
            exemption_days: args.exemption_days,
            fiat: args
                .fiat
                .iter()
                .map(|f| f.trim().to_uppercase())
                .filter(|f| !f.is_empty())
                .collect(),
            ..EngineConfig::default()
        };
        config.validate()?;
        Ok(config)
    }
}

impl EngineArgs {
    pub fn ledger_options(&self) -> anyhow::Result<LedgerOptions> {
        let delimiter = u8::try_from(self.ledger_delimiter)
            .context("ledger delimiter must be a single-byte character")?;
        Ok(LedgerOptions {
            delimiter,
            numbers: if self.strict_numbers {
                MalformedNumberPolicy::Reject
            } else {
                MalformedNumberPolicy::Zero
            },
        })
    }

    /// Read both ledgers and replay them.
    pub fn reconcile(&self) -> anyhow::Result<Reconciliation> {
        let config = EngineConfig::try_from(self)?;
        let ledger = ledger::read_ledger_file(&self.ledger, self.ledger_options()?)?;
        let seed = seed::load_seed_pool(self.seed.as_deref());
        Ok(replay(ledger, seed, &config))
    }
}

/// Replay a parsed ledger, carrying over amounts that were read as zero.
pub fn replay(ledger: Ledger, seed: seed::SeedPool, config: &EngineConfig) -> Reconciliation {
    let Ledger { legs, malformed } = ledger;
    let grouper = EventGrouper::new(legs, config.window);
    let mut result = reconcile(&grouper, seed, config);
    for value in malformed {
        result.reports.diagnose(Diagnostic::MalformedNumber {
            time: value.timestamp,
            row: value.row,
            asset: value.asset,
            value: value.value,
        });
    }
    result
}

/// SHA-256 of a file, hex encoded.
pub fn fingerprint(path: &Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

pub fn format_money(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

pub fn format_quantity(qty: Decimal) -> String {
    qty.normalize().to_string()
}
