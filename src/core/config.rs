use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeSet;

pub const DEFAULT_FIAT: &[&str] = &["EUR", "BRL", "USD", "GBP"];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("grouping window must be positive")]
    NonPositiveWindow,
    #[error("seed tolerance must not be negative: {0}")]
    NegativeTolerance(Decimal),
    #[error("exemption threshold must not be negative: {0}")]
    NegativeThreshold(i64),
}

/// How close a deposit must be to a seed withdrawal to be the same coins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedTolerance {
    /// `|seed - deposit| < tolerance`
    Absolute(Decimal),
    /// `deposit * (1 - r) <= seed <= deposit * (1 + r)`
    Relative(Decimal),
}

impl SeedTolerance {
    pub fn matches(&self, seed: Decimal, deposit: Decimal) -> bool {
        match *self {
            SeedTolerance::Absolute(tolerance) => (seed - deposit).abs() < tolerance,
            SeedTolerance::Relative(r) => {
                seed >= deposit * (Decimal::ONE - r) && seed <= deposit * (Decimal::ONE + r)
            }
        }
    }

    fn value(&self) -> Decimal {
        match *self {
            SeedTolerance::Absolute(v) | SeedTolerance::Relative(v) => v,
        }
    }
}

/// What happens when an outflow needs more than the inventory holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnderflowPolicy {
    /// Report the uncovered quantity as its own zero-cost, lot-less disposal row
    /// so proceeds still add up, and raise a diagnostic.
    #[default]
    Report,
    /// Stop at what the inventory covers and raise a diagnostic only.
    Truncate,
}

/// Engine settings for one reconciliation run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Ledger rows whose rounded timestamps coincide form one event
    pub window: Duration,
    pub seed_tolerance: SeedTolerance,
    pub underflow: UnderflowPolicy,
    /// Holding periods strictly longer than this are exempt
    pub exemption_days: i64,
    pub fiat: BTreeSet<String>,
    /// Lot remainders at or below this are consumed whole
    pub dust: Decimal,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            window: Duration::seconds(2),
            seed_tolerance: SeedTolerance::Absolute(dec!(0.00001)),
            underflow: UnderflowPolicy::Report,
            exemption_days: 365,
            fiat: DEFAULT_FIAT.iter().map(|s| s.to_string()).collect(),
            dust: dec!(0.000000000001),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window <= Duration::zero() {
            return Err(ConfigError::NonPositiveWindow);
        }
        if self.seed_tolerance.value() < Decimal::ZERO {
            return Err(ConfigError::NegativeTolerance(self.seed_tolerance.value()));
        }
        if self.exemption_days < 0 {
            return Err(ConfigError::NegativeThreshold(self.exemption_days));
        }
        Ok(())
    }

    pub fn is_fiat(&self, asset: &str) -> bool {
        self.fiat.contains(asset)
    }
}
