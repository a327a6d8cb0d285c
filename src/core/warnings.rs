use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::Serialize;

/// Which kind of outflow ran out of lots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
pub enum OutflowKind {
    Disposal,
    Swap,
    Withdrawal,
    Unpaired,
}

/// Non-fatal findings raised while replaying the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(tag = "type")]
pub enum Diagnostic {
    /// An outflow needed more than the inventory held.
    InventoryShortfall {
        #[schemars(with = "String")]
        time: DateTime<Utc>,
        asset: String,
        outflow: OutflowKind,
        #[schemars(with = "f64")]
        requested: Decimal,
        #[schemars(with = "f64")]
        uncovered: Decimal,
    },
    /// A trade outflow with nothing received in exchange in its event: no
    /// fiat proceeds and no credited crypto other than a deposit. Usually the
    /// grouping window is too narrow.
    UnpairedOutflow {
        #[schemars(with = "String")]
        time: DateTime<Utc>,
        asset: String,
        #[schemars(with = "f64")]
        quantity: Decimal,
    },
    /// One event credited more than one fiat currency; proceeds were summed.
    MixedFiatProceeds {
        #[schemars(with = "String")]
        time: DateTime<Utc>,
        currencies: Vec<String>,
    },
    /// A seed withdrawal that no deposit claimed.
    UnmatchedSeed {
        asset: String,
        #[schemars(with = "f64")]
        quantity: Decimal,
        date: String,
    },
    /// A ledger amount that could not be parsed and was read as zero.
    MalformedNumber {
        #[schemars(with = "String")]
        time: DateTime<Utc>,
        row: usize,
        asset: String,
        value: String,
    },
}

impl Diagnostic {
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::InventoryShortfall { .. } => "InventoryShortfall",
            Diagnostic::UnpairedOutflow { .. } => "UnpairedOutflow",
            Diagnostic::MixedFiatProceeds { .. } => "MixedFiatProceeds",
            Diagnostic::UnmatchedSeed { .. } => "UnmatchedSeed",
            Diagnostic::MalformedNumber { .. } => "MalformedNumber",
        }
    }

    pub fn time(&self) -> Option<DateTime<Utc>> {
        match self {
            Diagnostic::InventoryShortfall { time, .. }
            | Diagnostic::UnpairedOutflow { time, .. }
            | Diagnostic::MixedFiatProceeds { time, .. }
            | Diagnostic::MalformedNumber { time, .. } => Some(*time),
            Diagnostic::UnmatchedSeed { .. } => None,
        }
    }

    pub fn asset(&self) -> String {
        match self {
            Diagnostic::InventoryShortfall { asset, .. }
            | Diagnostic::UnpairedOutflow { asset, .. }
            | Diagnostic::UnmatchedSeed { asset, .. }
            | Diagnostic::MalformedNumber { asset, .. } => asset.clone(),
            Diagnostic::MixedFiatProceeds { currencies, .. } => currencies.join("+"),
        }
    }

    pub fn quantity(&self) -> Option<Decimal> {
        match self {
            Diagnostic::InventoryShortfall { uncovered, .. } => Some(*uncovered),
            Diagnostic::UnpairedOutflow { quantity, .. }
            | Diagnostic::UnmatchedSeed { quantity, .. } => Some(*quantity),
            Diagnostic::MixedFiatProceeds { .. } | Diagnostic::MalformedNumber { .. } => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Diagnostic::InventoryShortfall {
                outflow,
                requested,
                uncovered,
                ..
            } => format!(
                "{:?} of {} not covered by inventory: {} missing",
                outflow,
                requested.normalize(),
                uncovered.normalize()
            ),
            Diagnostic::UnpairedOutflow { .. } => {
                "outflow with nothing received in exchange in its event; check the grouping window".to_string()
            }
            Diagnostic::MixedFiatProceeds { currencies, .. } => {
                format!("proceeds summed across {}", currencies.join(", "))
            }
            Diagnostic::UnmatchedSeed { date, .. } => {
                format!("seed withdrawal of {} never matched a deposit", date)
            }
            Diagnostic::MalformedNumber { row, value, .. } => {
                format!("row {}: amount '{}' read as 0", row, value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn serializes_with_type_tag() {
        let diagnostic = Diagnostic::UnmatchedSeed {
            asset: "BTC".to_string(),
            quantity: dec!(0.5),
            date: "01/01/2020".to_string(),
        };
        let json = serde_json::to_value(&diagnostic).unwrap();
        assert_eq!(json["type"], "UnmatchedSeed");
        assert_eq!(json["asset"], "BTC");
        assert_eq!(diagnostic.time(), None);
        assert_eq!(diagnostic.quantity(), Some(dec!(0.5)));
    }

    #[test]
    fn shortfall_message_names_missing_quantity() {
        let diagnostic = Diagnostic::InventoryShortfall {
            time: DateTime::from_timestamp(0, 0).unwrap(),
            asset: "ETH".to_string(),
            outflow: OutflowKind::Disposal,
            requested: dec!(2.00),
            uncovered: dec!(0.50),
        };
        assert_eq!(diagnostic.kind(), "InventoryShortfall");
        assert_eq!(
            diagnostic.message(),
            "Disposal of 2 not covered by inventory: 0.5 missing"
        );
    }
}
