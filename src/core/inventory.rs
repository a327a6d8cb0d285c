use super::exemption::parse_calendar_date;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

/// When a lot was acquired. Seed ledger dates are carried verbatim; the
/// parsed date is only used for holding-period arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcquisitionDate {
    pub raw: String,
    #[serde(skip)]
    pub date: Option<NaiveDate>,
}

impl AcquisitionDate {
    pub fn known(date: NaiveDate) -> Self {
        AcquisitionDate {
            raw: date.format("%Y-%m-%d").to_string(),
            date: Some(date),
        }
    }

    pub fn parse(raw: &str) -> Self {
        AcquisitionDate {
            raw: raw.trim().to_string(),
            date: parse_calendar_date(raw),
        }
    }
}

impl fmt::Display for AcquisitionDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Where a lot's coins first came from, before any swaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Origin {
    /// Staking, interest, rewards and other credits with no acquisition cost
    InternalAccrual,
    /// Bought with fiat in the same event
    FiatPurchase,
    /// Deposit matched against a withdrawal of the seed ledger
    MatchedExternalSeed,
    /// Deposit with no known origin
    UnknownExternal,
}

impl Origin {
    pub fn label(self) -> &'static str {
        match self {
            Origin::InternalAccrual => "Rendimento/Interno",
            Origin::FiatPurchase => "Compra Fiat",
            Origin::MatchedExternalSeed => "Histórico (Semente)",
            Origin::UnknownExternal => "Origem Externa",
        }
    }
}

/// Provenance of a lot. Swapped lots remember only the root origin, so a
/// chain of swaps never nests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind")]
pub enum Provenance {
    InternalAccrual,
    FiatPurchase,
    MatchedExternalSeed,
    UnknownExternal,
    InheritedFromSwap { origin: Origin },
}

impl Provenance {
    pub fn origin(self) -> Origin {
        match self {
            Provenance::InternalAccrual => Origin::InternalAccrual,
            Provenance::FiatPurchase => Origin::FiatPurchase,
            Provenance::MatchedExternalSeed => Origin::MatchedExternalSeed,
            Provenance::UnknownExternal => Origin::UnknownExternal,
            Provenance::InheritedFromSwap { origin } => origin,
        }
    }

    /// Provenance of a lot received in exchange for this one.
    pub fn inherited(self) -> Provenance {
        Provenance::InheritedFromSwap {
            origin: self.origin(),
        }
    }

    pub fn label(self) -> String {
        match self {
            Provenance::InheritedFromSwap { origin } => format!("{} via Swap", origin.label()),
            other => other.origin().label().to_string(),
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// A slice of previously acquired quantity with its cost basis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CostLot {
    pub asset: String,
    pub quantity: Decimal,
    pub total_cost: Decimal,
    pub acquired: AcquisitionDate,
    pub provenance: Provenance,
}

impl CostLot {
    pub fn unit_cost(&self) -> Decimal {
        if self.quantity.is_zero() {
            Decimal::ZERO
        } else {
            self.total_cost / self.quantity
        }
    }
}

/// Part of a lot taken out by a FIFO consumption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotSlice {
    pub quantity: Decimal,
    pub cost: Decimal,
    pub acquired: AcquisitionDate,
    pub provenance: Provenance,
}

impl From<CostLot> for LotSlice {
    fn from(lot: CostLot) -> Self {
        LotSlice {
            quantity: lot.quantity,
            cost: lot.total_cost,
            acquired: lot.acquired,
            provenance: lot.provenance,
        }
    }
}

/// Result of [`Inventory::consume_fifo`]: the slices taken, oldest first, and
/// whatever the inventory could not cover.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Consumption {
    pub slices: Vec<LotSlice>,
    pub shortfall: Decimal,
}

impl Consumption {
    pub fn covered(&self) -> Decimal {
        self.slices.iter().map(|s| s.quantity).sum()
    }

    pub fn cost(&self) -> Decimal {
        self.slices.iter().map(|s| s.cost).sum()
    }

    pub fn is_short(&self) -> bool {
        self.shortfall > Decimal::ZERO
    }
}

/// Per-asset FIFO queues of cost lots, owned by a single reconciliation run.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    lots: BTreeMap<String, VecDeque<CostLot>>,
    dust: Decimal,
}

impl Inventory {
    pub fn new(dust: Decimal) -> Self {
        Inventory {
            lots: BTreeMap::new(),
            dust,
        }
    }

    /// Append a lot to the tail of its asset's queue.
    pub fn push(&mut self, lot: CostLot) {
        if lot.quantity <= Decimal::ZERO {
            log::debug!("Ignoring empty {} lot", lot.asset);
            return;
        }
        log::debug!(
            "Lot {} PUSH: qty={}, cost={}, acquired={}, origin={}",
            lot.asset,
            lot.quantity,
            lot.total_cost,
            lot.acquired,
            lot.provenance
        );
        self.lots.entry(lot.asset.clone()).or_default().push_back(lot);
    }

    /// Take `quantity` of `asset` from the oldest lots first.
    ///
    /// A partially consumed head keeps its per-unit cost: quantity and cost
    /// shrink by the same proportion. A head left with `dust` or less is
    /// consumed whole, so no empty lot survives and no cost is stranded.
    pub fn consume_fifo(&mut self, asset: &str, quantity: Decimal) -> Consumption {
        let mut consumption = Consumption::default();
        if quantity <= Decimal::ZERO {
            return consumption;
        }

        let dust = self.dust;
        let mut remaining = quantity;
        if let Some(queue) = self.lots.get_mut(asset) {
            while remaining > Decimal::ZERO {
                let Some(head) = queue.front_mut() else {
                    break;
                };
                if head.quantity - remaining <= dust {
                    let Some(lot) = queue.pop_front() else {
                        break;
                    };
                    remaining -= lot.quantity;
                    log::debug!(
                        "Lot {} CONSUME ALL: qty={}, cost={}",
                        asset,
                        lot.quantity,
                        lot.total_cost
                    );
                    consumption.slices.push(lot.into());
                } else {
                    let cost = head.total_cost * remaining / head.quantity;
                    head.quantity -= remaining;
                    head.total_cost -= cost;
                    log::debug!(
                        "Lot {} CONSUME: qty={}, cost={}. Remaining: qty={}, cost={}",
                        asset,
                        remaining,
                        cost,
                        head.quantity,
                        head.total_cost
                    );
                    consumption.slices.push(LotSlice {
                        quantity: remaining,
                        cost,
                        acquired: head.acquired.clone(),
                        provenance: head.provenance,
                    });
                    remaining = Decimal::ZERO;
                }
            }
            if queue.is_empty() {
                self.lots.remove(asset);
            }
        }

        consumption.shortfall = remaining.max(Decimal::ZERO);
        if consumption.is_short() {
            log::debug!(
                "Lot {} SHORT: requested={}, uncovered={}",
                asset,
                quantity,
                consumption.shortfall
            );
        }
        consumption
    }

    pub fn balance(&self, asset: &str) -> Decimal {
        self.lots(asset).map(|l| l.quantity).sum()
    }

    pub fn total_cost(&self, asset: &str) -> Decimal {
        self.lots(asset).map(|l| l.total_cost).sum()
    }

    pub fn lots<'a>(&'a self, asset: &str) -> impl Iterator<Item = &'a CostLot> + 'a {
        self.lots.get(asset).into_iter().flatten()
    }

    pub fn assets(&self) -> impl Iterator<Item = &str> {
        self.lots.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn lot(asset: &str, qty: Decimal, cost: Decimal, date: &str) -> CostLot {
        CostLot {
            asset: asset.to_string(),
            quantity: qty,
            total_cost: cost,
            acquired: AcquisitionDate::parse(date),
            provenance: Provenance::InternalAccrual,
        }
    }

    fn inventory() -> Inventory {
        Inventory::new(dec!(0.000000000001))
    }

    #[test]
    fn push_appends_to_tail() {
        let mut inv = inventory();
        inv.push(lot("BTC", dec!(1), dec!(100), "2020-01-01"));
        inv.push(lot("BTC", dec!(2), dec!(300), "2020-02-01"));
        let dates: Vec<_> = inv.lots("BTC").map(|l| l.acquired.raw.clone()).collect();
        assert_eq!(dates, vec!["2020-01-01", "2020-02-01"]);
        assert_eq!(inv.balance("BTC"), dec!(3));
        assert_eq!(inv.total_cost("BTC"), dec!(400));
    }

    #[test]
    fn empty_lots_are_ignored() {
        let mut inv = inventory();
        inv.push(lot("BTC", Decimal::ZERO, dec!(100), "2020-01-01"));
        assert!(inv.is_empty());
    }

    #[test]
    fn consumes_oldest_first() {
        let mut inv = inventory();
        inv.push(lot("BTC", dec!(1), dec!(100), "2020-01-01"));
        inv.push(lot("BTC", dec!(1), dec!(200), "2020-02-01"));

        let consumption = inv.consume_fifo("BTC", dec!(1.5));
        assert_eq!(consumption.slices.len(), 2);
        assert_eq!(consumption.slices[0].acquired.raw, "2020-01-01");
        assert_eq!(consumption.slices[0].quantity, dec!(1));
        assert_eq!(consumption.slices[0].cost, dec!(100));
        assert_eq!(consumption.slices[1].quantity, dec!(0.5));
        assert_eq!(consumption.slices[1].cost, dec!(100));
        assert_eq!(consumption.shortfall, Decimal::ZERO);

        let left: Vec<_> = inv.lots("BTC").collect();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].quantity, dec!(0.5));
        assert_eq!(left[0].total_cost, dec!(100));
    }

    #[test]
    fn partial_consumption_keeps_unit_cost() {
        let mut inv = inventory();
        inv.push(lot("ETH", dec!(3), dec!(1000), "2020-01-01"));
        let before = inv.lots("ETH").next().unwrap().unit_cost();

        inv.consume_fifo("ETH", dec!(0.7));
        inv.consume_fifo("ETH", dec!(1.1));

        let after = inv.lots("ETH").next().unwrap().unit_cost();
        assert!((after - before).abs() < dec!(0.0000000001));
        assert_eq!(inv.balance("ETH"), dec!(1.2));
    }

    #[test]
    fn dust_remainder_is_consumed_whole() {
        let mut inv = inventory();
        inv.push(lot("BTC", dec!(1.0000000000001), dec!(100), "2020-01-01"));
        let consumption = inv.consume_fifo("BTC", dec!(1));
        assert_eq!(consumption.slices.len(), 1);
        assert_eq!(consumption.cost(), dec!(100));
        assert!(inv.is_empty());
        assert!(inv.lots("BTC").all(|l| l.quantity > Decimal::ZERO));
    }

    #[test]
    fn underflow_reports_shortfall_without_fabricating() {
        let mut inv = inventory();
        inv.push(lot("BTC", dec!(0.4), dec!(40), "2020-01-01"));
        let consumption = inv.consume_fifo("BTC", dec!(1));
        assert_eq!(consumption.covered(), dec!(0.4));
        assert_eq!(consumption.shortfall, dec!(0.6));
        assert!(consumption.is_short());
        assert!(inv.is_empty());

        let consumption = inv.consume_fifo("DOGE", dec!(5));
        assert!(consumption.slices.is_empty());
        assert_eq!(consumption.shortfall, dec!(5));
    }

    #[test]
    fn conservation_across_operations() {
        let mut inv = inventory();
        let mut inflow = Decimal::ZERO;
        let mut consumed = Decimal::ZERO;
        let steps = [
            (dec!(0.3), dec!(0.1)),
            (dec!(1.25), dec!(0.9)),
            (dec!(0.05), dec!(0.333)),
            (dec!(2), dec!(1.5)),
        ];
        for (i, &(add, take)) in steps.iter().enumerate() {
            inv.push(lot("SOL", add, dec!(10) * add, &format!("2021-01-0{}", i + 1)));
            inflow += add;
            consumed += inv.consume_fifo("SOL", take).covered();
            assert!((inv.balance("SOL") - (inflow - consumed)).abs() <= dec!(0.000000000001));
        }
    }

    #[test]
    fn provenance_inheritance_flattens() {
        let seeded = Provenance::MatchedExternalSeed;
        let once = seeded.inherited();
        let twice = once.inherited();
        assert_eq!(
            once,
            Provenance::InheritedFromSwap {
                origin: Origin::MatchedExternalSeed
            }
        );
        assert_eq!(once, twice);
        assert_eq!(twice.origin(), Origin::MatchedExternalSeed);
        assert_eq!(once.label(), "Histórico (Semente) via Swap");
    }
}
