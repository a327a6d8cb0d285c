//! Replays grouped ledger events against the lot inventory.

use super::config::{EngineConfig, UnderflowPolicy};
use super::events::{Event, EventGrouper};
use super::exemption::{assess, Exemption};
use super::inventory::{AcquisitionDate, Consumption, CostLot, Inventory, Provenance};
use super::report::{Direction, DisposalRecord, ReportAccumulator, SwapRecord, TransferRecord};
use super::warnings::{Diagnostic, OutflowKind};
use crate::ledger::{LedgerLeg, OperationKind};
use crate::seed::SeedPool;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};

const WITHDRAWAL_STATUS: &str = "Para Carteira Externa";

/// What an event does economically, decided once per event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    /// Crypto out, fiat in
    Sale,
    /// Crypto out, other crypto in
    Swap,
    /// Fiat out, crypto in
    Purchase,
    Plain,
}

/// The legs of one event sorted by the role they play.
struct Roles<'a> {
    /// Fiat credited by a trade
    proceeds: Vec<&'a LedgerLeg>,
    /// Crypto debited by a trade
    traded_out: Vec<&'a LedgerLeg>,
    /// Crypto credited other than by a deposit. Conversions are often
    /// labelled like income (staking, earn subscriptions), so the label
    /// does not decide what was received in exchange.
    received: Vec<&'a LedgerLeg>,
    /// Fiat debited by a trade
    fiat_spent: Vec<&'a LedgerLeg>,
}

impl<'a> Roles<'a> {
    fn new(event: &Event<'a>, config: &EngineConfig) -> Self {
        let proceeds = event
            .fiat_inflows(&config.fiat)
            .into_iter()
            .filter(|leg| !leg.kind().is_deposit())
            .collect();
        let mut traded_out = Vec::new();
        let mut fiat_spent = Vec::new();
        for leg in event.outflows() {
            if leg.kind() == OperationKind::Fee || leg.kind().is_withdrawal() {
                continue;
            }
            if config.is_fiat(&leg.asset) {
                fiat_spent.push(leg);
            } else {
                traded_out.push(leg);
            }
        }
        let received = event
            .inflows()
            .filter(|leg| !leg.kind().is_deposit() && !config.is_fiat(&leg.asset))
            .collect();
        Roles {
            proceeds,
            traded_out,
            received,
            fiat_spent,
        }
    }

    fn kind(&self) -> EventKind {
        if !self.proceeds.is_empty() {
            EventKind::Sale
        } else if !self.traded_out.is_empty() && !self.received.is_empty() {
            EventKind::Swap
        } else if !self.fiat_spent.is_empty() && !self.received.is_empty() {
            EventKind::Purchase
        } else {
            EventKind::Plain
        }
    }
}

/// Split `total` by `weights`. The last share takes the remainder so the
/// shares always add up to `total` exactly.
pub fn apportion(total: Decimal, weights: &[Decimal]) -> Vec<Decimal> {
    let sum: Decimal = weights.iter().sum();
    if sum.is_zero() {
        return vec![Decimal::ZERO; weights.len()];
    }
    let mut shares = Vec::with_capacity(weights.len());
    let mut allocated = Decimal::ZERO;
    for (i, weight) in weights.iter().enumerate() {
        let share = if i + 1 == weights.len() {
            total - allocated
        } else {
            total * weight / sum
        };
        allocated += share;
        shares.push(share);
    }
    shares
}

/// Cost weights of the assets received in a swap or purchase: every distinct asset gets
/// an equal share, split between its own legs by quantity. Quantities of
/// different assets are not comparable.
fn cost_weights(legs: &[&LedgerLeg]) -> Vec<Decimal> {
    let mut per_asset: BTreeMap<&str, Decimal> = BTreeMap::new();
    for leg in legs {
        *per_asset.entry(leg.asset.as_str()).or_default() += leg.quantity();
    }
    legs.iter()
        .map(|leg| match per_asset.get(leg.asset.as_str()) {
            Some(total) if !total.is_zero() => leg.quantity() / total,
            _ => Decimal::ZERO,
        })
        .collect()
}

fn quantities(legs: &[&LedgerLeg]) -> Vec<Decimal> {
    legs.iter().map(|leg| leg.quantity()).collect()
}

/// Slice quantities, followed by the shortfall when there is one.
fn consumption_weights(consumption: &Consumption) -> Vec<Decimal> {
    let mut weights: Vec<_> = consumption.slices.iter().map(|s| s.quantity).collect();
    if consumption.is_short() {
        weights.push(consumption.shortfall);
    }
    weights
}

/// Everything a replay produced.
#[derive(Debug)]
pub struct Reconciliation {
    pub reports: ReportAccumulator,
    /// Lots still held at the end of the ledger
    pub inventory: Inventory,
    /// Seed withdrawals no deposit claimed
    pub seed: SeedPool,
}

/// State of one ledger replay. Events must be fed in chronological order.
#[derive(Debug)]
pub struct Reconciler {
    config: EngineConfig,
    inventory: Inventory,
    seed: SeedPool,
    reports: ReportAccumulator,
}

impl Reconciler {
    pub fn new(config: EngineConfig, seed: SeedPool) -> Self {
        Reconciler {
            inventory: Inventory::new(config.dust),
            config,
            seed,
            reports: ReportAccumulator::default(),
        }
    }

    #[cfg(test)]
    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    #[cfg(test)]
    pub fn reports(&self) -> &ReportAccumulator {
        &self.reports
    }

    pub fn process(&mut self, event: &Event) {
        let roles = Roles::new(event, &self.config);
        let kind = roles.kind();
        log::debug!(
            "Event {} ({} legs): {:?}",
            event.time,
            event.legs.len(),
            kind
        );

        self.process_inflows(event, &roles, kind);

        for leg in event.outflows() {
            if leg.kind() == OperationKind::Fee {
                log::debug!("Skipping fee of {} {}", leg.quantity(), leg.asset);
            } else if leg.kind().is_withdrawal() {
                self.withdraw(event, leg);
            }
        }

        match kind {
            EventKind::Sale => self.dispose(event, &roles.traded_out, &roles.proceeds),
            EventKind::Swap => self.swap(event, &roles.traded_out, &roles.received),
            EventKind::Purchase | EventKind::Plain => {
                for leg in &roles.traded_out {
                    self.unpaired(event, leg);
                }
            }
        }
    }

    fn process_inflows(&mut self, event: &Event, roles: &Roles, kind: EventKind) {
        let purchase_costs = if kind == EventKind::Purchase {
            let spent: Decimal = roles.fiat_spent.iter().map(|leg| leg.quantity()).sum();
            apportion(spent, &cost_weights(&roles.received))
        } else {
            Vec::new()
        };

        for leg in event.inflows() {
            if self.config.is_fiat(&leg.asset) {
                continue;
            }
            if leg.kind().is_deposit() {
                self.deposit(event, leg);
                continue;
            }
            let bought = roles.received.iter().position(|l| std::ptr::eq(*l, leg));
            match (kind, bought) {
                (EventKind::Swap, Some(_)) => {}
                (EventKind::Purchase, Some(idx)) => self.inventory.push(CostLot {
                    asset: leg.asset.clone(),
                    quantity: leg.quantity(),
                    total_cost: purchase_costs.get(idx).copied().unwrap_or_default(),
                    acquired: AcquisitionDate::known(event.date()),
                    provenance: Provenance::FiatPurchase,
                }),
                _ => self.inventory.push(CostLot {
                    asset: leg.asset.clone(),
                    quantity: leg.quantity(),
                    total_cost: Decimal::ZERO,
                    acquired: AcquisitionDate::known(event.date()),
                    provenance: Provenance::InternalAccrual,
                }),
            }
        }
    }

    fn deposit(&mut self, event: &Event, leg: &LedgerLeg) {
        let quantity = leg.quantity();
        let lot = match self
            .seed
            .take_match(&leg.asset, quantity, &self.config.seed_tolerance)
        {
            Some(record) => {
                log::debug!(
                    "Deposit of {} {} matched seed withdrawal of {} ({})",
                    quantity,
                    leg.asset,
                    record.quantity,
                    record.date
                );
                CostLot {
                    asset: leg.asset.clone(),
                    quantity,
                    total_cost: record.total_cost,
                    acquired: AcquisitionDate::parse(&record.date),
                    provenance: Provenance::MatchedExternalSeed,
                }
            }
            None => CostLot {
                asset: leg.asset.clone(),
                quantity,
                total_cost: Decimal::ZERO,
                acquired: AcquisitionDate::known(event.date()),
                provenance: Provenance::UnknownExternal,
            },
        };
        self.reports.record_transfer(TransferRecord {
            time: event.time,
            asset: leg.asset.clone(),
            quantity,
            direction: Direction::Inflow,
            status: lot.provenance.label(),
        });
        self.inventory.push(lot);
    }

    fn withdraw(&mut self, event: &Event, leg: &LedgerLeg) {
        let quantity = leg.quantity();
        self.reports.record_transfer(TransferRecord {
            time: event.time,
            asset: leg.asset.clone(),
            quantity,
            direction: Direction::Outflow,
            status: WITHDRAWAL_STATUS.to_string(),
        });
        if self.config.is_fiat(&leg.asset) {
            return;
        }
        let consumption = self.inventory.consume_fifo(&leg.asset, quantity);
        self.shortfall(event, leg, OutflowKind::Withdrawal, &consumption);
    }

    fn unpaired(&mut self, event: &Event, leg: &LedgerLeg) {
        let quantity = leg.quantity();
        let consumption = self.inventory.consume_fifo(&leg.asset, quantity);
        self.reports.diagnose(Diagnostic::UnpairedOutflow {
            time: event.time,
            asset: leg.asset.clone(),
            quantity,
        });
        self.shortfall(event, leg, OutflowKind::Unpaired, &consumption);
    }

    fn shortfall(&mut self, event: &Event, leg: &LedgerLeg, outflow: OutflowKind, consumption: &Consumption) {
        if consumption.is_short() {
            self.reports.diagnose(Diagnostic::InventoryShortfall {
                time: event.time,
                asset: leg.asset.clone(),
                outflow,
                requested: leg.quantity(),
                uncovered: consumption.shortfall,
            });
        }
    }

    /// Taxable sale: every crypto leg shares the event's fiat proceeds by
    /// quantity, then each leg's share is split over the lots it consumed.
    fn dispose(&mut self, event: &Event, legs: &[&LedgerLeg], proceeds: &[&LedgerLeg]) {
        if legs.is_empty() {
            return;
        }
        let total: Decimal = proceeds.iter().map(|leg| leg.quantity()).sum();
        let currencies: BTreeSet<&str> = proceeds.iter().map(|leg| leg.asset.as_str()).collect();
        let fiat = proceeds
            .first()
            .map(|leg| leg.asset.clone())
            .unwrap_or_default();
        if currencies.len() > 1 {
            self.reports.diagnose(Diagnostic::MixedFiatProceeds {
                time: event.time,
                currencies: currencies.iter().map(|c| c.to_string()).collect(),
            });
        }

        let disposed = event.date();
        let shares = apportion(total, &quantities(legs));
        for (leg, leg_proceeds) in legs.iter().zip(shares) {
            let consumption = self.inventory.consume_fifo(&leg.asset, leg.quantity());
            let parts = apportion(leg_proceeds, &consumption_weights(&consumption));
            log::debug!(
                "Disposal {} {}: proceeds={}, covered={}, cost={}",
                leg.quantity(),
                leg.asset,
                leg_proceeds,
                consumption.covered(),
                consumption.cost()
            );

            for (slice, slice_proceeds) in consumption.slices.iter().zip(&parts) {
                let exemption = assess(
                    slice.acquired.date,
                    disposed,
                    slice.provenance.origin(),
                    self.config.exemption_days,
                );
                self.reports.record_disposal(DisposalRecord {
                    time: event.time,
                    asset: leg.asset.clone(),
                    fiat: fiat.clone(),
                    quantity: slice.quantity,
                    proceeds: *slice_proceeds,
                    acquired: Some(slice.acquired.clone()),
                    cost: slice.cost,
                    provenance: Some(slice.provenance),
                    exemption,
                });
            }

            if consumption.is_short() {
                self.shortfall(event, leg, OutflowKind::Disposal, &consumption);
                if self.config.underflow == UnderflowPolicy::Report {
                    self.reports.record_disposal(DisposalRecord {
                        time: event.time,
                        asset: leg.asset.clone(),
                        fiat: fiat.clone(),
                        quantity: consumption.shortfall,
                        proceeds: parts.last().copied().unwrap_or_default(),
                        acquired: None,
                        cost: Decimal::ZERO,
                        provenance: None,
                        exemption: Exemption::Indeterminate,
                    });
                }
            }
        }
    }

    /// Crypto-to-crypto conversion: the consumed slices' cost and dates move
    /// into the received assets, no gain is realised.
    fn swap(&mut self, event: &Event, outs: &[&LedgerLeg], ins: &[&LedgerLeg]) {
        let out_weights = quantities(outs);
        let in_weights = cost_weights(ins);
        // received[i][o]: quantity of inflow i paid for by outflow o
        let received: Vec<Vec<Decimal>> = ins
            .iter()
            .map(|leg| apportion(leg.quantity(), &out_weights))
            .collect();

        for (o, out) in outs.iter().enumerate() {
            let consumption = self.inventory.consume_fifo(&out.asset, out.quantity());
            let weights = consumption_weights(&consumption);
            let slice_costs: Vec<Vec<Decimal>> = consumption
                .slices
                .iter()
                .map(|slice| apportion(slice.cost, &in_weights))
                .collect();
            let origin_date = consumption.slices.first().map(|s| s.acquired.clone());

            for (i, inflow) in ins.iter().enumerate() {
                let quantity_in = received[i][o];
                let parts = apportion(quantity_in, &weights);
                let mut inherited = Decimal::ZERO;

                for (s, slice) in consumption.slices.iter().enumerate() {
                    let cost = slice_costs[s][i];
                    inherited += cost;
                    self.inventory.push(CostLot {
                        asset: inflow.asset.clone(),
                        quantity: parts[s],
                        total_cost: cost,
                        acquired: slice.acquired.clone(),
                        provenance: slice.provenance.inherited(),
                    });
                }
                if consumption.is_short() {
                    self.inventory.push(CostLot {
                        asset: inflow.asset.clone(),
                        quantity: parts.last().copied().unwrap_or_default(),
                        total_cost: Decimal::ZERO,
                        acquired: AcquisitionDate::known(event.date()),
                        provenance: Provenance::UnknownExternal,
                    });
                }

                self.reports.record_swap(SwapRecord {
                    time: event.time,
                    asset_out: out.asset.clone(),
                    quantity_out: out.quantity(),
                    asset_in: inflow.asset.clone(),
                    quantity_in,
                    inherited_cost: inherited,
                    origin_date: origin_date.clone(),
                });
            }

            self.shortfall(event, out, OutflowKind::Swap, &consumption);
        }
    }

    /// End the replay, reporting seed withdrawals that were never claimed.
    pub fn finish(mut self) -> Reconciliation {
        if !self.seed.is_empty() {
            log::warn!("{} seed withdrawals never matched a deposit", self.seed.len());
        }
        for (asset, record) in self.seed.remaining() {
            self.reports.diagnose(Diagnostic::UnmatchedSeed {
                asset: asset.to_string(),
                quantity: record.quantity,
                date: record.date.clone(),
            });
        }
        Reconciliation {
            reports: self.reports,
            inventory: self.inventory,
            seed: self.seed,
        }
    }
}

/// Replay every event of `grouper` in order.
pub fn reconcile(grouper: &EventGrouper, seed: SeedPool, config: &EngineConfig) -> Reconciliation {
    let mut reconciler = Reconciler::new(config.clone(), seed);
    let mut events = 0;
    for event in grouper.events() {
        reconciler.process(&event);
        events += 1;
    }
    log::info!(
        "Replayed {} events from {} ledger rows",
        events,
        grouper.legs().len()
    );
    reconciler.finish()
}
