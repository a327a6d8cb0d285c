//! Inventory command - lots still held after the replay

use super::{format_money, format_quantity, EngineArgs};
use crate::core::{CostLot, Inventory};
use clap::Args;
use rust_decimal::Decimal;
use serde::Serialize;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct InventoryCommand {
    #[command(flatten)]
    engine: EngineArgs,

    /// Filter by asset (e.g., BTC, ETH)
    #[arg(short, long)]
    asset: Option<String>,

    /// Output as JSON instead of formatted table
    #[arg(long)]
    json: bool,
}

#[derive(Tabled)]
struct LotRow {
    #[tabled(rename = "Asset")]
    asset: String,
    #[tabled(rename = "Quantity")]
    quantity: String,
    #[tabled(rename = "Cost")]
    cost: String,
    #[tabled(rename = "Unit Cost")]
    unit_cost: String,
    #[tabled(rename = "Acquired")]
    acquired: String,
    #[tabled(rename = "Origin")]
    origin: String,
}

#[derive(Tabled)]
struct HoldingRow {
    #[tabled(rename = "Asset")]
    asset: String,
    #[tabled(rename = "Lots")]
    lots: usize,
    #[tabled(rename = "Balance")]
    balance: String,
    #[tabled(rename = "Cost")]
    cost: String,
}

/// Balance and remaining cost basis of one asset.
#[derive(Serialize)]
struct Holding<'a> {
    asset: &'a str,
    lots: usize,
    balance: Decimal,
    total_cost: Decimal,
}

#[derive(Serialize)]
struct InventoryOutput<'a> {
    assets: Vec<Holding<'a>>,
    lots: Vec<&'a CostLot>,
}

impl InventoryCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let result = self.engine.reconcile()?;
        let inventory = &result.inventory;
        if inventory.is_empty() {
            log::info!("Every lot was consumed by the end of the ledger");
        }
        let holdings = self.holdings(inventory);
        let lots = self.held_lots(inventory);

        if self.json {
            let output = InventoryOutput {
                assets: holdings,
                lots,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }

        if lots.is_empty() {
            println!("No lots held matching filters");
            return Ok(());
        }

        let rows: Vec<LotRow> = lots
            .iter()
            .map(|lot| LotRow {
                asset: lot.asset.clone(),
                quantity: format_quantity(lot.quantity),
                cost: format_money(lot.total_cost),
                unit_cost: format_money(lot.unit_cost()),
                acquired: lot.acquired.to_string(),
                origin: lot.provenance.label(),
            })
            .collect();

        println!();
        println!("LOTS HELD");
        println!();
        let table = Table::new(rows)
            .with(Style::rounded())
            .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
            .to_string();
        println!("{}", table);

        let rows: Vec<HoldingRow> = holdings
            .iter()
            .map(|h| HoldingRow {
                asset: h.asset.to_string(),
                lots: h.lots,
                balance: format_quantity(h.balance),
                cost: format_money(h.total_cost),
            })
            .collect();
        println!();
        println!("BALANCES");
        println!();
        let table = Table::new(rows)
            .with(Style::rounded())
            .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
            .to_string();
        println!("{}", table);
        Ok(())
    }

    fn held_assets<'a>(&self, inventory: &'a Inventory) -> Vec<&'a str> {
        let asset_filter = self.asset.as_ref().map(|a| a.to_uppercase());
        inventory
            .assets()
            .filter(|asset| asset_filter.as_deref().is_none_or(|a| a == *asset))
            .collect()
    }

    fn holdings<'a>(&self, inventory: &'a Inventory) -> Vec<Holding<'a>> {
        self.held_assets(inventory)
            .into_iter()
            .map(|asset| Holding {
                asset,
                lots: inventory.lots(asset).count(),
                balance: inventory.balance(asset),
                total_cost: inventory.total_cost(asset),
            })
            .collect()
    }

    fn held_lots<'a>(&self, inventory: &'a Inventory) -> Vec<&'a CostLot> {
        self.held_assets(inventory)
            .into_iter()
            .flat_map(|asset| inventory.lots(asset))
            .collect()
    }
}
