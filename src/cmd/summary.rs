//! Summary command - per-asset disposal totals

use super::{fingerprint, format_money, format_quantity, EngineArgs};
use crate::core::{DisposalRecord, Exemption};
use chrono::Datelike;
use clap::Args;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::Serialize;
use std::collections::BTreeMap;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct SummaryCommand {
    #[command(flatten)]
    engine: EngineArgs,

    /// Calendar year of the disposals to include
    #[arg(short, long)]
    year: Option<i32>,

    /// Filter by asset (e.g., BTC, ETH)
    #[arg(short, long)]
    asset: Option<String>,

    /// Output as JSON instead of formatted table
    #[arg(long)]
    json: bool,
}

/// Disposal totals of one asset.
#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct AssetSummary {
    pub asset: String,
    pub disposals: usize,
    #[schemars(with = "f64")]
    pub quantity: Decimal,
    #[schemars(with = "f64")]
    pub proceeds: Decimal,
    #[schemars(with = "f64")]
    pub cost: Decimal,
    #[schemars(with = "f64")]
    pub result: Decimal,
    /// Result of slices held longer than the exemption threshold
    #[schemars(with = "f64")]
    pub exempt_result: Decimal,
    /// Result of slices held for the threshold or less
    #[schemars(with = "f64")]
    pub taxable_result: Decimal,
    /// Result of slices without a verifiable acquisition date
    #[schemars(with = "f64")]
    pub indeterminate_result: Decimal,
}

impl AssetSummary {
    fn add(&mut self, d: &DisposalRecord) {
        let gain = d.gain();
        self.disposals += 1;
        self.quantity += d.quantity;
        self.proceeds += d.proceeds;
        self.cost += d.cost;
        self.result += gain;
        match d.exemption {
            Exemption::Exempt { .. } => self.exempt_result += gain,
            Exemption::Taxable { .. } => self.taxable_result += gain,
            Exemption::Indeterminate => self.indeterminate_result += gain,
        }
    }
}

/// JSON output of the summary command.
#[derive(Debug, Serialize, JsonSchema)]
pub struct SummaryOutput {
    /// SHA-256 of the ledger file the figures were computed from
    pub ledger_sha256: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    pub assets: Vec<AssetSummary>,
    pub totals: AssetSummary,
    /// Sum of the per-row results after rounding to cents, as the disposal
    /// report shows them
    #[schemars(with = "f64")]
    pub displayed_result: Decimal,
    pub diagnostics: usize,
}

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Asset")]
    asset: String,
    #[tabled(rename = "Disposals")]
    disposals: usize,
    #[tabled(rename = "Quantity")]
    quantity: String,
    #[tabled(rename = "Proceeds")]
    proceeds: String,
    #[tabled(rename = "Cost")]
    cost: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "Exempt")]
    exempt: String,
    #[tabled(rename = "Taxable")]
    taxable: String,
    #[tabled(rename = "TBD")]
    indeterminate: String,
}

impl From<&AssetSummary> for SummaryRow {
    fn from(s: &AssetSummary) -> Self {
        SummaryRow {
            asset: s.asset.clone(),
            disposals: s.disposals,
            quantity: format_quantity(s.quantity),
            proceeds: format_money(s.proceeds),
            cost: format_money(s.cost),
            result: format_money(s.result),
            exempt: format_money(s.exempt_result),
            taxable: format_money(s.taxable_result),
            indeterminate: format_money(s.indeterminate_result),
        }
    }
}

impl SummaryCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let result = self.engine.reconcile()?;
        let asset_filter = self.asset.as_ref().map(|a| a.to_uppercase());

        let disposals: Vec<&DisposalRecord> = result
            .reports
            .disposals
            .iter()
            .filter(|d| self.year.is_none_or(|y| d.time.year() == y))
            .filter(|d| asset_filter.as_ref().is_none_or(|a| &d.asset == a))
            .collect();

        let mut by_asset: BTreeMap<&str, AssetSummary> = BTreeMap::new();
        let mut totals = AssetSummary {
            asset: "TOTAL".to_string(),
            ..AssetSummary::default()
        };
        for d in &disposals {
            by_asset
                .entry(d.asset.as_str())
                .or_insert_with(|| AssetSummary {
                    asset: d.asset.clone(),
                    ..AssetSummary::default()
                })
                .add(d);
            totals.add(d);
        }

        let output = SummaryOutput {
            ledger_sha256: fingerprint(&self.engine.ledger)?,
            year: self.year,
            asset: asset_filter,
            assets: by_asset.into_values().collect(),
            totals,
            displayed_result: disposals.iter().map(|d| d.displayed_gain()).sum(),
            diagnostics: result.reports.diagnostics.len(),
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            print_summary(&output);
        }
        Ok(())
    }
}

fn print_summary(output: &SummaryOutput) {
    let year_str = output
        .year
        .map_or("All Years".to_string(), |y| y.to_string());

    println!();
    match &output.asset {
        Some(asset) => println!("DISPOSAL SUMMARY ({}, {})", year_str, asset),
        None => println!("DISPOSAL SUMMARY ({})", year_str),
    }
    println!("Ledger SHA-256: {}", output.ledger_sha256);
    println!();

    if output.assets.is_empty() {
        println!("No disposals found matching filters");
    } else {
        let mut rows: Vec<SummaryRow> = output.assets.iter().map(SummaryRow::from).collect();
        rows.push(SummaryRow::from(&output.totals));
        let table = Table::new(rows)
            .with(Style::rounded())
            .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
            .to_string();
        println!("{}", table);
        println!();
        println!(
            "Result {} (exact) | {} (sum of rounded rows)",
            output.totals.result, format_money(output.displayed_result)
        );
    }
    if output.diagnostics > 0 {
        println!("{} diagnostic(s); run `validate` for details", output.diagnostics);
    }
}
