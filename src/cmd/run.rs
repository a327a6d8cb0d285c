//! Run command - replay the ledger and write the CSV reports

use super::{format_money, EngineArgs};
use crate::core::ReportFormat;
use anyhow::Context;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct RunCommand {
    #[command(flatten)]
    engine: EngineArgs,

    /// Directory the reports are written to
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Field delimiter of the reports
    #[arg(long, default_value_t = ';')]
    delimiter: char,

    /// Use '.' as the decimal mark in the reports instead of ','
    #[arg(long)]
    dot_decimal: bool,
}

impl RunCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let format = ReportFormat {
            delimiter: u8::try_from(self.delimiter)
                .context("report delimiter must be a single-byte character")?,
            decimal_comma: !self.dot_decimal,
        };
        let result = self.engine.reconcile()?;
        let reports = &result.reports;
        let paths = reports.write_reports(&self.output, &format)?;

        println!("Disposals:   {} -> {}", reports.disposals.len(), paths.disposals.display());
        println!("Swaps:       {} -> {}", reports.swaps.len(), paths.swaps.display());
        println!("Transfers:   {} -> {}", reports.transfers.len(), paths.transfers.display());
        println!("Diagnostics: {} -> {}", reports.diagnostics.len(), paths.diagnostics.display());
        println!(
            "Proceeds {} | Costs {} | Result {} (rows sum to {})",
            format_money(reports.total_proceeds()),
            format_money(reports.total_cost()),
            format_money(reports.total_gain()),
            format_money(reports.displayed_gain())
        );
        if !result.seed.is_empty() {
            println!("Seed withdrawals never deposited: {}", result.seed.len());
        }
        if !reports.diagnostics.is_empty() {
            println!("Run `validate` for details on the diagnostics.");
        }
        Ok(())
    }
}
