//! Schema command - print expected input and report formats

use super::summary::SummaryOutput;
use crate::core::{DiagnosticCsvRecord, DisposalCsvRecord, SwapCsvRecord, TransferCsvRecord};
use crate::csv_schema::CsvField;
use crate::ledger::LedgerCsvRecord;
use crate::seed::SeedCsvRecord;
use clap::Args;
use schemars::schema_for;

#[derive(Args, Debug)]
pub struct SchemaCommand {
    /// Which format to describe
    #[arg(value_enum, default_value = "ledger")]
    format: SchemaFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum SchemaFormat {
    /// Exchange transaction history (input)
    Ledger,
    /// Predecessor exchange FIFO report (input)
    Seed,
    /// 1_Vendas_IRS.csv
    Disposals,
    /// 2_Historico_Swaps.csv
    Swaps,
    /// 3_Reconciliacao_Transferencias.csv
    Transfers,
    /// 4_Diagnosticos.csv
    Diagnostics,
    /// JSON Schema of `summary --json`
    SummaryJson,
}

impl SchemaCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        match self.format {
            SchemaFormat::Ledger => print_csv_fields(
                "Ledger CSV (comma separated, other columns ignored)",
                LedgerCsvRecord::csv_schema(),
            ),
            SchemaFormat::Seed => print_csv_fields(
                "Seed CSV (semicolon separated, comma decimal mark)",
                SeedCsvRecord::csv_schema(),
            ),
            SchemaFormat::Disposals => {
                print_csv_fields("Disposal report", DisposalCsvRecord::csv_schema())
            }
            SchemaFormat::Swaps => print_csv_fields("Swap report", SwapCsvRecord::csv_schema()),
            SchemaFormat::Transfers => {
                print_csv_fields("Transfer report", TransferCsvRecord::csv_schema())
            }
            SchemaFormat::Diagnostics => {
                print_csv_fields("Diagnostics report", DiagnosticCsvRecord::csv_schema())
            }
            SchemaFormat::SummaryJson => {
                let schema = schema_for!(SummaryOutput);
                println!("{}", serde_json::to_string_pretty(&schema)?);
            }
        }
        Ok(())
    }
}

fn print_csv_fields(title: &str, fields: &[CsvField]) {
    println!("{}", title);
    println!("{}", "=".repeat(title.chars().count()));
    println!();
    for field in fields {
        let req = if field.required { "required" } else { "optional" };
        println!("{:20} ({:8})  {}", field.name, req, field.description);
    }
}
