mod cmd;
mod core;
mod csv_schema;
mod ledger;
mod seed;

use clap::{Parser, Subcommand};

/// FIFO cost-lot reconciliation of a crypto exchange ledger
#[derive(Parser, Debug)]
#[command(name = "cryptolot", version, about)]
struct Opts {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay the ledger and write the disposal, swap, transfer and diagnostic reports
    Run(cmd::run::RunCommand),
    /// Per-asset totals of the disposals
    Summary(cmd::summary::SummaryCommand),
    /// Lots still held at the end of the ledger
    Inventory(cmd::inventory::InventoryCommand),
    /// List diagnostics; exits with status 1 if there are any
    Validate(cmd::validate::ValidateCommand),
    /// Describe the input and report formats
    Schema(cmd::schema::SchemaCommand),
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let opts = Opts::parse();
    match opts.command {
        Command::Run(run) => run.exec(),
        Command::Summary(summary) => summary.exec(),
        Command::Inventory(inventory) => inventory.exec(),
        Command::Validate(validate) => validate.exec(),
        Command::Schema(schema) => schema.exec(),
    }
}
