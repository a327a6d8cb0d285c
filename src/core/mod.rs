pub mod classifier;
pub mod config;
pub mod events;
pub mod exemption;
pub mod inventory;
pub mod report;
pub mod warnings;

// What the commands and the seed reader need from the engine.
pub use classifier::{reconcile, Reconciliation};
pub use config::{EngineConfig, SeedTolerance, UnderflowPolicy};
pub use events::EventGrouper;
pub use exemption::Exemption;
pub use inventory::{CostLot, Inventory};
pub use report::{
    DiagnosticCsvRecord, DisposalCsvRecord, DisposalRecord, ReportFormat, SwapCsvRecord,
    TransferCsvRecord,
};
pub use warnings::Diagnostic;
