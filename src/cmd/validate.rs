//! Validate command - surface data quality issues without writing reports

use super::{format_quantity, EngineArgs};
use crate::core::Diagnostic;
use clap::Args;
use serde::Serialize;

#[derive(Args, Debug)]
pub struct ValidateCommand {
    #[command(flatten)]
    engine: EngineArgs,

    /// Output as JSON instead of formatted text
    #[arg(long)]
    json: bool,
}

/// JSON output structure
#[derive(Debug, Serialize)]
struct ValidationOutput<'a> {
    ledger: String,
    issue_count: usize,
    issues: &'a [Diagnostic],
}

impl ValidateCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let result = self.engine.reconcile()?;
        let issues = &result.reports.diagnostics;

        if self.json {
            let output = ValidationOutput {
                ledger: self.engine.ledger.display().to_string(),
                issue_count: issues.len(),
                issues,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            print_text(issues);
        }

        // Exit with code 1 if issues found
        if !issues.is_empty() {
            std::process::exit(1);
        }
        Ok(())
    }
}

fn print_text(issues: &[Diagnostic]) {
    println!();
    println!("VALIDATION RESULTS");
    println!();

    if issues.is_empty() {
        println!("\u{2713} No issues found.");
        return;
    }

    println!("\u{26A0} {} issue(s) found:", issues.len());
    println!();
    for (i, issue) in issues.iter().enumerate() {
        let when = issue
            .time()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        let quantity = issue.quantity().map(format_quantity).unwrap_or_default();
        println!(
            "  {}. [{}] {} {} {}",
            i + 1,
            issue.kind(),
            when,
            quantity,
            issue.asset()
        );
        println!("     {}", issue.message());
        println!();
    }
}
