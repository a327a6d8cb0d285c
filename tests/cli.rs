//! E2E tests driving the cryptolot binary against the fixtures in tests/data

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

fn cryptolot(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cryptolot"))
        .args(args)
        .output()
        .expect("Failed to execute command")
}

fn out_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("cryptolot-{}-{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

/// Seeded BTC swapped into ETH keeps its cost and date through to the sale
#[test]
fn run_writes_reports_with_seeded_cost() {
    let dir = out_dir("run");
    let output = cryptolot(&[
        "run",
        "tests/data/ledger_basic.csv",
        "--seed",
        "tests/data/seed_basic.csv",
        "-o",
        dir.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "Command failed: {:?}", output);

    let disposals = fs::read_to_string(dir.join("1_Vendas_IRS.csv")).unwrap();
    let lines: Vec<_> = disposals.lines().collect();
    assert_eq!(lines.len(), 2, "{}", disposals);
    assert_eq!(
        lines[0],
        "Data_Venda;Ativo;Moeda_Venda;Valor_Venda;Data_Aquisicao;Custo_Aquisicao;Origem_Externa;Resultado;Isento_365d"
    );
    assert_eq!(
        lines[1],
        "2021-06-02;ETH;EUR;20000,00;01/01/2020;10000,00;Histórico (Semente) via Swap;10000,00;518 dias (ISENTO)"
    );

    let swaps = fs::read_to_string(dir.join("2_Historico_Swaps.csv")).unwrap();
    assert!(swaps.contains("2020-09-01;12:00:00;BTC;0,5;ETH;10;10000,00;01/01/2020"), "{}", swaps);

    let transfers = fs::read_to_string(dir.join("3_Reconciliacao_Transferencias.csv")).unwrap();
    let transfers: Vec<_> = transfers.lines().collect();
    assert_eq!(transfers.len(), 3);
    assert!(transfers[1].contains("BTC;0,5;ENTRADA;Histórico (Semente)"));
    assert!(transfers[2].contains("ADA;1000;SAÍDA;Para Carteira Externa"));

    let diagnostics = fs::read_to_string(dir.join("4_Diagnosticos.csv")).unwrap();
    assert!(diagnostics.contains("UnmatchedSeed"));

    fs::remove_dir_all(&dir).unwrap();
}

/// Without a seed ledger the deposit is of unknown origin
#[test]
fn run_without_seed_is_indeterminate() {
    let dir = out_dir("noseed");
    let output = cryptolot(&[
        "run",
        "tests/data/ledger_basic.csv",
        "-o",
        dir.to_str().unwrap(),
        "--dot-decimal",
        "--delimiter",
        ",",
    ]);
    assert!(output.status.success(), "Command failed: {:?}", output);

    let disposals = fs::read_to_string(dir.join("1_Vendas_IRS.csv")).unwrap();
    let row = disposals.lines().nth(1).unwrap();
    assert!(row.starts_with("2021-06-02,ETH,EUR,20000.00,2020-06-01,0.00,"), "{}", row);
    assert!(row.ends_with("Origem Externa via Swap,20000.00,TBD"), "{}", row);

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn summary_json_totals() {
    let output = cryptolot(&[
        "summary",
        "tests/data/ledger_basic.csv",
        "--seed",
        "tests/data/seed_basic.csv",
        "--json",
    ]);
    assert!(output.status.success(), "Command failed: {:?}", output);

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["ledger_sha256"].as_str().unwrap().len(), 64);
    assert_eq!(json["totals"]["disposals"], 1);
    assert_eq!(json["assets"][0]["asset"], "ETH");
    assert_eq!(json["diagnostics"], 1);
}

#[test]
fn summary_table_filters_by_year() {
    let output = cryptolot(&["summary", "tests/data/ledger_basic.csv", "--year", "2020"]);
    assert!(output.status.success(), "Command failed: {:?}", output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("DISPOSAL SUMMARY (2020)"));
    assert!(stdout.contains("No disposals found matching filters"));
}

#[test]
fn inventory_lists_remaining_lots() {
    let output = cryptolot(&[
        "inventory",
        "tests/data/ledger_basic.csv",
        "--asset",
        "ada",
        "--json",
    ]);
    assert!(output.status.success(), "Command failed: {:?}", output);

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let lots = json["lots"].as_array().unwrap();
    assert_eq!(lots.len(), 2);
    assert_eq!(lots[0]["provenance"]["kind"], "FiatPurchase");
    assert_eq!(lots[1]["provenance"]["kind"], "InternalAccrual");
    let assets = json["assets"].as_array().unwrap();
    assert_eq!(assets.len(), 1);
    assert_eq!(assets[0]["asset"], "ADA");
    assert_eq!(assets[0]["lots"], 2);
}

#[test]
fn validate_clean_ledger_succeeds() {
    let output = cryptolot(&["validate", "tests/data/ledger_basic.csv"]);
    assert!(output.status.success(), "Command failed: {:?}", output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No issues found"));
}

#[test]
fn validate_reports_shortfalls_and_exits_nonzero() {
    let output = cryptolot(&["validate", "tests/data/ledger_shortfall.csv", "--json"]);
    assert_eq!(output.status.code(), Some(1));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let kinds: Vec<_> = json["issues"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["type"].as_str().unwrap().to_string())
        .collect();
    assert!(kinds.contains(&"InventoryShortfall".to_string()));
    assert!(kinds.contains(&"UnpairedOutflow".to_string()));
    assert!(kinds.contains(&"MalformedNumber".to_string()));
}

#[test]
fn truncate_drops_uncovered_row() {
    let report = out_dir("report");
    let truncate = out_dir("truncate");
    for (dir, policy) in [(&report, "report"), (&truncate, "truncate")] {
        let output = cryptolot(&[
            "run",
            "tests/data/ledger_shortfall.csv",
            "--underflow",
            policy,
            "-o",
            dir.to_str().unwrap(),
        ]);
        assert!(output.status.success(), "Command failed: {:?}", output);
    }

    let reported = fs::read_to_string(report.join("1_Vendas_IRS.csv")).unwrap();
    assert_eq!(reported.lines().count(), 3);
    assert!(reported.contains(";Sem Lote;600,00;TBD"), "{}", reported);
    let truncated = fs::read_to_string(truncate.join("1_Vendas_IRS.csv")).unwrap();
    assert_eq!(truncated.lines().count(), 2);

    fs::remove_dir_all(&report).unwrap();
    fs::remove_dir_all(&truncate).unwrap();
}

#[test]
fn strict_numbers_rejects_malformed_amount() {
    let output = cryptolot(&["validate", "tests/data/ledger_shortfall.csv", "--strict-numbers"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("abc"), "{}", stderr);
}

#[test]
fn schema_describes_reports() {
    let output = cryptolot(&["schema", "disposals"]);
    assert!(output.status.success(), "Command failed: {:?}", output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Data_Venda"));
    assert!(stdout.contains("Isento_365d"));

    let output = cryptolot(&["schema", "summary-json"]);
    assert!(output.status.success(), "Command failed: {:?}", output);
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(json["properties"]["ledger_sha256"].is_object());
}
