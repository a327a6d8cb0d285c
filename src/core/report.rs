//! In-memory report rows and their CSV rendering.

use super::exemption::Exemption;
use super::inventory::{AcquisitionDate, Provenance};
use super::warnings::Diagnostic;
use crate::csv_schema::CsvField;
use chrono::{DateTime, Utc};
use cryptolot_derive::CsvSchema;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const DISPOSALS_FILE: &str = "1_Vendas_IRS.csv";
pub const SWAPS_FILE: &str = "2_Historico_Swaps.csv";
pub const TRANSFERS_FILE: &str = "3_Reconciliacao_Transferencias.csv";
pub const DIAGNOSTICS_FILE: &str = "4_Diagnosticos.csv";

/// Origin label for disposed quantity that no lot covered.
pub const NO_LOT_LABEL: &str = "Sem Lote";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("cannot write {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// A taxable sale of one lot slice for fiat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisposalRecord {
    pub time: DateTime<Utc>,
    pub asset: String,
    pub fiat: String,
    pub quantity: Decimal,
    pub proceeds: Decimal,
    /// `None` when no lot covered this quantity
    pub acquired: Option<AcquisitionDate>,
    pub cost: Decimal,
    pub provenance: Option<Provenance>,
    pub exemption: Exemption,
}

impl DisposalRecord {
    pub fn gain(&self) -> Decimal {
        self.proceeds - self.cost
    }

    pub fn origin_label(&self) -> String {
        self.provenance
            .map(|p| p.label())
            .unwrap_or_else(|| NO_LOT_LABEL.to_string())
    }

    /// Result rounded to cents, as the disposal report shows it.
    pub fn displayed_gain(&self) -> Decimal {
        self.gain().round_dp(2)
    }
}

/// Cost carried from a swapped-out asset into a swapped-in asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRecord {
    pub time: DateTime<Utc>,
    pub asset_out: String,
    pub quantity_out: Decimal,
    pub asset_in: String,
    pub quantity_in: Decimal,
    pub inherited_cost: Decimal,
    /// Oldest acquisition date among the inherited slices
    pub origin_date: Option<AcquisitionDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Inflow,
    Outflow,
}

impl Direction {
    pub fn label(self) -> &'static str {
        match self {
            Direction::Inflow => "ENTRADA",
            Direction::Outflow => "SAÍDA",
        }
    }
}

/// Movement to or from an external wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub time: DateTime<Utc>,
    pub asset: String,
    pub quantity: Decimal,
    pub direction: Direction,
    pub status: String,
}

/// Number rendering for the CSV reports.
#[derive(Debug, Clone, Copy)]
pub struct ReportFormat {
    pub delimiter: u8,
    pub decimal_comma: bool,
}

impl Default for ReportFormat {
    fn default() -> Self {
        ReportFormat {
            delimiter: b';',
            decimal_comma: true,
        }
    }
}

impl ReportFormat {
    /// Fiat amounts are shown with 2 decimals; the engine keeps full precision.
    pub fn money(&self, amount: Decimal) -> String {
        self.mark(format!("{:.2}", amount.round_dp(2)))
    }

    pub fn quantity(&self, amount: Decimal) -> String {
        self.mark(amount.normalize().to_string())
    }

    fn mark(&self, s: String) -> String {
        if self.decimal_comma {
            s.replace('.', ",")
        } else {
            s
        }
    }
}

fn date(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d").to_string()
}

fn clock(time: DateTime<Utc>) -> String {
    time.format("%H:%M:%S").to_string()
}

#[derive(Debug, Serialize, CsvSchema)]
pub struct DisposalCsvRecord {
    /// Date of the sale
    #[serde(rename = "Data_Venda")]
    pub date: String,
    /// Asset sold
    #[serde(rename = "Ativo")]
    pub asset: String,
    /// Fiat currency received
    #[serde(rename = "Moeda_Venda")]
    pub fiat: String,
    /// Proceeds attributed to this lot slice
    #[serde(rename = "Valor_Venda")]
    pub proceeds: String,
    /// Acquisition date of the lot
    #[serde(rename = "Data_Aquisicao")]
    pub acquired: String,
    /// Cost basis of the slice
    #[serde(rename = "Custo_Aquisicao")]
    pub cost: String,
    /// Origin of the lot
    #[serde(rename = "Origem_Externa")]
    pub origin: String,
    /// Proceeds minus cost
    #[serde(rename = "Resultado")]
    pub result: String,
    /// Holding period and exemption status
    #[serde(rename = "Isento_365d")]
    pub exemption: String,
}

impl DisposalCsvRecord {
    pub fn new(d: &DisposalRecord, format: &ReportFormat) -> Self {
        DisposalCsvRecord {
            date: date(d.time),
            asset: d.asset.clone(),
            fiat: d.fiat.clone(),
            proceeds: format.money(d.proceeds),
            acquired: d
                .acquired
                .as_ref()
                .map(|a| a.raw.clone())
                .unwrap_or_default(),
            cost: format.money(d.cost),
            origin: d.origin_label(),
            result: format.money(d.gain()),
            exemption: d.exemption.to_string(),
        }
    }
}

#[derive(Debug, Serialize, CsvSchema)]
pub struct SwapCsvRecord {
    /// Date of the swap
    #[serde(rename = "Data")]
    pub date: String,
    /// Time of the swap (UTC)
    #[serde(rename = "Hora")]
    pub time: String,
    /// Asset given up
    #[serde(rename = "Saiu")]
    pub asset_out: String,
    /// Quantity given up
    #[serde(rename = "Qtd_Saiu")]
    pub quantity_out: String,
    /// Asset received
    #[serde(rename = "Entrou")]
    pub asset_in: String,
    /// Quantity received from this outflow
    #[serde(rename = "Qtd_Entrou")]
    pub quantity_in: String,
    /// Cost basis carried into the received asset
    #[serde(rename = "Custo_Herdado")]
    pub inherited_cost: String,
    /// Oldest acquisition date carried over
    #[serde(rename = "Data_Orig")]
    pub origin_date: String,
}

impl SwapCsvRecord {
    pub fn new(s: &SwapRecord, format: &ReportFormat) -> Self {
        SwapCsvRecord {
            date: date(s.time),
            time: clock(s.time),
            asset_out: s.asset_out.clone(),
            quantity_out: format.quantity(s.quantity_out),
            asset_in: s.asset_in.clone(),
            quantity_in: format.quantity(s.quantity_in),
            inherited_cost: format.money(s.inherited_cost),
            origin_date: s
                .origin_date
                .as_ref()
                .map(|a| a.raw.clone())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, CsvSchema)]
pub struct TransferCsvRecord {
    /// Date of the movement
    #[serde(rename = "Data")]
    pub date: String,
    /// Time of the movement (UTC)
    #[serde(rename = "Hora")]
    pub time: String,
    /// Asset moved
    #[serde(rename = "Moeda")]
    pub asset: String,
    /// Quantity moved
    #[serde(rename = "Qtd")]
    pub quantity: String,
    /// ENTRADA (deposit) or SAÍDA (withdrawal)
    #[serde(rename = "Tipo")]
    pub direction: String,
    /// Matched origin of a deposit, or destination of a withdrawal
    #[serde(rename = "Status")]
    pub status: String,
}

impl TransferCsvRecord {
    pub fn new(t: &TransferRecord, format: &ReportFormat) -> Self {
        TransferCsvRecord {
            date: date(t.time),
            time: clock(t.time),
            asset: t.asset.clone(),
            quantity: format.quantity(t.quantity),
            direction: t.direction.label().to_string(),
            status: t.status.clone(),
        }
    }
}

#[derive(Debug, Serialize, CsvSchema)]
pub struct DiagnosticCsvRecord {
    /// Date of the event that raised it, if any
    #[serde(rename = "Data")]
    pub date: String,
    /// Time of the event that raised it, if any
    #[serde(rename = "Hora")]
    pub time: String,
    /// Diagnostic kind
    #[serde(rename = "Tipo")]
    pub kind: String,
    /// Asset concerned
    #[serde(rename = "Ativo")]
    pub asset: String,
    /// Quantity concerned
    #[serde(rename = "Qtd")]
    pub quantity: String,
    /// Explanation
    #[serde(rename = "Mensagem")]
    pub message: String,
}

impl DiagnosticCsvRecord {
    pub fn new(d: &Diagnostic, format: &ReportFormat) -> Self {
        DiagnosticCsvRecord {
            date: d.time().map(date).unwrap_or_default(),
            time: d.time().map(clock).unwrap_or_default(),
            kind: d.kind().to_string(),
            asset: d.asset(),
            quantity: d.quantity().map(|q| format.quantity(q)).unwrap_or_default(),
            message: d.message(),
        }
    }
}

/// Report rows collected during one run.
#[derive(Debug, Clone, Default)]
pub struct ReportAccumulator {
    pub disposals: Vec<DisposalRecord>,
    pub swaps: Vec<SwapRecord>,
    pub transfers: Vec<TransferRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Where [`ReportAccumulator::write_reports`] put each file.
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub disposals: PathBuf,
    pub swaps: PathBuf,
    pub transfers: PathBuf,
    pub diagnostics: PathBuf,
}

impl ReportAccumulator {
    pub fn record_disposal(&mut self, record: DisposalRecord) {
        self.disposals.push(record);
    }

    pub fn record_swap(&mut self, record: SwapRecord) {
        self.swaps.push(record);
    }

    pub fn record_transfer(&mut self, record: TransferRecord) {
        self.transfers.push(record);
    }

    pub fn diagnose(&mut self, diagnostic: Diagnostic) {
        log::warn!("{}: {} {}", diagnostic.kind(), diagnostic.asset(), diagnostic.message());
        self.diagnostics.push(diagnostic);
    }

    /// Exact proceeds across all disposal rows.
    pub fn total_proceeds(&self) -> Decimal {
        self.disposals.iter().map(|d| d.proceeds).sum()
    }

    pub fn total_cost(&self) -> Decimal {
        self.disposals.iter().map(|d| d.cost).sum()
    }

    pub fn total_gain(&self) -> Decimal {
        self.disposals.iter().map(|d| d.gain()).sum()
    }

    /// Sum of the 2-decimal results as displayed. Differs from
    /// [`Self::total_gain`] by display rounding only.
    pub fn displayed_gain(&self) -> Decimal {
        self.disposals.iter().map(|d| d.displayed_gain()).sum()
    }

    pub fn write_reports(&self, dir: &Path, format: &ReportFormat) -> Result<ReportPaths, ReportError> {
        std::fs::create_dir_all(dir).map_err(|source| ReportError::Create {
            path: dir.to_path_buf(),
            source,
        })?;
        let paths = ReportPaths {
            disposals: dir.join(DISPOSALS_FILE),
            swaps: dir.join(SWAPS_FILE),
            transfers: dir.join(TRANSFERS_FILE),
            diagnostics: dir.join(DIAGNOSTICS_FILE),
        };
        self.write_disposals(create(&paths.disposals)?, format)?;
        self.write_swaps(create(&paths.swaps)?, format)?;
        self.write_transfers(create(&paths.transfers)?, format)?;
        self.write_diagnostics(create(&paths.diagnostics)?, format)?;
        log::info!(
            "Wrote {} disposals, {} swaps, {} transfers, {} diagnostics to {}",
            self.disposals.len(),
            self.swaps.len(),
            self.transfers.len(),
            self.diagnostics.len(),
            dir.display()
        );
        Ok(paths)
    }

    pub fn write_disposals<W: Write>(&self, writer: W, format: &ReportFormat) -> Result<(), ReportError> {
        let rows = self.disposals.iter().map(|d| DisposalCsvRecord::new(d, format));
        write_csv(writer, DisposalCsvRecord::csv_header(), rows, format)
    }

    pub fn write_swaps<W: Write>(&self, writer: W, format: &ReportFormat) -> Result<(), ReportError> {
        let rows = self.swaps.iter().map(|s| SwapCsvRecord::new(s, format));
        write_csv(writer, SwapCsvRecord::csv_header(), rows, format)
    }

    pub fn write_transfers<W: Write>(&self, writer: W, format: &ReportFormat) -> Result<(), ReportError> {
        let rows = self.transfers.iter().map(|t| TransferCsvRecord::new(t, format));
        write_csv(writer, TransferCsvRecord::csv_header(), rows, format)
    }

    pub fn write_diagnostics<W: Write>(&self, writer: W, format: &ReportFormat) -> Result<(), ReportError> {
        let rows = self.diagnostics.iter().map(|d| DiagnosticCsvRecord::new(d, format));
        write_csv(writer, DiagnosticCsvRecord::csv_header(), rows, format)
    }
}

fn create(path: &Path) -> Result<BufWriter<File>, ReportError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|source| ReportError::Create {
            path: path.to_path_buf(),
            source,
        })
}

/// Header first, so an empty report still names its columns.
fn write_csv<W, I, R>(writer: W, header: &[&str], rows: I, format: &ReportFormat) -> Result<(), ReportError>
where
    W: Write,
    I: IntoIterator<Item = R>,
    R: Serialize,
{
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(format.delimiter)
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record(header)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn time() -> DateTime<Utc> {
        crate::ledger::parse_timestamp("2021-06-02 10:15:30").unwrap()
    }

    fn disposal(proceeds: Decimal, cost: Decimal) -> DisposalRecord {
        DisposalRecord {
            time: time(),
            asset: "BTC".to_string(),
            fiat: "EUR".to_string(),
            quantity: dec!(0.1),
            proceeds,
            acquired: Some(AcquisitionDate::parse("2020-01-01")),
            cost,
            provenance: Some(Provenance::MatchedExternalSeed),
            exemption: Exemption::Exempt { days: 518 },
        }
    }

    fn render<F>(write: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> Result<(), ReportError>,
    {
        let mut buf = Vec::new();
        write(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn empty_reports_still_have_headers() {
        let reports = ReportAccumulator::default();
        let format = ReportFormat::default();
        let out = render(|w| reports.write_disposals(w, &format));
        assert_eq!(
            out.trim(),
            "Data_Venda;Ativo;Moeda_Venda;Valor_Venda;Data_Aquisicao;Custo_Aquisicao;Origem_Externa;Resultado;Isento_365d"
        );
        let out = render(|w| reports.write_swaps(w, &format));
        assert!(out.starts_with("Data;Hora;Saiu;Qtd_Saiu;Entrou;Qtd_Entrou;Custo_Herdado;Data_Orig"));
        let out = render(|w| reports.write_transfers(w, &format));
        assert!(out.starts_with("Data;Hora;Moeda;Qtd;Tipo;Status"));
    }

    #[test]
    fn disposal_row_rounds_money_for_display() {
        let mut reports = ReportAccumulator::default();
        reports.record_disposal(disposal(dec!(20000.004), dec!(10000)));
        let out = render(|w| reports.write_disposals(w, &ReportFormat::default()));
        let row = out.lines().nth(1).unwrap();
        assert_eq!(
            row,
            "2021-06-02;BTC;EUR;20000,00;2020-01-01;10000,00;Histórico (Semente);10000,00;518 dias (ISENTO)"
        );
    }

    #[test]
    fn dot_decimal_format() {
        let format = ReportFormat {
            delimiter: b',',
            decimal_comma: false,
        };
        assert_eq!(format.money(dec!(1234.565)), "1234.56");
        assert_eq!(format.quantity(dec!(0.50000000)), "0.5");
        let comma = ReportFormat::default();
        assert_eq!(comma.money(dec!(7)), "7,00");
    }

    #[test]
    fn uncovered_disposal_is_labelled() {
        let mut record = disposal(dec!(100), Decimal::ZERO);
        record.provenance = None;
        record.acquired = None;
        assert_eq!(record.origin_label(), NO_LOT_LABEL);
        assert!(record.provenance.is_none());
    }

    #[test]
    fn displayed_totals_track_rounding_drift() {
        let mut reports = ReportAccumulator::default();
        reports.record_disposal(disposal(dec!(0.004), Decimal::ZERO));
        reports.record_disposal(disposal(dec!(0.004), Decimal::ZERO));
        assert_eq!(reports.total_gain(), dec!(0.008));
        assert_eq!(reports.displayed_gain(), Decimal::ZERO);
    }

    #[test]
    fn writes_all_files() {
        let dir = std::env::temp_dir().join(format!("cryptolot-report-{}", std::process::id()));
        let reports = ReportAccumulator::default();
        let paths = reports.write_reports(&dir, &ReportFormat::default()).unwrap();
        for path in [&paths.disposals, &paths.swaps, &paths.transfers, &paths.diagnostics] {
            assert!(path.exists(), "{} missing", path.display());
        }
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
