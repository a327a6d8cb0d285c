use serde::Serialize;

/// One column of a CSV input or report, as described by `#[derive(CsvSchema)]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CsvField {
    pub name: &'static str,
    pub required: bool,
    pub description: &'static str,
}
