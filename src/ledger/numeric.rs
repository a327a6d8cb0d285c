//! Normalization of locale-ambiguous numeric strings into exact decimals.
//!
//! Exchange exports mix `1234.56`, `1.234,56`, `1,234.56` and `1.5E-8`.
//! Everything funnels through [`normalize`] so the engine only ever sees
//! [`Decimal`] values.

use rust_decimal::Decimal;
use std::str::FromStr;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NumericError {
    #[error("not a number: '{0}'")]
    Malformed(String),
}

/// What to do with a value that cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedNumberPolicy {
    /// Substitute zero and carry on (the run records a diagnostic).
    #[default]
    Zero,
    /// Fail the read.
    Reject,
}

/// Parse a numeric string written with either `,` or `.` as decimal mark.
///
/// Empty input is zero. When both separators appear, the last one is the
/// decimal mark. A separator appearing more than once is a thousands
/// separator. A single `,` is a decimal mark.
pub fn normalize(value: &str) -> Result<Decimal, NumericError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(Decimal::ZERO);
    }

    if let Some(scientific) = scientific_notation(trimmed) {
        return Decimal::from_scientific(&scientific)
            .map_err(|_| NumericError::Malformed(value.to_string()));
    }

    let cleaned: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();
    let canonical = canonicalize(&cleaned);

    Decimal::from_str(&canonical).map_err(|_| NumericError::Malformed(value.to_string()))
}

/// [`normalize`], applying `policy` on failure.
pub fn normalize_with(value: &str, policy: MalformedNumberPolicy) -> Result<Decimal, NumericError> {
    match normalize(value) {
        Ok(amount) => Ok(amount),
        Err(err) => match policy {
            MalformedNumberPolicy::Zero => {
                log::warn!("{}, using 0", err);
                Ok(Decimal::ZERO)
            }
            MalformedNumberPolicy::Reject => Err(err),
        },
    }
}

fn scientific_notation(s: &str) -> Option<String> {
    let (mantissa, exponent) = s.split_once(['e', 'E'])?;
    let mantissa_ok = !mantissa.is_empty()
        && mantissa
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-' | '+'));
    let exponent_ok = exponent.parse::<i32>().is_ok();
    if mantissa_ok && exponent_ok {
        Some(format!("{}e{}", mantissa.replace(',', "."), exponent))
    } else {
        None
    }
}

fn canonicalize(s: &str) -> String {
    match (s.rfind(','), s.rfind('.')) {
        (Some(comma), Some(dot)) => {
            let (decimal, thousands) = if comma > dot { (',', '.') } else { ('.', ',') };
            s.chars()
                .filter(|&c| c != thousands)
                .map(|c| if c == decimal { '.' } else { c })
                .collect()
        }
        (Some(_), None) if s.matches(',').count() > 1 => s.replace(',', ""),
        (Some(_), None) => s.replace(',', "."),
        (None, Some(_)) if s.matches('.').count() > 1 => s.replace('.', ""),
        _ => s.to_string(),
    }
}
