//! Column normalization and type coercion
//!
//! Maps the source column names of a [`RawRecordBatch`] onto the canonical
//! columns of an entity and coerces every cell to its declared type. Cells
//! that are empty become [`Value::Missing`]; cells that are non-empty but do
//! not parse also become `Missing` and are reported as [`CoercionWarning`]s.

use super::reader::{Delimiter, RawRecordBatch};
use crate::error::SchemaMismatchError;
use crate::schema::{ColumnType, EntityDescriptor, EntityKind};
use serde::Serialize;
use std::collections::HashSet;

/// A typed cell
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Integer(i64),
    Real(f64),
    Missing,
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// A non-empty cell that could not be coerced to its column's type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoercionWarning {
    /// 1-based data row (the header line is not counted)
    pub row: usize,
    pub column: &'static str,
    pub expected: ColumnType,
    pub raw: String,
}

/// How a lone separator in a numeric cell is read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecimalStyle {
    /// A single '.' or ',' is the decimal separator
    #[default]
    Auto,
    /// pt-BR: '.' groups thousands whenever the digits are grouped by three
    /// ("1.500" is 1500), ',' is the decimal separator
    Brazilian,
}

impl From<Delimiter> for DecimalStyle {
    /// Semicolon exports are written by pt-BR spreadsheets
    fn from(delimiter: Delimiter) -> Self {
        match delimiter {
            Delimiter::Comma => DecimalStyle::Auto,
            Delimiter::Semicolon => DecimalStyle::Brazilian,
        }
    }
}

/// Rows remapped to canonical columns, in declaration order
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecordBatch {
    pub entity: EntityKind,
    pub columns: Vec<&'static str>,
    pub rows: Vec<Vec<Value>>,
    pub warnings: Vec<CoercionWarning>,
}

impl NormalizedRecordBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| *c == name)
    }

    /// Distinct text values of a column, ignoring missing cells
    pub fn text_keys(&self, column: &str) -> HashSet<&str> {
        let Some(idx) = self.column_index(column) else {
            return HashSet::new();
        };
        self.rows
            .iter()
            .filter_map(|row| row.get(idx).and_then(Value::as_text))
            .collect()
    }

    /// Rows whose `column` holds a text value absent from `keys`
    pub fn count_unmatched(&self, column: &str, keys: &HashSet<&str>) -> usize {
        let Some(idx) = self.column_index(column) else {
            return 0;
        };
        self.rows
            .iter()
            .filter(|row| match row.get(idx) {
                Some(Value::Text(key)) => !keys.contains(key.as_str()),
                _ => true,
            })
            .count()
    }
}

/// Remap and coerce a raw batch against an entity descriptor.
pub fn normalize(
    batch: &RawRecordBatch,
    entity: &'static EntityDescriptor,
) -> Result<NormalizedRecordBatch, SchemaMismatchError> {
    let mut plan = Vec::new();
    let mut missing = Vec::new();

    for spec in entity.sourced_columns() {
        let sources: Vec<usize> = batch
            .columns
            .iter()
            .enumerate()
            .filter(|(_, name)| spec.matches(name))
            .map(|(idx, _)| idx)
            .collect();

        match sources.as_slice() {
            [] => missing.push(spec.name),
            [idx] => plan.push((spec, *idx)),
            _ => {
                return Err(SchemaMismatchError::AmbiguousColumn {
                    table: entity.table,
                    column: spec.name,
                    sources: sources.iter().map(|&i| batch.columns[i].clone()).collect(),
                })
            }
        }
    }

    if !missing.is_empty() {
        return Err(SchemaMismatchError::MissingColumns {
            table: entity.table,
            missing,
            found: batch.columns.clone(),
        });
    }

    let style = DecimalStyle::from(batch.delimiter);
    let mut warnings = Vec::new();
    let rows: Vec<Vec<Value>> = batch
        .rows
        .iter()
        .enumerate()
        .map(|(row_idx, raw_row)| {
            plan.iter()
                .map(|(spec, idx)| {
                    let raw = raw_row.get(*idx).map(String::as_str).unwrap_or("");
                    coerce(raw, spec.ty, style).unwrap_or_else(|| {
                        warnings.push(CoercionWarning {
                            row: row_idx + 1,
                            column: spec.name,
                            expected: spec.ty,
                            raw: raw.to_string(),
                        });
                        Value::Missing
                    })
                })
                .collect::<Vec<_>>()
        })
        .collect();

    Ok(NormalizedRecordBatch {
        entity: entity.kind,
        columns: plan.iter().map(|(spec, _)| spec.name).collect(),
        rows,
        warnings,
    })
}

/// Coerce one cell. `None` means a non-empty cell that failed to parse.
fn coerce(raw: &str, ty: ColumnType, style: DecimalStyle) -> Option<Value> {
    if raw.is_empty() {
        return Some(Value::Missing);
    }
    match ty {
        ColumnType::Text => Some(Value::Text(raw.to_string())),
        ColumnType::Integer if raw.trim().is_empty() => Some(Value::Missing),
        ColumnType::Real if raw.trim().is_empty() => Some(Value::Missing),
        ColumnType::Integer => parse_integer(raw, style).map(Value::Integer),
        ColumnType::Real => parse_real(raw, style).map(Value::Real),
    }
}

/// Parse an integer cell. Integral decimals ("3.0", "3,0") are accepted.
pub fn parse_integer(raw: &str, style: DecimalStyle) -> Option<i64> {
    let s = raw.trim();
    if let Ok(v) = s.parse::<i64>() {
        return Some(v);
    }

    let v = parse_real(s, style)?;
    // Beyond 2^53 the float no longer identifies a single integer
    const EXACT_LIMIT: f64 = 9_007_199_254_740_992.0;
    (v.fract() == 0.0 && v.abs() <= EXACT_LIMIT).then_some(v as i64)
}

/// Parse a real cell, accepting either '.' or ',' as the decimal separator.
///
/// With both present the later one is the decimal separator ("1.234,56",
/// "1,234.56"). A separator that repeats is a thousands separator
/// ("1.234.567"). Under [`DecimalStyle::Brazilian`] a lone '.' followed by
/// groups of three digits is a thousands separator too.
pub fn parse_real(raw: &str, style: DecimalStyle) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    let dots = s.matches('.').count();
    let commas = s.matches(',').count();
    let (decimal, thousands) = match (s.rfind('.'), s.rfind(',')) {
        (Some(dot), Some(comma)) if dot > comma => (Some('.'), Some(',')),
        (Some(_), Some(_)) => (Some(','), Some('.')),
        (Some(_), None) if dots > 1 => (None, Some('.')),
        (Some(_), None) if style == DecimalStyle::Brazilian && is_grouped(s, '.') => {
            (None, Some('.'))
        }
        (Some(_), None) => (Some('.'), None),
        (None, Some(_)) if commas > 1 => (None, Some(',')),
        (None, Some(_)) => (Some(','), None),
        (None, None) => (None, None),
    };

    if let Some(sep) = decimal {
        if s.matches(sep).count() > 1 {
            return None;
        }
    }

    let normalized: String = s
        .chars()
        .filter(|&c| Some(c) != thousands)
        .map(|c| if Some(c) == decimal { '.' } else { c })
        .collect();

    let v: f64 = normalized.parse().ok()?;
    v.is_finite().then_some(v)
}

/// Digits grouped by three with `sep`, e.g. "1.500" or "-12.345.678"
fn is_grouped(s: &str, sep: char) -> bool {
    let digits = s.strip_prefix(|c: char| c == '-' || c == '+').unwrap_or(s);
    let mut groups = digits.split(sep);
    let lead = groups.next().unwrap_or_default();
    let all_digits = |g: &str| g.bytes().all(|b| b.is_ascii_digit());
    (1..=3).contains(&lead.len())
        && all_digits(lead)
        && groups.all(|g| g.len() == 3 && all_digits(g))
}
