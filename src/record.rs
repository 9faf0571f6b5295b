// 📋 Record Store - loan guarantee rows in memory
//
// Ingestion parses the few columns the pipelines need and keeps every raw
// cell, so exports can reproduce the upload with extra columns appended.
// Parsing never fails on a bad cell: it records a quality event and leaves
// the typed field empty. Only missing required columns are fatal.

use crate::config::ColumnMap;
use crate::error::IngestError;
use crate::quality::{IssueKind, QualityLog};
use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

// ============================================================================
// IDENTIFIER NORMALIZATION
// ============================================================================

/// Strip separators from a business identifier ("123-45-67890" → "1234567890").
///
/// Only alphanumeric characters survive. Every join and lookup keys on this form.
pub fn normalize_identifier(raw: &str) -> String {
    raw.chars().filter(|c| c.is_alphanumeric()).collect()
}

// ============================================================================
// LOAN RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanRecord {
    /// 1-based row in the source file (header is row 1)
    pub row: usize,

    /// Business identifier as uploaded (not normalized)
    pub identifier: String,
    pub address: Option<String>,
    pub amount: Option<f64>,
    pub bank: String,
    pub date: Option<NaiveDate>,

    // Optional columns (None when the column is absent or the cell is empty)
    pub industry: Option<String>,
    pub working_capital: Option<f64>,
    pub resident_id: Option<String>,

    /// Every cell of the row, in header order
    pub values: Vec<String>,
}

impl LoanRecord {
    pub fn normalized_identifier(&self) -> String {
        normalize_identifier(&self.identifier)
    }

    pub fn year(&self) -> Option<i32> {
        self.date.map(|d| d.year())
    }
}

// ============================================================================
// RECORD STORE
// ============================================================================

/// Column positions resolved against the uploaded header row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnIndex {
    pub identifier: usize,
    pub address: usize,
    pub amount: usize,
    pub bank: usize,
    pub date: usize,
    pub industry: Option<usize>,
    pub working_capital: Option<usize>,
    pub resident_id: Option<usize>,
}

impl ColumnIndex {
    /// Resolve column positions, failing with every missing required column named
    pub fn resolve(headers: &[String], columns: &ColumnMap) -> Result<Self, IngestError> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);

        let required = [
            &columns.identifier,
            &columns.address,
            &columns.amount,
            &columns.bank,
            &columns.date,
        ];
        let missing: Vec<String> = required
            .iter()
            .filter(|name| find(name).is_none())
            .map(|name| name.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(IngestError::MissingColumns { missing });
        }

        Ok(ColumnIndex {
            identifier: find(&columns.identifier).unwrap_or_default(),
            address: find(&columns.address).unwrap_or_default(),
            amount: find(&columns.amount).unwrap_or_default(),
            bank: find(&columns.bank).unwrap_or_default(),
            date: find(&columns.date).unwrap_or_default(),
            industry: find(&columns.industry),
            working_capital: find(&columns.working_capital),
            resident_id: find(&columns.resident_id),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordStore {
    pub headers: Vec<String>,
    pub columns: ColumnIndex,
    pub records: Vec<LoanRecord>,
}

impl RecordStore {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[LoanRecord] {
        &self.records
    }

    /// Same headers, a different set of rows
    pub fn with_records(&self, records: Vec<LoanRecord>) -> RecordStore {
        RecordStore {
            headers: self.headers.clone(),
            columns: self.columns.clone(),
            records,
        }
    }

    /// Raw identifiers in row order (duplicates and empties included)
    pub fn identifiers(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.identifier.as_str()).collect()
    }

    /// Earliest and latest parseable dates
    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        let mut dates = self.records.iter().filter_map(|r| r.date);
        let first = dates.next()?;
        Some(dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d))))
    }
}

// ============================================================================
// INGESTION
// ============================================================================

/// Result of loading a dataset: the store plus every recoverable issue found
#[derive(Debug, Clone)]
pub struct Ingested {
    pub store: RecordStore,
    pub quality: QualityLog,
}

pub fn load_csv(csv_path: &Path, columns: &ColumnMap) -> Result<Ingested> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open CSV file: {}", csv_path.display()))?;
    let ingested = read_records(file, columns)
        .with_context(|| format!("Failed to load dataset: {}", csv_path.display()))?;
    Ok(ingested)
}

/// Parse a UTF-8 CSV stream into a record store
pub fn read_records<R: Read>(reader: R, columns: &ColumnMap) -> Result<Ingested, IngestError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| IngestError::Unreadable {
            reason: e.to_string(),
        })?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let index = ColumnIndex::resolve(&headers, columns)?;
    let mut quality = QualityLog::new();
    let mut records = Vec::new();

    // Byte records: a bad cell costs a quality event, not the whole file
    for (line_num, result) in rdr.byte_records().enumerate() {
        let row = line_num + 2; // 1-indexed + header row
        let raw = result.map_err(|e| IngestError::Unreadable {
            reason: format!("line {}: {}", row, e),
        })?;

        let mut values = decode_cells(row, &raw, &headers, &mut quality);
        if values.len() > headers.len() {
            let extra = values.split_off(headers.len());
            quality.record(
                row,
                "*",
                IssueKind::ExtraCells,
                format!("{} extra cell(s): {}", extra.len(), extra.join(",")),
            );
        }
        values.resize(headers.len(), String::new());

        records.push(parse_row(row, values, &index, columns, &mut quality));
    }

    tracing::info!(
        rows = records.len(),
        issues = quality.len(),
        "dataset loaded"
    );

    Ok(Ingested {
        store: RecordStore {
            headers,
            columns: index,
            records,
        },
        quality,
    })
}

fn decode_cells(
    row: usize,
    raw: &csv::ByteRecord,
    headers: &[String],
    quality: &mut QualityLog,
) -> Vec<String> {
    raw.iter()
        .enumerate()
        .map(|(i, cell)| match std::str::from_utf8(cell) {
            Ok(v) => v.to_string(),
            Err(_) => {
                let lossy = String::from_utf8_lossy(cell).into_owned();
                let field = headers.get(i).map(|h| h.as_str()).unwrap_or("*");
                quality.record(row, field, IssueKind::InvalidEncoding, lossy.clone());
                lossy
            }
        })
        .collect()
}

fn parse_row(
    row: usize,
    values: Vec<String>,
    index: &ColumnIndex,
    columns: &ColumnMap,
    quality: &mut QualityLog,
) -> LoanRecord {
    let cell = |i: usize| values.get(i).map(|v| v.trim()).unwrap_or("");
    let optional_cell = |i: Option<usize>| {
        i.map(cell)
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
    };

    let identifier = cell(index.identifier).to_string();
    if normalize_identifier(&identifier).is_empty() {
        quality.record(row, &columns.identifier, IssueKind::MissingIdentifier, identifier.clone());
    }

    let amount_raw = cell(index.amount);
    let amount = parse_amount(amount_raw);
    if amount.is_none() && !amount_raw.is_empty() {
        quality.record(row, &columns.amount, IssueKind::UnparseableAmount, amount_raw);
    }

    let date_raw = cell(index.date);
    let date = parse_date(date_raw);
    if date.is_none() && !date_raw.is_empty() {
        quality.record(row, &columns.date, IssueKind::UnparseableDate, date_raw);
    }

    let working_capital_raw = optional_cell(index.working_capital);
    let working_capital = working_capital_raw.as_deref().and_then(parse_amount);
    if let (Some(raw), None) = (&working_capital_raw, working_capital) {
        quality.record(row, &columns.working_capital, IssueKind::UnparseableAmount, raw.clone());
    }

    LoanRecord {
        row,
        identifier,
        address: optional_cell(Some(index.address)),
        amount,
        bank: cell(index.bank).to_string(),
        date,
        industry: optional_cell(index.industry),
        working_capital,
        resident_id: optional_cell(index.resident_id),
        values,
    }
}

/// Numeric cell with optional thousands separators ("1,500,000" → 1500000.0)
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Dates as spreadsheets export them; anything else is None
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y%m%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(d);
        }
    }

    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }

    None
}

// ============================================================================
// FILTER
// ============================================================================

/// Operator filter. A `None` criterion means "select all".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordFilter {
    pub banks: Option<Vec<String>>,
    pub years: Option<Vec<i32>>,
    pub industries: Option<Vec<String>>,
    /// Inclusive on both ends
    pub date_range: Option<(NaiveDate, NaiveDate)>,
}

impl RecordFilter {
    pub fn all() -> Self {
        RecordFilter::default()
    }

    pub fn is_unrestricted(&self) -> bool {
        self.banks.is_none()
            && self.years.is_none()
            && self.industries.is_none()
            && self.date_range.is_none()
    }

    pub fn matches(&self, record: &LoanRecord) -> bool {
        if let Some(banks) = &self.banks {
            if !banks.iter().any(|b| b == &record.bank) {
                return false;
            }
        }

        if let Some(years) = &self.years {
            match record.year() {
                Some(y) if years.contains(&y) => {}
                _ => return false,
            }
        }

        if let Some(industries) = &self.industries {
            match &record.industry {
                Some(i) if industries.contains(i) => {}
                _ => return false,
            }
        }

        if let Some((start, end)) = self.date_range {
            match record.date {
                Some(d) if d >= start && d <= end => {}
                _ => return false,
            }
        }

        true
    }

    pub fn apply(&self, store: &RecordStore) -> RecordStore {
        let records = store
            .records
            .iter()
            .filter(|r| self.matches(r))
            .cloned()
            .collect();
        store.with_records(records)
    }
}

/// Filter as it arrives from a query string or the command line.
/// Lists are comma separated; dates are YYYY-MM-DD.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterParams {
    pub bank: Option<String>,
    pub year: Option<String>,
    pub industry: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

fn split_list(raw: &Option<String>) -> Option<Vec<String>> {
    let items: Vec<String> = raw
        .as_deref()?
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

impl FilterParams {
    pub fn to_filter(&self) -> Result<RecordFilter> {
        let years = match split_list(&self.year) {
            Some(items) => Some(
                items
                    .iter()
                    .map(|y| y.parse::<i32>().with_context(|| format!("Invalid year: {}", y)))
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => None,
        };

        let parse_bound = |raw: &Option<String>| -> Result<Option<NaiveDate>> {
            match raw.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map(Some)
                    .with_context(|| format!("Invalid date (expected YYYY-MM-DD): {}", s)),
                None => Ok(None),
            }
        };
        let from = parse_bound(&self.from)?;
        let to = parse_bound(&self.to)?;

        let date_range = match (from, to) {
            (None, None) => None,
            (start, end) => {
                let start = start.unwrap_or(NaiveDate::MIN);
                let end = end.unwrap_or(NaiveDate::MAX);
                if start > end {
                    anyhow::bail!("Date range is empty: {} > {}", start, end);
                }
                Some((start, end))
            }
        };

        Ok(RecordFilter {
            banks: split_list(&self.bank),
            years,
            industries: split_list(&self.industry),
            date_range,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
