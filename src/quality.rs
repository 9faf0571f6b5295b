// ✅ Data Quality Log - recoverable row-level issues
//
// Nothing recorded here is fatal. Rows with issues stay in every view they are
// still valid for; the log only counts and describes what was skipped or
// defaulted so the operator can see it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// ISSUE KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IssueKind {
    /// Amount cell present but not numeric
    UnparseableAmount,

    /// Amount missing where a sum needed it (counted as 0)
    MissingAmount,

    /// Date cell present but not a recognised date
    UnparseableDate,

    /// Business identifier empty after normalization
    MissingIdentifier,

    /// Address outside the region or without a district segment
    UnmatchedAddress,

    /// District resolved but absent from the boundary index
    MissingCoordinate,

    /// Resident id too short or not numeric
    UnparseableResidentId,

    /// Cell bytes were not valid UTF-8 (kept with replacement characters)
    InvalidEncoding,

    /// Row longer than the header row; the surplus cells were dropped
    ExtraCells,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::UnparseableAmount => "unparseable_amount",
            IssueKind::MissingAmount => "missing_amount",
            IssueKind::UnparseableDate => "unparseable_date",
            IssueKind::MissingIdentifier => "missing_identifier",
            IssueKind::UnmatchedAddress => "unmatched_address",
            IssueKind::MissingCoordinate => "missing_coordinate",
            IssueKind::UnparseableResidentId => "unparseable_resident_id",
            IssueKind::InvalidEncoding => "invalid_encoding",
            IssueKind::ExtraCells => "extra_cells",
        }
    }
}

// ============================================================================
// QUALITY EVENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityEvent {
    /// 1-based row in the source file (header is row 1)
    pub row: usize,
    pub field: String,
    pub kind: IssueKind,
    pub detail: String,
}

// ============================================================================
// QUALITY LOG
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityLog {
    events: Vec<QualityEvent>,
}

impl QualityLog {
    pub fn new() -> Self {
        QualityLog::default()
    }

    /// Record an issue and emit it at debug level
    pub fn record(&mut self, row: usize, field: &str, kind: IssueKind, detail: impl Into<String>) {
        let detail = detail.into();
        tracing::debug!(row, field, kind = kind.as_str(), %detail, "data quality issue");
        self.events.push(QualityEvent {
            row,
            field: field.to_string(),
            kind,
            detail,
        });
    }

    pub fn events(&self) -> &[QualityEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn count(&self, kind: IssueKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    /// Issue counts per kind, in a stable order
    pub fn counts(&self) -> BTreeMap<IssueKind, usize> {
        let mut counts = BTreeMap::new();
        for event in &self.events {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    pub fn summary(&self) -> String {
        if self.events.is_empty() {
            return "no data quality issues".to_string();
        }

        let parts: Vec<String> = self
            .counts()
            .iter()
            .map(|(kind, n)| format!("{} {}", n, kind.as_str()))
            .collect();

        format!("{} issue(s): {}", self.events.len(), parts.join(", "))
    }
}
