// 🔗 Enrichment Merger - registry statuses joined back onto records
//
// Left join on the normalized identifier. Every input row comes out exactly
// once, in input order, whether or not a status was found; a lookup that
// failed entirely simply yields all-empty status columns.

use crate::record::{normalize_identifier, LoanRecord, RecordStore};
use crate::registry::RegistryStatus;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

/// Column headers appended to the export
pub const STATUS_COLUMN: &str = "영업상태";
pub const CLOSURE_DATE_COLUMN: &str = "폐업일";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub record: LoanRecord,
    /// None when the lookup failed or the registry did not know the identifier
    pub status: Option<RegistryStatus>,
}

pub fn merge(records: &[LoanRecord], statuses: &HashMap<String, RegistryStatus>) -> Vec<EnrichedRecord> {
    records
        .iter()
        .map(|record| EnrichedRecord {
            status: statuses.get(&record.normalized_identifier()).cloned(),
            record: record.clone(),
        })
        .collect()
}

/// Count of rows that received a status
pub fn matched_count(enriched: &[EnrichedRecord]) -> usize {
    enriched.iter().filter(|e| e.status.is_some()).count()
}

// ============================================================================
// EXPORT
// ============================================================================

/// Write the enriched dataset as CSV: every original column (identifier
/// normalized) followed by the status and closure date columns.
pub fn export_csv<W: Write>(store: &RecordStore, enriched: &[EnrichedRecord], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header: Vec<&str> = store.headers.iter().map(|h| h.as_str()).collect();
    header.push(STATUS_COLUMN);
    header.push(CLOSURE_DATE_COLUMN);
    wtr.write_record(&header).context("Failed to write CSV header")?;

    let id_col = store.columns.identifier;
    for row in enriched {
        let mut values = row.record.values.clone();
        if let Some(cell) = values.get_mut(id_col) {
            *cell = normalize_identifier(cell);
        }

        let (status, closure) = match &row.status {
            Some(s) => (s.raw_status.clone(), s.closure_date.clone().unwrap_or_default()),
            None => (String::new(), String::new()),
        };
        values.push(status);
        values.push(closure);

        wtr.write_record(&values)
            .with_context(|| format!("Failed to write row {}", row.record.row))?;
    }

    wtr.flush().context("Failed to flush CSV output")?;
    Ok(())
}

pub fn export_csv_file(store: &RecordStore, enriched: &[EnrichedRecord], path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    export_csv(store, enriched, file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::{record, sample_store};
    use proptest::prelude::*;

    fn active(id: &str) -> RegistryStatus {
        RegistryStatus::new(id, "계속사업자", Some("01"), Some(""))
    }

    #[test]
    fn test_merge_attaches_status_to_every_matching_row() {
        let store = sample_store();
        let mut statuses = HashMap::new();
        statuses.insert("1234567890".to_string(), active("1234567890"));

        let enriched = merge(store.records(), &statuses);

        assert_eq!(enriched.len(), store.len());
        assert_eq!(enriched[0].status.as_ref().map(|s| s.raw_status.as_str()), Some("계속사업자"));
        assert_eq!(enriched[1].status, enriched[0].status);
        assert_eq!(enriched[2].status, None);
        assert_eq!(enriched[3].status, None);
        assert_eq!(matched_count(&enriched), 2);
    }

    #[test]
    fn test_merge_with_empty_mapping_keeps_rows() {
        let store = sample_store();
        let enriched = merge(store.records(), &HashMap::new());

        assert_eq!(enriched.len(), store.len());
        assert!(enriched.iter().all(|e| e.status.is_none()));
        assert_eq!(
            enriched.iter().map(|e| e.record.row).collect::<Vec<_>>(),
            vec![2, 3, 4, 5]
        );
    }

    #[test]
    fn test_export_appends_status_columns() {
        let store = sample_store();
        let mut statuses = HashMap::new();
        statuses.insert(
            "2223344444".to_string(),
            RegistryStatus::new("2223344444", "폐업자", Some("03"), Some("20240131")),
        );
        let enriched = merge(store.records(), &statuses);

        let mut out = Vec::new();
        export_csv(&store, &enriched, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines[0].ends_with("비고,영업상태,폐업일"));
        assert!(lines[1].starts_with("1234567890,"));
        assert!(lines[1].ends_with(",,"));
        assert!(lines[3].starts_with("2223344444,"));
        assert!(lines[3].ends_with(",폐업자,20240131"));
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn test_export_to_file() {
        let store = sample_store();
        let enriched = merge(store.records(), &HashMap::new());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("enriched.csv");

        export_csv_file(&store, &enriched, &path).unwrap();

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        assert_eq!(rdr.headers().unwrap().len(), store.headers.len() + 2);
        assert_eq!(rdr.records().count(), store.len());
    }

    proptest! {
        #[test]
        fn prop_merge_never_drops_rows(
            ids in prop::collection::vec("[0-9]{3}-[0-9]{2}-[0-9]{5}", 1..40),
            known in prop::collection::vec(any::<bool>(), 40),
        ) {
            let records: Vec<LoanRecord> = ids
                .iter()
                .enumerate()
                .map(|(i, id)| record(i + 2, id, "서울특별시 강남구", Some(1.0)))
                .collect();
            let statuses: HashMap<String, RegistryStatus> = ids
                .iter()
                .zip(known.iter())
                .filter(|(_, k)| **k)
                .map(|(id, _)| (normalize_identifier(id), active(id)))
                .collect();

            let enriched = merge(&records, &statuses);

            prop_assert_eq!(enriched.len(), records.len());
            for (e, r) in enriched.iter().zip(records.iter()) {
                prop_assert_eq!(&e.record, r);
                prop_assert_eq!(e.status.is_some(), statuses.contains_key(&r.normalized_identifier()));
            }
        }
    }
}
