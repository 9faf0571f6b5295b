use crate::config::ColumnMap;
use crate::record::{ColumnIndex, LoanRecord, RecordStore};
use crate::registry::{BusinessStatus, RegistryStatus};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Compute idempotency hash for duplicate detection
/// Row position + every raw cell, so re-importing the same file is a no-op
/// while identical rows at different positions stay distinct.
pub fn compute_idempotency_hash(record: &LoanRecord) -> String {
    let mut hasher = Sha256::new();
    hasher.update(record.row.to_string());
    for value in &record.values {
        hasher.update([0x1fu8]);
        hasher.update(value.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Event for audit trail (imports, lookups, batch failures)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// Outcome of one import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStats {
    pub inserted: usize,
    pub duplicates: usize,
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Records Table (parsed fields + every raw cell as JSON)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            idempotency_hash TEXT UNIQUE NOT NULL,
            row_number INTEGER NOT NULL,
            identifier TEXT NOT NULL,
            address TEXT,
            amount REAL,
            bank TEXT NOT NULL,
            date TEXT,
            industry TEXT,
            working_capital REAL,
            resident_id TEXT,
            raw_values TEXT NOT NULL,
            source_file TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Columns Table (header order shared by every import)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS columns (
            position INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Registry Statuses (one row per normalized identifier, last lookup wins)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS registry_statuses (
            identifier TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            raw_status TEXT NOT NULL,
            closure_date TEXT,
            checked_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_idempotency_hash ON records(idempotency_hash)",
        [],
    )?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_date ON records(date)", [])?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_bank ON records(bank)", [])?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;

    Ok(())
}

/// Replace the stored header row
pub fn save_columns(conn: &Connection, headers: &[String]) -> Result<()> {
    conn.execute("DELETE FROM columns", [])?;
    for (position, name) in headers.iter().enumerate() {
        conn.execute(
            "INSERT INTO columns (position, name) VALUES (?1, ?2)",
            params![position as i64, name],
        )?;
    }
    Ok(())
}

pub fn load_columns(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM columns ORDER BY position")?;
    let headers = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(headers)
}

/// Store a loaded dataset. Rows already present are skipped.
///
/// Raw cells are stored positionally, so every import must share the header
/// row of the first one. A file with another layout is rejected before any
/// row is written.
pub fn insert_records(conn: &Connection, store: &RecordStore, source_file: &str) -> Result<ImportStats> {
    let stored = load_columns(conn)?;
    if stored.is_empty() {
        save_columns(conn, &store.headers)?;
    } else if stored != store.headers {
        return Err(anyhow!(
            "Header row of {} does not match the stored dataset (stored: [{}], file: [{}])",
            source_file,
            stored.join(", "),
            store.headers.join(", ")
        ));
    }

    let mut inserted = 0;
    let mut duplicates = 0;

    for record in store.records() {
        let hash = compute_idempotency_hash(record);
        let raw_values = serde_json::to_string(&record.values)?;

        let result = conn.execute(
            "INSERT INTO records (
                idempotency_hash, row_number, identifier, address, amount, bank, date,
                industry, working_capital, resident_id, raw_values, source_file
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                hash,
                record.row as i64,
                record.identifier,
                record.address,
                record.amount,
                record.bank,
                record.date.map(|d| d.format(DATE_FORMAT).to_string()),
                record.industry,
                record.working_capital,
                record.resident_id,
                raw_values,
                source_file,
            ],
        );

        match result {
            Ok(_) => inserted += 1,
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    let event = Event::new(
        "dataset_imported",
        "dataset",
        source_file,
        serde_json::json!({
            "rows": store.len(),
            "inserted": inserted,
            "duplicates": duplicates,
        }),
        "csv_importer",
    );
    insert_event(conn, &event)?;

    tracing::info!(inserted, duplicates, source_file, "records stored");

    Ok(ImportStats { inserted, duplicates })
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

/// Rebuild the record store from the database, rows in import order
pub fn get_all_records(conn: &Connection, columns: &ColumnMap) -> Result<RecordStore> {
    let headers = load_columns(conn)?;
    if headers.is_empty() {
        return Err(anyhow!("No dataset imported yet"));
    }
    let index = ColumnIndex::resolve(&headers, columns)
        .context("Stored header row does not match the configured columns")?;

    let mut stmt = conn.prepare(
        "SELECT row_number, identifier, address, amount, bank, date,
                industry, working_capital, resident_id, raw_values
         FROM records
         ORDER BY id",
    )?;

    let records = stmt
        .query_map([], |row| {
            let row_number: i64 = row.get(0)?;
            let date_str: Option<String> = row.get(5)?;
            let raw_values: String = row.get(9)?;

            Ok(LoanRecord {
                row: row_number as usize,
                identifier: row.get(1)?,
                address: row.get(2)?,
                amount: row.get(3)?,
                bank: row.get(4)?,
                date: date_str.and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok()),
                industry: row.get(6)?,
                working_capital: row.get(7)?,
                resident_id: row.get(8)?,
                values: serde_json::from_str(&raw_values)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RecordStore {
        headers,
        columns: index,
        records,
    })
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;

    Ok(count)
}

// ============================================================================
// REGISTRY STATUSES
// ============================================================================

/// Upsert looked-up statuses; returns how many rows were written
pub fn save_statuses(conn: &Connection, statuses: &HashMap<String, RegistryStatus>) -> Result<usize> {
    let checked_at = Utc::now().to_rfc3339();
    let mut written = 0;

    for status in statuses.values() {
        conn.execute(
            "INSERT INTO registry_statuses (identifier, status, raw_status, closure_date, checked_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(identifier) DO UPDATE SET
                status = excluded.status,
                raw_status = excluded.raw_status,
                closure_date = excluded.closure_date,
                checked_at = excluded.checked_at",
            params![
                status.identifier,
                status.status.as_str(),
                status.raw_status,
                status.closure_date,
                checked_at,
            ],
        )?;
        written += 1;
    }

    Ok(written)
}

pub fn load_statuses(conn: &Connection) -> Result<HashMap<String, RegistryStatus>> {
    let mut stmt = conn.prepare(
        "SELECT identifier, status, raw_status, closure_date FROM registry_statuses",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut statuses = HashMap::new();
    for (identifier, label, raw_status, closure_date) in rows {
        let status: BusinessStatus = label
            .parse()
            .map_err(|e: String| anyhow!("Bad stored status for {}: {}", identifier, e))?;
        statuses.insert(
            identifier.clone(),
            RegistryStatus {
                identifier,
                status,
                raw_status,
                closure_date,
            },
        );
    }

    Ok(statuses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::sample_store;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_idempotency_import_twice() {
        let conn = test_db();
        let store = sample_store();

        // First import
        let first = insert_records(&conn, &store, "loans.csv").unwrap();
        let count1 = verify_count(&conn).unwrap();

        // Second import (same rows)
        let second = insert_records(&conn, &store, "loans.csv").unwrap();
        let count2 = verify_count(&conn).unwrap();

        assert_eq!(first, ImportStats { inserted: 4, duplicates: 0 });
        assert_eq!(count1, 4);
        assert_eq!(
            second,
            ImportStats { inserted: 0, duplicates: 4 },
            "Second import should insert 0 records (all duplicates)"
        );
        assert_eq!(count2, 4);
    }

    #[test]
    fn test_compute_idempotency_hash() {
        let store = sample_store();
        let a = &store.records()[0];

        let hash1 = compute_idempotency_hash(a);
        let hash2 = compute_idempotency_hash(a);

        assert_eq!(hash1, hash2, "Same record should produce same hash");
        assert_eq!(hash1.len(), 64, "SHA-256 hash should be 64 hex characters");

        // Same cells at another row are a different record
        let mut moved = a.clone();
        moved.row += 10;
        assert_ne!(compute_idempotency_hash(&moved), hash1);
    }

    #[test]
    fn test_records_roundtrip_through_database() {
        let conn = test_db();
        let store = sample_store();
        insert_records(&conn, &store, "loans.csv").unwrap();

        let loaded = get_all_records(&conn, &ColumnMap::default()).unwrap();

        assert_eq!(loaded, store);
    }

    #[test]
    fn test_import_with_other_layout_is_rejected() {
        let conn = test_db();
        insert_records(&conn, &sample_store(), "loans.csv").unwrap();

        let reordered = "\
은행구분,기표일자,사업자번호,사업장주소,실행/해지금액(원)
국민은행,2024-01-01,555-55-55555,서울특별시 중구 세종대로 1,10
";
        let other = crate::record::read_records(reordered.as_bytes(), &ColumnMap::default())
            .unwrap()
            .store;

        let err = insert_records(&conn, &other, "reordered.csv").unwrap_err();
        assert!(err.to_string().contains("reordered.csv"));
        assert_eq!(verify_count(&conn).unwrap(), 4);
        assert!(get_events_for_entity(&conn, "dataset", "reordered.csv")
            .unwrap()
            .is_empty());

        // The stored dataset still exports with one consistent layout
        let loaded = get_all_records(&conn, &ColumnMap::default()).unwrap();
        let enriched = crate::enrich::merge(loaded.records(), &HashMap::new());
        let mut out = Vec::new();
        crate::enrich::export_csv(&loaded, &enriched, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("사업자번호,사업장주소"));
        assert!(lines[1].starts_with("1234567890,서울특별시 강남구"));
    }

    #[test]
    fn test_second_file_with_same_layout_appends() {
        let conn = test_db();
        insert_records(&conn, &sample_store(), "loans.csv").unwrap();

        let more = format!(
            "{}\n999-99-99999,서울특별시 종로구 종로 1,5000,하나은행,2024-02-01,,,,\n",
            sample_store().headers.join(",")
        );
        let next = crate::record::read_records(more.as_bytes(), &ColumnMap::default())
            .unwrap()
            .store;

        let stats = insert_records(&conn, &next, "loans-2024.csv").unwrap();
        assert_eq!(stats, ImportStats { inserted: 1, duplicates: 0 });
        assert_eq!(verify_count(&conn).unwrap(), 5);
    }

    #[test]
    fn test_get_all_records_on_empty_database() {
        let conn = test_db();
        assert!(get_all_records(&conn, &ColumnMap::default()).is_err());
    }

    #[test]
    fn test_event_log() {
        let conn = test_db();

        let event = Event::new(
            "test_event",
            "lookup",
            "test_id_123",
            serde_json::json!({"test": "data"}),
            "test_actor",
        );

        insert_event(&conn, &event).unwrap();

        let events = get_events_for_entity(&conn, "lookup", "test_id_123").unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "test_event");
        assert_eq!(events[0].actor, "test_actor");
        assert_eq!(events[0].data["test"], "data");
    }

    #[test]
    fn test_import_writes_audit_event() {
        let conn = test_db();
        insert_records(&conn, &sample_store(), "loans.csv").unwrap();

        let events = get_events_for_entity(&conn, "dataset", "loans.csv").unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "dataset_imported");
        assert_eq!(events[0].data["inserted"], 4);
    }

    #[test]
    fn test_statuses_upsert() {
        let conn = test_db();

        let mut first = HashMap::new();
        first.insert(
            "1234567890".to_string(),
            RegistryStatus::new("1234567890", "계속사업자", Some("01"), Some("")),
        );
        assert_eq!(save_statuses(&conn, &first).unwrap(), 1);

        let mut second = HashMap::new();
        second.insert(
            "1234567890".to_string(),
            RegistryStatus::new("1234567890", "폐업자", Some("03"), Some("20240131")),
        );
        save_statuses(&conn, &second).unwrap();

        let loaded = load_statuses(&conn).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["1234567890"], second["1234567890"]);
        assert_eq!(loaded["1234567890"].status, BusinessStatus::Closed);
    }
}
