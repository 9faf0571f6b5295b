// Loan Insight - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod address;    // District extraction from free-text addresses
pub mod boundary;   // District boundaries → representative coordinates
pub mod config;
pub mod db;
pub mod enrich;     // Registry statuses joined onto records + CSV export
pub mod error;
pub mod geo;        // District totals for the map
pub mod geometry;
pub mod quality;
pub mod record;
pub mod registry;   // Business status lookups with retry and partial results
pub mod summary;    // Dashboard aggregates

// Re-export commonly used types
pub use address::{AddressResolver, Resolution, UnmatchedReason};
pub use boundary::{BoundaryIndex, BoundaryPolygon, BoundarySource, Coordinate};
pub use config::{AppConfig, ColumnMap, CoordinateOverride, GeoConfig, RegistryConfig};
pub use db::{
    Event, ImportStats,
    setup_database, insert_records, get_all_records, verify_count,
    insert_event, get_events_for_entity, save_statuses, load_statuses,
};
pub use enrich::{export_csv, export_csv_file, merge, EnrichedRecord};
pub use error::{AttemptError, BoundaryError, ConfigError, IngestError};
pub use geo::{aggregate, normalize, DistrictMetric, GeoAggregation};
pub use quality::{IssueKind, QualityEvent, QualityLog};
pub use record::{
    load_csv, normalize_identifier, read_records,
    FilterParams, Ingested, LoanRecord, RecordFilter, RecordStore,
};
pub use registry::{
    BusinessStatus, HttpTransport, LookupEvent, LookupResult,
    RegistryClient, RegistryStatus, RetryPolicy, Sleeper, ThreadSleeper,
};
pub use summary::{dashboard, AgeBand, Dashboard};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
