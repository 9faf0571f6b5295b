// ❗ Typed errors for the pipeline seams
//
// Application code (CLI, server, persistence) works in anyhow::Result and
// attaches context; these enums are what the library itself returns where a
// caller needs to match on the failure.

use thiserror::Error;

/// Structural failures while ingesting the uploaded dataset.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Missing required field(s): {}", .missing.join(", "))]
    MissingColumns { missing: Vec<String> },

    #[error("Failed to read dataset: {reason}")]
    Unreadable { reason: String },
}

/// Failures while loading boundary geometry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BoundaryError {
    #[error("Failed to read boundary file {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("Boundary data is not a GeoJSON FeatureCollection: {reason}")]
    InvalidGeoJson { reason: String },

    #[error("No district boundaries found: {features} feature(s), {outside_region} outside the region filter, {skipped} without a district or areal geometry")]
    NoDistricts {
        features: usize,
        outside_region: usize,
        skipped: usize,
    },
}

/// A single failed registry request attempt.
///
/// Every variant is retryable; the retry policy decides whether another
/// attempt is made.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttemptError {
    #[error("registry returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("registry response body is malformed: {reason}")]
    MalformedBody { reason: String },

    #[error("registry response has no data collection")]
    MissingData,

    #[error("connection to registry failed: {reason}")]
    Connection { reason: String },

    #[error("registry request timed out: {reason}")]
    Timeout { reason: String },
}

/// Invalid values in the configuration file.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}
