// ⚙️ Configuration - loan-insight.toml
//
// Every section has defaults, so an empty (or absent) file is a valid config.
// The registry service key is a secret: it is read from the environment
// first and never has a default.

use crate::error::ConfigError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "loan-insight.toml";

/// Environment variable holding the registry service key
pub const SERVICE_KEY_ENV: &str = "LOAN_INSIGHT_SERVICE_KEY";

/// Largest batch the registry accepts in a single request
pub const MAX_REGISTRY_BATCH: usize = 100;

// ============================================================================
// SECTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite database used by `import`, `enrich` and the API server
    pub database_path: PathBuf,
    pub columns: ColumnMap,
    pub registry: RegistryConfig,
    pub geo: GeoConfig,
    pub cohort: CohortConfig,
}

/// Header names of the uploaded dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub identifier: String,
    pub address: String,
    pub amount: String,
    pub bank: String,
    pub date: String,
    pub industry: String,
    pub working_capital: String,
    pub resident_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub endpoint: String,
    /// URL-encoded service key, appended as `serviceKey`
    pub service_key: Option<String>,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    /// Addresses must contain this token to be resolved to a district
    pub region: String,
    pub boundary_path: PathBuf,
    /// Feature property holding the district name
    pub district_field: String,
    /// Optional feature property/value pair restricting which features are indexed
    pub region_field: Option<String>,
    pub region_value: Option<String>,
    pub overrides: Vec<CoordinateOverride>,
}

/// Hand-picked coordinate replacing a computed one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateOverride {
    pub district: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CohortConfig {
    /// Two-digit birth years above this are 19xx, the rest 20xx
    pub century_pivot: u32,
}

// ============================================================================
// DEFAULTS
// ============================================================================

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_path: PathBuf::from("loan_insight.db"),
            columns: ColumnMap::default(),
            registry: RegistryConfig::default(),
            geo: GeoConfig::default(),
            cohort: CohortConfig::default(),
        }
    }
}

impl Default for ColumnMap {
    fn default() -> Self {
        ColumnMap {
            identifier: "사업자번호".to_string(),
            address: "사업장주소".to_string(),
            amount: "실행/해지금액(원)".to_string(),
            bank: "은행구분".to_string(),
            date: "기표일자".to_string(),
            industry: "대분류업종명".to_string(),
            working_capital: "차입금(운전)".to_string(),
            resident_id: "주민번호".to_string(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            endpoint: "https://api.odcloud.kr/api/nts-businessman/v1/status".to_string(),
            service_key: None,
            batch_size: MAX_REGISTRY_BATCH,
            max_attempts: 3,
            retry_delay_secs: 5,
            timeout_secs: 30,
        }
    }
}

impl Default for GeoConfig {
    fn default() -> Self {
        GeoConfig {
            region: "서울특별시".to_string(),
            boundary_path: PathBuf::from("HangJeongDong_ver20230701.geojson"),
            district_field: "sggnm".to_string(),
            region_field: Some("sidonm".to_string()),
            region_value: Some("서울특별시".to_string()),
            overrides: vec![
                CoordinateOverride {
                    district: "중구".to_string(),
                    lat: 37.5637,
                    lon: 126.9970,
                },
                CoordinateOverride {
                    district: "강서구".to_string(),
                    lat: 37.5510,
                    lon: 126.8495,
                },
            ],
        }
    }
}

impl Default for CohortConfig {
    fn default() -> Self {
        CohortConfig { century_pivot: 22 }
    }
}

// ============================================================================
// LOADING
// ============================================================================

impl AppConfig {
    /// Load configuration.
    ///
    /// * `Some(path)` - the file must exist
    /// * `None` - `loan-insight.toml` in the working directory if present, defaults otherwise
    ///
    /// `LOAN_INSIGHT_SERVICE_KEY` always wins over the file's `registry.service_key`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    AppConfig::default()
                }
            }
        };

        if let Ok(key) = std::env::var(SERVICE_KEY_ENV) {
            if !key.trim().is_empty() {
                config.registry.service_key = Some(key.trim().to_string());
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(text)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.registry.batch_size == 0 || self.registry.batch_size > MAX_REGISTRY_BATCH {
            return Err(ConfigError::InvalidValue {
                field: "registry.batch_size".to_string(),
                value: self.registry.batch_size.to_string(),
                reason: format!("must be between 1 and {}", MAX_REGISTRY_BATCH),
            });
        }

        if self.registry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "registry.max_attempts".to_string(),
                value: "0".to_string(),
                reason: "at least one attempt is required".to_string(),
            });
        }

        if self.region_filter_is_partial() {
            return Err(ConfigError::InvalidValue {
                field: "geo.region_field".to_string(),
                value: format!("{:?}/{:?}", self.geo.region_field, self.geo.region_value),
                reason: "region_field and region_value must be set together".to_string(),
            });
        }

        Ok(())
    }

    fn region_filter_is_partial(&self) -> bool {
        self.geo.region_field.is_some() != self.geo.region_value.is_some()
    }
}

impl RegistryConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ============================================================================
// TESTS
// ============================================================================
