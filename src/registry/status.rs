// Business registration status as the rest of the pipeline sees it

use crate::record::normalize_identifier;
use serde::{Deserialize, Serialize};

/// Placeholder the service (and older exports) use for "no information"
pub const NO_INFO: &str = "정보 없음";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BusinessStatus {
    /// 계속사업자 - operating
    Active,

    /// 휴업자 / 폐업자 - suspended or closed
    Closed,

    /// Unregistered, blank, or a status string we do not know
    Unknown,
}

impl BusinessStatus {
    /// Map the service's status text, falling back to its status code
    /// (01 operating, 02 suspended, 03 closed) when the text is blank.
    pub fn from_raw(status: &str, code: Option<&str>) -> Self {
        match status.trim() {
            "계속사업자" => BusinessStatus::Active,
            "휴업자" | "폐업자" => BusinessStatus::Closed,
            "" => match code.map(str::trim) {
                Some("01") => BusinessStatus::Active,
                Some("02") | Some("03") => BusinessStatus::Closed,
                _ => BusinessStatus::Unknown,
            },
            _ => BusinessStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessStatus::Active => "ACTIVE",
            BusinessStatus::Closed => "CLOSED",
            BusinessStatus::Unknown => "UNKNOWN",
        }
    }
}

impl std::str::FromStr for BusinessStatus {
    type Err = String;

    /// Inverse of `as_str`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(BusinessStatus::Active),
            "CLOSED" => Ok(BusinessStatus::Closed),
            "UNKNOWN" => Ok(BusinessStatus::Unknown),
            other => Err(format!("unknown business status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStatus {
    /// Normalized identifier
    pub identifier: String,
    pub status: BusinessStatus,
    /// Status text exactly as the service sent it
    pub raw_status: String,
    /// Closure date as sent (YYYYMMDD), None when blank or "정보 없음"
    pub closure_date: Option<String>,
}

impl RegistryStatus {
    pub fn new(identifier: &str, raw_status: &str, code: Option<&str>, closure_date: Option<&str>) -> Self {
        RegistryStatus {
            identifier: normalize_identifier(identifier),
            status: BusinessStatus::from_raw(raw_status, code),
            raw_status: raw_status.trim().to_string(),
            closure_date: closure_date
                .map(str::trim)
                .filter(|d| !d.is_empty() && *d != NO_INFO)
                .map(|d| d.to_string()),
        }
    }
}
