// Request/response bodies of the business status endpoint

use super::status::{RegistryStatus, NO_INFO};
use crate::error::AttemptError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRequest {
    pub b_no: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub status_code: Option<String>,
    #[serde(default)]
    pub match_cnt: Option<u32>,
    #[serde(default)]
    pub request_cnt: Option<u32>,
    /// Absent on error bodies; its presence is what makes a response usable
    #[serde(default)]
    pub data: Option<Vec<StatusEntry>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    #[serde(default)]
    pub b_no: String,
    #[serde(default)]
    pub b_stt: Option<String>,
    #[serde(default)]
    pub b_stt_cd: Option<String>,
    #[serde(default)]
    pub end_dt: Option<String>,
    #[serde(default)]
    pub tax_type: Option<String>,
}

impl StatusEntry {
    pub fn to_status(&self) -> RegistryStatus {
        RegistryStatus::new(
            &self.b_no,
            self.b_stt.as_deref().unwrap_or(NO_INFO),
            self.b_stt_cd.as_deref(),
            self.end_dt.as_deref(),
        )
    }
}

/// Extract the result collection from a 2xx body
pub fn parse_body(body: &str) -> Result<Vec<StatusEntry>, AttemptError> {
    let response: StatusResponse =
        serde_json::from_str(body).map_err(|e| AttemptError::MalformedBody {
            reason: e.to_string(),
        })?;
    response.data.ok_or(AttemptError::MissingData)
}
