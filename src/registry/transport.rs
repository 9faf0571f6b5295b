// One request per batch; nothing here retries

use super::wire::{parse_body, StatusEntry, StatusRequest};
use crate::config::RegistryConfig;
use crate::error::AttemptError;
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};

/// Sends one batch of normalized identifiers to the registry.
///
/// An attempt succeeds only when the transport reports success AND the body
/// carries a result collection. Everything else is an `AttemptError`.
pub trait RegistryTransport {
    fn send(&self, identifiers: &[String]) -> Result<Vec<StatusEntry>, AttemptError>;
}

/// Blocking HTTP transport against the business status endpoint
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    url: String,
}

impl HttpTransport {
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to build registry HTTP client")?;

        let url = match &config.service_key {
            Some(key) => request_url(&config.endpoint, key),
            None => {
                tracing::warn!("no registry service key configured, requests will likely be rejected");
                config.endpoint.clone()
            }
        };

        Ok(HttpTransport {
            client,
            endpoint: config.endpoint.clone(),
            url,
        })
    }
}

/// Append the service key to the endpoint, keeping any query it already has.
///
/// The key is issued URL-encoded and goes in verbatim.
fn request_url(endpoint: &str, key: &str) -> String {
    let separator = match endpoint.find('?') {
        None => "?",
        Some(_) if endpoint.ends_with('?') || endpoint.ends_with('&') => "",
        Some(_) => "&",
    };
    format!("{}{}serviceKey={}", endpoint, separator, key)
}

impl RegistryTransport for HttpTransport {
    fn send(&self, identifiers: &[String]) -> Result<Vec<StatusEntry>, AttemptError> {
        let body = StatusRequest {
            b_no: identifiers.to_vec(),
        };

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .map_err(from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let text = response.text().map_err(from_reqwest)?;
        parse_body(&text)
    }
}

fn from_reqwest(e: reqwest::Error) -> AttemptError {
    if e.is_timeout() {
        AttemptError::Timeout {
            reason: e.to_string(),
        }
    } else {
        AttemptError::Connection {
            reason: e.to_string(),
        }
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .field("service_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_service_key() {
        let config = RegistryConfig {
            service_key: Some("secret%3D%3D".to_string()),
            ..RegistryConfig::default()
        };
        let transport = HttpTransport::new(&config).unwrap();
        let debug = format!("{:?}", transport);

        assert!(debug.contains("api.odcloud.kr"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_service_key_joins_existing_query() {
        assert_eq!(
            request_url("https://api.example.kr/status", "k%3D"),
            "https://api.example.kr/status?serviceKey=k%3D"
        );
        assert_eq!(
            request_url("https://api.example.kr/status?returnType=JSON", "k%3D"),
            "https://api.example.kr/status?returnType=JSON&serviceKey=k%3D"
        );
        assert_eq!(
            request_url("https://api.example.kr/status?", "k%3D"),
            "https://api.example.kr/status?serviceKey=k%3D"
        );
    }

    #[test]
    fn test_debug_keeps_endpoint_query_but_not_key() {
        let config = RegistryConfig {
            endpoint: "https://api.example.kr/status?returnType=JSON".to_string(),
            service_key: Some("secret%3D%3D".to_string()),
            ..RegistryConfig::default()
        };
        let transport = HttpTransport::new(&config).unwrap();
        let debug = format!("{:?}", transport);

        assert!(debug.contains("returnType=JSON"));
        assert!(!debug.contains("secret"));
        assert!(transport.url.ends_with("returnType=JSON&serviceKey=secret%3D%3D"));
    }

    #[test]
    fn test_unreachable_endpoint_is_a_connection_failure() {
        let config = RegistryConfig {
            endpoint: "http://127.0.0.1:9/status".to_string(),
            timeout_secs: 2,
            ..RegistryConfig::default()
        };
        let transport = HttpTransport::new(&config).unwrap();

        let err = transport.send(&["1234567890".to_string()]).unwrap_err();
        assert!(matches!(
            err,
            AttemptError::Connection { .. } | AttemptError::Timeout { .. }
        ));
    }
}
