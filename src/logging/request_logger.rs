use crate::config::LoggingConfig;
use crate::routing::{mask_credential, BackendDescriptor};
use chrono::{DateTime, Utc};
use http::header::HeaderMap;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Serialize)]
pub struct UpstreamRequestLog {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub target_model: String,
    pub address: String,
    pub credential: String,
    pub attempt: usize,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpstreamResponseLog {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub address: String,
    pub credential: String,
    pub attempt: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Structured logging for upstream attempts. Credentials are always masked;
/// headers and bodies are only included when the config asks for them.
#[derive(Debug, Clone)]
pub struct RequestLogger {
    config: LoggingConfig,
}

impl RequestLogger {
    pub fn new(config: LoggingConfig) -> Self {
        Self { config }
    }

    pub fn log_upstream_request(
        &self,
        model: &str,
        backend: &BackendDescriptor,
        attempt: usize,
        stream: bool,
        headers: &HeaderMap,
        body: Option<&[u8]>,
    ) {
        if !self.config.enabled {
            return;
        }

        let log = UpstreamRequestLog {
            timestamp: Utc::now(),
            model: model.to_string(),
            target_model: backend.target_model().to_string(),
            address: backend.address().to_string(),
            credential: mask_credential(backend.credential()),
            attempt,
            stream,
            headers: self
                .config
                .include_headers
                .then(|| Self::headers_to_map(headers)),
            body: if self.config.include_body {
                body.map(|b| String::from_utf8_lossy(b).into_owned())
            } else {
                None
            },
        };

        tracing::info!(log = ?log, "Upstream request");
    }

    pub fn log_upstream_response(
        &self,
        model: &str,
        backend: &BackendDescriptor,
        attempt: usize,
        status_code: u16,
        elapsed: Duration,
        headers: &HeaderMap,
    ) {
        if !self.config.enabled {
            return;
        }

        let log = UpstreamResponseLog {
            timestamp: Utc::now(),
            model: model.to_string(),
            address: backend.address().to_string(),
            credential: mask_credential(backend.credential()),
            attempt,
            status_code: Some(status_code),
            duration_ms: elapsed.as_millis() as u64,
            content_type: headers
                .get(http::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            error: None,
        };

        match status_code {
            200..=299 => tracing::info!(log = ?log, "Upstream response"),
            418 | 429 => tracing::warn!(log = ?log, "Upstream is busy"),
            401 => tracing::warn!(log = ?log, "Found expired provider"),
            500.. => tracing::error!(log = ?log, "Upstream server error"),
            _ => tracing::warn!(log = ?log, "Upstream rejected request"),
        }
    }

    pub fn log_upstream_failure(
        &self,
        model: &str,
        backend: &BackendDescriptor,
        attempt: usize,
        elapsed: Duration,
        error: &str,
    ) {
        if !self.config.enabled {
            return;
        }

        let log = UpstreamResponseLog {
            timestamp: Utc::now(),
            model: model.to_string(),
            address: backend.address().to_string(),
            credential: mask_credential(backend.credential()),
            attempt,
            status_code: None,
            duration_ms: elapsed.as_millis() as u64,
            content_type: None,
            error: Some(error.to_string()),
        };

        tracing::error!(log = ?log, "Upstream request failed");
    }

    fn headers_to_map(headers: &HeaderMap) -> HashMap<String, String> {
        headers
            .iter()
            .map(|(name, value)| {
                let key = name.to_string();
                let val = if value.is_sensitive() || Self::is_sensitive_header(&key) {
                    "[REDACTED]".to_string()
                } else {
                    value.to_str().unwrap_or("<invalid>").to_string()
                };
                (key, val)
            })
            .collect()
    }

    fn is_sensitive_header(name: &str) -> bool {
        let lower = name.to_lowercase();
        lower.contains("authorization")
            || lower.contains("api-key")
            || lower.contains("api_key")
            || lower.contains("apikey")
            || lower.contains("token")
            || lower.contains("cookie")
            || lower.contains("password")
            || lower.contains("secret")
    }
}
