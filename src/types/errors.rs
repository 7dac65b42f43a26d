use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{}", missing_message(.model, .function_call))]
    ConfigurationMissing { model: String, function_call: bool },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("No usable provider left for '{0}'")]
    PoolExhausted(String),

    #[error("Service is temporarily unavailable after {attempts} attempts")]
    ServiceUnavailable { attempts: usize },

    #[error("No effective response")]
    EmptyCompletion,

    #[error("Malformed upstream body: {0}")]
    MalformedUpstreamBody(String),

    #[error("Provider store error: {0}")]
    Store(String),

    #[error("Header error: {0}")]
    Header(String),

    #[error("Request timeout")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

fn missing_message(model: &str, function_call: &bool) -> String {
    if *function_call {
        format!("Not found any model '{}' support function call", model)
    } else {
        format!("Not support model '{}'", model)
    }
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::ConfigurationMissing { .. } => StatusCode::BAD_REQUEST,
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::Unauthorized => StatusCode::UNAUTHORIZED,
            ProxyError::PoolExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::EmptyCompletion => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::MalformedUpstreamBody(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Header(_) => StatusCode::BAD_REQUEST,
            ProxyError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Http(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Json(_) => StatusCode::BAD_REQUEST,
            ProxyError::Yaml(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &str {
        match self {
            ProxyError::Config(_) => "configuration_error",
            ProxyError::ConfigurationMissing { .. } => "model_not_found",
            ProxyError::InvalidRequest(_) => "invalid_request",
            ProxyError::Unauthorized => "unauthorized",
            ProxyError::PoolExhausted(_) => "pool_exhausted",
            ProxyError::ServiceUnavailable { .. } => "service_unavailable",
            ProxyError::EmptyCompletion => "empty_completion",
            ProxyError::MalformedUpstreamBody(_) => "malformed_upstream_body",
            ProxyError::Store(_) => "store_error",
            ProxyError::Header(_) => "header_error",
            ProxyError::Timeout => "timeout",
            ProxyError::Http(_) => "http_error",
            ProxyError::Json(_) => "json_error",
            ProxyError::Yaml(_) => "yaml_error",
            ProxyError::Io(_) => "io_error",
            ProxyError::Internal(_) => "internal_error",
        }
    }

    /// Message shown to clients. Server-side failures collapse to a generic
    /// text so file paths and upstream addresses never leak.
    pub fn public_message(&self) -> String {
        match self {
            ProxyError::Config(_)
            | ProxyError::Store(_)
            | ProxyError::Yaml(_)
            | ProxyError::Io(_)
            | ProxyError::Http(_)
            | ProxyError::MalformedUpstreamBody(_)
            | ProxyError::Internal(_) => "Internal server error".to_string(),
            ProxyError::PoolExhausted(_) | ProxyError::ServiceUnavailable { .. } => {
                "Service is temporarily unavailable".to_string()
            }
            other => other.to_string(),
        }
    }
}

// Implement IntoResponse for ProxyError to convert errors into HTTP responses
impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.error_type();

        tracing::error!(
            error_type = error_type,
            status = status.as_u16(),
            message = %self,
            "Request failed"
        );

        let body = Json(json!({
            "success": false,
            "message": self.public_message(),
            "error": {
                "type": error_type,
                "code": status.as_u16(),
            }
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
