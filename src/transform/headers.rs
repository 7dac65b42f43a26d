use crate::config::{HeaderConfig, HeaderMode};
use crate::types::{ProxyError, Result};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use std::str::FromStr;

/// Headers that describe the inbound connection or body and must not be
/// replayed upstream.
const HOP_HEADERS: [HeaderName; 6] = [
    header::HOST,
    header::CONTENT_LENGTH,
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::ACCEPT_ENCODING,
    header::AUTHORIZATION,
];

/// Build the header set for one upstream attempt: apply the configured
/// policy to the client's headers, strip hop-by-hop headers and install the
/// backend's credential.
pub fn outbound_headers(
    incoming: &HeaderMap,
    config: &HeaderConfig,
    credential: &str,
) -> Result<HeaderMap> {
    let mut headers = match config.mode {
        HeaderMode::Whitelist => HeaderMap::new(),
        HeaderMode::Blacklist | HeaderMode::Passthrough => incoming.clone(),
    };

    for name in &config.drop {
        headers.remove(parse_name(name)?);
    }

    for (key, value) in &config.add {
        let name = parse_name(key)?;
        if !headers.contains_key(&name) {
            headers.insert(name, parse_value(key, value)?);
        }
    }

    for (key, value) in &config.force {
        headers.insert(parse_name(key)?, parse_value(key, value)?);
    }

    for name in HOP_HEADERS {
        headers.remove(name);
    }

    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );

    let credential = credential.trim();
    if !credential.is_empty() {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", credential))
            .map_err(|_| ProxyError::Header("Provider token is not a valid header value".to_string()))?;
        value.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, value);
    }

    Ok(headers)
}

fn parse_name(name: &str) -> Result<HeaderName> {
    HeaderName::from_str(name)
        .map_err(|e| ProxyError::Header(format!("Invalid header name '{}': {}", name, e)))
}

fn parse_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| ProxyError::Header(format!("Invalid header value for '{}': {}", name, e)))
}
