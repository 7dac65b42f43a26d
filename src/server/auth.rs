use crate::server::AppState;
use crate::types::ProxyError;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Client routes: the configured secret must be presented as a bearer token.
/// Without a configured secret the routes are open.
pub async fn require_client_token(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let secret = state
        .config
        .auth
        .secret_key
        .as_deref()
        .map(str::trim)
        .unwrap_or("");

    if secret.is_empty() {
        return next.run(request).await;
    }

    match bearer_token(request.headers()) {
        Some(token) if constant_time_eq(token, secret) => next.run(request).await,
        _ => ProxyError::Unauthorized.into_response(),
    }
}

/// Admin routes: always require the admin token; closed when none is set.
pub async fn require_admin_token(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let admin = state
        .config
        .auth
        .admin_token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());

    match (admin, bearer_token(request.headers())) {
        (Some(expected), Some(token)) if constant_time_eq(token, expected) => {
            next.run(request).await
        }
        _ => {
            tracing::warn!(path = %request.uri().path(), "Rejected admin request");
            ProxyError::Unauthorized.into_response()
        }
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    use subtle::ConstantTimeEq;
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
