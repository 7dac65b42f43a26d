pub mod admin;
pub mod auth;
pub mod openai;

use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::{config::Config, proxy::RequestDispatcher};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<RequestDispatcher>,
    pub config: Arc<Config>,
}

pub fn build_router(state: AppState) -> Router {
    let client = Router::new()
        .route(
            "/v1/models",
            get(openai::list_models_handler).fallback(invalid_route),
        )
        .route(
            "/v1/chat/completions",
            post(openai::chat_completions_handler).fallback(invalid_route),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_client_token,
        ));

    let admin = Router::new()
        .route(
            "/v1/provider/list",
            get(admin::list_providers_handler).fallback(invalid_route),
        )
        .route(
            "/v1/provider/update",
            put(admin::update_providers_handler).fallback(invalid_route),
        )
        .route(
            "/v1/provider/reload",
            post(admin::reload_handler).fallback(invalid_route),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin_token,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(client)
        .merge(admin)
        .fallback(invalid_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn invalid_route() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "message": "Invalid request method or path",
            "success": false
        })),
    )
        .into_response()
}
