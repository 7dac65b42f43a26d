use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Response,
    Json,
};
use serde::Serialize;

use crate::{
    server::AppState,
    types::{openai::ChatCompletionRequest, ProxyError, Result},
};

/// Fixed creation timestamp reported for every listed model.
const MODEL_CREATED: i64 = 1_733_976_732;

#[derive(Debug, Serialize)]
pub struct ModelList {
    pub object: &'static str,
    pub data: Vec<ModelEntry>,
}

#[derive(Debug, Serialize)]
pub struct ModelEntry {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub owned_by: &'static str,
}

pub async fn chat_completions_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let request: ChatCompletionRequest = serde_json::from_slice(&body)
        .map_err(|e| ProxyError::InvalidRequest(format!("Invalid request body: {}", e)))?;

    tracing::debug!(
        model = ?request.model,
        stream = request.stream,
        function_call = request.needs_function_calling(),
        "Chat completion request"
    );

    state.dispatcher.dispatch(&headers, request).await
}

pub async fn list_models_handler(State(state): State<AppState>) -> Result<Json<ModelList>> {
    let data = state
        .dispatcher
        .router()
        .store()
        .list()
        .await?
        .into_iter()
        .map(|name| name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .map(|id| ModelEntry {
            owned_by: owner_of(&id),
            id,
            object: "model",
            created: MODEL_CREATED,
        })
        .collect();

    Ok(Json(ModelList {
        object: "list",
        data,
    }))
}

fn owner_of(model: &str) -> &'static str {
    if model.contains("claude") {
        "Anthropic"
    } else if model.contains("gemini") {
        "Google"
    } else if model.contains("gpt-") || matches!(model, "o1" | "o1-mini" | "o1-preview") {
        "OpenAI"
    } else {
        "Other"
    }
}
