use axum::{body::Bytes, extract::State, Json};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::{
    server::AppState,
    store::{apply_update, ProviderRecord, ProviderUpdate},
    types::{ProxyError, Result},
};

#[derive(Debug, Serialize)]
pub struct Ack {
    pub message: &'static str,
    pub success: bool,
}

impl Ack {
    fn ok() -> Json<Self> {
        Json(Self {
            message: "Ok",
            success: true,
        })
    }
}

pub async fn list_providers_handler(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, Vec<ProviderRecord>>>> {
    let store = state.dispatcher.router().store();

    let mut providers = BTreeMap::new();
    for model in store.list().await? {
        if let Some(records) = store.get(&model).await? {
            providers.insert(model, records);
        }
    }

    Ok(Json(providers))
}

pub async fn update_providers_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Ack>> {
    let update: ProviderUpdate = serde_json::from_slice(&body)
        .map_err(|e| ProxyError::InvalidRequest(format!("Invalid provider update: {}", e)))?;

    let router = state.dispatcher.router();
    let outcome = apply_update(router.store().as_ref(), update).await?;
    if outcome.replaced {
        // Deleted models have selectors too.
        router.reload();
    } else {
        for model in &outcome.models {
            router.invalidate(model);
        }
    }

    Ok(Ack::ok())
}

pub async fn reload_handler(State(state): State<AppState>) -> Json<Ack> {
    state.dispatcher.router().reload();
    Ack::ok()
}
