pub mod memory;
pub mod update;

use crate::routing::{BackendDescriptor, BackendId};
use crate::types::Result;
use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use memory::MemoryStore;
pub use update::{apply_update, ProviderUpdate};

/// Status value that permanently excludes a record from selector builds.
pub const DEAD_STATUS: &str = "dead";

/// One stored backend entry for a model.
///
/// Unknown keys are kept in `extra` so a round trip through the store does
/// not lose operator annotations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRecord {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alive: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProviderRecord {
    pub fn validate(&self) -> std::result::Result<(), String> {
        parse_endpoint(&self.url).map(|_| ())
    }

    pub fn is_dead(&self) -> bool {
        self.alive
            .as_deref()
            .is_some_and(|status| status.trim().eq_ignore_ascii_case(DEAD_STATUS))
    }

    pub fn function_enabled(&self) -> bool {
        self.function_enabled.unwrap_or(false)
    }

    pub fn is(&self, id: &BackendId) -> bool {
        parse_endpoint(&self.url).is_ok_and(|url| url == id.address)
            && self.token.trim() == id.credential
    }

    /// Backend for `model`, or the reason the record cannot serve it.
    pub fn to_descriptor(&self, model: &str) -> std::result::Result<BackendDescriptor, String> {
        if self.is_dead() {
            return Err("provider is marked dead".to_string());
        }

        let address = parse_endpoint(&self.url)?;
        let target_model = self
            .real_model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(model);

        Ok(BackendDescriptor::new(address, self.token.trim(), target_model)
            .with_priority(self.priority.unwrap_or(-1))
            .with_stream_capable(self.stream_enabled.unwrap_or(true))
            .with_unstable(self.instable.unwrap_or(false)))
    }
}

/// Parse an absolute http(s) endpoint address.
pub fn parse_endpoint(raw: &str) -> std::result::Result<Url, String> {
    let trimmed = raw.trim();
    if !trimmed.starts_with("https://") && !trimmed.starts_with("http://") {
        return Err(format!("url '{}' must start with http:// or https://", trimmed));
    }
    Url::parse(trimmed).map_err(|e| format!("url '{}' is not valid: {}", trimmed, e))
}

/// Key-value store of provider lists, keyed by model name.
#[async_trait]
pub trait ProviderStore: Send + Sync {
    async fn get(&self, model: &str) -> Result<Option<Vec<ProviderRecord>>>;

    async fn put(&self, model: &str, records: Vec<ProviderRecord>) -> Result<()>;

    async fn list(&self) -> Result<Vec<String>>;

    async fn delete(&self, model: &str) -> Result<()>;
}

/// Flag every record of `model` matching `backend` as dead so later selector
/// builds skip it. Returns whether anything changed.
pub async fn mark_dead(
    store: &dyn ProviderStore,
    model: &str,
    backend: &BackendDescriptor,
) -> Result<bool> {
    let Some(mut records) = store.get(model).await? else {
        return Ok(false);
    };

    let mut changed = false;
    for record in records.iter_mut().filter(|r| r.is(backend.id()) && !r.is_dead()) {
        record.alive = Some(DEAD_STATUS.to_string());
        changed = true;
    }

    if changed {
        store.put(model, records).await?;
        tracing::warn!(model = model, backend = %backend, "Provider marked dead");
    }

    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn record(url: &str, token: &str) -> ProviderRecord {
        ProviderRecord {
            url: url.to_string(),
            token: token.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_record_field_names() {
        let record: ProviderRecord = serde_json::from_value(json!({
            "url": "https://a.example.com/v1/chat/completions",
            "token": "sk-a",
            "realModel": "o1-preview",
            "priority": 35,
            "functionEnabled": true,
            "streamEnabled": false,
            "instable": true,
            "note": "shared key"
        }))
        .unwrap();

        assert_eq!(record.real_model.as_deref(), Some("o1-preview"));
        assert_eq!(record.priority, Some(35));
        assert!(record.function_enabled());
        assert_eq!(record.extra["note"], "shared key");

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["functionEnabled"], true);
        assert_eq!(value["note"], "shared key");
        assert!(value.get("alive").is_none());
    }

    #[test]
    fn test_descriptor_defaults() {
        let backend = record(" https://a.example.com/v1 ", " sk-a ")
            .to_descriptor("gpt-4o")
            .unwrap();
        assert_eq!(backend.address().as_str(), "https://a.example.com/v1");
        assert_eq!(backend.credential(), "sk-a");
        assert_eq!(backend.target_model(), "gpt-4o");
        assert_eq!(backend.priority(), -1);
        assert!(backend.stream_capable());
        assert!(!backend.unstable());
    }

    #[test]
    fn test_descriptor_rejects_invalid_and_dead() {
        assert!(record("a.example.com", "sk").to_descriptor("m").is_err());
        assert!(record("ws://a.example.com", "sk").to_descriptor("m").is_err());

        let mut dead = record("https://a.example.com", "sk");
        dead.alive = Some(" DEAD ".to_string());
        assert!(dead.is_dead());
        assert!(dead.to_descriptor("m").is_err());
    }

    #[test]
    fn test_mark_dead_flags_only_matching_identity() {
        let store = MemoryStore::new(BTreeMap::from([(
            "gpt-4o".to_string(),
            vec![
                record("https://a.example.com/v1", "sk-1"),
                record("https://a.example.com/v1", "sk-2"),
            ],
        )]));
        let backend = record("https://a.example.com/v1", "sk-1")
            .to_descriptor("gpt-4o")
            .unwrap();

        let changed = tokio_test::block_on(mark_dead(&store, "gpt-4o", &backend)).unwrap();
        assert!(changed);

        let records = tokio_test::block_on(store.get("gpt-4o")).unwrap().unwrap();
        assert!(records[0].is_dead());
        assert!(!records[1].is_dead());

        // Second call finds nothing left to change.
        let changed = tokio_test::block_on(mark_dead(&store, "gpt-4o", &backend)).unwrap();
        assert!(!changed);
    }

    #[test]
    fn test_mark_dead_unknown_model() {
        let store = MemoryStore::new(BTreeMap::new());
        let backend = record("https://a.example.com/v1", "sk-1")
            .to_descriptor("m")
            .unwrap();
        assert!(!tokio_test::block_on(mark_dead(&store, "m", &backend)).unwrap());
    }
}
