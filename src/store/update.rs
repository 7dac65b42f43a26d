use super::{parse_endpoint, ProviderRecord, ProviderStore};
use crate::types::{ProxyError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Bulk provider update, grouped by address then token:
///
/// ```json
/// {
///   "replace": false,
///   "providers": {
///     "https://a.com/v1/chat/completions": {
///       "sk-1": { "models": { "gpt-4o": { "priority": 60 }, "o1": { "realModel": "o1-preview" } } }
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderUpdate {
    #[serde(default)]
    pub replace: bool,
    #[serde(default)]
    pub providers: BTreeMap<String, BTreeMap<String, ServiceEntry>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceEntry {
    #[serde(default)]
    pub models: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    pub replaced: bool,
    /// Models whose provider list was written.
    pub models: Vec<String>,
}

pub async fn apply_update(store: &dyn ProviderStore, update: ProviderUpdate) -> Result<UpdateOutcome> {
    if update.providers.is_empty() {
        return Err(ProxyError::InvalidRequest(
            "New providers cannot be empty".to_string(),
        ));
    }

    let mut merged: BTreeMap<String, Vec<ProviderRecord>> = BTreeMap::new();
    if !update.replace {
        for model in store.list().await? {
            if let Some(records) = store.get(&model).await? {
                merged.insert(model, records);
            }
        }
    }

    let mut touched = BTreeSet::new();
    for (url, tokens) in &update.providers {
        let address = match parse_endpoint(url) {
            Ok(_) => url.trim().to_string(),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Dropping provider with invalid url");
                continue;
            }
        };

        for (token, service) in tokens {
            let token = token.trim();
            if service.models.is_empty() {
                tracing::warn!(url = %address, "Ignoring provider token without models");
                continue;
            }

            for (name, item) in &service.models {
                let model = name.trim();
                if model.is_empty() {
                    tracing::warn!(url = %address, "Ignoring empty model name");
                    continue;
                }

                let mut record = match parse_item(item) {
                    Some(record) => record,
                    None => {
                        tracing::warn!(
                            url = %address,
                            model = model,
                            "Ignoring invalid model settings"
                        );
                        continue;
                    }
                };
                record.url = address.clone();
                record.token = token.to_string();

                upsert(merged.entry(model.to_string()).or_default(), record);
                touched.insert(model.to_string());
            }
        }
    }

    if update.replace {
        for model in store.list().await? {
            store.delete(&model).await?;
        }
    }

    let mut written = Vec::new();
    for (model, records) in merged {
        if records.is_empty() || !(update.replace || touched.contains(&model)) {
            continue;
        }
        store.put(&model, records).await?;
        written.push(model);
    }

    tracing::info!(
        replace = update.replace,
        models = ?written,
        "Provider configuration updated"
    );

    Ok(UpdateOutcome {
        replaced: update.replace,
        models: written,
    })
}

fn parse_item(item: &Value) -> Option<ProviderRecord> {
    if !item.is_object() {
        return None;
    }
    serde_json::from_value(item.clone()).ok()
}

/// Replace the record with the same `(url, token)` in place, or append.
fn upsert(records: &mut Vec<ProviderRecord>, record: ProviderRecord) {
    match records
        .iter_mut()
        .find(|r| r.url.trim() == record.url && r.token.trim() == record.token)
    {
        Some(existing) => *existing = record,
        None => records.push(record),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn update(value: Value) -> ProviderUpdate {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_empty_providers_rejected() {
        let store = MemoryStore::new(BTreeMap::new());
        let err = apply_update(&store, update(json!({"providers": {}})))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_update_groups_records_by_model() {
        let store = MemoryStore::new(BTreeMap::new());
        let outcome = apply_update(
            &store,
            update(json!({
                "providers": {
                    "https://a.example.com/v1/chat/completions": {
                        "sk-1": {
                            "models": {
                                "gpt-4o": {"functionEnabled": false, "priority": 60},
                                "gpt-4o-mini": {},
                                "o1": {"realModel": "o1-preview", "functionEnabled": true}
                            },
                            "tbd": "unknown"
                        }
                    },
                    "not-a-url": {"sk-2": {"models": {"gpt-4o": {}}}},
                    "https://b.example.com/v1/chat/completions": {
                        "sk-3": {"models": {}},
                        "sk-4": {"models": {"gpt-4o": "bogus", " ": {}}}
                    }
                }
            })),
        )
        .await
        .unwrap();

        assert!(!outcome.replaced);
        assert_eq!(outcome.models, vec!["gpt-4o", "gpt-4o-mini", "o1"]);

        let gpt = store.get("gpt-4o").await.unwrap().unwrap();
        assert_eq!(gpt.len(), 1);
        assert_eq!(gpt[0].url, "https://a.example.com/v1/chat/completions");
        assert_eq!(gpt[0].token, "sk-1");
        assert_eq!(gpt[0].priority, Some(60));

        let o1 = store.get("o1").await.unwrap().unwrap();
        assert_eq!(o1[0].real_model.as_deref(), Some("o1-preview"));
    }

    #[tokio::test]
    async fn test_merge_replaces_same_identity_and_keeps_others() {
        let store = MemoryStore::new(BTreeMap::from([
            (
                "gpt-4o".to_string(),
                vec![
                    ProviderRecord {
                        url: "https://a.example.com/v1".to_string(),
                        token: "sk-1".to_string(),
                        priority: Some(10),
                        ..Default::default()
                    },
                    ProviderRecord {
                        url: "https://c.example.com/v1".to_string(),
                        token: "sk-9".to_string(),
                        ..Default::default()
                    },
                ],
            ),
            ("claude-3".to_string(), vec![ProviderRecord {
                url: "https://c.example.com/v1".to_string(),
                token: "sk-9".to_string(),
                ..Default::default()
            }]),
        ]));

        let outcome = apply_update(
            &store,
            update(json!({
                "providers": {
                    "https://a.example.com/v1": {"sk-1": {"models": {"gpt-4o": {"priority": 80}}}}
                }
            })),
        )
        .await
        .unwrap();
        assert_eq!(outcome.models, vec!["gpt-4o"]);

        let gpt = store.get("gpt-4o").await.unwrap().unwrap();
        assert_eq!(gpt.len(), 2);
        assert_eq!(gpt[0].priority, Some(80));
        assert_eq!(gpt[1].token, "sk-9");
        assert!(store.get("claude-3").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_replace_drops_existing_models() {
        let store = MemoryStore::new(BTreeMap::from([(
            "claude-3".to_string(),
            vec![ProviderRecord {
                url: "https://c.example.com/v1".to_string(),
                token: "sk-9".to_string(),
                ..Default::default()
            }],
        )]));

        let outcome = apply_update(
            &store,
            update(json!({
                "replace": true,
                "providers": {
                    "https://a.example.com/v1": {"sk-1": {"models": {"gpt-4o": {}}}}
                }
            })),
        )
        .await
        .unwrap();

        assert!(outcome.replaced);
        assert_eq!(store.list().await.unwrap(), vec!["gpt-4o"]);
    }
}
