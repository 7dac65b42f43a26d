use super::{ProviderRecord, ProviderStore};
use crate::config::StoreConfig;
use crate::types::{ProxyError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

type Records = BTreeMap<String, Vec<ProviderRecord>>;

/// Provider store held in memory, optionally mirrored to a JSON snapshot
/// file that is rewritten after every change.
pub struct MemoryStore {
    records: RwLock<Records>,
    snapshot: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new(records: Records) -> Self {
        Self {
            records: RwLock::new(records),
            snapshot: None,
        }
    }

    /// Load from the configured snapshot when it exists, otherwise start from
    /// the seed records in the config.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let Some(path) = config.snapshot.clone() else {
            return Ok(Self::new(config.providers.clone()));
        };

        let records = match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let records: Records = serde_json::from_str(&content).map_err(|e| {
                    ProxyError::Store(format!(
                        "Failed to parse snapshot {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                tracing::info!(
                    path = %path.display(),
                    models = records.len(),
                    "Loaded provider snapshot"
                );
                records
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    path = %path.display(),
                    "No provider snapshot yet, starting from configured providers"
                );
                config.providers.clone()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            records: RwLock::new(records),
            snapshot: Some(path),
        })
    }

    async fn persist(&self, records: &Records) -> Result<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_vec_pretty(records)?;
        tokio::fs::write(path, content).await.map_err(|e| {
            ProxyError::Store(format!("Failed to write snapshot {}: {}", path.display(), e))
        })
    }
}

#[async_trait]
impl ProviderStore for MemoryStore {
    async fn get(&self, model: &str) -> Result<Option<Vec<ProviderRecord>>> {
        Ok(self.records.read().await.get(model.trim()).cloned())
    }

    async fn put(&self, model: &str, records: Vec<ProviderRecord>) -> Result<()> {
        let mut guard = self.records.write().await;
        guard.insert(model.trim().to_string(), records);
        self.persist(&guard).await
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.records.read().await.keys().cloned().collect())
    }

    async fn delete(&self, model: &str) -> Result<()> {
        let mut guard = self.records.write().await;
        if guard.remove(model.trim()).is_some() {
            self.persist(&guard).await?;
        }
        Ok(())
    }
}
