use crate::config::{BackoffPolicy, CacheConfig};
use crate::routing::{BackendDescriptor, FailoverSelector, RoutingKey, SelectorCache};
use crate::store::ProviderStore;
use crate::types::{ProxyError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

type BuildLock = Arc<tokio::sync::Mutex<()>>;

/// Resolves a routing key to its FailoverSelector, building selectors from
/// the provider store on a cache miss.
pub struct ModelRouter {
    store: Arc<dyn ProviderStore>,
    cache: SelectorCache<Arc<FailoverSelector>>,
    backoff: BackoffPolicy,
    building: Mutex<HashMap<RoutingKey, BuildLock>>,
}

impl ModelRouter {
    pub fn new(store: Arc<dyn ProviderStore>, cache: &CacheConfig, backoff: BackoffPolicy) -> Self {
        Self {
            store,
            cache: SelectorCache::new(cache.ttl(), cache.capacity),
            backoff,
            building: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ProviderStore> {
        &self.store
    }

    pub fn cache(&self) -> &SelectorCache<Arc<FailoverSelector>> {
        &self.cache
    }

    pub async fn selector_for(&self, key: &RoutingKey) -> Result<Arc<FailoverSelector>> {
        if let Some(selector) = self.cache.get(key) {
            return Ok(selector);
        }

        let lock = self.build_lock(key);
        let result = self.build_once(key, &lock).await;
        self.release_build_lock(key, &lock);
        result
    }

    async fn build_once(&self, key: &RoutingKey, lock: &BuildLock) -> Result<Arc<FailoverSelector>> {
        let _guard = lock.lock().await;
        if let Some(selector) = self.cache.get(key) {
            return Ok(selector);
        }

        let selector = Arc::new(self.build(key).await?);
        tracing::info!(
            key = %key,
            backends = selector.len(),
            "Built provider selector"
        );
        self.cache.set(key.clone(), selector.clone());
        Ok(selector)
    }

    /// Builds of one key are serialized; different keys build concurrently.
    fn build_lock(&self, key: &RoutingKey) -> BuildLock {
        self.building.lock().entry(key.clone()).or_default().clone()
    }

    fn release_build_lock(&self, key: &RoutingKey, lock: &BuildLock) {
        let mut building = self.building.lock();
        // One reference in the map plus ours: nobody else is waiting.
        if Arc::strong_count(lock) == 2 {
            building.remove(key);
        }
    }

    async fn build(&self, key: &RoutingKey) -> Result<FailoverSelector> {
        let missing = || ProxyError::ConfigurationMissing {
            model: key.model().to_string(),
            function_call: key.function_call(),
        };

        let records = self.store.get(key.model()).await?.ok_or_else(missing)?;

        let backends: Vec<BackendDescriptor> = records
            .iter()
            .filter(|record| !key.function_call() || record.function_enabled())
            .filter_map(|record| match record.to_descriptor(key.model()) {
                Ok(backend) => Some(backend),
                Err(reason) => {
                    tracing::warn!(
                        key = %key,
                        url = %record.url,
                        reason = %reason,
                        "Skipping provider record"
                    );
                    None
                }
            })
            .collect();

        if backends.is_empty() {
            return Err(missing());
        }

        FailoverSelector::new(backends, self.backoff)
    }

    /// Drop both routing keys of `model`.
    pub fn invalidate(&self, model: &str) {
        for key in RoutingKey::both(model) {
            if self.cache.remove(&key) {
                tracing::debug!(key = %key, "Invalidated provider selector");
            }
        }
    }

    pub fn reload(&self) {
        let dropped = self.cache.len();
        self.cache.clear();
        tracing::info!(dropped = dropped, "Cleared provider selector cache");
    }
}
