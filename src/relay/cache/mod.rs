use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::relay::cache::store::CacheStore;

pub mod key;
pub mod store;

/// Get-or-compute wrapper around the external store. Store failures are
/// fail-open: a read error or corrupt payload counts as a miss, a write
/// error is logged and the freshly computed value is still returned.
/// Concurrent misses on one key may compute twice; last write wins.
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn CacheStore>,
}

impl ResultCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// On a hit the compute closure is never invoked, which short-circuits
    /// all downstream work. Key construction therefore has to happen before
    /// any scratch file or worker is touched.
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        key: &str,
        ttl_secs: u64,
        compute: F,
    ) -> Result<T, PipelineError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        match self.store.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => {
                    debug!(key, "cache hit");
                    return Ok(value);
                }
                Err(err) => warn!(key, error = %err, "corrupt cache payload, recomputing"),
            },
            Ok(None) => debug!(key, "cache miss"),
            Err(err) => warn!(key, error = %err, "cache read failed, recomputing"),
        }

        let value = compute().await?;

        match serde_json::to_vec(&value) {
            Ok(bytes) => {
                if let Err(err) = self.store.set_ex(key, &bytes, ttl_secs).await {
                    warn!(key, error = %err, "cache write failed, returning fresh result");
                }
            }
            Err(err) => warn!(key, error = %err, "failed to serialize result for caching"),
        }

        Ok(value)
    }
}
