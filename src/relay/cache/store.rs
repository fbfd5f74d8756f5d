use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::AsyncCommands;

/// External TTL key-value store, consumed as plain get/set. The store handles
/// its own locking; concurrent unsynchronized access is fine.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set_ex(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<()>;
}

/// Shared redis-backed store. The connection manager reconnects on its own,
/// so a transient outage shows up as per-call errors rather than a dead
/// handle.
#[derive(Clone)]
pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisStore {
    #[tracing::instrument(level = "info")]
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("invalid redis URL")?;
        let conn = redis::aio::ConnectionManager::new(client)
            .await
            .context("failed to connect to the result cache store")?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }
}

/// In-process store with the same expiry semantics, for tests and
/// single-node setups without a redis instance.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (Instant, Vec<u8>)>>,
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((deadline, value)) if *deadline > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<()> {
        self.entries.lock().unwrap().insert(
            key.to_string(),
            (Instant::now() + Duration::from_secs(ttl_secs), value.to_vec()),
        );
        Ok(())
    }
}
