//! Cache stores for setting lookups.
//!
//! Entries never expire; they live until a write, delete or flush for the
//! same key and scope evicts them.

use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisError};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use common::AppResult;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Minimal cache contract: read, store without expiry, evict.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get the raw payload stored under `key`
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Store `payload` under `key` with no expiry
    async fn put_forever(&self, key: &str, payload: String) -> AppResult<()>;

    /// Evict `key`; a missing key is not an error
    async fn forget(&self, key: &str) -> AppResult<()>;
}

/// Return the cached value for `key`, or compute, store and return it.
///
/// The cache is an optimization: read, decode and store failures are logged
/// and fall through to `compute`. Errors from `compute` propagate.
pub async fn remember_forever<T, F, Fut>(
    store: &dyn CacheStore,
    key: &str,
    compute: F,
) -> AppResult<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    match store.get(key).await {
        Ok(Some(payload)) => match serde_json::from_str(&payload) {
            Ok(value) => {
                debug!(cache_key = %key, "Cache hit");
                return Ok(value);
            }
            Err(e) => warn!(cache_key = %key, error = %e, "Discarding undecodable cache entry"),
        },
        Ok(None) => debug!(cache_key = %key, "Cache miss"),
        Err(e) => warn!(cache_key = %key, error = %e, "Cache read failed, using storage"),
    }

    let value = compute().await?;

    match serde_json::to_string(&value) {
        Ok(payload) => {
            if let Err(e) = store.put_forever(key, payload).await {
                warn!(cache_key = %key, error = %e, "Cache write failed");
            }
        }
        Err(e) => warn!(cache_key = %key, error = %e, "Cannot encode cache entry"),
    }

    Ok(value)
}

// =============================================================================
// Redis
// =============================================================================

/// Redis-backed cache store.
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
}

impl RedisCache {
    /// Connect to Redis.
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;

        tracing::info!("Redis cache connected");

        Ok(Self { connection })
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn put_forever(&self, key: &str, payload: String) -> AppResult<()> {
        let mut conn = self.connection.clone();
        conn.set::<_, _, ()>(key, payload).await?;
        Ok(())
    }

    async fn forget(&self, key: &str) -> AppResult<()> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}

// =============================================================================
// In-process
// =============================================================================

/// In-process cache store for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.entries.read().await.contains_key(key)
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put_forever(&self, key: &str, payload: String) -> AppResult<()> {
        self.entries.write().await.insert(key.to_string(), payload);
        Ok(())
    }

    async fn forget(&self, key: &str) -> AppResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
