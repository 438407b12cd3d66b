//! Settings service - the public key-value contract.
//!
//! Adds value encoding, cache-key derivation and cache invalidation on top
//! of a [`SettingsRepository`]. Scopes are passed per call through
//! [`Settings::set_extra_columns`]; unscoped calls run with the empty scope.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use common::{AppResult, OptionExt};
use domain::{cache_key, decode_value, encode_value, Lookup, Scope, SettingRow};

use crate::infra::{remember_forever, CacheStore};
use crate::repository::SettingsRepository;

/// Settings store with an optional read-through cache.
pub struct Settings {
    repository: Arc<dyn SettingsRepository>,
    cache: Option<Arc<dyn CacheStore>>,
    cache_enabled: bool,
}

impl Settings {
    /// Create a settings service with caching disabled.
    pub fn new(repository: Arc<dyn SettingsRepository>) -> Self {
        Self {
            repository,
            cache: None,
            cache_enabled: false,
        }
    }

    /// Attach a cache store. Caching still has to be enabled.
    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn set_cache(&mut self, cache: Arc<dyn CacheStore>) {
        self.cache = Some(cache);
    }

    pub fn cache(&self) -> Option<&Arc<dyn CacheStore>> {
        self.cache.as_ref()
    }

    pub fn enable_cache(&mut self) {
        self.cache_enabled = true;
    }

    pub fn disable_cache(&mut self) {
        self.cache_enabled = false;
    }

    /// Caching is in effect only when enabled and a store is attached.
    pub fn is_cache_enabled(&self) -> bool {
        self.cache_enabled && self.cache.is_some()
    }

    fn active_cache(&self) -> Option<&dyn CacheStore> {
        if self.cache_enabled {
            self.cache.as_deref()
        } else {
            None
        }
    }

    /// Bind extra columns to the next operation only.
    pub fn set_extra_columns(&self, scope: impl Into<Scope>) -> Scoped<'_> {
        Scoped {
            settings: self,
            scope: scope.into(),
        }
    }

    // =========================================================================
    // Unscoped Operations
    // =========================================================================

    /// Get a setting, `None` when it is missing or stored as NULL.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> AppResult<Option<T>> {
        self.get_in(&Scope::new(), key).await
    }

    /// Get a setting, falling back to `default` when it is missing.
    pub async fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> AppResult<T> {
        Ok(self.get_in(&Scope::new(), key).await?.unwrap_or(default))
    }

    /// Get a setting that must exist.
    pub async fn require<T: DeserializeOwned>(&self, key: &str) -> AppResult<T> {
        self.get_in(&Scope::new(), key).await?.ok_or_not_found()
    }

    /// Check if a setting exists. Always reads storage.
    pub async fn has(&self, key: &str) -> AppResult<bool> {
        self.has_in(&Scope::new(), key).await
    }

    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> AppResult<()> {
        self.set_in(&Scope::new(), key, value).await
    }

    /// Set several settings one after another. Not atomic.
    pub async fn set_many<I, K, V>(&self, entries: I) -> AppResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Serialize,
    {
        self.set_many_in(&Scope::new(), entries).await
    }

    pub async fn forget(&self, key: &str) -> AppResult<()> {
        self.forget_in(&Scope::new(), key).await
    }

    /// Delete every setting. With no scope this empties the table.
    pub async fn flush(&self) -> AppResult<u64> {
        self.flush_in(&Scope::new()).await
    }

    /// Delete every row in the table, whatever its scope columns hold.
    pub async fn truncate(&self) -> AppResult<u64> {
        let stale = match self.active_cache() {
            Some(_) => {
                let rows = self.repository.all(&Scope::new()).await?;
                stale_keys(rows.iter().map(|row| (row.key.as_str(), &row.scope)))
            }
            None => BTreeSet::new(),
        };

        let deleted = self.repository.truncate().await?;
        self.invalidate(&stale).await?;

        debug!(rows = deleted, "Settings table truncated");
        Ok(deleted)
    }

    /// List the raw rows, values still encoded.
    pub async fn all(&self) -> AppResult<Vec<SettingRow>> {
        self.repository.all(&Scope::new()).await
    }

    // =========================================================================
    // Scoped Implementations
    // =========================================================================

    async fn get_in<T: DeserializeOwned>(&self, scope: &Scope, key: &str) -> AppResult<Option<T>> {
        let lookup = match self.active_cache() {
            Some(cache) => {
                remember_forever(cache, &cache_key(key, scope), || {
                    self.repository.get(scope, key)
                })
                .await?
            }
            None => self.repository.get(scope, key).await?,
        };

        debug!(key, scope = %scope, found = !lookup.is_missing(), "Setting read");

        match lookup {
            Lookup::Value(raw) => Ok(Some(decode_value(&raw)?)),
            Lookup::Missing | Lookup::Null => Ok(None),
        }
    }

    async fn has_in(&self, scope: &Scope, key: &str) -> AppResult<bool> {
        self.repository.has(scope, key).await
    }

    async fn set_in<T: Serialize + ?Sized>(
        &self,
        scope: &Scope,
        key: &str,
        value: &T,
    ) -> AppResult<()> {
        let encoded = encode_value(value)?;
        let stale = self.stale_keys_for(scope, key).await?;

        self.repository.set(scope, key, Some(encoded)).await?;
        self.invalidate(&stale).await?;

        debug!(key, scope = %scope, "Setting written");
        Ok(())
    }

    async fn set_many_in<I, K, V>(&self, scope: &Scope, entries: I) -> AppResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Serialize,
    {
        for (key, value) in entries {
            self.set_in(scope, key.as_ref(), &value).await?;
        }
        Ok(())
    }

    async fn forget_in(&self, scope: &Scope, key: &str) -> AppResult<()> {
        let stale = self.stale_keys_for(scope, key).await?;

        let deleted = self.repository.forget(scope, key).await?;
        self.invalidate(&stale).await?;

        debug!(key, scope = %scope, rows = deleted, "Setting forgotten");
        Ok(())
    }

    async fn flush_in(&self, scope: &Scope) -> AppResult<u64> {
        let stale = match self.active_cache() {
            Some(_) => {
                let rows = self.repository.all(scope).await?;
                stale_keys(rows.iter().map(|row| (row.key.as_str(), &row.scope)))
            }
            None => BTreeSet::new(),
        };

        let deleted = self.repository.flush(scope).await?;
        self.invalidate(&stale).await?;

        debug!(scope = %scope, rows = deleted, "Settings flushed");
        Ok(deleted)
    }

    /// Cache keys a write of `key` under `scope` can make stale.
    ///
    /// The write touches every row `scope` matches, and inserts one under
    /// `scope` itself when none exists. Must run before the write so deleted
    /// rows are still listed.
    async fn stale_keys_for(&self, scope: &Scope, key: &str) -> AppResult<BTreeSet<String>> {
        if self.active_cache().is_none() {
            return Ok(BTreeSet::new());
        }

        let rows = self.repository.matching(scope, key).await?;
        Ok(stale_keys(
            std::iter::once((key, scope)).chain(rows.iter().map(|row| (key, &row.scope))),
        ))
    }

    async fn invalidate(&self, keys: &BTreeSet<String>) -> AppResult<()> {
        if let Some(cache) = self.active_cache() {
            for key in keys {
                cache.forget(key).await?;
            }
        }
        Ok(())
    }
}

/// Every cache key under which a read could have returned one of `rows`.
fn stale_keys<'a, I>(rows: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = (&'a str, &'a Scope)>,
{
    rows.into_iter()
        .flat_map(|(key, scope)| {
            scope
                .subsets()
                .into_iter()
                .map(move |subset| cache_key(key, &subset))
        })
        .collect()
}

/// Settings bound to one scope for exactly one operation.
///
/// Obtained from [`Settings::set_extra_columns`]. Every method consumes the
/// handle, so the scope is gone once the operation returns, whether it
/// succeeded or not.
pub struct Scoped<'a> {
    settings: &'a Settings,
    scope: Scope,
}

impl Scoped<'_> {
    /// The extra columns the next operation will use.
    pub fn extra_columns(&self) -> &Scope {
        &self.scope
    }

    pub async fn get<T: DeserializeOwned>(self, key: &str) -> AppResult<Option<T>> {
        self.settings.get_in(&self.scope, key).await
    }

    pub async fn get_or<T: DeserializeOwned>(self, key: &str, default: T) -> AppResult<T> {
        Ok(self.settings.get_in(&self.scope, key).await?.unwrap_or(default))
    }

    pub async fn require<T: DeserializeOwned>(self, key: &str) -> AppResult<T> {
        self.settings.get_in(&self.scope, key).await?.ok_or_not_found()
    }

    pub async fn has(self, key: &str) -> AppResult<bool> {
        self.settings.has_in(&self.scope, key).await
    }

    pub async fn set<T: Serialize + ?Sized>(self, key: &str, value: &T) -> AppResult<()> {
        self.settings.set_in(&self.scope, key, value).await
    }

    pub async fn set_many<I, K, V>(self, entries: I) -> AppResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Serialize,
    {
        self.settings.set_many_in(&self.scope, entries).await
    }

    pub async fn forget(self, key: &str) -> AppResult<()> {
        self.settings.forget_in(&self.scope, key).await
    }

    /// Delete the rows matching this scope only.
    pub async fn flush(self) -> AppResult<u64> {
        self.settings.flush_in(&self.scope).await
    }

    pub async fn all(self) -> AppResult<Vec<SettingRow>> {
        self.settings.repository.all(&self.scope).await
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;

    use super::*;
    use crate::infra::{MemoryCache, MockCacheStore};
    use crate::repository::MockSettingsRepository;
    use common::AppError;

    fn tenant(id: i64) -> Scope {
        Scope::from([("tenant_id", id)])
    }

    fn stored(value: &str) -> Lookup {
        Lookup::Value(encode_value(value).unwrap())
    }

    #[tokio::test]
    async fn test_get_without_cache_never_reads_cache() {
        let mut repo = MockSettingsRepository::new();
        repo.expect_get()
            .times(1)
            .returning(|_, _| Ok(stored("value")));

        let mut cache = MockCacheStore::new();
        cache.expect_get().never();
        cache.expect_put_forever().never();

        let mut settings = Settings::new(Arc::new(repo)).with_cache(Arc::new(cache));
        settings.disable_cache();

        let value: Option<String> = settings.get("key").await.unwrap();
        assert_eq!(value.as_deref(), Some("value"));
    }

    #[tokio::test]
    async fn test_enabled_without_store_behaves_as_disabled() {
        let mut repo = MockSettingsRepository::new();
        repo.expect_get()
            .times(1)
            .returning(|_, _| Ok(stored("value")));

        let mut settings = Settings::new(Arc::new(repo));
        settings.enable_cache();

        assert!(!settings.is_cache_enabled());
        assert_eq!(settings.get::<String>("key").await.unwrap().as_deref(), Some("value"));
    }

    #[tokio::test]
    async fn test_get_with_cache_hit_skips_repository() {
        let mut repo = MockSettingsRepository::new();
        repo.expect_get().never();

        let payload = serde_json::to_string(&stored("cached")).unwrap();
        let expected_key = cache_key("key", &Scope::new());
        let mut cache = MockCacheStore::new();
        cache
            .expect_get()
            .withf(move |key| key.to_string() == expected_key)
            .times(1)
            .returning(move |_| Ok(Some(payload.clone())));

        let mut settings = Settings::new(Arc::new(repo)).with_cache(Arc::new(cache));
        settings.enable_cache();

        assert_eq!(settings.get::<String>("key").await.unwrap().as_deref(), Some("cached"));
    }

    #[tokio::test]
    async fn test_set_evicts_every_scope_that_could_read_the_row() {
        let mut repo = MockSettingsRepository::new();
        repo.expect_matching()
            .withf(|scope, key| scope.is_empty() && key == "plan")
            .times(1)
            .returning(|_, _| {
                Ok(vec![SettingRow {
                    key: "plan".to_string(),
                    value: None,
                    scope: tenant(1),
                }])
            });
        repo.expect_set()
            .withf(|scope, key, value| scope.is_empty() && key == "plan" && value.is_some())
            .times(1)
            .returning(|_, _, _| Ok(()));

        let cache = Arc::new(MemoryCache::new());
        let unscoped_key = cache_key("plan", &Scope::new());
        let tenant_key = cache_key("plan", &tenant(1));
        let other_key = cache_key("plan", &tenant(2));
        for key in [&unscoped_key, &tenant_key, &other_key] {
            cache.put_forever(key, "{}".to_string()).await.unwrap();
        }

        let mut settings = Settings::new(Arc::new(repo)).with_cache(cache.clone());
        settings.enable_cache();

        settings.set("plan", "free").await.unwrap();

        assert!(!cache.contains(&unscoped_key).await);
        assert!(!cache.contains(&tenant_key).await);
        assert!(cache.contains(&other_key).await);
    }

    #[tokio::test]
    async fn test_scoped_set_evicts_unscoped_entry() {
        let mut repo = MockSettingsRepository::new();
        repo.expect_matching().times(1).returning(|_, _| Ok(vec![]));
        repo.expect_set()
            .withf(|scope, key, value| {
                *scope == tenant(1) && key == "key" && value.is_some()
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let unscoped_key = cache_key("key", &Scope::new());
        let tenant_key = cache_key("key", &tenant(1));
        let mut cache = MockCacheStore::new();
        cache
            .expect_forget()
            .withf(move |key| key.to_string() == unscoped_key)
            .times(1)
            .returning(|_| Ok(()));
        cache
            .expect_forget()
            .withf(move |key| key.to_string() == tenant_key)
            .times(1)
            .returning(|_| Ok(()));

        let mut settings = Settings::new(Arc::new(repo)).with_cache(Arc::new(cache));
        settings.enable_cache();

        settings
            .set_extra_columns(tenant(1))
            .set("key", "value")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_write_without_cache_skips_row_listing() {
        let mut repo = MockSettingsRepository::new();
        repo.expect_matching().never();
        repo.expect_forget().times(1).returning(|_, _| Ok(0));

        let settings = Settings::new(Arc::new(repo));

        settings.forget("key").await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_invalidation_propagates() {
        let mut repo = MockSettingsRepository::new();
        repo.expect_matching().returning(|_, _| Ok(vec![]));
        repo.expect_forget().times(1).returning(|_, _| Ok(1));

        let mut cache = MockCacheStore::new();
        cache
            .expect_forget()
            .returning(|_| Err(AppError::Cache("connection reset".to_string())));

        let mut settings = Settings::new(Arc::new(repo)).with_cache(Arc::new(cache));
        settings.enable_cache();

        assert!(matches!(settings.forget("key").await, Err(AppError::Cache(_))));
    }

    #[tokio::test]
    async fn test_scope_is_consumed_by_one_operation() {
        let mut repo = MockSettingsRepository::new();
        repo.expect_get()
            .withf(|scope, _| *scope == tenant(1))
            .times(1)
            .returning(|_, _| Ok(stored("tenant")));
        repo.expect_get()
            .withf(|scope, _| scope.is_empty())
            .times(1)
            .returning(|_, _| Ok(Lookup::Missing));

        let settings = Settings::new(Arc::new(repo));

        let scoped = settings.set_extra_columns(tenant(1));
        assert_eq!(scoped.extra_columns(), &tenant(1));
        assert_eq!(scoped.get::<String>("key").await.unwrap().as_deref(), Some("tenant"));
        assert_eq!(settings.get::<String>("key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_null_value_yields_default() {
        let mut repo = MockSettingsRepository::new();
        repo.expect_get().returning(|_, _| Ok(Lookup::Null));

        let settings = Settings::new(Arc::new(repo));

        assert_eq!(settings.get_or("key", "d".to_string()).await.unwrap(), "d");
        assert!(matches!(
            settings.require::<String>("key").await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_corrupt_value_is_not_defaulted() {
        let mut repo = MockSettingsRepository::new();
        repo.expect_get()
            .returning(|_, _| Ok(Lookup::Value("a:1:{s:5:\"hello\";}".to_string())));

        let settings = Settings::new(Arc::new(repo));

        assert!(matches!(
            settings.get_or("key", "d".to_string()).await,
            Err(AppError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_unserializable_value_writes_nothing() {
        let mut repo = MockSettingsRepository::new();
        repo.expect_set().never();

        let settings = Settings::new(Arc::new(repo));

        // JSON object keys must be strings.
        let mut map = std::collections::HashMap::new();
        map.insert(vec![1u8], "x");

        assert!(matches!(
            settings.set("key", &map).await,
            Err(AppError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_flush_invalidates_call_and_row_scopes() {
        let mut repo = MockSettingsRepository::new();
        repo.expect_all().with(eq(Scope::new())).times(1).returning(|_| {
            Ok(vec![SettingRow {
                key: "key".to_string(),
                value: None,
                scope: tenant(1),
            }])
        });
        repo.expect_flush()
            .with(eq(Scope::new()))
            .times(1)
            .returning(|_| Ok(1));

        let cache = Arc::new(MemoryCache::new());
        let unscoped_key = cache_key("key", &Scope::new());
        let tenant_key = cache_key("key", &tenant(1));
        cache.put_forever(&unscoped_key, "{}".to_string()).await.unwrap();
        cache.put_forever(&tenant_key, "{}".to_string()).await.unwrap();

        let mut settings = Settings::new(Arc::new(repo)).with_cache(cache.clone());
        settings.enable_cache();

        assert_eq!(settings.flush().await.unwrap(), 1);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_flush_without_cache_skips_enumeration() {
        let mut repo = MockSettingsRepository::new();
        repo.expect_all().never();
        repo.expect_flush().times(1).returning(|_| Ok(0));

        let settings = Settings::new(Arc::new(repo));

        assert_eq!(settings.set_extra_columns(tenant(3)).flush().await.unwrap(), 0);
    }
}
