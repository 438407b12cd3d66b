//! Settings Store Library
//!
//! A key-value settings store kept in a relational table. Values are
//! encoded as versioned JSON. Reads can go through a cache that never
//! expires and is evicted on every write. Deployments may declare extra
//! "scope" columns (a tenant id, a locale) and bind values for them to a
//! single operation with `set_extra_columns`.
//!
//! ```no_run
//! # async fn demo() -> common::AppResult<()> {
//! use settings_store::{SettingsApp, SettingsConfig};
//!
//! let app = SettingsApp::connect(&SettingsConfig::from_env()?).await?;
//! app.settings.set("site.name", "Example").await?;
//!
//! let name: Option<String> = app.settings.get("site.name").await?;
//! let seats: i64 = app
//!     .settings
//!     .set_extra_columns([("tenant_id", 1)])
//!     .get_or("seats", 5)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod infra;
pub mod repository;
pub mod service;

use std::sync::Arc;

use tracing::{info, warn};

use common::AppResult;

pub use crate::config::SettingsConfig;
pub use crate::service::{Scoped, Settings};
pub use domain::{Lookup, Scope, ScopeKind, ScopeValue, SettingRow, TableSchema};

use crate::infra::{CacheStore, Database, MemoryCache, RedisCache, SqlTable};
use crate::repository::SettingsStore;

/// A fully wired settings store: connection, table accessor and service.
pub struct SettingsApp {
    pub settings: Settings,
    pub table: Arc<SqlTable>,
    pub database: Database,
}

impl SettingsApp {
    /// Connect to the database and cache described by `config`.
    ///
    /// The table is not created here; call [`SettingsApp::init`] for that.
    pub async fn connect(config: &SettingsConfig) -> AppResult<Self> {
        let database = Database::connect(&config.database).await?;
        let table = Arc::new(SqlTable::new(
            database.get_connection(),
            config.schema.clone(),
        )?);

        let repository = Arc::new(SettingsStore::new(table.clone()));
        let mut settings = Settings::new(repository);

        if config.cache.enabled {
            settings.set_cache(connect_cache(config.cache.redis_url.as_deref()).await);
            settings.enable_cache();
        }

        info!(
            table = %config.schema.table,
            scope_columns = config.schema.scope_columns.len(),
            cache = settings.is_cache_enabled(),
            "Settings store ready"
        );

        Ok(Self {
            settings,
            table,
            database,
        })
    }

    /// Create the settings table if it does not exist.
    pub async fn init(&self) -> AppResult<()> {
        self.table.ensure_schema().await
    }
}

/// Redis when a URL is configured and reachable, otherwise the in-process cache.
async fn connect_cache(redis_url: Option<&str>) -> Arc<dyn CacheStore> {
    match redis_url {
        Some(url) => match RedisCache::connect(url).await {
            Ok(cache) => Arc::new(cache),
            Err(e) => {
                warn!(error = %e, "Redis unavailable, using in-process cache");
                Arc::new(MemoryCache::new())
            }
        },
        None => Arc::new(MemoryCache::new()),
    }
}
