//! Scoped key-value access to the settings table.
//!
//! The repository knows nothing about caching or value encoding. Every
//! operation takes the scope it runs in; scope columns filter every read,
//! write and delete, except `truncate`, which clears the whole table.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use common::AppResult;
use domain::{Lookup, Scope, SettingRow};

use crate::infra::{RowFilter, SettingsTable};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Settings repository trait for dependency injection.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// Check if a row exists for `key` within `scope`
    async fn has(&self, scope: &Scope, key: &str) -> AppResult<bool>;

    /// Read the raw stored value for `key` within `scope`
    async fn get(&self, scope: &Scope, key: &str) -> AppResult<Lookup>;

    /// Insert or update the value for `key` within `scope`
    async fn set(&self, scope: &Scope, key: &str, value: Option<String>) -> AppResult<()>;

    /// List the rows for `key` that `scope` matches
    async fn matching(&self, scope: &Scope, key: &str) -> AppResult<Vec<SettingRow>>;

    /// List every row matching `scope`
    async fn all(&self, scope: &Scope) -> AppResult<Vec<SettingRow>>;

    /// Delete the rows for `key` within `scope`
    async fn forget(&self, scope: &Scope, key: &str) -> AppResult<u64>;

    /// Delete every row matching `scope` (the empty scope matches all rows)
    async fn flush(&self, scope: &Scope) -> AppResult<u64>;

    /// Delete every row in the table regardless of scope
    async fn truncate(&self) -> AppResult<u64>;
}

/// Concrete implementation of SettingsRepository over a table accessor.
pub struct SettingsStore {
    table: Arc<dyn SettingsTable>,
}

impl SettingsStore {
    /// Create new repository instance
    pub fn new(table: Arc<dyn SettingsTable>) -> Self {
        Self { table }
    }

    /// Bind `scope` to the next operation only.
    pub fn set_extra_columns(&self, scope: impl Into<Scope>) -> ScopedRepository<'_> {
        ScopedRepository::new(self, scope.into())
    }
}

#[async_trait]
impl SettingsRepository for SettingsStore {
    async fn has(&self, scope: &Scope, key: &str) -> AppResult<bool> {
        let count = self.table.count(&RowFilter::key(key, scope)).await?;
        Ok(count > 0)
    }

    async fn get(&self, scope: &Scope, key: &str) -> AppResult<Lookup> {
        let row = self.table.value(&RowFilter::key(key, scope)).await?;
        Ok(Lookup::from_row(row))
    }

    async fn set(&self, scope: &Scope, key: &str, value: Option<String>) -> AppResult<()> {
        // Check-then-act: two writers racing on the same key and scope can
        // both insert unless the table enforces uniqueness.
        let filter = RowFilter::key(key, scope);

        if self.table.count(&filter).await? == 0 {
            self.table
                .insert(&SettingRow {
                    key: key.to_string(),
                    value,
                    scope: scope.clone(),
                })
                .await?;
            debug!(key, scope = %scope, "Setting inserted");
        } else {
            let updated = self.table.update(&filter, value).await?;
            debug!(key, scope = %scope, rows = updated, "Setting updated");
        }

        Ok(())
    }

    async fn matching(&self, scope: &Scope, key: &str) -> AppResult<Vec<SettingRow>> {
        self.table.rows(&RowFilter::key(key, scope)).await
    }

    async fn all(&self, scope: &Scope) -> AppResult<Vec<SettingRow>> {
        self.table.rows(&RowFilter::scope(scope)).await
    }

    async fn forget(&self, scope: &Scope, key: &str) -> AppResult<u64> {
        self.table.delete(&RowFilter::key(key, scope)).await
    }

    async fn flush(&self, scope: &Scope) -> AppResult<u64> {
        self.table.delete(&RowFilter::scope(scope)).await
    }

    async fn truncate(&self) -> AppResult<u64> {
        self.table.truncate().await
    }
}

/// A repository bound to one scope for exactly one operation.
///
/// Every method consumes the handle, so the scope cannot outlive the call.
pub struct ScopedRepository<'a> {
    repository: &'a dyn SettingsRepository,
    scope: Scope,
}

impl<'a> ScopedRepository<'a> {
    pub fn new(repository: &'a dyn SettingsRepository, scope: Scope) -> Self {
        Self { repository, scope }
    }

    /// The scope the next operation will run in.
    pub fn extra_columns(&self) -> &Scope {
        &self.scope
    }

    pub async fn has(self, key: &str) -> AppResult<bool> {
        self.repository.has(&self.scope, key).await
    }

    pub async fn get(self, key: &str) -> AppResult<Lookup> {
        self.repository.get(&self.scope, key).await
    }

    pub async fn set(self, key: &str, value: Option<String>) -> AppResult<()> {
        self.repository.set(&self.scope, key, value).await
    }

    pub async fn all(self) -> AppResult<Vec<SettingRow>> {
        self.repository.all(&self.scope).await
    }

    pub async fn forget(self, key: &str) -> AppResult<u64> {
        self.repository.forget(&self.scope, key).await
    }

    pub async fn flush(self) -> AppResult<u64> {
        self.repository.flush(&self.scope).await
    }
}
