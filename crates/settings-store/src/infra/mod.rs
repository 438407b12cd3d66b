//! Infrastructure layer - External systems integration
//!
//! This module handles all external system concerns:
//! - Database connections
//! - The settings table accessor
//! - Caching systems (Redis, in-process)

pub mod cache;
mod db;
pub mod table;

pub use cache::{remember_forever, CacheStore, MemoryCache, RedisCache};
pub use db::Database;
pub use table::{RowFilter, SettingsTable, SqlTable};

#[cfg(any(test, feature = "test-utils"))]
pub use cache::MockCacheStore;
#[cfg(any(test, feature = "test-utils"))]
pub use table::MockSettingsTable;
