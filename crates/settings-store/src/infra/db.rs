//! Database connection and initialization.

use std::sync::Arc;
use std::time::Duration;

use sea_orm::{
    ConnectOptions, ConnectionTrait, Database as SeaDatabase, DatabaseConnection, DbErr, Statement,
};

use common::DatabaseConfig;

/// Database wrapper for connection management
///
/// The pool handle is shared through an `Arc`; `DatabaseConnection` itself
/// is not `Clone` when sea-orm's `mock` feature is enabled.
#[derive(Clone)]
pub struct Database {
    connection: Arc<DatabaseConnection>,
}

impl Database {
    /// Open a connection pool for the configured database.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DbErr> {
        let mut options = ConnectOptions::new(config.url.clone());
        options
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(10))
            .sqlx_logging(false);

        // Every pooled connection to an in-memory SQLite database sees its own
        // empty database, so the pool must hold exactly one.
        if is_sqlite_memory(&config.url) {
            options.max_connections(1).min_connections(1);
        }

        let connection = SeaDatabase::connect(options).await?;
        tracing::info!(backend = ?connection.get_database_backend(), "Database connected");

        Ok(Self {
            connection: Arc::new(connection),
        })
    }

    /// Get a shared handle to the connection pool.
    pub fn get_connection(&self) -> Arc<DatabaseConnection> {
        Arc::clone(&self.connection)
    }

    /// Check database connectivity by executing a simple query.
    pub async fn ping(&self) -> Result<(), DbErr> {
        self.connection
            .execute(Statement::from_string(
                self.connection.get_database_backend(),
                "SELECT 1".to_string(),
            ))
            .await?;
        Ok(())
    }
}

fn is_sqlite_memory(url: &str) -> bool {
    url.starts_with("sqlite::memory:") || url.contains("mode=memory")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_sqlite_memory() {
        assert!(is_sqlite_memory("sqlite::memory:"));
        assert!(is_sqlite_memory("sqlite://file:app?mode=memory"));
        assert!(!is_sqlite_memory("sqlite://settings.db?mode=rwc"));
        assert!(!is_sqlite_memory("postgres://localhost/app"));
    }

    #[tokio::test]
    async fn test_connect_in_memory_sqlite() {
        let db = Database::connect(&DatabaseConfig::default()).await.unwrap();
        assert!(db.ping().await.is_ok());
    }
}
