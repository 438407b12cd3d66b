//! Settings store configuration.

use std::env;

use common::{AppResult, CacheConfig, DatabaseConfig};
use domain::TableSchema;

/// Settings store configuration.
#[derive(Debug, Clone, Default)]
pub struct SettingsConfig {
    /// Database connection settings
    pub database: DatabaseConfig,
    /// Read-through cache settings
    pub cache: CacheConfig,
    /// Table name and declared scope columns
    pub schema: TableSchema,
}

impl SettingsConfig {
    /// Load configuration from environment variables.
    ///
    /// Fails only when `SETTINGS_SCOPE_COLUMNS` cannot be parsed or the
    /// resulting schema is invalid.
    pub fn from_env() -> AppResult<Self> {
        let defaults = DatabaseConfig::default();

        let database = DatabaseConfig {
            url: env::var("SETTINGS_DATABASE_URL")
                .or_else(|_| env::var("DATABASE_URL"))
                .unwrap_or(defaults.url),
            max_connections: env::var("SETTINGS_DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            min_connections: defaults.min_connections,
        };

        let cache = CacheConfig {
            enabled: env::var("SETTINGS_CACHE")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            redis_url: env::var("SETTINGS_REDIS_URL")
                .or_else(|_| env::var("REDIS_URL"))
                .ok()
                .filter(|url| !url.is_empty()),
        };

        let mut schema = TableSchema::new(
            env::var("SETTINGS_TABLE").unwrap_or_else(|_| TableSchema::default().table),
        );
        if let Ok(columns) = env::var("SETTINGS_SCOPE_COLUMNS") {
            schema.scope_columns = TableSchema::parse_scope_columns(&columns)?;
        }
        schema.validate()?;

        Ok(Self {
            database,
            cache,
            schema,
        })
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" ON "));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }

    #[test]
    fn test_default_config() {
        let config = SettingsConfig::default();

        assert_eq!(config.schema.table, "settings");
        assert!(config.schema.scope_columns.is_empty());
        assert!(!config.cache.enabled);
        assert_eq!(config.database.url, "sqlite::memory:");
    }
}
