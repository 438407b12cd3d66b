//! Domain-level constants.
//!
//! Column names, encoding version and cache key layout.

// =============================================================================
// Table Layout
// =============================================================================

/// Default settings table name
pub const DEFAULT_TABLE_NAME: &str = "settings";

/// Auto-assigned row identifier column
pub const COLUMN_ID: &str = "id";

/// Setting key column
pub const COLUMN_KEY: &str = "key";

/// Setting value column (nullable)
pub const COLUMN_VALUE: &str = "value";

/// Column names a scope column may not shadow
pub const RESERVED_COLUMNS: &[&str] = &[COLUMN_ID, COLUMN_KEY, COLUMN_VALUE];

/// Check if a column name is reserved by the settings table itself
pub fn is_reserved_column(name: &str) -> bool {
    RESERVED_COLUMNS.contains(&name)
}

// =============================================================================
// Value Encoding
// =============================================================================

/// Current version of the stored value envelope
pub const ENCODING_VERSION: u8 = 1;

// =============================================================================
// Cache
// =============================================================================

/// Cache key prefix for setting entries
pub const CACHE_PREFIX_SETTING: &str = "settings:";
