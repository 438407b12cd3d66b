//! Setting rows, table schema and lookup results.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{is_reserved_column, DEFAULT_TABLE_NAME};
use crate::error::{DomainError, DomainResult};
use crate::scope::{Scope, ScopeValue};

/// Storage type of a scope column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Integer,
    Text,
    Boolean,
}

impl ScopeKind {
    /// Check if a value can be stored in a column of this kind
    pub fn accepts(&self, value: &ScopeValue) -> bool {
        matches!(
            (self, value),
            (ScopeKind::Integer, ScopeValue::Integer(_))
                | (ScopeKind::Text, ScopeValue::Text(_))
                | (ScopeKind::Boolean, ScopeValue::Boolean(_))
        )
    }

    /// Parse a raw string (e.g. from the command line) as a value of this kind.
    pub fn parse_value(&self, raw: &str) -> DomainResult<ScopeValue> {
        match self {
            ScopeKind::Integer => raw.trim().parse::<i64>().map(ScopeValue::Integer).map_err(|_| {
                DomainError::validation(format!("'{}' is not an integer", raw))
            }),
            ScopeKind::Text => Ok(ScopeValue::Text(raw.to_string())),
            ScopeKind::Boolean => match raw.trim() {
                "true" | "1" => Ok(ScopeValue::Boolean(true)),
                "false" | "0" => Ok(ScopeValue::Boolean(false)),
                other => Err(DomainError::validation(format!(
                    "'{}' is not a boolean",
                    other
                ))),
            },
        }
    }
}

impl FromStr for ScopeKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "integer" | "int" | "bigint" => Ok(ScopeKind::Integer),
            "text" | "string" => Ok(ScopeKind::Text),
            "boolean" | "bool" => Ok(ScopeKind::Boolean),
            other => Err(DomainError::validation(format!(
                "unknown scope column kind '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKind::Integer => write!(f, "integer"),
            ScopeKind::Text => write!(f, "text"),
            ScopeKind::Boolean => write!(f, "boolean"),
        }
    }
}

/// A scope column declared by the deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeColumn {
    pub name: String,
    pub kind: ScopeKind,
}

impl ScopeColumn {
    pub fn new(name: impl Into<String>, kind: ScopeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Logical layout of the settings table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name
    pub table: String,
    /// Extra columns that may appear in a scope
    pub scope_columns: Vec<ScopeColumn>,
}

impl Default for TableSchema {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE_NAME.to_string(),
            scope_columns: Vec::new(),
        }
    }
}

impl TableSchema {
    /// Create a schema with no scope columns.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            scope_columns: Vec::new(),
        }
    }

    /// Declare an additional scope column.
    pub fn with_scope_column(mut self, name: impl Into<String>, kind: ScopeKind) -> Self {
        self.scope_columns.push(ScopeColumn::new(name, kind));
        self
    }

    /// Parse a `name:kind,name:kind` list of scope column declarations.
    pub fn parse_scope_columns(declarations: &str) -> DomainResult<Vec<ScopeColumn>> {
        declarations
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                let (name, kind) = part.split_once(':').ok_or_else(|| {
                    DomainError::validation(format!(
                        "scope column '{}' must be written as name:kind",
                        part
                    ))
                })?;
                Ok(ScopeColumn::new(name.trim(), kind.parse()?))
            })
            .collect()
    }

    pub fn scope_column(&self, name: &str) -> Option<&ScopeColumn> {
        self.scope_columns.iter().find(|c| c.name == name)
    }

    /// Check the schema declaration itself.
    pub fn validate(&self) -> DomainResult<()> {
        if self.table.trim().is_empty() {
            return Err(DomainError::validation("table name must not be empty"));
        }

        for (i, column) in self.scope_columns.iter().enumerate() {
            if column.name.trim().is_empty() {
                return Err(DomainError::validation("scope column name must not be empty"));
            }
            if is_reserved_column(&column.name) {
                return Err(DomainError::validation(format!(
                    "scope column '{}' shadows a settings table column",
                    column.name
                )));
            }
            if self.scope_columns[..i].iter().any(|c| c.name == column.name) {
                return Err(DomainError::validation(format!(
                    "scope column '{}' is declared twice",
                    column.name
                )));
            }
        }

        Ok(())
    }

    /// Build a scope from raw `(column, value)` strings, typed by the declared kinds.
    pub fn parse_scope<'a, I>(&self, pairs: I) -> DomainResult<Scope>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut scope = Scope::new();
        for (name, raw) in pairs {
            let column = self.scope_column(name).ok_or_else(|| {
                DomainError::validation(format!("unknown scope column '{}'", name))
            })?;
            scope = scope.with(name, column.kind.parse_value(raw)?);
        }
        Ok(scope)
    }

    /// Check that every column of `scope` is declared with a matching kind.
    pub fn validate_scope(&self, scope: &Scope) -> DomainResult<()> {
        for (name, value) in scope.iter() {
            let column = self.scope_column(name).ok_or_else(|| {
                DomainError::validation(format!("unknown scope column '{}'", name))
            })?;

            if !column.kind.accepts(value) {
                return Err(DomainError::validation(format!(
                    "scope column '{}' expects a {} value, got '{}'",
                    name, column.kind, value
                )));
            }
        }

        Ok(())
    }
}

/// A persisted setting row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingRow {
    pub key: String,
    /// Encoded value, `None` when the column is NULL
    pub value: Option<String>,
    /// The row's own non-null scope column values
    pub scope: Scope,
}

/// Result of reading a single key.
///
/// Distinguishes a missing row from a row whose value column is NULL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "lowercase")]
pub enum Lookup {
    Missing,
    Null,
    Value(String),
}

impl Lookup {
    /// Build a lookup from the outer "row exists" and inner "value" options.
    pub fn from_row(row: Option<Option<String>>) -> Self {
        match row {
            None => Lookup::Missing,
            Some(None) => Lookup::Null,
            Some(Some(value)) => Lookup::Value(value),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Lookup::Missing)
    }

    /// Collapse to the stored value, losing the missing/null distinction.
    pub fn into_option(self) -> Option<String> {
        match self {
            Lookup::Value(value) => Some(value),
            Lookup::Missing | Lookup::Null => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant_schema() -> TableSchema {
        TableSchema::new("settings").with_scope_column("tenant_id", ScopeKind::Integer)
    }

    #[test]
    fn test_parse_scope_columns() {
        let columns = TableSchema::parse_scope_columns("tenant_id:integer, env:text").unwrap();

        assert_eq!(
            columns,
            vec![
                ScopeColumn::new("tenant_id", ScopeKind::Integer),
                ScopeColumn::new("env", ScopeKind::Text),
            ]
        );
        assert!(TableSchema::parse_scope_columns("").unwrap().is_empty());
        assert!(TableSchema::parse_scope_columns("tenant_id").is_err());
        assert!(TableSchema::parse_scope_columns("tenant_id:uuid").is_err());
    }

    #[test]
    fn test_validate_rejects_reserved_and_duplicate_columns() {
        assert!(tenant_schema().validate().is_ok());
        assert!(TableSchema::new("settings")
            .with_scope_column("key", ScopeKind::Text)
            .validate()
            .is_err());
        assert!(tenant_schema()
            .with_scope_column("tenant_id", ScopeKind::Text)
            .validate()
            .is_err());
        assert!(TableSchema::new(" ").validate().is_err());
    }

    #[test]
    fn test_validate_scope() {
        let schema = tenant_schema();

        assert!(schema.validate_scope(&Scope::new()).is_ok());
        assert!(schema.validate_scope(&Scope::from([("tenant_id", 1)])).is_ok());
        assert!(matches!(
            schema.validate_scope(&Scope::from([("tenant_id", "one")])),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            schema.validate_scope(&Scope::from([("region", "eu")])),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn test_parse_scope_uses_declared_kinds() {
        let schema = tenant_schema().with_scope_column("env", ScopeKind::Text);

        let scope = schema
            .parse_scope([("tenant_id", "7"), ("env", "42")])
            .unwrap();

        assert_eq!(scope.get("tenant_id"), Some(&ScopeValue::Integer(7)));
        assert_eq!(scope.get("env"), Some(&ScopeValue::Text("42".to_string())));
        assert!(schema.parse_scope([("tenant_id", "seven")]).is_err());
        assert!(schema.parse_scope([("region", "eu")]).is_err());
    }

    #[test]
    fn test_lookup_from_row() {
        assert_eq!(Lookup::from_row(None), Lookup::Missing);
        assert_eq!(Lookup::from_row(Some(None)), Lookup::Null);
        assert_eq!(
            Lookup::from_row(Some(Some("x".to_string()))).into_option(),
            Some("x".to_string())
        );
        assert_eq!(Lookup::Null.into_option(), None);
    }
}
