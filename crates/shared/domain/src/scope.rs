//! Scope value object.
//!
//! A scope is the set of extra column assignments (tenant, environment, ...)
//! that, together with the key, identifies a setting row. Scopes are
//! immutable values passed to each operation; nothing holds one between
//! calls.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A scalar scope column value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScopeValue {
    Integer(i64),
    Text(String),
    Boolean(bool),
}

impl From<i64> for ScopeValue {
    fn from(value: i64) -> Self {
        ScopeValue::Integer(value)
    }
}

impl From<i32> for ScopeValue {
    fn from(value: i32) -> Self {
        ScopeValue::Integer(i64::from(value))
    }
}

impl From<u32> for ScopeValue {
    fn from(value: u32) -> Self {
        ScopeValue::Integer(i64::from(value))
    }
}

impl From<bool> for ScopeValue {
    fn from(value: bool) -> Self {
        ScopeValue::Boolean(value)
    }
}

impl From<String> for ScopeValue {
    fn from(value: String) -> Self {
        ScopeValue::Text(value)
    }
}

impl From<&str> for ScopeValue {
    fn from(value: &str) -> Self {
        ScopeValue::Text(value.to_string())
    }
}

impl fmt::Display for ScopeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeValue::Integer(v) => write!(f, "{}", v),
            ScopeValue::Text(v) => write!(f, "{}", v),
            ScopeValue::Boolean(v) => write!(f, "{}", v),
        }
    }
}

/// Extra column assignments applied to a single operation.
///
/// Columns are kept ordered by name, so two scopes built from the same
/// pairs in a different order are equal and serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope {
    columns: BTreeMap<String, ScopeValue>,
}

impl Scope {
    /// Create an empty scope (matches every row).
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of this scope with `column` set to `value`.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<ScopeValue>) -> Self {
        self.columns.insert(column.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn get(&self, column: &str) -> Option<&ScopeValue> {
        self.columns.get(column)
    }

    /// Iterate over `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScopeValue)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Every scope built from a subset of these columns, the empty scope and
    /// `self` included.
    ///
    /// A read under scope `S` can return a row only when `S` is a subset of
    /// the row's scope, so these are the cache scopes a write to that row
    /// has to evict.
    pub fn subsets(&self) -> Vec<Scope> {
        let mut subsets = vec![Scope::new()];
        for (column, value) in &self.columns {
            let extended: Vec<Scope> = subsets
                .iter()
                .map(|s| s.clone().with(column.as_str(), value.clone()))
                .collect();
            subsets.extend(extended);
        }
        subsets
    }
}

impl<K, V> FromIterator<(K, V)> for Scope
where
    K: Into<String>,
    V: Into<ScopeValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            columns: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Scope
where
    K: Into<String>,
    V: Into<ScopeValue>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (column, value)) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", column, value)?;
        }
        write!(f, "}}")
    }
}
