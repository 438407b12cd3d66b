//! Domain layer - Settings value types and pure policies.
//!
//! This crate contains no I/O. It defines what a setting row and a scope
//! look like, how values are encoded for storage, and how cache keys are
//! derived. Storage and caching live in `settings-store`.

pub mod cache_key;
pub mod codec;
pub mod constants;
pub mod error;
pub mod scope;
pub mod setting;

pub use cache_key::cache_key;
pub use codec::{decode_value, encode_value};
pub use constants::*;
pub use error::{DomainError, DomainResult};
pub use scope::{Scope, ScopeValue};
pub use setting::{Lookup, ScopeColumn, ScopeKind, SettingRow, TableSchema};
