//! Cache key derivation.

use sha2::{Digest, Sha256};

use crate::constants::CACHE_PREFIX_SETTING;
use crate::scope::Scope;

/// Derive the cache key for `key` under `scope`.
///
/// The digest covers the canonical JSON of `[key, scope]`; scope columns are
/// ordered by name, so the result does not depend on how the scope was built.
pub fn cache_key(key: &str, scope: &Scope) -> String {
    // Serializing a str and a map of scalars cannot fail.
    let canonical = serde_json::to_vec(&(key, scope)).unwrap_or_default();
    let digest = Sha256::digest(&canonical);
    format!("{}{}", CACHE_PREFIX_SETTING, hex::encode(digest))
}
