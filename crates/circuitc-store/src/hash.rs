//! Deterministic content digests using blake3.
//!
//! Digests are derived state: they name cache entries and isolated id
//! prefixes, and let tests compare whole exports cheaply.
//!
//! # Determinism
//!
//! `serde_json::Value` objects are key-sorted maps, and records serialize
//! through fixed struct field order, so the same content always produces
//! the same bytes and therefore the same digest.

use serde_json::Value;

use crate::error::StorageError;
use crate::record::CircuitRecord;

/// blake3 digest of a JSON value's canonical serialization.
pub fn hash_value(value: &Value) -> Result<blake3::Hash, StorageError> {
    let bytes = serde_json::to_vec(value)?;
    Ok(blake3::hash(&bytes))
}

/// First `len` hex characters of the digest of `text`.
pub fn short_digest(text: &str, len: usize) -> String {
    let hex = blake3::hash(text.as_bytes()).to_hex();
    hex.as_str()[..len.min(hex.len())].to_string()
}

/// Digest of a record export, order-sensitive.
pub fn hash_records(records: &[CircuitRecord]) -> Result<blake3::Hash, StorageError> {
    let mut hasher = blake3::Hasher::new();
    for record in records {
        hasher.update(&serde_json::to_vec(record)?);
        hasher.update(b"\n");
    }
    Ok(hasher.finalize())
}
