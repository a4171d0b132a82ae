//! The [`FactStore`] trait: the typed CRUD contract every render pass reads
//! and writes through.
//!
//! The store is synchronous. The render engine is single-threaded, so the
//! store needs no locking of its own.

use serde_json::{Map, Value};

use crate::error::StorageError;
use crate::record::CircuitRecord;

/// Typed collections of circuit records keyed by id.
pub trait FactStore: Send {
    // -------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------

    /// Inserts a record, assigning a fresh `<kind>_<n>` id.
    ///
    /// Returns the record as stored, with its id filled in.
    fn insert(&mut self, record: CircuitRecord) -> Result<CircuitRecord, StorageError>;

    /// Inserts a record keeping the id it already carries.
    ///
    /// Used when merging snapshots whose ids were remapped beforehand.
    fn insert_with_id(&mut self, record: CircuitRecord) -> Result<(), StorageError>;

    /// Shallow-merges `partial` (a JSON object) into the record `id`.
    fn update(&mut self, id: &str, partial: &Value) -> Result<CircuitRecord, StorageError>;

    /// Replaces the record with the same id.
    fn replace(&mut self, record: CircuitRecord) -> Result<(), StorageError>;

    /// Removes the record `id` and returns it.
    fn delete(&mut self, id: &str) -> Result<CircuitRecord, StorageError>;

    // -------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------

    fn get(&self, id: &str) -> Option<&CircuitRecord>;

    /// Every record of `kind`, in insertion order.
    fn list(&self, kind: &str) -> Vec<&CircuitRecord>;

    /// Full export in insertion order: the compiled output.
    fn to_array(&self) -> Vec<CircuitRecord>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records of `kind` whose fields equal every entry of `fields`.
    fn list_where(&self, kind: &str, fields: &Value) -> Vec<&CircuitRecord> {
        let empty = Map::new();
        let fields = fields.as_object().unwrap_or(&empty);
        self.list(kind)
            .into_iter()
            .filter(|r| r.matches(fields))
            .collect()
    }

    /// First record of `kind` matching `fields`.
    fn get_where(&self, kind: &str, fields: &Value) -> Option<&CircuitRecord> {
        self.list_where(kind, fields).into_iter().next()
    }
}
