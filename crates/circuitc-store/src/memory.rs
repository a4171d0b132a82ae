//! In-memory implementation of [`FactStore`].
//!
//! [`InMemoryStore`] keeps records in an insertion-ordered map plus a
//! per-kind index, so exports are deterministic and kind listings avoid a
//! full scan.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;

use crate::error::StorageError;
use crate::record::CircuitRecord;
use crate::traits::FactStore;

/// HashMap-backed fact store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    /// Records indexed by id, in insertion order.
    records: IndexMap<String, CircuitRecord>,
    /// Record ids grouped by kind.
    by_kind: HashMap<&'static str, IndexSet<String>>,
    /// Next numeric suffix per kind.
    counters: HashMap<&'static str, u32>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from exported records, keeping their ids.
    pub fn from_records(records: Vec<CircuitRecord>) -> Result<Self, StorageError> {
        let mut store = Self::new();
        for record in records {
            store.insert_with_id(record)?;
        }
        Ok(store)
    }

    fn next_id(&mut self, kind: &'static str) -> String {
        loop {
            let counter = self.counters.entry(kind).or_insert(0);
            let id = format!("{kind}_{counter}");
            *counter += 1;
            if !self.records.contains_key(&id) {
                return id;
            }
        }
    }

    fn index(&mut self, record: CircuitRecord) {
        self.by_kind
            .entry(record.kind())
            .or_default()
            .insert(record.id().to_string());
        self.records.insert(record.id().to_string(), record);
    }
}

impl FactStore for InMemoryStore {
    fn insert(&mut self, mut record: CircuitRecord) -> Result<CircuitRecord, StorageError> {
        let id = self.next_id(record.kind());
        record.set_id(id);
        self.index(record.clone());
        Ok(record)
    }

    fn insert_with_id(&mut self, record: CircuitRecord) -> Result<(), StorageError> {
        if record.id().is_empty() {
            return Err(StorageError::InvalidUpdate {
                id: String::new(),
                reason: format!("{} record has no id", record.kind()),
            });
        }
        if self.records.contains_key(record.id()) {
            return Err(StorageError::DuplicateId {
                id: record.id().to_string(),
            });
        }
        self.index(record);
        Ok(())
    }

    fn update(&mut self, id: &str, partial: &Value) -> Result<CircuitRecord, StorageError> {
        let partial = partial.as_object().ok_or_else(|| StorageError::InvalidUpdate {
            id: id.to_string(),
            reason: "partial update must be a JSON object".to_string(),
        })?;
        let current = self
            .records
            .get(id)
            .ok_or_else(|| StorageError::RecordNotFound { id: id.to_string() })?;
        let merged = current.merged(partial)?;
        self.records.insert(id.to_string(), merged.clone());
        Ok(merged)
    }

    fn replace(&mut self, record: CircuitRecord) -> Result<(), StorageError> {
        let slot = self
            .records
            .get_mut(record.id())
            .ok_or_else(|| StorageError::RecordNotFound {
                id: record.id().to_string(),
            })?;
        if slot.kind() != record.kind() {
            return Err(StorageError::InvalidUpdate {
                id: record.id().to_string(),
                reason: format!("cannot change kind {} to {}", slot.kind(), record.kind()),
            });
        }
        *slot = record;
        Ok(())
    }

    fn delete(&mut self, id: &str) -> Result<CircuitRecord, StorageError> {
        let record = self
            .records
            .shift_remove(id)
            .ok_or_else(|| StorageError::RecordNotFound { id: id.to_string() })?;
        if let Some(ids) = self.by_kind.get_mut(record.kind()) {
            ids.shift_remove(id);
        }
        Ok(record)
    }

    fn get(&self, id: &str) -> Option<&CircuitRecord> {
        self.records.get(id)
    }

    fn list(&self, kind: &str) -> Vec<&CircuitRecord> {
        self.by_kind
            .get(kind)
            .map(|ids| ids.iter().filter_map(|id| self.records.get(id)).collect())
            .unwrap_or_default()
    }

    fn to_array(&self) -> Vec<CircuitRecord> {
        self.records.values().cloned().collect()
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{SourceComponent, SourcePort};
    use serde_json::json;

    fn component(name: &str) -> CircuitRecord {
        CircuitRecord::SourceComponent(SourceComponent {
            name: name.to_string(),
            ftype: "resistor".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn insert_assigns_sequential_ids_per_kind() {
        let mut store = InMemoryStore::new();
        let a = store.insert(component("R1")).unwrap();
        let b = store.insert(component("R2")).unwrap();
        let p = store
            .insert(CircuitRecord::SourcePort(SourcePort {
                name: "pin1".to_string(),
                ..Default::default()
            }))
            .unwrap();
        assert_eq!(a.id(), "source_component_0");
        assert_eq!(b.id(), "source_component_1");
        assert_eq!(p.id(), "source_port_0");
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn query_by_fields() {
        let mut store = InMemoryStore::new();
        store.insert(component("R1")).unwrap();
        store.insert(component("R2")).unwrap();
        let hit = store
            .get_where("source_component", &json!({ "name": "R2" }))
            .unwrap();
        assert_eq!(hit.id(), "source_component_1");
        assert!(store
            .get_where("source_component", &json!({ "name": "R3" }))
            .is_none());
        assert_eq!(store.list("source_port").len(), 0);
    }

    #[test]
    fn partial_update_merges_fields() {
        let mut store = InMemoryStore::new();
        let rec = store.insert(component("R1")).unwrap();
        store
            .update(rec.id(), &json!({ "display_value": "1k" }))
            .unwrap();
        let CircuitRecord::SourceComponent(c) = store.get(rec.id()).unwrap() else {
            panic!("wrong kind");
        };
        assert_eq!(c.display_value.as_deref(), Some("1k"));
        assert!(matches!(
            store.update("nope", &json!({})),
            Err(StorageError::RecordNotFound { .. })
        ));
    }

    #[test]
    fn delete_keeps_order_of_remaining_records() {
        let mut store = InMemoryStore::new();
        store.insert(component("R1")).unwrap();
        store.insert(component("R2")).unwrap();
        store.insert(component("R3")).unwrap();
        store.delete("source_component_1").unwrap();
        let ids: Vec<String> = store.to_array().iter().map(|r| r.id().to_string()).collect();
        assert_eq!(ids, vec!["source_component_0", "source_component_2"]);
        assert_eq!(store.list("source_component").len(), 2);
    }

    #[test]
    fn insert_with_id_rejects_duplicates_and_skips_taken_ids() {
        let mut store = InMemoryStore::new();
        let mut rec = component("R1");
        rec.set_id("source_component_0".to_string());
        store.insert_with_id(rec.clone()).unwrap();
        assert!(matches!(
            store.insert_with_id(rec),
            Err(StorageError::DuplicateId { .. })
        ));
        let next = store.insert(component("R2")).unwrap();
        assert_eq!(next.id(), "source_component_1");
    }
}
