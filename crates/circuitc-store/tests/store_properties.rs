//! Property tests for the in-memory fact store.

use proptest::prelude::*;

use circuitc_store::record::{SourceComponent, SourceNet};
use circuitc_store::{remap_ids, CircuitRecord, FactStore, InMemoryStore};
use std::collections::HashMap;

fn record(is_net: bool, name: String) -> CircuitRecord {
    if is_net {
        CircuitRecord::SourceNet(SourceNet {
            name,
            ..Default::default()
        })
    } else {
        CircuitRecord::SourceComponent(SourceComponent {
            name,
            ftype: "resistor".to_string(),
            ..Default::default()
        })
    }
}

proptest! {
    #[test]
    fn ids_are_unique_and_export_keeps_insertion_order(
        items in prop::collection::vec((any::<bool>(), "[A-Z][0-9]{1,2}"), 1..40)
    ) {
        let mut store = InMemoryStore::new();
        let mut inserted = Vec::new();
        for (is_net, name) in items {
            inserted.push(store.insert(record(is_net, name)).unwrap().id().to_string());
        }
        let exported: Vec<String> = store.to_array().iter().map(|r| r.id().to_string()).collect();
        prop_assert_eq!(&exported, &inserted);

        let mut unique = inserted.clone();
        unique.sort();
        unique.dedup();
        prop_assert_eq!(unique.len(), inserted.len());
    }

    #[test]
    fn remapped_snapshot_merges_without_collisions(count in 1usize..20) {
        let mut nested = InMemoryStore::new();
        for i in 0..count {
            nested.insert(record(i % 2 == 0, format!("N{i}"))).unwrap();
        }
        let mut parent = InMemoryStore::new();
        for i in 0..count {
            parent.insert(record(i % 2 == 0, format!("P{i}"))).unwrap();
        }
        let snapshot = nested.to_array();
        for prefix in ["isolated_0", "isolated_1"] {
            for rec in remap_ids(&snapshot, prefix, &HashMap::new()).unwrap() {
                parent.insert_with_id(rec).unwrap();
            }
        }
        prop_assert_eq!(parent.len(), count * 3);
    }
}
