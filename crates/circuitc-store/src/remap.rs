//! Id remapping and translation of record snapshots.
//!
//! A snapshot rendered in isolation uses its own id space. Before merging
//! it into a parent store every `*_id` / `*_ids` field is rewritten under a
//! fresh prefix, connectivity keys are prefixed the same way, and explicit
//! overrides map chosen ids (the isolated root subcircuit) onto ids that
//! already exist in the parent.

use std::collections::HashMap;

use serde_json::Value;

use circuitc_core::geometry::Transform;

use crate::error::StorageError;
use crate::record::{CircuitRecord, Side};

const CONNECTIVITY_KEY_FIELD: &str = "subcircuit_connectivity_map_key";

/// Rewrites ids in `records` under `prefix`.
///
/// Ids present in `overrides` map to the override value instead.
pub fn remap_ids(
    records: &[CircuitRecord],
    prefix: &str,
    overrides: &HashMap<String, String>,
) -> Result<Vec<CircuitRecord>, StorageError> {
    let rewrite = |id: &str| -> String {
        overrides
            .get(id)
            .cloned()
            .unwrap_or_else(|| format!("{prefix}_{id}"))
    };

    records
        .iter()
        .map(|record| {
            let mut json = record.to_json()?;
            for (key, value) in json.iter_mut() {
                if key.ends_with("_id") {
                    if let Value::String(s) = value {
                        *s = rewrite(s);
                    }
                } else if key.ends_with("_ids") {
                    if let Value::Array(items) = value {
                        for item in items {
                            if let Value::String(s) = item {
                                *s = rewrite(s);
                            }
                        }
                    }
                } else if key == CONNECTIVITY_KEY_FIELD {
                    if let Value::String(s) = value {
                        *s = format!("{prefix}_{s}");
                    }
                }
            }
            CircuitRecord::from_json(json)
        })
        .collect()
}

/// Applies `t` to every record on `side` (or every spatial record when
/// `side` is `None`).
pub fn transform_records(records: &mut [CircuitRecord], t: &Transform, side: Option<Side>) {
    for record in records {
        if side.is_none() || record.side() == side {
            record.transform(t);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{PcbComponent, SourceTrace};
    use circuitc_core::geometry::Point;

    #[test]
    fn remaps_id_fields_lists_and_connectivity_keys() {
        let trace = CircuitRecord::SourceTrace(SourceTrace {
            source_trace_id: "source_trace_0".to_string(),
            connected_source_port_ids: vec!["source_port_0".to_string()],
            subcircuit_id: Some("subcircuit_source_group_0".to_string()),
            subcircuit_connectivity_map_key: Some("G_connectivity_net0".to_string()),
            ..Default::default()
        });
        let overrides = HashMap::from([(
            "subcircuit_source_group_0".to_string(),
            "subcircuit_source_group_7".to_string(),
        )]);
        let out = remap_ids(&[trace], "isolated_3", &overrides).unwrap();
        let CircuitRecord::SourceTrace(t) = &out[0] else {
            panic!("kind changed");
        };
        assert_eq!(t.source_trace_id, "isolated_3_source_trace_0");
        assert_eq!(t.connected_source_port_ids, vec!["isolated_3_source_port_0"]);
        assert_eq!(t.subcircuit_id.as_deref(), Some("subcircuit_source_group_7"));
        assert_eq!(
            t.subcircuit_connectivity_map_key.as_deref(),
            Some("isolated_3_G_connectivity_net0")
        );
    }

    #[test]
    fn translation_only_touches_requested_side() {
        let mut records = vec![CircuitRecord::PcbComponent(PcbComponent {
            pcb_component_id: "pcb_component_0".to_string(),
            center: Point::new(1.0, 1.0),
            ..Default::default()
        })];
        transform_records(&mut records, &Transform::translation(2.0, 0.0), Some(Side::Schematic));
        assert_eq!(records[0].bounds().unwrap().center(), Point::new(1.0, 1.0));
        transform_records(&mut records, &Transform::translation(2.0, 0.0), Some(Side::Pcb));
        assert_eq!(records[0].bounds().unwrap().center(), Point::new(3.0, 1.0));
    }
}
