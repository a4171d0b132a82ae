//! Property tests for tree traversals and subcircuit boundaries.

use proptest::prelude::*;
use serde_json::{json, Value};

use circuitc_core::props::GroupProps;
use circuitc_core::{DesignTree, NodeId, NodeProps, ValidationError};

fn group(kind: &str, v: &Value) -> Result<NodeProps, ValidationError> {
    GroupProps::parse(kind, v, false).map(NodeProps::Group)
}

/// Each entry picks a parent among the nodes created so far (root first)
/// and whether the new group is a subcircuit.
fn build(shape: &[(usize, bool)]) -> (DesignTree, Vec<NodeId>) {
    let mut tree = DesignTree::new();
    let mut ids = vec![tree.root_id()];
    for (i, &(pick, subcircuit)) in shape.iter().enumerate() {
        let parent = ids[pick % ids.len()];
        let id = tree
            .insert(
                parent,
                "group",
                json!({ "name": format!("G{i}"), "subcircuit": subcircuit }),
                group,
            )
            .unwrap();
        ids.push(id);
    }
    (tree, ids)
}

fn tree_shape() -> impl Strategy<Value = Vec<(usize, bool)>> {
    prop::collection::vec((0usize..64, any::<bool>()), 1..40)
}

proptest! {
    #[test]
    fn post_order_visits_children_before_parents(shape in tree_shape()) {
        let (tree, ids) = build(&shape);
        let order = tree.post_order(tree.root_id());
        prop_assert_eq!(order.len(), ids.len());
        let position = |id: NodeId| order.iter().position(|o| *o == id).unwrap();
        for &id in &ids[1..] {
            let parent = tree.parent(id).unwrap();
            prop_assert!(position(id) < position(parent));
        }
    }

    #[test]
    fn selectable_descendants_stop_at_subcircuits(shape in tree_shape()) {
        let (tree, ids) = build(&shape);
        for &origin in &ids {
            let full = tree.full_descendants(origin);
            let selectable = tree.selectable_descendants(origin);
            for id in &selectable {
                prop_assert!(full.contains(id));
                // No subcircuit sits strictly between the origin and a selectable node.
                let between: Vec<NodeId> = tree
                    .ancestors(*id)
                    .into_iter()
                    .take_while(|a| *a != origin)
                    .collect();
                prop_assert!(between.iter().all(|a| !tree.get(*a).unwrap().is_subcircuit()));
            }
            for id in full.iter().filter(|id| !selectable.contains(id)) {
                let owner = tree.enclosing_subcircuit(*id).unwrap();
                prop_assert!(owner != origin && full.contains(&owner));
            }
        }
    }
}
