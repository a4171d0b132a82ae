//! Every node sees every phase once, in the global order, whatever the tree
//! shape and whenever its subtree grows.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use serde_json::{json, Value};

use circuitc_core::{NodeId, RenderPhase};
use circuitc_render::{
    parse_custom, ComponentRegistry, Element, NodeBehavior, RenderConfig, RenderContext,
    RenderEngine, RenderError,
};

type Log = Arc<Mutex<Vec<(NodeId, RenderPhase)>>>;

/// Logs initial handling; nodes with `grow > 0` add a child during `spawn_in`.
struct Recorder {
    log: Log,
    spawn_in: RenderPhase,
}

impl NodeBehavior for Recorder {
    fn initial(&self, ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
        self.log.lock().unwrap().push((node, ctx.phase));
        if ctx.phase == self.spawn_in {
            let grow = ctx
                .node(node)?
                .declared
                .get("grow")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            if grow > 0 {
                ctx.add_child(node, "recorder", json!({ "grow": grow - 1 }))?;
            }
        }
        Ok(())
    }
}

fn element(depth: u32, fanout: usize, grow: u64) -> Element {
    let node = Element::new("recorder", json!({ "grow": grow }));
    if depth == 0 {
        return node;
    }
    node.with_children((0..fanout).map(|_| element(depth - 1, fanout, grow)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn phases_run_in_global_order_on_every_node(
        depth in 0u32..4,
        fanout in 1usize..4,
        grow in 0u64..3,
        spawn in 0usize..RenderPhase::COUNT,
    ) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ComponentRegistry::empty();
        registry.register(
            "recorder",
            parse_custom,
            Recorder { log: Arc::clone(&log), spawn_in: RenderPhase::ALL[spawn] },
        );
        let tree = registry.build_tree(&[element(depth, fanout, grow)]).unwrap();
        let mut engine = RenderEngine::new(tree, registry, RenderConfig::default());
        engine.render_cycle().unwrap();

        let mut seen: HashMap<NodeId, Vec<RenderPhase>> = HashMap::new();
        for (node, phase) in log.lock().unwrap().iter() {
            seen.entry(*node).or_default().push(*phase);
        }
        let root = engine.tree().root_id();
        let nodes = engine.tree().full_descendants(root);
        prop_assert_eq!(seen.len(), nodes.len());
        for node in nodes {
            prop_assert_eq!(seen.get(&node).cloned().unwrap_or_default(), RenderPhase::ALL.to_vec());
        }
    }
}
