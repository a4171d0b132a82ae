//! Groups, subcircuits and boards.
//!
//! A group owns the layout of its children. A subcircuit group (boards and
//! cacheable groups always are) additionally scopes selectors, maps
//! connectivity for its traces and routes them. A cacheable group hands its
//! whole subtree to an isolated render and only positions the result.

use serde_json::json;

use circuitc_core::props::GroupProps;
use circuitc_core::{NodeId, NodeProps, RenderPhase};
use circuitc_store::record::SourceGroup;
use circuitc_store::{CircuitRecord, Side};

use super::{is_layout_root, upsert};
use crate::context::{subcircuit_id_for, RenderContext};
use crate::error::RenderError;
use crate::registry::NodeBehavior;
use crate::{autoroute, connectivity, isolation, layout};

#[derive(Debug, Clone, Copy, Default)]
pub struct GroupBehavior;

impl NodeBehavior for GroupBehavior {
    fn initial(&self, ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
        self.render(ctx, node, false)
    }

    fn update(&self, ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
        self.render(ctx, node, true)
    }
}

impl GroupBehavior {
    fn render(&self, ctx: &mut RenderContext<'_>, node: NodeId, rerun: bool) -> Result<(), RenderError> {
        let Some(props) = ctx.node(node)?.props.as_group().cloned() else {
            return Ok(());
        };
        let isolated = ctx.isolates(node);
        let phase = ctx.phase;

        match phase {
            RenderPhase::SubtreeExpansion if isolated => isolation::begin(ctx, node),
            RenderPhase::SourceBinding if !isolated => bind_source(ctx, node, &props),
            // A descendant changed: the structural key may have moved on.
            RenderPhase::PortMatching if isolated && rerun => isolation::begin(ctx, node),
            RenderPhase::PortMatching if props.subcircuit && !isolated => {
                connectivity::map_scope(ctx, node).map(|_| ())
            }
            RenderPhase::SchematicLayout if is_layout_root(ctx, node) => {
                layout::layout_group(ctx, node, Side::Schematic)
            }
            RenderPhase::PcbComponentRender if is_layout_root(ctx, node) => {
                layout::layout_group(ctx, node, Side::Pcb)
            }
            RenderPhase::PcbTraceRender if props.subcircuit && !isolated => {
                autoroute::route_scope(ctx, node)
            }
            _ => Ok(()),
        }
    }
}

/// Writes the group's `source_group` and links its direct children to it.
fn bind_source(ctx: &mut RenderContext<'_>, node: NodeId, props: &GroupProps) -> Result<(), RenderError> {
    let parent_source_group_id = ctx
        .tree
        .ancestors(node)
        .into_iter()
        .find_map(|a| ctx.tree.get(a).and_then(|n| n.refs.source_group_id.clone()));
    let record = CircuitRecord::SourceGroup(SourceGroup {
        name: props.name.clone(),
        is_subcircuit: props.subcircuit,
        parent_source_group_id,
        subcircuit_id: props.subcircuit.then(|| subcircuit_id_for(node)),
        parent_subcircuit_id: ctx.enclosing_subcircuit_id(node),
        ..Default::default()
    });
    let existing = ctx.refs(node)?.source_group_id.clone();
    let id = upsert(ctx, existing.as_deref(), record)?;
    ctx.refs_mut(node)?.source_group_id = Some(id.clone());

    let children: Vec<NodeId> = ctx.tree.children(node).to_vec();
    for child in children {
        let Some(child_node) = ctx.tree.get(child) else {
            continue;
        };
        let (record_id, patch) = match child_node.props {
            NodeProps::Component(_) => (
                child_node.refs.source_component_id.clone(),
                json!({ "source_group_id": id }),
            ),
            NodeProps::Group(_) => (
                child_node.refs.source_group_id.clone(),
                json!({ "parent_source_group_id": id }),
            ),
            _ => continue,
        };
        if let Some(record_id) = record_id.filter(|r| ctx.store.get(r).is_some()) {
            ctx.update(&record_id, patch)?;
        }
    }
    Ok(())
}
