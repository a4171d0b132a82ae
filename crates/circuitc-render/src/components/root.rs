//! The synthetic tree root.
//!
//! Traces outside every subcircuit belong to the root scope: the root maps
//! and direct-routes them. It also runs the design-wide pcb analysis,
//! turning unrouted connections and off-board parts into error records.

use std::collections::HashSet;

use tracing::{debug, warn};

use circuitc_core::geometry::Bounds;
use circuitc_core::{NodeId, RenderPhase};
use circuitc_store::record::{PcbPlacementError, PcbTraceError};
use circuitc_store::CircuitRecord;

use super::clear_extra;
use crate::connectivity;
use crate::context::RenderContext;
use crate::error::RenderError;
use crate::registry::NodeBehavior;
use crate::routing::{self, pcb_ports_by_source};

const ANALYSIS_KINDS: &[&str] = &["pcb_trace_error", "pcb_placement_error"];

/// Slack when checking that a part lies on its board.
const BOARD_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, Default)]
pub struct RootBehavior;

impl NodeBehavior for RootBehavior {
    fn initial(&self, ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
        self.render(ctx, node)
    }

    fn update(&self, ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
        self.render(ctx, node)
    }

    fn remove(&self, _ctx: &mut RenderContext<'_>, _node: NodeId) -> Result<(), RenderError> {
        Ok(())
    }
}

impl RootBehavior {
    fn render(&self, ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
        match ctx.phase {
            RenderPhase::PortMatching => connectivity::map_scope(ctx, node).map(|_| ()),
            RenderPhase::PcbTraceRender => routing::direct_route(ctx, node).map(|_| ()),
            RenderPhase::PcbAnalysis => analyze(ctx, node),
            _ => Ok(()),
        }
    }
}

fn analyze(ctx: &mut RenderContext<'_>, root: NodeId) -> Result<(), RenderError> {
    clear_extra(ctx, root, ANALYSIS_KINDS)?;
    let mut written = unrouted_connections(ctx)?;
    written.extend(off_board_components(ctx)?);
    debug!(errors = written.len(), "pcb analysis");
    ctx.refs_mut(root)?.extra.extend(written);
    Ok(())
}

/// One `pcb_trace_error` per connectivity group whose pcb ports have no
/// trace carrying its key. Scopes with a routing job in flight are
/// skipped until the job lands.
fn unrouted_connections(ctx: &mut RenderContext<'_>) -> Result<Vec<String>, RenderError> {
    let routed: HashSet<String> = ctx
        .store
        .list("pcb_trace")
        .into_iter()
        .filter_map(|r| match r {
            CircuitRecord::PcbTrace(t) => t.subcircuit_connectivity_map_key.clone(),
            _ => None,
        })
        .collect();
    let ports = pcb_ports_by_source(ctx);

    let mut scopes: Vec<NodeId> = ctx.state.connectivity.keys().copied().collect();
    scopes.sort();

    let mut errors = Vec::new();
    for scope in scopes {
        if ctx.tree.get(scope).is_none() {
            continue;
        }
        if ctx.state.routes.get(&scope).is_some_and(|r| r.pending) {
            continue;
        }
        let subcircuit_id = (scope != ctx.tree.root_id())
            .then(|| ctx.subcircuit_id(scope))
            .flatten();
        let groups = ctx.state.connectivity.get(&scope).cloned().unwrap_or_default();
        for group in groups {
            let pcb_port_ids: Vec<String> = routing::sorted_points(&ports, &group.source_port_ids)
                .into_iter()
                .map(|p| p.pcb_port_id)
                .collect();
            if pcb_port_ids.len() < 2 || routed.contains(&group.key) {
                continue;
            }
            errors.push(PcbTraceError {
                message: format!("no pcb trace connects {}", group.key),
                source_trace_id: group.source_trace_ids.first().cloned(),
                pcb_port_ids,
                subcircuit_id: subcircuit_id.clone(),
                subcircuit_connectivity_map_key: Some(group.key.clone()),
                ..Default::default()
            });
        }
    }

    let mut ids = Vec::with_capacity(errors.len());
    for error in errors {
        warn!(key = ?error.subcircuit_connectivity_map_key, "unrouted connection");
        ids.push(ctx.insert(CircuitRecord::PcbTraceError(error))?);
    }
    Ok(ids)
}

/// One `pcb_placement_error` per component lying outside its board.
fn off_board_components(ctx: &mut RenderContext<'_>) -> Result<Vec<String>, RenderError> {
    let boards: Vec<(NodeId, Bounds)> = ctx
        .tree
        .node_ids()
        .into_iter()
        .filter_map(|id| {
            let node = ctx.tree.get(id)?;
            if node.pending_removal || !node.caps.primary_board {
                return None;
            }
            let board = node.refs.pcb_board_id.as_deref().and_then(|b| ctx.store.get(b))?;
            match board {
                CircuitRecord::PcbBoard(b) => Some((
                    id,
                    Bounds::from_center(b.center, circuitc_core::Size::new(b.width, b.height)),
                )),
                _ => None,
            }
        })
        .collect();

    let mut errors = Vec::new();
    for (board, outline) in boards {
        let outline = outline.expand(BOARD_TOLERANCE);
        for record_id in ctx.subtree_record_ids(board) {
            let Some(CircuitRecord::PcbComponent(component)) = ctx.store.get(&record_id) else {
                continue;
            };
            if outline.contains(&component.bounds()) {
                continue;
            }
            let name = match ctx.store.get(&component.source_component_id) {
                Some(CircuitRecord::SourceComponent(s)) => s.name.clone(),
                _ => component.source_component_id.clone(),
            };
            errors.push(PcbPlacementError {
                message: format!("{name} is placed outside the board"),
                pcb_component_id: Some(component.pcb_component_id.clone()),
                subcircuit_id: component.subcircuit_id.clone(),
                ..Default::default()
            });
        }
    }

    let mut ids = Vec::with_capacity(errors.len());
    for error in errors {
        warn!(component = ?error.pcb_component_id, "component outside the board");
        ids.push(ctx.insert(CircuitRecord::PcbPlacementError(error))?);
    }
    Ok(ids)
}
