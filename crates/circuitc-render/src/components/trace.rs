//! Traces between ports and nets.
//!
//! Endpoints are selectors evaluated from the trace's subcircuit (or the
//! tree root). `net.NAME` names a net; a net that does not exist yet is
//! created in that scope during subtree expansion.

use std::collections::HashMap;

use serde_json::json;

use circuitc_core::geometry::Point;
use circuitc_core::props::TraceProps;
use circuitc_core::selector::select_all;
use circuitc_core::{NodeId, NodeProps, RenderPhase};
use circuitc_store::record::{SchematicEdge, SchematicNetLabel, SchematicTrace, SourceTrace};
use circuitc_store::CircuitRecord;

use super::{clear_extra, upsert};
use crate::context::RenderContext;
use crate::error::RenderError;
use crate::isolation::GENERATED_FLAG;
use crate::registry::NodeBehavior;

#[derive(Debug, Clone, Copy, Default)]
pub struct TraceBehavior;

impl NodeBehavior for TraceBehavior {
    fn initial(&self, ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
        self.render(ctx, node)
    }

    fn update(&self, ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
        self.render(ctx, node)
    }
}

impl TraceBehavior {
    fn render(&self, ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
        let Some(props) = ctx.node(node)?.props.as_trace().cloned() else {
            return Ok(());
        };
        match ctx.phase {
            RenderPhase::SubtreeExpansion => ensure_nets(ctx, node, &props),
            RenderPhase::PortDiscovery => bind_endpoints(ctx, node, &props),
            RenderPhase::SchematicTraceRender => render_schematic(ctx, node),
            _ => Ok(()),
        }
    }
}

/// Creates the nets named by `net.NAME` endpoints that nothing declares.
fn ensure_nets(ctx: &mut RenderContext<'_>, node: NodeId, props: &TraceProps) -> Result<(), RenderError> {
    let scope = ctx.selector_scope(node);
    let host = if scope == ctx.tree.root_id() {
        ctx.tree
            .resolve_root()
            .ok()
            .or_else(|| ctx.tree.parent(node))
            .unwrap_or(scope)
    } else {
        scope
    };

    for endpoint in &props.endpoints {
        let Some(name) = TraceProps::net_shorthand(endpoint) else {
            continue;
        };
        if !select_all(&*ctx.tree, scope, endpoint)?.is_empty() {
            continue;
        }
        ctx.add_child(host, "net", json!({ "name": name, GENERATED_FLAG: true }))?;
    }
    Ok(())
}

fn bind_endpoints(ctx: &mut RenderContext<'_>, node: NodeId, props: &TraceProps) -> Result<(), RenderError> {
    let scope = ctx.selector_scope(node);
    let mut ports = Vec::new();
    let mut nets = Vec::new();
    for endpoint in &props.endpoints {
        let target = ctx.resolve_for(node, scope, endpoint)?;
        let found = ctx.node(target)?;
        let source_id = match &found.props {
            NodeProps::Port(_) => found.refs.source_port_id.clone().map(|id| (true, id)),
            NodeProps::Net(_) => found.refs.source_net_id.clone().map(|id| (false, id)),
            _ => {
                return Err(RenderError::Structural {
                    reason: format!(
                        "{} can only connect ports and nets",
                        ctx.node(node)?.describe()
                    ),
                    names: vec![endpoint.clone(), found.describe()],
                })
            }
        };
        match source_id {
            Some((true, id)) if !ports.contains(&id) => ports.push(id),
            Some((false, id)) if !nets.contains(&id) => nets.push(id),
            _ => {}
        }
    }

    let record = CircuitRecord::SourceTrace(SourceTrace {
        connected_source_port_ids: ports,
        connected_source_net_ids: nets,
        display_name: Some(props.endpoints.join(" to ")),
        subcircuit_id: ctx.subcircuit_id(node),
        ..Default::default()
    });
    let existing = ctx.refs(node)?.source_trace_id.clone();
    let id = upsert(ctx, existing.as_deref(), record)?;
    ctx.refs_mut(node)?.source_trace_id = Some(id);
    Ok(())
}

/// Draws the trace as L-shaped edges between its schematic ports and puts
/// a label on the first port for every net it joins.
fn render_schematic(ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
    clear_extra(ctx, node, &["schematic_trace", "schematic_net_label"])?;

    let Some(CircuitRecord::SourceTrace(trace)) = ctx
        .refs(node)?
        .source_trace_id
        .as_deref()
        .and_then(|id| ctx.store.get(id))
        .cloned()
    else {
        return Ok(());
    };

    let positions: HashMap<String, Point> = ctx
        .store
        .list("schematic_port")
        .into_iter()
        .filter_map(|r| match r {
            CircuitRecord::SchematicPort(p) => Some((p.source_port_id.clone(), p.center)),
            _ => None,
        })
        .collect();
    let points: Vec<Point> = trace
        .connected_source_port_ids
        .iter()
        .filter_map(|id| positions.get(id).copied())
        .collect();
    let subcircuit_id = ctx.subcircuit_id(node);

    let mut written = Vec::new();
    if points.len() >= 2 {
        let edges = points
            .windows(2)
            .flat_map(|pair| {
                let corner = Point::new(pair[1].x, pair[0].y);
                [
                    SchematicEdge {
                        from: pair[0],
                        to: corner,
                    },
                    SchematicEdge {
                        from: corner,
                        to: pair[1],
                    },
                ]
            })
            .filter(|e| e.from != e.to)
            .collect();
        written.push(ctx.insert(CircuitRecord::SchematicTrace(SchematicTrace {
            source_trace_id: Some(trace.source_trace_id.clone()),
            edges,
            subcircuit_id: subcircuit_id.clone(),
            subcircuit_connectivity_map_key: trace.subcircuit_connectivity_map_key.clone(),
            ..Default::default()
        }))?);
    }

    if let Some(anchor) = points.first().copied() {
        for net_id in &trace.connected_source_net_ids {
            let Some(CircuitRecord::SourceNet(net)) = ctx.store.get(net_id) else {
                continue;
            };
            let label = CircuitRecord::SchematicNetLabel(SchematicNetLabel {
                source_net_id: net.source_net_id.clone(),
                text: net.name.clone(),
                anchor_position: anchor,
                subcircuit_id: subcircuit_id.clone(),
                ..Default::default()
            });
            written.push(ctx.insert(label)?);
        }
    }

    ctx.refs_mut(node)?.extra.extend(written);
    Ok(())
}
