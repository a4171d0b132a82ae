//! Direct pcb routing.
//!
//! The built-in router draws straight two-point segments between the pcb
//! ports of each connectivity group, chained in (x, y) order. It runs
//! synchronously in the pcb trace phase; remote autorouting lives in
//! [`autoroute`](crate::autoroute).

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::debug;

use circuitc_core::geometry::Point;
use circuitc_core::NodeId;
use circuitc_store::record::{PcbTrace, RoutePoint};
use circuitc_store::CircuitRecord;

use crate::context::RenderContext;
use crate::error::RenderError;

/// Routing bookkeeping for one scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteState {
    /// Digest of the last autorouter input.
    pub input_hash: Option<String>,
    /// Records the last routing pass produced.
    pub record_ids: Vec<String>,
    /// A remote job is running.
    pub pending: bool,
    /// The last pass produced a result.
    pub finished: bool,
}

/// A pcb port as the routers see it.
#[derive(Debug, Clone, PartialEq)]
pub struct PortPoint {
    pub pcb_port_id: String,
    pub at: Point,
    pub layer: String,
}

/// Pcb ports keyed by the source port they render.
pub fn pcb_ports_by_source(ctx: &RenderContext<'_>) -> HashMap<String, PortPoint> {
    ctx.store
        .list("pcb_port")
        .into_iter()
        .filter_map(|r| match r {
            CircuitRecord::PcbPort(p) => Some((
                p.source_port_id.clone(),
                PortPoint {
                    pcb_port_id: p.pcb_port_id.clone(),
                    at: Point::new(p.x, p.y),
                    layer: p.layers.first().cloned().unwrap_or_else(|| "top".to_string()),
                },
            )),
            _ => None,
        })
        .collect()
}

/// Ports of one group, sorted by (x, y).
pub fn sorted_points(ports: &HashMap<String, PortPoint>, source_port_ids: &[String]) -> Vec<PortPoint> {
    let mut points: Vec<PortPoint> = source_port_ids
        .iter()
        .filter_map(|id| ports.get(id).cloned())
        .collect();
    points.sort_by(|a, b| {
        a.at.x
            .partial_cmp(&b.at.x)
            .unwrap_or(Ordering::Equal)
            .then(a.at.y.partial_cmp(&b.at.y).unwrap_or(Ordering::Equal))
    });
    points
}

/// Deletes whatever the previous routing pass of `scope` wrote.
pub fn clear_routes(ctx: &mut RenderContext<'_>, scope: NodeId) -> Result<(), RenderError> {
    let previous = ctx
        .state
        .routes
        .get_mut(&scope)
        .map(|s| std::mem::take(&mut s.record_ids))
        .unwrap_or_default();
    for id in &previous {
        ctx.delete_quiet(id)?;
    }
    if let Ok(refs) = ctx.refs_mut(scope) {
        refs.extra.retain(|id| !previous.contains(id));
    }
    Ok(())
}

/// Routes every connectivity group of `scope` with straight segments.
///
/// Returns the number of traces written.
pub fn direct_route(ctx: &mut RenderContext<'_>, scope: NodeId) -> Result<usize, RenderError> {
    clear_routes(ctx, scope)?;

    let groups = ctx.state.connectivity.get(&scope).cloned().unwrap_or_default();
    let ports = pcb_ports_by_source(ctx);
    let subcircuit_id = if scope == ctx.tree.root_id() {
        None
    } else {
        ctx.subcircuit_id(scope)
    };
    let width = ctx.config().trace_width;

    let mut written = Vec::new();
    for group in &groups {
        let points = sorted_points(&ports, &group.source_port_ids);
        for pair in points.windows(2) {
            let trace = PcbTrace {
                source_trace_id: group.source_trace_ids.first().cloned(),
                route: vec![
                    RoutePoint::wire(pair[0].at, width, &pair[0].layer),
                    RoutePoint::wire(pair[1].at, width, &pair[1].layer),
                ],
                subcircuit_id: subcircuit_id.clone(),
                subcircuit_connectivity_map_key: Some(group.key.clone()),
                ..Default::default()
            };
            written.push(ctx.insert(CircuitRecord::PcbTrace(trace))?);
        }
    }

    debug!(scope = %scope, traces = written.len(), "direct-routed scope");
    let count = written.len();
    ctx.refs_mut(scope)?.extra.extend(written.iter().cloned());
    let state = ctx.state.routes.entry(scope).or_default();
    state.record_ids = written;
    state.pending = false;
    state.finished = true;
    state.input_hash = None;
    Ok(count)
}
