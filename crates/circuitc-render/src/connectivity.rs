//! Connectivity mapping.
//!
//! For one scope (a subcircuit, or the tree root for traces outside any
//! subcircuit) the mapper unions every trace with the ports and nets it
//! connects. Each resulting group gets a key `{label}_connectivity_net{n}`
//! that is written onto its `source_port`, `source_net` and `source_trace`
//! records. The label is the subcircuit's name (or its id), so two sibling
//! subcircuits reusing the same net names never share a key.
//!
//! A trace crossing a subcircuit boundary lands in the groups of both
//! scopes. Each scope only keys the records it owns, so the inner scope's
//! key on its own ports survives the outer scope's pass.

use std::collections::HashMap;

use petgraph::unionfind::UnionFind;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use circuitc_core::NodeId;
use circuitc_store::CircuitRecord;

use crate::context::{subcircuit_id_for, RenderContext};
use crate::error::RenderError;

/// One electrical node within a scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectivityGroup {
    pub key: String,
    pub source_port_ids: Vec<String>,
    pub source_net_ids: Vec<String>,
    pub source_trace_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Member {
    Port,
    Net,
    Trace,
}

/// Label used in keys of `scope`: the group name, else its subcircuit id,
/// and `root` for the tree root.
pub fn scope_label(ctx: &RenderContext<'_>, scope: NodeId) -> String {
    if scope == ctx.tree.root_id() {
        return "root".to_string();
    }
    ctx.tree
        .get(scope)
        .and_then(|n| n.name().map(str::to_string))
        .unwrap_or_else(|| subcircuit_id_for(scope))
}

/// Maps the traces of `scope` and writes connectivity keys.
pub fn map_scope(ctx: &mut RenderContext<'_>, scope: NodeId) -> Result<Vec<ConnectivityGroup>, RenderError> {
    let traces = scope_traces(ctx, scope);
    let label = scope_label(ctx, scope);
    let owner = (scope != ctx.tree.root_id()).then(|| subcircuit_id_for(scope));

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut members: Vec<(String, Member)> = Vec::new();
    let mut edges: Vec<(usize, usize)> = Vec::new();
    let mut intern = |id: &str, member: Member, members: &mut Vec<(String, Member)>| -> usize {
        *index.entry(id.to_string()).or_insert_with(|| {
            members.push((id.to_string(), member));
            members.len() - 1
        })
    };

    for trace in &traces {
        let t = intern(&trace.source_trace_id, Member::Trace, &mut members);
        for port in &trace.connected_source_port_ids {
            let p = intern(port, Member::Port, &mut members);
            edges.push((t, p));
        }
        for net in &trace.connected_source_net_ids {
            let n = intern(net, Member::Net, &mut members);
            edges.push((t, n));
        }
    }

    let mut sets: UnionFind<usize> = UnionFind::new(members.len());
    for (a, b) in edges {
        sets.union(a, b);
    }

    // Groups are numbered in order of their first member.
    let mut order: Vec<usize> = Vec::new();
    let mut by_root: HashMap<usize, ConnectivityGroup> = HashMap::new();
    for (i, (id, member)) in members.iter().enumerate() {
        let root = sets.find(i);
        let group = by_root.entry(root).or_insert_with(|| {
            order.push(root);
            ConnectivityGroup::default()
        });
        match member {
            Member::Port => group.source_port_ids.push(id.clone()),
            Member::Net => group.source_net_ids.push(id.clone()),
            Member::Trace => group.source_trace_ids.push(id.clone()),
        }
    }

    let mut groups = Vec::with_capacity(order.len());
    for (n, root) in order.into_iter().enumerate() {
        let Some(mut group) = by_root.remove(&root) else {
            continue;
        };
        group.key = format!("{label}_connectivity_net{n}");
        let patch = json!({ "subcircuit_connectivity_map_key": group.key });
        for id in group
            .source_port_ids
            .iter()
            .chain(&group.source_net_ids)
            .chain(&group.source_trace_ids)
        {
            let owned = ctx
                .store
                .get(id)
                .is_some_and(|r| r.subcircuit_id() == owner.as_deref());
            if owned {
                ctx.update(id, patch.clone())?;
            }
        }
        groups.push(group);
    }

    debug!(scope = %scope, label = %label, groups = groups.len(), "mapped connectivity");
    ctx.state.connectivity.insert(scope, groups.clone());
    Ok(groups)
}

/// Source traces owned by `scope`, plus outer traces reaching into it
/// through one of its ports.
fn scope_traces(ctx: &RenderContext<'_>, scope: NodeId) -> Vec<circuitc_store::record::SourceTrace> {
    let root = ctx.tree.root_id();
    let owner = (scope != root).then_some(scope);
    let subcircuit_id = owner.map(subcircuit_id_for);

    let mut own = Vec::new();
    let mut crossing = Vec::new();
    for id in ctx.tree.node_ids() {
        let Some(node) = ctx.tree.get(id) else {
            continue;
        };
        if node.pending_removal || node.props.as_trace().is_none() {
            continue;
        }
        let Some(record) = node
            .refs
            .source_trace_id
            .as_deref()
            .and_then(|rid| ctx.store.get(rid))
        else {
            continue;
        };
        let CircuitRecord::SourceTrace(trace) = record else {
            continue;
        };
        if ctx.tree.enclosing_subcircuit(id) == owner {
            own.push(trace.clone());
        } else if subcircuit_id.is_some() && touches(ctx, trace, subcircuit_id.as_deref()) {
            crossing.push(trace.clone());
        }
    }
    own.extend(crossing);
    own
}

fn touches(
    ctx: &RenderContext<'_>,
    trace: &circuitc_store::record::SourceTrace,
    subcircuit_id: Option<&str>,
) -> bool {
    trace.connected_source_port_ids.iter().any(|pid| {
        ctx.store
            .get(pid)
            .is_some_and(|r| r.subcircuit_id() == subcircuit_id)
    })
}
