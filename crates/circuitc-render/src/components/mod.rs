//! Behaviors of the built-in node kinds.
//!
//! Each kind overrides only the phases it cares about; the engine picks the
//! handler (initial, update or remove) and sets [`RenderContext::phase`].
//!
//! # Modules
//!
//! - [`component`]: generic pin components (`resistor`, `capacitor`, `chip`)
//! - [`port`]: explicit and generated ports
//! - [`net`]: named nets
//! - [`trace`]: traces between ports and nets
//! - [`constraint`]: relative placement constraints
//! - [`group`]: groups, subcircuits and boards
//! - [`root`]: the synthetic tree root (top-level connectivity, analysis)
//! - [`simulation`]: `analogsimulation` experiments

pub mod component;
pub mod constraint;
pub mod group;
pub mod net;
pub mod port;
pub mod root;
pub mod simulation;
pub mod trace;

pub use component::ComponentBehavior;
pub use constraint::ConstraintBehavior;
pub use group::GroupBehavior;
pub use net::NetBehavior;
pub use port::PortBehavior;
pub use root::RootBehavior;
pub use simulation::SimulationBehavior;
pub use trace::TraceBehavior;

use serde_json::Value;

use circuitc_core::geometry::{compose, Transform};
use circuitc_core::{NodeId, PositionProps};
use circuitc_store::{CircuitRecord, Side};

use crate::context::RenderContext;
use crate::error::RenderError;
use crate::isolation::GENERATED_FLAG;

/// Writes `record` over `existing` when that record is still stored,
/// otherwise inserts it. Returns the record id.
///
/// Optional fields the new record leaves unset keep their stored values,
/// so keys and group links written by other nodes survive a re-render.
pub(crate) fn upsert(
    ctx: &mut RenderContext<'_>,
    existing: Option<&str>,
    record: CircuitRecord,
) -> Result<String, RenderError> {
    if let Some(id) = existing.filter(|id| ctx.store.get(id).is_some()) {
        let mut fields = record.to_json()?;
        fields.remove("type");
        fields.remove(&format!("{}_id", record.kind()));
        ctx.update(id, Value::Object(fields))?;
        return Ok(id.to_string());
    }
    ctx.insert(record)
}

/// Deletes the records of `kinds` listed in the node's extra refs.
pub(crate) fn clear_extra(
    ctx: &mut RenderContext<'_>,
    node: NodeId,
    kinds: &[&str],
) -> Result<(), RenderError> {
    let extra = std::mem::take(&mut ctx.refs_mut(node)?.extra);
    let mut kept = Vec::with_capacity(extra.len());
    for id in extra {
        let doomed = ctx
            .store
            .get(&id)
            .map_or(true, |r| kinds.contains(&r.kind()));
        if doomed {
            ctx.delete_quiet(&id)?;
        } else {
            kept.push(id);
        }
    }
    ctx.refs_mut(node)?.extra = kept;
    Ok(())
}

/// Deletes the record behind one ref slot and empties the slot.
pub(crate) fn clear_ref(ctx: &mut RenderContext<'_>, slot: Option<String>) -> Result<(), RenderError> {
    match slot {
        Some(id) => ctx.delete_quiet(&id),
        None => Ok(()),
    }
}

/// Whether the node was generated from another node's properties.
pub(crate) fn is_generated(declared: &Value) -> bool {
    declared
        .get(GENERATED_FLAG)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Where a node's own geometry goes on `side`: its declared offset and
/// rotation relative to the parent.
pub(crate) fn placement(position: &PositionProps, side: Side) -> Transform {
    let ((x, y), rotation) = match side {
        Side::Schematic => (position.sch_offset(), position.sch_rotation),
        _ => (position.pcb_offset(), position.pcb_rotation),
    };
    compose(&[Transform::translation(x, y), Transform::rotation(rotation)])
}

/// Groups with no group above them lay out their whole subtree.
pub(crate) fn is_layout_root(ctx: &RenderContext<'_>, node: NodeId) -> bool {
    !ctx.tree
        .ancestors(node)
        .into_iter()
        .any(|a| ctx.tree.get(a).is_some_and(|n| n.props.as_group().is_some()))
}
