//! Relative placement constraints.
//!
//! A constraint produces no records. Its selectors are checked from the
//! parent group during port discovery so a bad reference fails early and
//! names the constraint; the parent's layout applies it.

use circuitc_core::{NodeId, RenderPhase};

use crate::context::RenderContext;
use crate::error::RenderError;
use crate::registry::NodeBehavior;

#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintBehavior;

impl NodeBehavior for ConstraintBehavior {
    fn initial(&self, ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
        check_selectors(ctx, node)
    }

    fn update(&self, ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
        check_selectors(ctx, node)
    }
}

fn check_selectors(ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
    if ctx.phase != RenderPhase::PortDiscovery {
        return Ok(());
    }
    let Some(props) = ctx.node(node)?.props.as_constraint().cloned() else {
        return Ok(());
    };
    let Some(parent) = ctx.tree.parent(node) else {
        return Ok(());
    };
    for selector in props.kind.selectors() {
        ctx.resolve_for(node, parent, selector)?;
    }
    Ok(())
}
