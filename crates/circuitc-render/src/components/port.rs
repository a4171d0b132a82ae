//! Ports: the connection points of a component.

use circuitc_core::{NodeId, RenderPhase};
use circuitc_store::record::SourcePort;
use circuitc_store::CircuitRecord;

use super::upsert;
use crate::context::RenderContext;
use crate::error::RenderError;
use crate::registry::NodeBehavior;

#[derive(Debug, Clone, Copy, Default)]
pub struct PortBehavior;

impl NodeBehavior for PortBehavior {
    fn initial(&self, ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
        self.bind(ctx, node)
    }

    fn update(&self, ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
        self.bind(ctx, node)
    }
}

impl PortBehavior {
    fn bind(&self, ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
        if ctx.phase != RenderPhase::SourceBinding {
            return Ok(());
        }
        let Some(props) = ctx.node(node)?.props.as_port().cloned() else {
            return Ok(());
        };
        let mut hints = vec![props.name.clone()];
        hints.extend(props.aliases.iter().filter(|a| **a != props.name).cloned());
        let source_component_id = ctx
            .tree
            .parent(node)
            .and_then(|p| ctx.tree.get(p))
            .and_then(|p| p.refs.source_component_id.clone());

        let record = CircuitRecord::SourcePort(SourcePort {
            name: props.name,
            pin_number: props.pin_number,
            port_hints: hints,
            source_component_id,
            subcircuit_id: ctx.subcircuit_id(node),
            ..Default::default()
        });
        let existing = ctx.refs(node)?.source_port_id.clone();
        let id = upsert(ctx, existing.as_deref(), record)?;
        ctx.refs_mut(node)?.source_port_id = Some(id);
        Ok(())
    }
}
