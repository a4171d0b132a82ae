//! Named nets.

use circuitc_core::props::NodeProps;
use circuitc_core::{NodeId, RenderPhase};
use circuitc_store::record::SourceNet;
use circuitc_store::CircuitRecord;

use super::upsert;
use crate::context::RenderContext;
use crate::error::RenderError;
use crate::registry::NodeBehavior;

#[derive(Debug, Clone, Copy, Default)]
pub struct NetBehavior;

impl NodeBehavior for NetBehavior {
    fn initial(&self, ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
        self.bind(ctx, node)
    }

    fn update(&self, ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
        self.bind(ctx, node)
    }
}

impl NetBehavior {
    fn bind(&self, ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
        if ctx.phase != RenderPhase::SourceBinding {
            return Ok(());
        }
        let NodeProps::Net(props) = &ctx.node(node)?.props else {
            return Ok(());
        };
        let record = CircuitRecord::SourceNet(SourceNet {
            name: props.name.clone(),
            subcircuit_id: ctx.subcircuit_id(node),
            ..Default::default()
        });
        let existing = ctx.refs(node)?.source_net_id.clone();
        let id = upsert(ctx, existing.as_deref(), record)?;
        ctx.refs_mut(node)?.source_net_id = Some(id);
        Ok(())
    }
}
