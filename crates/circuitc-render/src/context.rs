//! The context handed to node behaviors.
//!
//! [`RenderContext`] borrows the engine's tree, store and state for the
//! duration of one handler call. Handlers read and write records through
//! it, add child nodes, queue async effects and move geometry.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use circuitc_core::geometry::{Bounds, Transform};
use circuitc_core::selector::{select_all, select_required};
use circuitc_core::{DesignNode, DesignTree, EntityRefs, NodeId, NodeProps, RenderPhase};
use circuitc_store::{CircuitRecord, FactStore, Side, StorageError};

use crate::config::RenderConfig;
use crate::effects::EffectFuture;
use crate::engine::{EngineServices, EngineState};
use crate::error::RenderError;
use crate::isolation;
use crate::registry::ComponentRegistry;

/// Subcircuit id carried by records owned by subcircuit `node`.
pub fn subcircuit_id_for(node: NodeId) -> String {
    format!("subcircuit_{node}")
}

pub struct RenderContext<'a> {
    pub tree: &'a mut DesignTree,
    pub store: &'a mut dyn FactStore,
    pub registry: &'a ComponentRegistry,
    pub services: &'a Arc<EngineServices>,
    pub state: &'a mut EngineState,
    /// Phase whose handler is running.
    pub phase: RenderPhase,
}

impl<'a> RenderContext<'a> {
    pub fn config(&self) -> &RenderConfig {
        &self.services.config
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    pub fn node(&self, id: NodeId) -> Result<&DesignNode, RenderError> {
        Ok(self.tree.node(id)?)
    }

    /// A copy of the node's parsed properties.
    pub fn props(&self, id: NodeId) -> Result<NodeProps, RenderError> {
        Ok(self.tree.node(id)?.props.clone())
    }

    pub fn refs(&self, id: NodeId) -> Result<&EntityRefs, RenderError> {
        Ok(&self.tree.node(id)?.refs)
    }

    pub fn refs_mut(&mut self, id: NodeId) -> Result<&mut EntityRefs, RenderError> {
        Ok(&mut self.tree.node_mut(id)?.refs)
    }

    /// Creates a node of a registered kind under `parent`.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        kind: &str,
        declared: Value,
    ) -> Result<NodeId, RenderError> {
        let parser = self.registry.parser(kind)?;
        let id = self.tree.insert(parent, kind, declared, parser)?;
        debug!(parent = %parent, child = %id, kind, "added child during render");
        Ok(id)
    }

    /// Marks `phases` dirty on every ancestor of `id`.
    pub fn mark_ancestors_dirty(&mut self, id: NodeId, phases: &[RenderPhase]) {
        for ancestor in self.tree.ancestors(id) {
            self.tree.mark_dirty_many(ancestor, phases);
        }
    }

    // -----------------------------------------------------------------------
    // Scoping and selectors
    // -----------------------------------------------------------------------

    /// Subcircuit id of the subcircuit owning `id` (itself when it is one).
    pub fn subcircuit_id(&self, id: NodeId) -> Option<String> {
        self.tree.owning_subcircuit(id).map(subcircuit_id_for)
    }

    /// Subcircuit id of the nearest strict ancestor subcircuit.
    pub fn enclosing_subcircuit_id(&self, id: NodeId) -> Option<String> {
        self.tree.enclosing_subcircuit(id).map(subcircuit_id_for)
    }

    /// Where selectors authored on `id` are evaluated from.
    pub fn selector_scope(&self, id: NodeId) -> NodeId {
        self.tree
            .enclosing_subcircuit(id)
            .unwrap_or_else(|| self.tree.root_id())
    }

    /// Resolves `selector` from `scope`; a miss names `scope`.
    pub fn resolve(&self, scope: NodeId, selector: &str) -> Result<NodeId, RenderError> {
        Ok(select_required(&*self.tree, scope, selector)?)
    }

    /// Resolves `selector` from `scope`; a miss names `origin`, the node
    /// that authored the selector.
    pub fn resolve_for(
        &self,
        origin: NodeId,
        scope: NodeId,
        selector: &str,
    ) -> Result<NodeId, RenderError> {
        let found = select_all(&*self.tree, scope, selector)?;
        found
            .first()
            .copied()
            .ok_or_else(|| RenderError::Resolution {
                node: self
                    .tree
                    .get(origin)
                    .map(DesignNode::describe)
                    .unwrap_or_else(|| origin.to_string()),
                selector: selector.to_string(),
            })
    }

    // -----------------------------------------------------------------------
    // Records
    // -----------------------------------------------------------------------

    /// Inserts `record` and returns its assigned id.
    pub fn insert(&mut self, record: CircuitRecord) -> Result<String, RenderError> {
        Ok(self.store.insert(record)?.id().to_string())
    }

    pub fn update(&mut self, id: &str, partial: Value) -> Result<(), RenderError> {
        self.store.update(id, &partial)?;
        Ok(())
    }

    /// Deletes `id`, ignoring records that are already gone.
    pub fn delete_quiet(&mut self, id: &str) -> Result<(), RenderError> {
        match self.store.delete(id) {
            Ok(_) | Err(StorageError::RecordNotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes every record `id` references and clears its refs.
    pub fn delete_refs(&mut self, id: NodeId) -> Result<(), RenderError> {
        let ids = self.refs(id)?.all_ids();
        for record_id in ids {
            self.delete_quiet(&record_id)?;
        }
        self.refs_mut(id)?.clear();
        Ok(())
    }

    /// Ids of every record produced by `id` and its full subtree.
    pub fn subtree_record_ids(&self, id: NodeId) -> Vec<String> {
        std::iter::once(id)
            .chain(self.tree.full_descendants(id))
            .filter_map(|n| self.tree.get(n))
            .flat_map(|n| n.refs.all_ids())
            .collect()
    }

    /// Applies `t` to every record of `side` in the subtree at `id`.
    ///
    /// The move is also folded into the frame of every layout unit in the
    /// subtree so a later [`reset_subtree`](Self::reset_subtree) can undo it.
    pub fn move_subtree(&mut self, id: NodeId, side: Side, t: &Transform) -> Result<(), RenderError> {
        if t.is_identity() {
            return Ok(());
        }
        for record_id in self.subtree_record_ids(id) {
            self.transform_record(&record_id, side, t)?;
        }
        for unit in self.layout_units(id) {
            let frame = self
                .state
                .frames
                .entry((unit, side))
                .or_insert(Transform::IDENTITY);
            *frame = t.then_after(frame);
        }
        Ok(())
    }

    /// Returns every layout unit in the subtree at `id` to the position it
    /// was rendered at, undoing earlier layout moves.
    pub fn reset_subtree(&mut self, id: NodeId, side: Side) -> Result<(), RenderError> {
        for unit in self.layout_units(id) {
            let Some(frame) = self.state.frames.remove(&(unit, side)) else {
                continue;
            };
            let Some(undo) = frame.inverse() else {
                continue;
            };
            for record_id in self.unit_record_ids(unit, side) {
                self.transform_record(&record_id, side, &undo)?;
            }
        }
        Ok(())
    }

    /// Forgets the layout frame of `id`; its records were just rendered
    /// from scratch.
    pub fn clear_frame(&mut self, id: NodeId, side: Side) {
        self.state.frames.remove(&(id, side));
    }

    fn transform_record(&mut self, record_id: &str, side: Side, t: &Transform) -> Result<(), RenderError> {
        let Some(record) = self.store.get(record_id) else {
            return Ok(());
        };
        if record.side() != Some(side) {
            return Ok(());
        }
        let mut moved = record.clone();
        moved.transform(t);
        self.store.replace(moved)?;
        Ok(())
    }

    /// Whether `id` renders its subtree in an isolated engine.
    pub fn isolates(&self, id: NodeId) -> bool {
        isolation::isolates(&*self.tree, self.config(), id)
    }

    /// Components and isolated groups: the nodes whose own records layout
    /// moves as one piece.
    fn layout_units(&self, id: NodeId) -> Vec<NodeId> {
        std::iter::once(id)
            .chain(self.tree.full_descendants(id))
            .filter(|&n| match self.tree.get(n).map(|n| &n.props) {
                Some(NodeProps::Component(_)) => true,
                Some(NodeProps::Group(_)) => self.isolates(n),
                _ => false,
            })
            .collect()
    }

    /// Records of `side` that belong to layout unit `id`.
    fn unit_record_ids(&self, id: NodeId, side: Side) -> Vec<String> {
        let Some(node) = self.tree.get(id) else {
            return Vec::new();
        };
        let mut ids = node.refs.all_ids();
        let component = matches!(node.props, NodeProps::Component(_));
        if component {
            for &child in self.tree.children(id) {
                if let Some(port) = self.tree.get(child).filter(|c| c.props.as_port().is_some()) {
                    ids.extend(port.refs.all_ids());
                }
            }
        }
        ids.retain(|rid| {
            self.store.get(rid).is_some_and(|r| {
                r.side() == Some(side) && !(component && matches!(r, CircuitRecord::CadComponent(_)))
            })
        });
        ids
    }

    /// Extent of the component geometry of `side` in the subtree at `id`.
    pub fn side_bounds(&self, id: NodeId, side: Side) -> Option<Bounds> {
        Bounds::union_all(self.footprint(id, side))
    }

    /// The boxes layout packs for the subtree at `id`: pads on the pcb
    /// side, symbol boxes on the schematic side.
    pub fn footprint(&self, id: NodeId, side: Side) -> Vec<Bounds> {
        self.subtree_record_ids(id)
            .iter()
            .filter_map(|rid| self.store.get(rid))
            .filter(|r| match side {
                Side::Pcb => matches!(r, CircuitRecord::PcbSmtpad(_) | CircuitRecord::PcbComponent(_)),
                Side::Schematic => matches!(r, CircuitRecord::SchematicComponent(_)),
                Side::Source => false,
            })
            .filter_map(CircuitRecord::bounds)
            .collect()
    }

    // -----------------------------------------------------------------------
    // Effects
    // -----------------------------------------------------------------------

    /// Queues effect `id` of `node` under the current phase.
    pub fn queue_effect(&mut self, node: NodeId, id: &str, future: EffectFuture) {
        debug!(node = %node, effect = id, phase = %self.phase, "queued async effect");
        self.state
            .effects
            .queue(self.tree, node, id, self.phase, future);
    }
}
