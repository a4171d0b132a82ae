//! DesignTree: the ownership hierarchy of design nodes.
//!
//! Nodes live in an arena indexed by [`NodeId`]. A synthetic root node owns
//! every top-level element. Ownership is exclusive and acyclic; all
//! mutations go through `DesignTree` methods so the parent/child links stay
//! consistent.
//!
//! # Traversals
//!
//! - [`DesignTree::selectable_descendants`] stops at, but includes, any
//!   descendant that is a subcircuit boundary. Selectors use it.
//! - [`DesignTree::full_descendants`] ignores boundaries. Connectivity and
//!   geometry moves use it.
//! - [`DesignTree::post_order`] visits children before their parent. The
//!   render engine walks the tree this way.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smallvec::SmallVec;

use crate::error::{CoreError, ValidationError};
use crate::id::NodeId;
use crate::phase::{PhaseStates, RenderPhase};
use crate::props::NodeProps;

/// Schema check turning declared properties into typed properties.
pub type PropsParser = fn(&str, &Value) -> Result<NodeProps, ValidationError>;

/// Kind name of the synthetic root node.
pub const ROOT_KIND: &str = "root";

/// Capability flags checked instead of a class hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    /// Encapsulation boundary for selectors and connectivity.
    pub subcircuit: bool,
    /// Emits pcb geometry that layout can move.
    pub produces_pcb: bool,
    /// Primitive container whose children are laid out.
    pub container: bool,
    /// The design's primary board.
    pub primary_board: bool,
}

impl Capabilities {
    /// Derives the capability set from parsed properties.
    pub fn from_props(props: &NodeProps) -> Self {
        match props {
            NodeProps::Root => Capabilities {
                container: true,
                ..Default::default()
            },
            NodeProps::Group(g) => Capabilities {
                subcircuit: g.subcircuit,
                produces_pcb: true,
                container: true,
                primary_board: g.is_board,
            },
            NodeProps::Component(_) => Capabilities {
                produces_pcb: true,
                ..Default::default()
            },
            _ => Capabilities::default(),
        }
    }
}

/// Back-references to the records a node produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityRefs {
    pub source_component_id: Option<String>,
    pub source_group_id: Option<String>,
    pub source_port_id: Option<String>,
    pub source_net_id: Option<String>,
    pub source_trace_id: Option<String>,
    pub schematic_component_id: Option<String>,
    pub schematic_group_id: Option<String>,
    pub schematic_port_id: Option<String>,
    pub pcb_component_id: Option<String>,
    pub pcb_group_id: Option<String>,
    pub pcb_board_id: Option<String>,
    pub pcb_port_id: Option<String>,
    pub cad_component_id: Option<String>,
    /// Secondary records: pads, traces, labels, error records.
    pub extra: Vec<String>,
}

impl EntityRefs {
    /// Every referenced record id.
    pub fn all_ids(&self) -> Vec<String> {
        [
            &self.source_component_id,
            &self.source_group_id,
            &self.source_port_id,
            &self.source_net_id,
            &self.source_trace_id,
            &self.schematic_component_id,
            &self.schematic_group_id,
            &self.schematic_port_id,
            &self.pcb_component_id,
            &self.pcb_group_id,
            &self.pcb_board_id,
            &self.pcb_port_id,
            &self.cad_component_id,
        ]
        .into_iter()
        .flatten()
        .cloned()
        .chain(self.extra.iter().cloned())
        .collect()
    }

    pub fn clear(&mut self) {
        *self = EntityRefs::default();
    }
}

/// An asynchronous effect queued by a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsyncEffect {
    pub id: String,
    pub phase: RenderPhase,
    /// Bumped on supersede; completions carrying an older generation are stale.
    pub generation: u64,
    pub complete: bool,
}

/// One node of the design tree.
#[derive(Debug, Clone)]
pub struct DesignNode {
    pub id: NodeId,
    /// Kind tag, e.g. `resistor`, `group`, `trace`.
    pub kind: String,
    pub caps: Capabilities,
    pub parent: Option<NodeId>,
    pub children: SmallVec<[NodeId; 4]>,
    /// Properties as declared, before validation.
    pub declared: Value,
    /// Validated, defaulted properties.
    pub props: NodeProps,
    pub parser: PropsParser,
    pub phases: PhaseStates,
    pub pending_removal: bool,
    pub refs: EntityRefs,
    pub effects: Vec<AsyncEffect>,
}

impl DesignNode {
    pub fn name(&self) -> Option<&str> {
        self.props.name()
    }

    pub fn is_subcircuit(&self) -> bool {
        self.caps.subcircuit
    }

    /// Short description used in error messages, e.g. `<resistor name="R1" />`.
    pub fn describe(&self) -> String {
        match self.name() {
            Some(name) => format!("<{} name=\"{}\" />", self.kind, name),
            None => format!("<{} #{} />", self.kind, self.id),
        }
    }

    /// Whether an effect with `id` is still running.
    pub fn has_pending_effect(&self, id: &str) -> bool {
        self.effects.iter().any(|e| e.id == id && !e.complete)
    }
}

fn parse_root(_kind: &str, _declared: &Value) -> Result<NodeProps, ValidationError> {
    Ok(NodeProps::Root)
}

/// The design node arena.
#[derive(Debug, Clone)]
pub struct DesignTree {
    nodes: Vec<Option<DesignNode>>,
    root: NodeId,
}

impl Default for DesignTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DesignTree {
    /// Creates a tree holding only the synthetic root.
    pub fn new() -> Self {
        let root = NodeId(0);
        let node = DesignNode {
            id: root,
            kind: ROOT_KIND.to_string(),
            caps: Capabilities::from_props(&NodeProps::Root),
            parent: None,
            children: SmallVec::new(),
            declared: Value::Object(Map::new()),
            props: NodeProps::Root,
            parser: parse_root,
            phases: PhaseStates::default(),
            pending_removal: false,
            refs: EntityRefs::default(),
            effects: Vec::new(),
        };
        DesignTree {
            nodes: vec![Some(node)],
            root,
        }
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// Validates `declared` and creates an unowned node.
    ///
    /// Validation failure is fatal to construction: no node is created.
    pub fn create(
        &mut self,
        kind: &str,
        declared: Value,
        parser: PropsParser,
    ) -> Result<NodeId, ValidationError> {
        let props = parser(kind, &declared)?;
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(DesignNode {
            id,
            kind: kind.to_string(),
            caps: Capabilities::from_props(&props),
            parent: None,
            children: SmallVec::new(),
            declared,
            props,
            parser,
            phases: PhaseStates::default(),
            pending_removal: false,
            refs: EntityRefs::default(),
            effects: Vec::new(),
        }));
        Ok(id)
    }

    /// Attaches an unowned `child` as the last child of `parent`.
    pub fn add(&mut self, parent: NodeId, child: NodeId) -> Result<(), CoreError> {
        self.node(parent)?;
        let child_node = self.node(child)?;
        if child == self.root {
            return Err(CoreError::RootDetach);
        }
        if let Some(owner) = child_node.parent {
            return Err(CoreError::AlreadyOwned {
                child,
                parent: owner,
            });
        }
        if parent == child || self.ancestors(parent).contains(&child) {
            return Err(CoreError::CyclicOwnership { child, parent });
        }
        self.node_mut(child)?.parent = Some(parent);
        self.node_mut(parent)?.children.push(child);
        Ok(())
    }

    pub fn add_all(&mut self, parent: NodeId, children: &[NodeId]) -> Result<(), CoreError> {
        for &child in children {
            self.add(parent, child)?;
        }
        Ok(())
    }

    /// Creates a node and attaches it under `parent` in one step.
    pub fn insert(
        &mut self,
        parent: NodeId,
        kind: &str,
        declared: Value,
        parser: PropsParser,
    ) -> Result<NodeId, CoreError> {
        let id = self.create(kind, declared, parser)?;
        self.add(parent, id)?;
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Removal
    // -----------------------------------------------------------------------

    /// Queues `id` and its whole subtree for phase cleanup.
    ///
    /// The nodes stay attached until the engine has run every remove
    /// handler and calls [`DesignTree::detach`].
    pub fn remove(&mut self, id: NodeId) -> Result<(), CoreError> {
        if id == self.root {
            return Err(CoreError::RootDetach);
        }
        self.node(id)?;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = self.node_mut(current)?;
            node.pending_removal = true;
            stack.extend(node.children.iter().copied());
        }
        Ok(())
    }

    /// Unlinks `id` from its parent and frees the subtree's arena slots.
    pub fn detach(&mut self, id: NodeId) -> Result<(), CoreError> {
        if id == self.root {
            return Err(CoreError::RootDetach);
        }
        let parent = self.node(id)?.parent;
        if let Some(parent) = parent {
            if let Ok(p) = self.node_mut(parent) {
                p.children.retain(|c| *c != id);
            }
        }
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(current.index()).and_then(Option::take) {
                stack.extend(node.children.iter().copied());
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn get(&self, id: NodeId) -> Option<&DesignNode> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut DesignNode> {
        self.nodes.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn node(&self, id: NodeId) -> Result<&DesignNode, CoreError> {
        self.get(id).ok_or(CoreError::NodeNotFound { id })
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut DesignNode, CoreError> {
        self.get_mut(id).ok_or(CoreError::NodeNotFound { id })
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.parent)
    }

    /// Ancestors from nearest to farthest, root included.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.parent(id);
        while let Some(p) = current {
            out.push(p);
            current = self.parent(p);
        }
        out
    }

    /// Number of live (attached or unowned) nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// Ids of every live node in arena order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().flatten().map(|n| n.id).collect()
    }

    // -----------------------------------------------------------------------
    // Property updates
    // -----------------------------------------------------------------------

    /// Merges `patch` into the declared properties and revalidates.
    ///
    /// On success every phase of the node is marked dirty and the layout
    /// and trace phases of each ancestor are marked dirty so they re-run on
    /// the next cycle. On validation failure the node is left unchanged.
    pub fn update_props(&mut self, id: NodeId, patch: &Value) -> Result<(), CoreError> {
        let node = self.node(id)?;
        let mut declared = match &node.declared {
            Value::Object(o) => o.clone(),
            _ => Map::new(),
        };
        let Value::Object(patch) = patch else {
            return Err(ValidationError::NotAnObject {
                kind: node.kind.clone(),
                found: "non-object patch".to_string(),
            }
            .into());
        };
        for (k, v) in patch {
            if v.is_null() {
                declared.remove(k);
            } else {
                declared.insert(k.clone(), v.clone());
            }
        }
        let declared = Value::Object(declared);
        let props = (node.parser)(&node.kind, &declared)?;

        let node = self.node_mut(id)?;
        node.caps = Capabilities::from_props(&props);
        node.declared = declared;
        node.props = props;
        node.phases.mark_all_dirty();

        for ancestor in self.ancestors(id) {
            self.mark_dirty_many(ancestor, RenderPhase::ancestor_notification_phases());
        }
        Ok(())
    }

    /// Forces the update handler of `phase` to run on the next cycle.
    pub fn mark_dirty(&mut self, id: NodeId, phase: RenderPhase) {
        if let Some(node) = self.get_mut(id) {
            node.phases.get_mut(phase).dirty = true;
        }
    }

    pub fn mark_dirty_many(&mut self, id: NodeId, phases: &[RenderPhase]) {
        for &phase in phases {
            self.mark_dirty(id, phase);
        }
    }

    // -----------------------------------------------------------------------
    // Traversals
    // -----------------------------------------------------------------------

    /// Post-order walk of the subtree at `from` (children before parent).
    pub fn post_order(&self, from: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<(NodeId, bool)> = vec![(from, false)];
        while let Some((id, expanded)) = stack.pop() {
            if self.get(id).is_none() {
                continue;
            }
            if expanded {
                out.push(id);
            } else {
                stack.push((id, true));
                for &child in self.children(id).iter().rev() {
                    stack.push((child, false));
                }
            }
        }
        out
    }

    /// Every descendant in pre-order, ignoring subcircuit boundaries.
    pub fn full_descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    /// Descendants in pre-order that stop at, but include, subcircuit
    /// boundaries.
    pub fn selectable_descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            if self.get(current).is_some_and(|n| !n.caps.subcircuit) {
                stack.extend(self.children(current).iter().rev().copied());
            }
        }
        out
    }

    /// Nearest strict ancestor that is a subcircuit boundary.
    pub fn enclosing_subcircuit(&self, id: NodeId) -> Option<NodeId> {
        self.ancestors(id)
            .into_iter()
            .find(|a| self.get(*a).is_some_and(|n| n.caps.subcircuit))
    }

    /// `id` itself when it is a subcircuit, otherwise its enclosing one.
    pub fn owning_subcircuit(&self, id: NodeId) -> Option<NodeId> {
        if self.get(id).is_some_and(|n| n.caps.subcircuit) {
            Some(id)
        } else {
            self.enclosing_subcircuit(id)
        }
    }

    /// Subcircuits strictly inside `id`, nearest boundaries only.
    pub fn child_subcircuits(&self, id: NodeId) -> Vec<NodeId> {
        self.selectable_descendants(id)
            .into_iter()
            .filter(|d| self.get(*d).is_some_and(|n| n.caps.subcircuit))
            .collect()
    }

    /// Resolves the node that root-level selectors start from.
    ///
    /// Exactly one top-level child wins; otherwise the unique primary board;
    /// otherwise the root cannot be inferred.
    pub fn resolve_root(&self) -> Result<NodeId, CoreError> {
        let top = self.children(self.root);
        match top {
            [] => Err(CoreError::AmbiguousRoot {
                reason: "the design is empty".to_string(),
            }),
            [only] => Ok(*only),
            many => {
                let boards: Vec<NodeId> = many
                    .iter()
                    .copied()
                    .filter(|c| self.get(*c).is_some_and(|n| n.caps.primary_board))
                    .collect();
                match boards.as_slice() {
                    [board] => Ok(*board),
                    [] => Err(CoreError::AmbiguousRoot {
                        reason: format!(
                            "{} top-level nodes and no board among them",
                            many.len()
                        ),
                    }),
                    _ => Err(CoreError::AmbiguousRoot {
                        reason: format!("{} boards at the top level", boards.len()),
                    }),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props::{ComponentProps, GroupProps};
    use serde_json::json;

    fn group(kind: &str, v: &Value) -> Result<NodeProps, ValidationError> {
        GroupProps::parse(kind, v, kind == "board").map(NodeProps::Group)
    }

    fn resistor(kind: &str, v: &Value) -> Result<NodeProps, ValidationError> {
        ComponentProps::parse(kind, v, Some(2)).map(NodeProps::Component)
    }

    fn sample() -> (DesignTree, NodeId, NodeId, NodeId, NodeId) {
        let mut tree = DesignTree::new();
        let root = tree.root_id();
        let board = tree.insert(root, "board", json!({}), group).unwrap();
        let sub = tree
            .insert(board, "group", json!({ "name": "G", "subcircuit": true }), group)
            .unwrap();
        let r1 = tree.insert(board, "resistor", json!({ "name": "R1" }), resistor).unwrap();
        let r2 = tree.insert(sub, "resistor", json!({ "name": "R2" }), resistor).unwrap();
        (tree, board, sub, r1, r2)
    }

    #[test]
    fn invalid_props_create_nothing() {
        let mut tree = DesignTree::new();
        let before = tree.len();
        assert!(tree.create("resistor", json!({}), resistor).is_err());
        assert_eq!(tree.len(), before);
    }

    #[test]
    fn ownership_is_exclusive_and_acyclic() {
        let (mut tree, board, sub, r1, _) = sample();
        assert!(matches!(
            tree.add(sub, r1),
            Err(CoreError::AlreadyOwned { .. })
        ));
        let loose = tree.create("group", json!({}), group).unwrap();
        tree.add(loose, board).unwrap_err();
        assert!(matches!(
            tree.add(loose, loose),
            Err(CoreError::CyclicOwnership { .. })
        ));
    }

    #[test]
    fn post_order_visits_children_first() {
        let (tree, board, sub, r1, r2) = sample();
        let order = tree.post_order(tree.root_id());
        assert_eq!(order, vec![r2, sub, r1, board, tree.root_id()]);
    }

    #[test]
    fn selectable_descendants_stop_at_subcircuits() {
        let (tree, board, sub, r1, r2) = sample();
        assert_eq!(tree.selectable_descendants(board), vec![sub, r1]);
        assert_eq!(tree.full_descendants(board), vec![sub, r2, r1]);
        assert_eq!(tree.enclosing_subcircuit(r2), Some(sub));
        assert_eq!(tree.enclosing_subcircuit(r1), Some(board));
        assert_eq!(tree.child_subcircuits(board), vec![sub]);
    }

    #[test]
    fn resolve_root_rules() {
        let (mut tree, board, ..) = sample();
        assert_eq!(tree.resolve_root().unwrap(), board);

        let root = tree.root_id();
        tree.insert(root, "group", json!({}), group).unwrap();
        assert_eq!(tree.resolve_root().unwrap(), board);

        tree.insert(root, "board", json!({}), group).unwrap();
        assert!(matches!(
            tree.resolve_root(),
            Err(CoreError::AmbiguousRoot { .. })
        ));
    }

    #[test]
    fn remove_marks_subtree_and_detach_frees_it() {
        let (mut tree, board, sub, _, r2) = sample();
        tree.remove(sub).unwrap();
        assert!(tree.node(sub).unwrap().pending_removal);
        assert!(tree.node(r2).unwrap().pending_removal);
        tree.detach(sub).unwrap();
        assert!(tree.get(r2).is_none());
        assert_eq!(tree.children(board).len(), 1);
        assert!(matches!(tree.remove(tree.root_id()), Err(CoreError::RootDetach)));
    }

    #[test]
    fn update_props_revalidates_and_notifies_ancestors() {
        let (mut tree, board, sub, _, r2) = sample();
        tree.update_props(r2, &json!({ "pcbX": 3 })).unwrap();
        let node = tree.node(r2).unwrap();
        assert_eq!(node.declared["pcbX"], json!(3));
        assert!(node.phases.is_dirty(RenderPhase::SubtreeExpansion));
        assert!(tree.node(sub).unwrap().phases.is_dirty(RenderPhase::PcbComponentRender));
        assert!(tree.node(board).unwrap().phases.is_dirty(RenderPhase::PortMatching));
        assert!(!tree.node(board).unwrap().phases.is_dirty(RenderPhase::SourceBinding));

        assert!(tree.update_props(r2, &json!({ "name": 5 })).is_err());
        assert_eq!(tree.node(r2).unwrap().name(), Some("R2"));
    }

    #[test]
    fn entity_refs_collect_all_ids() {
        let refs = EntityRefs {
            source_component_id: Some("source_component_0".to_string()),
            pcb_component_id: Some("pcb_component_0".to_string()),
            extra: vec!["pcb_smtpad_0".to_string()],
            ..Default::default()
        };
        assert_eq!(
            refs.all_ids(),
            vec!["source_component_0", "pcb_component_0", "pcb_smtpad_0"]
        );
    }
}
