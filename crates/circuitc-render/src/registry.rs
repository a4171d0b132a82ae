//! Component kinds: the registry and the tree builder.
//!
//! A [`ComponentRegistry`] maps each kind name to its schema check and its
//! [`NodeBehavior`]. It is built once and injected into the engine; nothing
//! reads a process-wide catalog. [`Element`] is the plain builder input: a
//! kind, declared properties and children.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use circuitc_core::props::{
    ComponentProps, ConstraintProps, GroupProps, NetProps, PortProps, SimulationProps, TraceProps,
};
use circuitc_core::tree::ROOT_KIND;
use circuitc_core::{CoreError, DesignTree, NodeId, NodeProps, PropsParser, ValidationError};

use crate::components::{
    ComponentBehavior, ConstraintBehavior, GroupBehavior, NetBehavior, PortBehavior,
    RootBehavior, SimulationBehavior, TraceBehavior,
};
use crate::context::RenderContext;
use crate::error::RenderError;

// ---------------------------------------------------------------------------
// Behavior trait
// ---------------------------------------------------------------------------

/// Per-kind phase handlers.
///
/// For each node and phase the engine calls exactly one handler per visit:
/// `initial` the first time, `update` when the phase was marked dirty, and
/// `remove` while the node is pending removal. Every handler defaults to a
/// no-op except `remove`, which deletes the records the node references.
pub trait NodeBehavior: Send + Sync {
    fn initial(&self, ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
        let _ = (ctx, node);
        Ok(())
    }

    fn update(&self, ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
        let _ = (ctx, node);
        Ok(())
    }

    fn remove(&self, ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
        ctx.delete_refs(node)
    }
}

/// Behavior of kinds that only carry data.
#[derive(Debug, Clone, Copy, Default)]
pub struct InertBehavior;

impl NodeBehavior for InertBehavior {}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct KindEntry {
    parser: PropsParser,
    behavior: Arc<dyn NodeBehavior>,
}

/// Kind name -> schema check and behavior.
#[derive(Clone)]
pub struct ComponentRegistry {
    kinds: HashMap<String, KindEntry>,
    root: Arc<dyn NodeBehavior>,
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ComponentRegistry {
    /// A registry with no kinds besides the synthetic root.
    pub fn empty() -> Self {
        ComponentRegistry {
            kinds: HashMap::new(),
            root: Arc::new(RootBehavior),
        }
    }

    /// The minimal built-in catalog.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        let group: Arc<dyn NodeBehavior> = Arc::new(GroupBehavior);
        let component: Arc<dyn NodeBehavior> = Arc::new(ComponentBehavior);
        registry.register_shared("board", parse_board, Arc::clone(&group));
        registry.register_shared("group", parse_group, group);
        registry.register_shared("resistor", parse_two_pin, Arc::clone(&component));
        registry.register_shared("capacitor", parse_two_pin, Arc::clone(&component));
        registry.register_shared("chip", parse_chip, component);
        registry.register("port", parse_port, PortBehavior);
        registry.register("net", parse_net, NetBehavior);
        registry.register("trace", parse_trace, TraceBehavior);
        registry.register("constraint", parse_constraint, ConstraintBehavior);
        registry.register("analogsimulation", parse_simulation, SimulationBehavior);
        registry
    }

    pub fn register(
        &mut self,
        kind: &str,
        parser: PropsParser,
        behavior: impl NodeBehavior + 'static,
    ) -> &mut Self {
        self.register_shared(kind, parser, Arc::new(behavior))
    }

    pub fn register_shared(
        &mut self,
        kind: &str,
        parser: PropsParser,
        behavior: Arc<dyn NodeBehavior>,
    ) -> &mut Self {
        self.kinds
            .insert(kind.to_string(), KindEntry { parser, behavior });
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    pub fn parser(&self, kind: &str) -> Result<PropsParser, ValidationError> {
        self.kinds
            .get(kind)
            .map(|e| e.parser)
            .ok_or_else(|| ValidationError::UnknownKind {
                kind: kind.to_string(),
            })
    }

    /// Behavior for `kind`; unknown kinds are inert.
    pub fn behavior(&self, kind: &str) -> Arc<dyn NodeBehavior> {
        if kind == ROOT_KIND {
            return Arc::clone(&self.root);
        }
        self.kinds
            .get(kind)
            .map(|e| Arc::clone(&e.behavior))
            .unwrap_or_else(|| Arc::new(InertBehavior))
    }

    // -----------------------------------------------------------------------
    // Tree building
    // -----------------------------------------------------------------------

    /// Builds a tree whose root owns `elements`.
    pub fn build_tree(&self, elements: &[Element]) -> Result<DesignTree, CoreError> {
        let mut tree = DesignTree::new();
        let root = tree.root_id();
        for element in elements {
            self.append(&mut tree, root, element)?;
        }
        Ok(tree)
    }

    /// Creates `element` and its children under `parent`.
    pub fn append(
        &self,
        tree: &mut DesignTree,
        parent: NodeId,
        element: &Element,
    ) -> Result<NodeId, CoreError> {
        let parser = self.parser(&element.kind)?;
        let id = tree.insert(parent, &element.kind, element.props.clone(), parser)?;
        for child in &element.children {
            self.append(tree, id, child)?;
        }
        Ok(id)
    }
}

// ---------------------------------------------------------------------------
// Elements
// ---------------------------------------------------------------------------

/// Builder input: one node and its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub kind: String,
    #[serde(default = "empty_props")]
    pub props: Value,
    #[serde(default)]
    pub children: Vec<Element>,
}

fn empty_props() -> Value {
    Value::Object(Default::default())
}

impl Element {
    pub fn new(kind: &str, props: Value) -> Self {
        Element {
            kind: kind.to_string(),
            props,
            children: Vec::new(),
        }
    }

    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children.extend(children);
        self
    }
}

// ---------------------------------------------------------------------------
// Built-in schema checks
// ---------------------------------------------------------------------------

fn parse_board(kind: &str, declared: &Value) -> Result<NodeProps, ValidationError> {
    GroupProps::parse(kind, declared, true).map(NodeProps::Group)
}

fn parse_group(kind: &str, declared: &Value) -> Result<NodeProps, ValidationError> {
    GroupProps::parse(kind, declared, false).map(NodeProps::Group)
}

fn parse_two_pin(kind: &str, declared: &Value) -> Result<NodeProps, ValidationError> {
    ComponentProps::parse(kind, declared, Some(2)).map(NodeProps::Component)
}

fn parse_chip(kind: &str, declared: &Value) -> Result<NodeProps, ValidationError> {
    ComponentProps::parse(kind, declared, None).map(NodeProps::Component)
}

fn parse_port(kind: &str, declared: &Value) -> Result<NodeProps, ValidationError> {
    PortProps::parse(kind, declared).map(NodeProps::Port)
}

fn parse_net(kind: &str, declared: &Value) -> Result<NodeProps, ValidationError> {
    NetProps::parse(kind, declared).map(NodeProps::Net)
}

fn parse_trace(kind: &str, declared: &Value) -> Result<NodeProps, ValidationError> {
    TraceProps::parse(kind, declared).map(NodeProps::Trace)
}

fn parse_constraint(kind: &str, declared: &Value) -> Result<NodeProps, ValidationError> {
    ConstraintProps::parse(kind, declared).map(NodeProps::Constraint)
}

fn parse_simulation(kind: &str, declared: &Value) -> Result<NodeProps, ValidationError> {
    SimulationProps::parse(kind, declared).map(NodeProps::AnalogSimulation)
}

/// Schema check for caller-registered kinds that keep their declared
/// object as-is.
pub fn parse_custom(kind: &str, declared: &Value) -> Result<NodeProps, ValidationError> {
    match declared {
        Value::Object(_) => Ok(NodeProps::Custom(declared.clone())),
        other => Err(ValidationError::NotAnObject {
            kind: kind.to_string(),
            found: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_nested_tree() {
        let registry = ComponentRegistry::builtin();
        let design = Element::new("board", json!({ "width": 10, "height": 10 }))
            .child(Element::new("resistor", json!({ "name": "R1", "resistance": "1k" })))
            .child(Element::new("capacitor", json!({ "name": "C1" })));
        let tree = registry.build_tree(&[design]).unwrap();
        let board = tree.resolve_root().unwrap();
        assert_eq!(tree.node(board).unwrap().kind, "board");
        assert_eq!(tree.children(board).len(), 2);
    }

    #[test]
    fn unknown_kind_fails_construction() {
        let registry = ComponentRegistry::builtin();
        let err = registry
            .build_tree(&[Element::new("flux_capacitor", json!({}))])
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::UnknownKind { ref kind }) if kind == "flux_capacitor"
        ));
    }

    #[test]
    fn invalid_props_fail_construction() {
        let registry = ComponentRegistry::builtin();
        let err = registry
            .build_tree(&[Element::new("resistor", json!({ "resistance": "1k" }))])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "<resistor> is missing required property 'name'"
        );
    }

    #[test]
    fn elements_deserialize_with_defaults() {
        let element: Element = serde_json::from_value(json!({
            "kind": "group",
            "children": [{ "kind": "net", "props": { "name": "GND" } }]
        }))
        .unwrap();
        assert_eq!(element.props, json!({}));
        assert_eq!(element.children[0].kind, "net");
    }

    #[test]
    fn custom_kinds_can_be_registered() {
        let mut registry = ComponentRegistry::builtin();
        registry.register("note", parse_custom, InertBehavior);
        assert!(registry.contains("note"));
        let tree = registry
            .build_tree(&[Element::new("note", json!({ "name": "n1" }))])
            .unwrap();
        assert_eq!(tree.len(), 2);
    }
}
