//! Subcircuit isolation and the structural render cache.
//!
//! A cacheable group is rendered by a nested [`RenderEngine`] over a copy of
//! its subtree, with its own fact store and settle loop, as an async effect.
//! The nested store becomes a [`Snapshot`] cached under the group's
//! structural key: a sorted JSON description of its kind, non-positional
//! properties and children. Every group with the same key reuses the
//! snapshot, merged into the outer store under a fresh id prefix, and is
//! then positioned like any other child.
//!
//! The cache is shared by every engine built from the same
//! [`EngineServices`]. While a key is being rendered, later groups with
//! that key wait on a watch channel instead of rendering it again.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use circuitc_core::{CoreError, DesignTree, EntityRefs, NodeId, RenderPhase};
use circuitc_store::{remap_ids, short_digest, CircuitRecord, Side};

use crate::config::RenderConfig;
use crate::context::{subcircuit_id_for, RenderContext};
use crate::effects::{EffectApply, EffectFuture};
use crate::engine::RenderEngine;
use crate::error::RenderError;

/// Declared on children a component generates from its own properties.
pub const GENERATED_FLAG: &str = "_generated";

/// Effect id of a group's isolated render (or its wait on another one).
pub const ISOLATION_EFFECT: &str = "isolated-render";

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// The finished output of one isolated render.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub key: String,
    /// Short digest of `key`, used in id prefixes and logs.
    pub digest: String,
    pub records: Vec<CircuitRecord>,
    /// Subcircuit id the nested render gave the group.
    pub root_subcircuit_id: String,
    /// What the group itself referenced in the nested render.
    pub root_refs: EntityRefs,
}

type SnapshotSlot = watch::Receiver<Option<Arc<Snapshot>>>;

#[derive(Debug, Clone)]
enum CacheEntry {
    Ready(Arc<Snapshot>),
    Pending(SnapshotSlot),
}

/// What a lookup found.
#[derive(Debug)]
pub enum CacheLookup {
    Hit(Arc<Snapshot>),
    InFlight(SnapshotSlot),
    /// Nothing cached; the caller now owns the render and must publish.
    Claimed(watch::Sender<Option<Arc<Snapshot>>>),
}

/// Structural key -> snapshot, shared across engines.
#[derive(Debug, Clone, Default)]
pub struct SubcircuitCache(Arc<DashMap<String, CacheEntry>>);

impl SubcircuitCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys cached or being rendered.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Ready snapshot for `key`, if any.
    pub fn get(&self, key: &str) -> Option<Arc<Snapshot>> {
        match self.0.get(key).as_deref() {
            Some(CacheEntry::Ready(snapshot)) => Some(Arc::clone(snapshot)),
            _ => None,
        }
    }

    /// Looks `key` up and claims it when absent.
    pub fn lookup_or_claim(&self, key: &str) -> CacheLookup {
        match self.0.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => match entry.get() {
                CacheEntry::Ready(snapshot) => CacheLookup::Hit(Arc::clone(snapshot)),
                CacheEntry::Pending(slot) => CacheLookup::InFlight(slot.clone()),
            },
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let (tx, rx) = watch::channel(None);
                entry.insert(CacheEntry::Pending(rx));
                CacheLookup::Claimed(tx)
            }
        }
    }

    fn publish(&self, snapshot: Arc<Snapshot>) {
        self.0
            .insert(snapshot.key.clone(), CacheEntry::Ready(snapshot));
    }

    fn abandon(&self, key: &str) {
        self.0.remove(key);
    }
}

// ---------------------------------------------------------------------------
// Isolation state
// ---------------------------------------------------------------------------

/// Isolation bookkeeping for one group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IsolationState {
    pub key: String,
    /// The snapshot for `key` has been merged into the store.
    pub merged: bool,
}

/// Whether `id` renders its subtree in an isolated engine.
pub fn isolates(tree: &DesignTree, config: &RenderConfig, id: NodeId) -> bool {
    config.subcircuit_caching
        && tree
            .get(id)
            .and_then(|n| n.props.as_group())
            .is_some_and(|g| g.cacheable)
}

/// Whether `id` lives strictly inside an isolating group.
pub fn inside_isolated(tree: &DesignTree, config: &RenderConfig, id: NodeId) -> bool {
    tree.ancestors(id)
        .into_iter()
        .any(|a| isolates(tree, config, a))
}

// ---------------------------------------------------------------------------
// Structural key
// ---------------------------------------------------------------------------

fn is_positional(key: &str) -> bool {
    key.ends_with('X')
        || key.ends_with('Y')
        || key.ends_with("Rotation")
        || key.contains("Margin")
        || key.ends_with("AnchorAlignment")
        || key == "layer"
}

fn is_generated(tree: &DesignTree, id: NodeId) -> bool {
    tree.get(id)
        .and_then(|n| n.declared.get(GENERATED_FLAG))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn sanitized(declared: &Value, top: bool) -> Value {
    let Some(obj) = declared.as_object() else {
        return Value::Object(Map::new());
    };
    let kept: Map<String, Value> = obj
        .iter()
        .filter(|(k, _)| k.as_str() != GENERATED_FLAG)
        .filter(|(k, _)| !top || !(is_positional(k) || k.as_str() == "name" || k.as_str() == "cacheable"))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Value::Object(kept)
}

fn describe(tree: &DesignTree, id: NodeId, top: bool) -> Result<Value, CoreError> {
    let node = tree.node(id)?;
    let children = node
        .children
        .iter()
        .copied()
        .filter(|&c| !is_generated(tree, c))
        .filter(|&c| tree.get(c).is_some_and(|n| !n.pending_removal))
        .map(|c| describe(tree, c, false))
        .collect::<Result<Vec<_>, _>>()?;
    let mut out = Map::new();
    out.insert("kind".to_string(), Value::String(node.kind.clone()));
    out.insert("props".to_string(), sanitized(&node.declared, top));
    out.insert("children".to_string(), Value::Array(children));
    Ok(Value::Object(out))
}

/// Deterministic description of the group at `id`, independent of where
/// it is placed and what it is called.
///
/// Children generated from properties are left out; the properties that
/// generate them are part of the key.
pub fn structural_key(tree: &DesignTree, id: NodeId) -> Result<String, CoreError> {
    Ok(describe(tree, id, true)?.to_string())
}

// ---------------------------------------------------------------------------
// Isolated render
// ---------------------------------------------------------------------------

/// Copies the authored subtree at `id` into a fresh tree whose only
/// top-level node is the group, unplaced and marked as a plain subcircuit.
pub fn isolated_tree(tree: &DesignTree, id: NodeId) -> Result<DesignTree, CoreError> {
    let node = tree.node(id)?;
    let mut props = match &node.declared {
        Value::Object(obj) => obj
            .iter()
            .filter(|(k, _)| !is_positional(k) && k.as_str() != "cacheable")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        _ => Map::new(),
    };
    props.insert("subcircuit".to_string(), Value::Bool(true));

    let mut nested = DesignTree::new();
    let root = nested.root_id();
    let top = nested.insert(root, &node.kind, Value::Object(props), node.parser)?;
    copy_children(tree, id, &mut nested, top)?;
    Ok(nested)
}

fn copy_children(
    tree: &DesignTree,
    from: NodeId,
    nested: &mut DesignTree,
    to: NodeId,
) -> Result<(), CoreError> {
    for &child in tree.children(from) {
        if is_generated(tree, child) {
            continue;
        }
        let node = tree.node(child)?;
        if node.pending_removal {
            continue;
        }
        let copy = nested.insert(to, &node.kind, node.declared.clone(), node.parser)?;
        copy_children(tree, child, nested, copy)?;
    }
    Ok(())
}

/// Starts (or resumes) isolation of `group`.
///
/// A cached snapshot is merged at once. Otherwise an effect either renders
/// the subtree in a nested engine or waits for the engine already doing so.
pub fn begin(ctx: &mut RenderContext<'_>, group: NodeId) -> Result<(), RenderError> {
    let key = structural_key(&*ctx.tree, group)?;
    if ctx.state.isolated.get(&group).is_some_and(|s| s.key == key) {
        return Ok(());
    }
    ctx.state.isolated.insert(
        group,
        IsolationState {
            key: key.clone(),
            merged: false,
        },
    );
    let digest = short_digest(&key, 8);

    match ctx.services.cache.lookup_or_claim(&key) {
        CacheLookup::Hit(snapshot) => {
            info!(node = %group, key = %digest, "subcircuit cache hit");
            merge(ctx, group, &snapshot)
        }
        CacheLookup::InFlight(slot) => {
            info!(node = %group, key = %digest, "waiting for in-flight isolated render");
            let future = wait_for(slot, group, subcircuit_id_for(group));
            ctx.queue_effect(group, ISOLATION_EFFECT, future);
            Ok(())
        }
        CacheLookup::Claimed(publisher) => {
            info!(node = %group, key = %digest, "subcircuit cache miss, rendering in isolation");
            let nested = isolated_tree(&*ctx.tree, group)?;
            let future = render_isolated(
                nested,
                Arc::clone(ctx.services),
                key,
                digest,
                publisher,
                group,
            );
            ctx.queue_effect(group, ISOLATION_EFFECT, future);
            Ok(())
        }
    }
}

fn render_isolated(
    tree: DesignTree,
    services: Arc<crate::engine::EngineServices>,
    key: String,
    digest: String,
    publisher: watch::Sender<Option<Arc<Snapshot>>>,
    group: NodeId,
) -> EffectFuture {
    Box::pin(async move {
        let subcircuit = subcircuit_id_for(group);
        let cache = services.cache.clone();
        let top = match tree.resolve_root() {
            Ok(top) => top,
            Err(err) => {
                cache.abandon(&key);
                return Err(RenderError::Isolation {
                    subcircuit,
                    message: err.to_string(),
                });
            }
        };

        let mut engine = RenderEngine::with_services(tree, services);
        let settled: Result<(), RenderError> = Box::pin(engine.settle()).await;
        if let Err(err) = settled {
            warn!(key = %digest, error = %err, "isolated render failed");
            cache.abandon(&key);
            return Err(RenderError::Isolation {
                subcircuit,
                message: err.to_string(),
            });
        }

        let root_refs = engine
            .tree()
            .get(top)
            .map(|n| n.refs.clone())
            .unwrap_or_default();
        let snapshot = Arc::new(Snapshot {
            key,
            digest,
            records: engine.circuit_json(),
            root_subcircuit_id: subcircuit_id_for(top),
            root_refs,
        });
        info!(key = %snapshot.digest, records = snapshot.records.len(), "isolated render cached");
        cache.publish(Arc::clone(&snapshot));
        // Waiters may already be gone; the cache holds the snapshot anyway.
        let _ = publisher.send(Some(Arc::clone(&snapshot)));

        let apply: EffectApply =
            Box::new(move |ctx: &mut RenderContext<'_>| merge_current(ctx, group, &snapshot));
        Ok(apply)
    })
}

fn wait_for(mut slot: SnapshotSlot, group: NodeId, subcircuit: String) -> EffectFuture {
    Box::pin(async move {
        let snapshot = loop {
            if let Some(snapshot) = slot.borrow_and_update().clone() {
                break snapshot;
            }
            if slot.changed().await.is_err() {
                return Err(RenderError::Isolation {
                    subcircuit,
                    message: "the isolated render this group waited on failed".to_string(),
                });
            }
        };
        let apply: EffectApply =
            Box::new(move |ctx: &mut RenderContext<'_>| merge_current(ctx, group, &snapshot));
        Ok(apply)
    })
}

/// Merges `snapshot` unless the group moved on to another key meanwhile.
fn merge_current(ctx: &mut RenderContext<'_>, group: NodeId, snapshot: &Snapshot) -> Result<(), RenderError> {
    let current = ctx
        .state
        .isolated
        .get(&group)
        .is_some_and(|s| s.key == snapshot.key);
    if !current || ctx.tree.get(group).is_none() {
        debug!(node = %group, "dropping snapshot for outdated structural key");
        return Ok(());
    }
    merge(ctx, group, snapshot)
}

/// Copies `snapshot` into the store as the records of `group`.
pub fn merge(ctx: &mut RenderContext<'_>, group: NodeId, snapshot: &Snapshot) -> Result<(), RenderError> {
    ctx.delete_refs(group)?;
    ctx.clear_frame(group, Side::Pcb);
    ctx.clear_frame(group, Side::Schematic);

    let prefix = format!(
        "{}_{}_{}",
        ctx.config().isolation_id_prefix,
        snapshot.digest,
        group.0
    );
    let mut overrides = HashMap::new();
    overrides.insert(snapshot.root_subcircuit_id.clone(), subcircuit_id_for(group));
    let records = remap_ids(&snapshot.records, &prefix, &overrides)?;

    let remapped = |id: &Option<String>| id.as_ref().map(|i| format!("{prefix}_{i}"));
    let source_group_id = remapped(&snapshot.root_refs.source_group_id);
    let schematic_group_id = remapped(&snapshot.root_refs.schematic_group_id);
    let pcb_group_id = remapped(&snapshot.root_refs.pcb_group_id);
    let owned = [&source_group_id, &schematic_group_id, &pcb_group_id];

    let mut extra = Vec::with_capacity(records.len());
    for record in records {
        let id = record.id().to_string();
        ctx.store.insert_with_id(record)?;
        if !owned.iter().any(|o| o.as_deref() == Some(id.as_str())) {
            extra.push(id);
        }
    }
    let count = extra.len() + owned.iter().filter(|o| o.is_some()).count();

    let refs = ctx.refs_mut(group)?;
    refs.source_group_id = source_group_id.clone();
    refs.schematic_group_id = schematic_group_id;
    refs.pcb_group_id = pcb_group_id;
    refs.extra = extra;

    if let Some(id) = source_group_id {
        let name = ctx.node(group)?.name().map(str::to_string);
        let parent_group = ctx
            .tree
            .ancestors(group)
            .into_iter()
            .find_map(|a| ctx.tree.get(a).and_then(|n| n.refs.source_group_id.clone()));
        let patch = serde_json::json!({
            "name": name,
            "parent_subcircuit_id": ctx.enclosing_subcircuit_id(group),
            "parent_source_group_id": parent_group,
        });
        ctx.update(&id, patch)?;
    }

    if let Some(state) = ctx.state.isolated.get_mut(&group) {
        state.merged = true;
    }
    ctx.tree.mark_dirty_many(
        group,
        &[RenderPhase::SchematicLayout, RenderPhase::PcbComponentRender],
    );
    ctx.mark_ancestors_dirty(group, RenderPhase::ancestor_notification_phases());
    let root = ctx.tree.root_id();
    ctx.tree.mark_dirty(root, RenderPhase::PcbAnalysis);

    info!(node = %group, key = %snapshot.digest, records = count, "merged isolated subcircuit");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ComponentRegistry, Element};
    use serde_json::json;

    fn amp(x: f64, name: &str) -> Element {
        Element::new(
            "group",
            json!({ "name": name, "cacheable": true, "pcbX": x, "schX": x, "pcbRotation": 90 }),
        )
        .child(Element::new("resistor", json!({ "name": "R1", "resistance": "1k" })))
        .child(Element::new("capacitor", json!({ "name": "C1", "capacitance": "1uF" })))
    }

    #[test]
    fn key_ignores_position_and_name() {
        let registry = ComponentRegistry::builtin();
        let tree = registry.build_tree(&[amp(0.0, "A"), amp(20.0, "B")]).unwrap();
        let [a, b] = tree.children(tree.root_id()) else {
            panic!("expected two groups");
        };
        assert_eq!(
            structural_key(&tree, *a).unwrap(),
            structural_key(&tree, *b).unwrap()
        );
    }

    #[test]
    fn key_tracks_child_props() {
        let registry = ComponentRegistry::builtin();
        let other = Element::new("group", json!({ "cacheable": true }))
            .child(Element::new("resistor", json!({ "name": "R1", "resistance": "2k" })))
            .child(Element::new("capacitor", json!({ "name": "C1", "capacitance": "1uF" })));
        let tree = registry.build_tree(&[amp(0.0, "A"), other]).unwrap();
        let [a, b] = tree.children(tree.root_id()) else {
            panic!("expected two groups");
        };
        assert_ne!(
            structural_key(&tree, *a).unwrap(),
            structural_key(&tree, *b).unwrap()
        );
    }

    #[test]
    fn key_format_is_sorted_json() {
        let registry = ComponentRegistry::builtin();
        let design = Element::new("group", json!({ "cacheable": true, "pcbX": 3, "name": "amp", "pcbPack": true }))
            .child(Element::new("resistor", json!({ "resistance": "1k", "name": "R1", "pcbX": 2 })));
        let tree = registry.build_tree(&[design]).unwrap();
        let group = tree.children(tree.root_id())[0];
        let key: Value = serde_json::from_str(&structural_key(&tree, group).unwrap()).unwrap();
        insta::assert_json_snapshot!(key, @r#"
        {
          "children": [
            {
              "children": [],
              "kind": "resistor",
              "props": {
                "name": "R1",
                "pcbX": 2,
                "resistance": "1k"
              }
            }
          ],
          "kind": "group",
          "props": {
            "pcbPack": true
          }
        }
        "#);
    }

    #[test]
    fn isolated_tree_drops_placement_and_marks_subcircuit() {
        let registry = ComponentRegistry::builtin();
        let tree = registry.build_tree(&[amp(5.0, "A")]).unwrap();
        let group = tree.children(tree.root_id())[0];
        let nested = isolated_tree(&tree, group).unwrap();
        let top = nested.resolve_root().unwrap();
        let node = nested.node(top).unwrap();
        assert!(node.caps.subcircuit);
        assert!(node.declared.get("pcbX").is_none());
        assert!(node.declared.get("cacheable").is_none());
        assert_eq!(node.declared["name"], "A");
        assert_eq!(nested.children(top).len(), 2);
    }

    #[tokio::test]
    async fn claims_are_exclusive_until_published() {
        let cache = SubcircuitCache::new();
        let CacheLookup::Claimed(tx) = cache.lookup_or_claim("k") else {
            panic!("first lookup must claim");
        };
        let CacheLookup::InFlight(mut rx) = cache.lookup_or_claim("k") else {
            panic!("second lookup must wait");
        };
        let snapshot = Arc::new(Snapshot {
            key: "k".to_string(),
            digest: "d".to_string(),
            records: Vec::new(),
            root_subcircuit_id: "subcircuit_1".to_string(),
            root_refs: EntityRefs::default(),
        });
        cache.publish(Arc::clone(&snapshot));
        tx.send(Some(Arc::clone(&snapshot))).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_deref(), Some(snapshot.as_ref()));
        assert!(matches!(cache.lookup_or_claim("k"), CacheLookup::Hit(_)));
        assert_eq!(cache.len(), 1);
    }
}
