//! The render phase engine.
//!
//! [`RenderEngine`] owns one design tree and one fact store and drives the
//! fixed phase list over the tree:
//!
//! - `render_cycle` visits every node once per phase, children before
//!   parents. Nodes added by a handler are picked up later in the same
//!   phase, and a node first catches up on any earlier phase it missed, so
//!   every node sees every phase in order whatever depth it was added at.
//! - `settle` repeats cycles and waits for queued async effects until no
//!   work remains. It is the only suspension point.
//!
//! The engine is single-threaded: handlers run one at a time with
//! exclusive access to the tree and store. Async effects run on the tokio
//! runtime but only hand back closures, which the engine applies between
//! cycles.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use circuitc_core::geometry::Transform;
use circuitc_core::{DesignTree, NodeId, RenderPhase};
use circuitc_layout::{CandidatePacker, FlexSolver, FlexboxSolver, PackSolver};
use circuitc_store::{CircuitRecord, FactStore, InMemoryStore, Side};
use serde_json::Value;

use crate::routing::RouteState;
use crate::config::RenderConfig;
use crate::connectivity::ConnectivityGroup;
use crate::context::RenderContext;
use crate::effects::{Completion, EffectTracker};
use crate::error::RenderError;
use crate::isolation::{self, IsolationState, SubcircuitCache};
use crate::registry::{ComponentRegistry, Element};
use crate::simulation::SimulationEngine;

// ---------------------------------------------------------------------------
// Services and state
// ---------------------------------------------------------------------------

/// Collaborators shared by an engine and every nested isolated engine it
/// spawns.
pub struct EngineServices {
    pub config: RenderConfig,
    pub registry: Arc<ComponentRegistry>,
    pub cache: SubcircuitCache,
    pub packer: Arc<dyn PackSolver>,
    pub flex: Arc<dyn FlexSolver>,
    pub http: reqwest::Client,
    pub simulators: Vec<Arc<dyn SimulationEngine>>,
}

impl EngineServices {
    pub fn new(config: RenderConfig, registry: Arc<ComponentRegistry>) -> Self {
        EngineServices {
            config,
            registry,
            cache: SubcircuitCache::new(),
            packer: Arc::new(CandidatePacker),
            flex: Arc::new(FlexboxSolver),
            http: reqwest::Client::new(),
            simulators: Vec::new(),
        }
    }

    pub fn with_packer(mut self, packer: Arc<dyn PackSolver>) -> Self {
        self.packer = packer;
        self
    }

    pub fn with_flex_solver(mut self, flex: Arc<dyn FlexSolver>) -> Self {
        self.flex = flex;
        self
    }

    pub fn with_simulation_engine(mut self, engine: Arc<dyn SimulationEngine>) -> Self {
        self.simulators.push(engine);
        self
    }

    /// Shares `cache` with other engines.
    pub fn with_cache(mut self, cache: SubcircuitCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }
}

/// Mutable engine bookkeeping handlers read and write through the context.
#[derive(Default)]
pub struct EngineState {
    pub effects: EffectTracker,
    /// Transform applied by layout to each layout unit's own records since
    /// they were rendered.
    pub frames: HashMap<(NodeId, Side), Transform>,
    /// Connectivity groups per scope (a subcircuit or the tree root).
    pub connectivity: HashMap<NodeId, Vec<ConnectivityGroup>>,
    pub routes: HashMap<NodeId, RouteState>,
    pub isolated: HashMap<NodeId, IsolationState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handler {
    Initial,
    Update,
    Remove,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct RenderEngine {
    tree: DesignTree,
    store: Box<dyn FactStore>,
    services: Arc<EngineServices>,
    state: EngineState,
    cycles: usize,
}

impl RenderEngine {
    pub fn new(tree: DesignTree, registry: ComponentRegistry, config: RenderConfig) -> Self {
        Self::with_services(
            tree,
            Arc::new(EngineServices::new(config, Arc::new(registry))),
        )
    }

    pub fn with_services(tree: DesignTree, services: Arc<EngineServices>) -> Self {
        RenderEngine {
            tree,
            store: Box::new(InMemoryStore::new()),
            services,
            state: EngineState::default(),
            cycles: 0,
        }
    }

    /// Replaces the fact store. Only meaningful before the first cycle.
    pub fn with_store(mut self, store: Box<dyn FactStore>) -> Self {
        self.store = store;
        self
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn tree(&self) -> &DesignTree {
        &self.tree
    }

    pub fn store(&self) -> &dyn FactStore {
        self.store.as_ref()
    }

    pub fn services(&self) -> &Arc<EngineServices> {
        &self.services
    }

    pub fn cache(&self) -> &SubcircuitCache {
        &self.services.cache
    }

    /// Cycles run so far.
    pub fn cycles(&self) -> usize {
        self.cycles
    }

    pub fn pending_effects(&self) -> usize {
        self.state.effects.pending_count()
    }

    /// The compiled output: every record in insertion order.
    pub fn circuit_json(&self) -> Vec<CircuitRecord> {
        self.store.to_array()
    }

    pub fn circuit_json_value(&self) -> Result<Value, RenderError> {
        Ok(serde_json::to_value(self.store.to_array()).map_err(circuitc_store::StorageError::from)?)
    }

    /// Connectivity groups computed for `scope` (a subcircuit node, or the
    /// tree root for unscoped traces).
    pub fn connectivity(&self, scope: NodeId) -> &[ConnectivityGroup] {
        self.state
            .connectivity
            .get(&scope)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    // -----------------------------------------------------------------------
    // Tree mutation
    // -----------------------------------------------------------------------

    /// Merges `patch` into a node's declared properties.
    pub fn update_props(&mut self, id: NodeId, patch: &Value) -> Result<(), RenderError> {
        self.tree.update_props(id, patch)?;
        Ok(())
    }

    /// Queues `id` and its subtree for removal on the next cycle.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), RenderError> {
        self.tree.remove(id)?;
        for ancestor in self.tree.ancestors(id) {
            self.tree
                .mark_dirty_many(ancestor, RenderPhase::ancestor_notification_phases());
        }
        Ok(())
    }

    /// Builds `element` under `parent`.
    pub fn add_element(&mut self, parent: NodeId, element: &Element) -> Result<NodeId, RenderError> {
        let id = self.services.registry.append(&mut self.tree, parent, element)?;
        for ancestor in self.tree.ancestors(id) {
            self.tree
                .mark_dirty_many(ancestor, RenderPhase::ancestor_notification_phases());
        }
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Cycles
    // -----------------------------------------------------------------------

    /// Runs every phase once over the whole tree.
    pub fn render_cycle(&mut self) -> Result<(), RenderError> {
        self.cycles += 1;
        debug!(cycle = self.cycles, nodes = self.tree.len(), "render cycle");

        for phase in RenderPhase::ALL {
            let mut visited: HashSet<NodeId> = HashSet::new();
            loop {
                let fresh: Vec<NodeId> = self
                    .tree
                    .post_order(self.tree.root_id())
                    .into_iter()
                    .filter(|id| !visited.contains(id))
                    .collect();
                if fresh.is_empty() {
                    break;
                }
                for id in fresh {
                    visited.insert(id);
                    self.visit(id, phase)?;
                }
            }
        }

        self.coverage_sweep()?;
        self.detach_removed()?;
        self.state.effects.forget_detached(&self.tree);
        Ok(())
    }

    /// Repeats cycles until no node has work left and no effect is pending.
    pub async fn settle(&mut self) -> Result<(), RenderError> {
        let wait = Duration::from_millis(self.services.config.settle_poll_interval_ms.max(1));
        let max_cycles = self.services.config.max_render_cycles;
        let mut ran = 0;

        loop {
            if ran >= max_cycles {
                return Err(RenderError::NotSettled { cycles: ran });
            }
            self.render_cycle()?;
            ran += 1;
            self.state.effects.start_queued();

            if !self.state.effects.has_pending() {
                if self.needs_cycle() {
                    continue;
                }
                info!(cycles = ran, records = self.store.len(), "render settled");
                return Ok(());
            }

            debug!(pending = self.state.effects.pending_count(), "waiting for async effects");
            let mut applied = 0;
            while applied == 0 && self.state.effects.has_pending() {
                if let Some(done) = self.state.effects.next_completion(wait).await? {
                    applied += self.apply_completion(done)?;
                }
            }
            while let Some(done) = self.state.effects.next_completion(Duration::ZERO).await? {
                self.apply_completion(done)?;
            }
        }
    }

    fn apply_completion(&mut self, done: Completion) -> Result<usize, RenderError> {
        let node = done.node;
        let effect = done.id.clone();
        let Some((phase, result)) = self.state.effects.accept(&mut self.tree, done) else {
            return Ok(0);
        };
        let apply = result?;
        debug!(node = %node, effect = %effect, phase = %phase, "applying effect result");
        let mut ctx = RenderContext {
            tree: &mut self.tree,
            store: self.store.as_mut(),
            registry: &self.services.registry,
            services: &self.services,
            state: &mut self.state,
            phase,
        };
        apply(&mut ctx)?;
        Ok(1)
    }

    /// Whether any live node is dirty, behind, or awaiting removal.
    fn needs_cycle(&self) -> bool {
        self.tree.node_ids().into_iter().any(|id| {
            if self.skipped(id) {
                return false;
            }
            self.tree.get(id).is_some_and(|n| {
                n.pending_removal || n.phases.any_dirty() || !n.phases.fully_initialized()
            })
        })
    }

    /// Nodes inside an isolated subcircuit are rendered by the nested
    /// engine, never by this one.
    fn skipped(&self, id: NodeId) -> bool {
        isolation::inside_isolated(&self.tree, &self.services.config, id)
    }

    fn visit(&mut self, id: NodeId, phase: RenderPhase) -> Result<(), RenderError> {
        let Some(node) = self.tree.get(id) else {
            return Ok(());
        };
        if self.skipped(id) {
            return Ok(());
        }

        if node.pending_removal {
            if node.phases.is_initialized(phase) {
                self.dispatch(id, phase, Handler::Remove)?;
            }
            return Ok(());
        }

        for &earlier in phase.predecessors() {
            let behind = self
                .tree
                .get(id)
                .is_some_and(|n| !n.phases.is_initialized(earlier));
            if behind {
                self.dispatch(id, earlier, Handler::Initial)?;
            }
        }

        let Some(state) = self.tree.get(id).map(|n| n.phases.get(phase)) else {
            return Ok(());
        };
        if !state.initialized {
            self.dispatch(id, phase, Handler::Initial)
        } else if state.dirty {
            self.dispatch(id, phase, Handler::Update)
        } else {
            Ok(())
        }
    }

    /// Runs one handler. Phase state is updated before the call so a
    /// handler may mark its own phase dirty again.
    fn dispatch(&mut self, id: NodeId, phase: RenderPhase, handler: Handler) -> Result<(), RenderError> {
        let node = self.tree.node_mut(id)?;
        let kind = node.kind.clone();
        let state = node.phases.get_mut(phase);
        match handler {
            Handler::Initial | Handler::Update => {
                state.initialized = true;
                state.dirty = false;
            }
            Handler::Remove => {
                state.initialized = false;
                state.dirty = false;
            }
        }

        let behavior = self.services.registry.behavior(&kind);
        let mut ctx = RenderContext {
            tree: &mut self.tree,
            store: self.store.as_mut(),
            registry: &self.services.registry,
            services: &self.services,
            state: &mut self.state,
            phase,
        };
        match handler {
            Handler::Initial => behavior.initial(&mut ctx, id),
            Handler::Update => behavior.update(&mut ctx, id),
            Handler::Remove => behavior.remove(&mut ctx, id),
        }
    }

    /// Initializes, in phase order, any node the phase walks left behind.
    fn coverage_sweep(&mut self) -> Result<(), RenderError> {
        loop {
            let behind: Vec<NodeId> = self
                .tree
                .post_order(self.tree.root_id())
                .into_iter()
                .filter(|&id| !self.skipped(id))
                .filter(|&id| {
                    self.tree
                        .get(id)
                        .is_some_and(|n| !n.pending_removal && !n.phases.fully_initialized())
                })
                .collect();
            if behind.is_empty() {
                return Ok(());
            }
            debug!(count = behind.len(), "coverage sweep");
            for id in behind {
                for phase in RenderPhase::ALL {
                    self.visit(id, phase)?;
                }
            }
        }
    }

    /// Detaches removed subtrees whose cleanup has finished.
    fn detach_removed(&mut self) -> Result<(), RenderError> {
        let tops: Vec<NodeId> = self
            .tree
            .node_ids()
            .into_iter()
            .filter(|&id| {
                let Some(node) = self.tree.get(id) else {
                    return false;
                };
                node.pending_removal
                    && node
                        .parent
                        .and_then(|p| self.tree.get(p))
                        .map_or(true, |p| !p.pending_removal)
            })
            .collect();

        for top in tops {
            let done = std::iter::once(top)
                .chain(self.tree.full_descendants(top))
                .all(|n| {
                    self.tree
                        .get(n)
                        .map_or(true, |n| n.phases.fully_uninitialized())
                });
            if done {
                debug!(node = %top, "detaching removed subtree");
                for n in std::iter::once(top).chain(self.tree.full_descendants(top)) {
                    self.state.routes.remove(&n);
                    self.state.isolated.remove(&n);
                    self.state.connectivity.remove(&n);
                    self.state.frames.retain(|(node, _), _| *node != n);
                }
                self.tree.detach(top)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{parse_custom, NodeBehavior};
    use serde_json::json;
    use std::sync::Mutex;

    /// Records every handler call it receives.
    struct Probe {
        log: Arc<Mutex<Vec<(NodeId, RenderPhase, &'static str)>>>,
        spawn_child_in: Option<RenderPhase>,
    }

    impl NodeBehavior for Probe {
        fn initial(&self, ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
            self.log.lock().unwrap().push((node, ctx.phase, "initial"));
            if Some(ctx.phase) == self.spawn_child_in {
                let depth = ctx
                    .node(node)?
                    .declared
                    .get("depth")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                if depth > 0 {
                    ctx.add_child(node, "probe", json!({ "depth": depth - 1 }))?;
                }
            }
            Ok(())
        }

        fn update(&self, ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
            self.log.lock().unwrap().push((node, ctx.phase, "update"));
            Ok(())
        }

        fn remove(&self, ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
            self.log.lock().unwrap().push((node, ctx.phase, "remove"));
            Ok(())
        }
    }

    type Log = Arc<Mutex<Vec<(NodeId, RenderPhase, &'static str)>>>;

    fn probe_engine(spawn_child_in: Option<RenderPhase>, depth: u64) -> (RenderEngine, Log, NodeId) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ComponentRegistry::empty();
        registry.register(
            "probe",
            parse_custom,
            Probe {
                log: Arc::clone(&log),
                spawn_child_in,
            },
        );
        let tree = registry
            .build_tree(&[Element::new("probe", json!({ "depth": depth }))])
            .unwrap();
        let top = tree.children(tree.root_id())[0];
        (
            RenderEngine::new(tree, registry, RenderConfig::default()),
            log,
            top,
        )
    }

    fn phases_for(log: &Log, node: NodeId) -> Vec<RenderPhase> {
        log.lock()
            .unwrap()
            .iter()
            .filter(|(n, _, h)| *n == node && *h == "initial")
            .map(|(_, p, _)| *p)
            .collect()
    }

    #[test]
    fn every_node_sees_phases_in_order() {
        let (mut engine, log, top) = probe_engine(None, 0);
        engine.render_cycle().unwrap();
        assert_eq!(phases_for(&log, top), RenderPhase::ALL.to_vec());
    }

    #[test]
    fn children_added_mid_cycle_see_every_phase_at_any_depth() {
        let (mut engine, log, top) = probe_engine(Some(RenderPhase::PcbComponentRender), 3);
        engine.render_cycle().unwrap();

        let ids = engine.tree().full_descendants(top);
        assert_eq!(ids.len(), 3);
        for id in std::iter::once(top).chain(ids) {
            assert_eq!(phases_for(&log, id), RenderPhase::ALL.to_vec(), "node {id}");
            assert!(engine.tree().node(id).unwrap().phases.fully_initialized());
        }
    }

    #[test]
    fn dirty_phase_reruns_only_its_update() {
        let (mut engine, log, top) = probe_engine(None, 0);
        engine.render_cycle().unwrap();
        log.lock().unwrap().clear();

        engine.tree.mark_dirty(top, RenderPhase::SchematicLayout);
        engine.render_cycle().unwrap();
        let calls = log.lock().unwrap().clone();
        assert_eq!(calls, vec![(top, RenderPhase::SchematicLayout, "update")]);
    }

    #[test]
    fn removal_runs_remove_handlers_then_detaches() {
        let (mut engine, log, top) = probe_engine(Some(RenderPhase::SubtreeExpansion), 1);
        engine.render_cycle().unwrap();
        let child = engine.tree().children(top)[0];
        log.lock().unwrap().clear();

        engine.remove_node(child).unwrap();
        engine.render_cycle().unwrap();
        let removed: Vec<RenderPhase> = log
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _, h)| *n == child && *h == "remove")
            .map(|(_, p, _)| *p)
            .collect();
        assert_eq!(removed, RenderPhase::ALL.to_vec());
        assert!(engine.tree().get(child).is_none());
        assert!(engine.tree().children(top).is_empty());
    }

    #[tokio::test]
    async fn settle_stops_when_nothing_is_pending() {
        let (mut engine, _log, _top) = probe_engine(Some(RenderPhase::SourceBinding), 2);
        engine.settle().await.unwrap();
        assert_eq!(engine.cycles(), 1);
        assert_eq!(engine.pending_effects(), 0);

        engine.settle().await.unwrap();
        assert_eq!(engine.cycles(), 2);
    }
}
