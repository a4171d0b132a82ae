//! Asynchronous effect tracking.
//!
//! A node queues an effect under an id for a phase. The effect's future
//! runs on the tokio runtime and resolves to an [`EffectApply`]: a closure
//! the engine runs on its own thread of control to write results into the
//! fact store and mark nodes dirty. The tracker keeps every pending effect
//! in one map so "is anything pending?" is a length check.
//!
//! Queuing an id that is already pending supersedes it: the generation is
//! bumped and the tracked phase moves to the new one. The earlier future
//! still runs to completion (nothing is cancelled) but its result is stale
//! and dropped with a warning.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use circuitc_core::{AsyncEffect, DesignTree, NodeId, RenderPhase};

use crate::context::RenderContext;
use crate::error::RenderError;

/// Applies an effect's result on the engine side.
pub type EffectApply = Box<dyn FnOnce(&mut RenderContext<'_>) -> Result<(), RenderError> + Send>;

/// The asynchronous part of an effect.
pub type EffectFuture = Pin<Box<dyn Future<Output = Result<EffectApply, RenderError>> + Send>>;

/// A finished effect, not yet checked for staleness.
pub struct Completion {
    pub node: NodeId,
    pub id: String,
    pub generation: u64,
    pub result: Result<EffectApply, RenderError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    phase: RenderPhase,
    generation: u64,
}

/// Pending effects of one engine.
pub struct EffectTracker {
    next_generation: u64,
    pending: HashMap<(NodeId, String), Pending>,
    queued: Vec<(NodeId, String, u64, EffectFuture)>,
    jobs: JoinSet<Completion>,
}

impl Default for EffectTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectTracker {
    pub fn new() -> Self {
        EffectTracker {
            next_generation: 0,
            pending: HashMap::new(),
            queued: Vec::new(),
            jobs: JoinSet::new(),
        }
    }

    /// Queues `future` as effect `id` of `node` for `phase`.
    ///
    /// The future is spawned when the settle loop next starts queued work,
    /// so queuing works outside a runtime.
    pub fn queue(
        &mut self,
        tree: &mut DesignTree,
        node: NodeId,
        id: &str,
        phase: RenderPhase,
        future: EffectFuture,
    ) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let key = (node, id.to_string());
        if let Some(previous) = self.pending.get(&key) {
            debug!(
                node = %node,
                effect = id,
                from = %previous.phase,
                to = %phase,
                "superseding pending effect"
            );
        }
        self.pending.insert(key, Pending { phase, generation });

        if let Some(n) = tree.get_mut(node) {
            n.effects.retain(|e| e.id != id);
            n.effects.push(AsyncEffect {
                id: id.to_string(),
                phase,
                generation,
                complete: false,
            });
        }
        self.queued.push((node, id.to_string(), generation, future));
    }

    /// O(1) check for outstanding work.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Phase the pending effect `id` of `node` is tracked under.
    pub fn pending_phase(&self, node: NodeId, id: &str) -> Option<RenderPhase> {
        self.pending.get(&(node, id.to_string())).map(|p| p.phase)
    }

    /// Spawns every queued future. Must run inside a tokio runtime.
    pub(crate) fn start_queued(&mut self) {
        for (node, id, generation, future) in self.queued.drain(..) {
            self.jobs.spawn(async move {
                let result = future.await;
                Completion {
                    node,
                    id,
                    generation,
                    result,
                }
            });
        }
    }

    /// Waits up to `wait` for the next finished effect.
    ///
    /// `Ok(None)` means the wait timed out. A task that panicked surfaces as
    /// an error.
    pub(crate) async fn next_completion(
        &mut self,
        wait: Duration,
    ) -> Result<Option<Completion>, RenderError> {
        if self.jobs.is_empty() {
            // Pending entries without a running task cannot complete.
            if !self.pending.is_empty() {
                warn!(pending = self.pending.len(), "dropping effects with no running task");
                self.pending.clear();
            }
            return Ok(None);
        }
        match tokio::time::timeout(wait, self.jobs.join_next()).await {
            Ok(Some(joined)) => Ok(Some(joined?)),
            Ok(None) | Err(_) => Ok(None),
        }
    }

    /// Checks `completion` against the current generation.
    ///
    /// Returns the apply closure when the completion is current; stale
    /// completions and completions of detached nodes are dropped.
    pub(crate) fn accept(
        &mut self,
        tree: &mut DesignTree,
        completion: Completion,
    ) -> Option<(RenderPhase, Result<EffectApply, RenderError>)> {
        let key = (completion.node, completion.id.clone());
        let current = self.pending.get(&key).copied();
        match current {
            Some(p) if p.generation == completion.generation => {
                self.pending.remove(&key);
                if let Some(node) = tree.get_mut(completion.node) {
                    for effect in node.effects.iter_mut().filter(|e| e.id == completion.id) {
                        effect.complete = true;
                    }
                } else {
                    debug!(node = %completion.node, effect = %completion.id, "effect finished for detached node");
                    return None;
                }
                Some((p.phase, completion.result))
            }
            _ => {
                warn!(
                    node = %completion.node,
                    effect = %completion.id,
                    generation = completion.generation,
                    "dropping stale effect completion"
                );
                None
            }
        }
    }

    /// Forgets pending effects of nodes that no longer exist.
    pub(crate) fn forget_detached(&mut self, tree: &DesignTree) {
        self.pending.retain(|(node, _), _| tree.get(*node).is_some());
        self.queued.retain(|(node, ..)| tree.get(*node).is_some());
    }
}
