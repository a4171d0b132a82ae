//! The fixed, ordered list of render phases and per-node phase state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One named pass of the render pipeline.
///
/// The declaration order is the execution order and must never change:
/// later phases read what earlier phases wrote to the fact store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderPhase {
    SubtreeExpansion,
    SourceBinding,
    PortDiscovery,
    PortMatching,
    SchematicComponentRender,
    SchematicLayout,
    SchematicTraceRender,
    PcbComponentRender,
    PcbTraceRender,
    CadModelRender,
    PcbAnalysis,
}

impl RenderPhase {
    pub const COUNT: usize = 11;

    pub const ALL: [RenderPhase; RenderPhase::COUNT] = [
        RenderPhase::SubtreeExpansion,
        RenderPhase::SourceBinding,
        RenderPhase::PortDiscovery,
        RenderPhase::PortMatching,
        RenderPhase::SchematicComponentRender,
        RenderPhase::SchematicLayout,
        RenderPhase::SchematicTraceRender,
        RenderPhase::PcbComponentRender,
        RenderPhase::PcbTraceRender,
        RenderPhase::CadModelRender,
        RenderPhase::PcbAnalysis,
    ];

    /// Position of this phase in the global order.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RenderPhase::SubtreeExpansion => "subtree-expansion",
            RenderPhase::SourceBinding => "source-binding",
            RenderPhase::PortDiscovery => "port-discovery",
            RenderPhase::PortMatching => "port-matching",
            RenderPhase::SchematicComponentRender => "schematic-component-render",
            RenderPhase::SchematicLayout => "schematic-layout",
            RenderPhase::SchematicTraceRender => "schematic-trace-render",
            RenderPhase::PcbComponentRender => "pcb-component-render",
            RenderPhase::PcbTraceRender => "pcb-trace-render",
            RenderPhase::CadModelRender => "cad-model-render",
            RenderPhase::PcbAnalysis => "pcb-analysis",
        }
    }

    /// Phases strictly before this one.
    pub fn predecessors(self) -> &'static [RenderPhase] {
        &RenderPhase::ALL[..self.index()]
    }

    /// Phases that must re-run on ancestors when a descendant changes.
    pub fn ancestor_notification_phases() -> &'static [RenderPhase] {
        &[
            RenderPhase::PortMatching,
            RenderPhase::SchematicLayout,
            RenderPhase::SchematicTraceRender,
            RenderPhase::PcbComponentRender,
            RenderPhase::PcbTraceRender,
        ]
    }
}

impl fmt::Display for RenderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of one node for one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PhaseState {
    /// Whether the initial handler has run (and no remove since).
    pub initialized: bool,
    /// Whether the update handler must run on the next visit.
    pub dirty: bool,
}

/// Phase states for every phase, indexed by [`RenderPhase::index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PhaseStates([PhaseState; RenderPhase::COUNT]);

impl PhaseStates {
    pub fn get(&self, phase: RenderPhase) -> PhaseState {
        self.0[phase.index()]
    }

    pub fn get_mut(&mut self, phase: RenderPhase) -> &mut PhaseState {
        &mut self.0[phase.index()]
    }

    pub fn is_initialized(&self, phase: RenderPhase) -> bool {
        self.get(phase).initialized
    }

    pub fn is_dirty(&self, phase: RenderPhase) -> bool {
        self.get(phase).dirty
    }

    /// True once every phase has run its initial handler.
    pub fn fully_initialized(&self) -> bool {
        self.0.iter().all(|s| s.initialized)
    }

    /// True once no phase remains initialized (after removal).
    pub fn fully_uninitialized(&self) -> bool {
        self.0.iter().all(|s| !s.initialized)
    }

    pub fn any_dirty(&self) -> bool {
        self.0.iter().any(|s| s.initialized && s.dirty)
    }

    pub fn mark_all_dirty(&mut self) {
        for s in &mut self.0 {
            s.dirty = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_order_is_fixed() {
        let names: Vec<&str> = RenderPhase::ALL.iter().map(|p| p.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "subtree-expansion",
                "source-binding",
                "port-discovery",
                "port-matching",
                "schematic-component-render",
                "schematic-layout",
                "schematic-trace-render",
                "pcb-component-render",
                "pcb-trace-render",
                "cad-model-render",
                "pcb-analysis",
            ]
        );
        for (i, phase) in RenderPhase::ALL.iter().enumerate() {
            assert_eq!(phase.index(), i);
        }
    }

    #[test]
    fn predecessors_are_a_prefix() {
        assert!(RenderPhase::SubtreeExpansion.predecessors().is_empty());
        assert_eq!(
            RenderPhase::PortDiscovery.predecessors(),
            &[RenderPhase::SubtreeExpansion, RenderPhase::SourceBinding]
        );
    }

    #[test]
    fn serde_uses_kebab_case_names() {
        let json = serde_json::to_string(&RenderPhase::PcbTraceRender).unwrap();
        assert_eq!(json, "\"pcb-trace-render\"");
    }

    #[test]
    fn dirty_only_counts_for_initialized_phases() {
        let mut states = PhaseStates::default();
        states.mark_all_dirty();
        assert!(!states.any_dirty());
        states.get_mut(RenderPhase::SourceBinding).initialized = true;
        assert!(states.any_dirty());
    }
}
