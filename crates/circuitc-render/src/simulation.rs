//! Pluggable simulation engines.
//!
//! Engines are registered on [`EngineServices`](crate::engine::EngineServices)
//! and run off the render thread. A failing engine never fails the render:
//! the failure becomes a `simulation_error` record.

use serde::Serialize;
use serde_json::Value;

use circuitc_store::CircuitRecord;

/// What an engine gets to simulate: the experiment and a snapshot of the
/// circuit at the time the experiment was created.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationRequest {
    pub experiment_id: String,
    pub duration_ms: f64,
    pub records: Vec<CircuitRecord>,
}

pub trait SimulationEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Runs the experiment. Blocking work is fine; it runs on a blocking
    /// thread. The error string is recorded verbatim.
    fn simulate(&self, request: &SimulationRequest) -> Result<Value, String>;
}

/// Counts the source components in the circuit. Useful as a smoke test
/// engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct InventoryEngine;

impl SimulationEngine for InventoryEngine {
    fn name(&self) -> &str {
        "inventory"
    }

    fn simulate(&self, request: &SimulationRequest) -> Result<Value, String> {
        let components = request
            .records
            .iter()
            .filter(|r| matches!(r, CircuitRecord::SourceComponent(_)))
            .count();
        Ok(serde_json::json!({
            "duration_ms": request.duration_ms,
            "source_components": components,
        }))
    }
}
