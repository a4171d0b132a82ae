//! Simulation engines run as effects and never fail the render.

use std::sync::Arc;

use serde_json::{json, Value};

use circuitc_render::{
    ComponentRegistry, Element, EngineServices, InventoryEngine, RenderConfig, RenderEngine,
    SimulationEngine, SimulationRequest,
};
use circuitc_store::CircuitRecord;

struct Broken;

impl SimulationEngine for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn simulate(&self, _request: &SimulationRequest) -> Result<Value, String> {
        Err("matrix is singular".to_string())
    }
}

fn design(engine: Option<&str>) -> Element {
    let mut simulation = json!({ "name": "transient", "duration": 5 });
    if let Some(engine) = engine {
        simulation["engine"] = json!(engine);
    }
    Element::new("board", json!({})).with_children([
        Element::new("resistor", json!({ "name": "R1", "resistance": "1k" })),
        Element::new("capacitor", json!({ "name": "C1", "capacitance": "1uF" })),
        Element::new("analogsimulation", simulation),
    ])
}

fn engine_with(design: Element, engines: Vec<Arc<dyn SimulationEngine>>) -> RenderEngine {
    let registry = ComponentRegistry::builtin();
    let tree = registry.build_tree(&[design]).unwrap();
    let services = engines.into_iter().fold(
        EngineServices::new(RenderConfig::default(), Arc::new(registry)),
        EngineServices::with_simulation_engine,
    );
    RenderEngine::with_services(tree, Arc::new(services))
}

#[tokio::test]
async fn failing_engine_is_recorded_and_others_still_run() {
    let mut engine = engine_with(design(None), vec![Arc::new(Broken), Arc::new(InventoryEngine)]);
    engine.settle().await.unwrap();

    let store = engine.store();
    let experiment_id = match store.list("simulation_experiment").as_slice() {
        [CircuitRecord::SimulationExperiment(e)] => {
            assert_eq!(e.name, "transient");
            assert_eq!(e.duration_ms, 5.0);
            e.simulation_experiment_id.clone()
        }
        other => panic!("expected one experiment, got {other:?}"),
    };

    match store.list("simulation_error").as_slice() {
        [CircuitRecord::SimulationError(e)] => {
            assert_eq!(e.engine, "broken");
            assert_eq!(e.message, "matrix is singular");
            assert_eq!(e.simulation_experiment_id.as_deref(), Some(experiment_id.as_str()));
        }
        other => panic!("expected one simulation error, got {other:?}"),
    }

    match store.list("simulation_result").as_slice() {
        [CircuitRecord::SimulationResult(r)] => {
            assert_eq!(r.engine, "inventory");
            assert_eq!(r.simulation_experiment_id, experiment_id);
            assert_eq!(r.data["source_components"], 2);
        }
        other => panic!("expected one simulation result, got {other:?}"),
    }
}

#[tokio::test]
async fn named_engine_runs_alone() {
    let mut engine = engine_with(
        design(Some("inventory")),
        vec![Arc::new(Broken), Arc::new(InventoryEngine)],
    );
    engine.settle().await.unwrap();

    let store = engine.store();
    assert!(store.list("simulation_error").is_empty());
    assert_eq!(store.list("simulation_result").len(), 1);
}

#[tokio::test]
async fn simulations_do_not_rerun_on_a_settled_design() {
    let mut engine = engine_with(design(None), vec![Arc::new(InventoryEngine)]);
    engine.settle().await.unwrap();
    let before = engine.circuit_json();

    engine.settle().await.unwrap();
    assert_eq!(engine.circuit_json(), before);
    assert_eq!(engine.store().list("simulation_result").len(), 1);
}
