//! Remote autorouting against a mock HTTP autorouter.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use circuitc_render::{ComponentRegistry, Element, RenderConfig, RenderEngine, RenderError};
use circuitc_store::CircuitRecord;

/// What the mock server saw and how it should answer.
#[derive(Clone, Default)]
struct Mock {
    inputs: Arc<Mutex<Vec<Value>>>,
    polls: Arc<Mutex<u32>>,
    /// Polls answered with `is_finished: false` before finishing.
    busy_polls: u32,
    fail: bool,
}

async fn create(State(mock): State<Mock>, Json(body): Json<Value>) -> Json<Value> {
    mock.inputs
        .lock()
        .unwrap()
        .push(body["input_simple_route_json"].clone());
    Json(json!({ "autorouting_job": { "autorouting_job_id": "job_1" } }))
}

async fn get(State(mock): State<Mock>, Json(body): Json<Value>) -> Json<Value> {
    assert_eq!(body["autorouting_job_id"], "job_1");
    let mut polls = mock.polls.lock().unwrap();
    *polls += 1;
    if mock.fail {
        return Json(json!({
            "autorouting_job": { "is_finished": false, "has_error": true, "error": { "message": "no route found" } }
        }));
    }
    let finished = *polls > mock.busy_polls;
    Json(json!({ "autorouting_job": { "is_finished": finished, "has_error": false } }))
}

/// Routes every requested connection as a straight wire.
async fn get_output(State(mock): State<Mock>, Json(_body): Json<Value>) -> Json<Value> {
    let input = mock.inputs.lock().unwrap().last().cloned().unwrap_or(Value::Null);
    let traces: Vec<Value> = input["connections"]
        .as_array()
        .into_iter()
        .flatten()
        .map(|connection| {
            let route: Vec<Value> = connection["pointsToConnect"]
                .as_array()
                .into_iter()
                .flatten()
                .map(|p| json!({ "route_type": "wire", "x": p["x"], "y": p["y"], "width": 0.2, "layer": "top" }))
                .collect();
            json!({ "connection_name": connection["name"], "route": route })
        })
        .collect();
    Json(json!({ "autorouting_job_output": { "output_pcb_traces": traces } }))
}

async fn serve(mock: Mock) -> String {
    let app = Router::new()
        .route("/autorouting/jobs/create", post(create))
        .route("/autorouting/jobs/get", post(get))
        .route("/autorouting/jobs/get_output", post(get_output))
        .with_state(mock);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn routed_board(url: &str) -> Element {
    Element::new("board", json!({ "autorouter": { "serverUrl": url } })).with_children([
        Element::new("resistor", json!({ "name": "R1", "resistance": "1k" })),
        Element::new("resistor", json!({ "name": "R2", "resistance": "1k" })),
        Element::new("trace", json!({ "from": ".R1 > .pin2", "to": ".R2 > .pin1" })),
    ])
}

fn engine_for(design: Element) -> RenderEngine {
    let registry = ComponentRegistry::builtin();
    let tree = registry.build_tree(&[design]).unwrap();
    let mut config = RenderConfig::default();
    config.settle_poll_interval_ms = 5;
    RenderEngine::new(tree, registry, config)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn job_output_becomes_pcb_traces() {
    let mock = Mock {
        busy_polls: 2,
        ..Mock::default()
    };
    let url = serve(mock.clone()).await;
    let mut engine = engine_for(routed_board(&url));
    engine.settle().await.unwrap();

    let inputs = mock.inputs.lock().unwrap().clone();
    assert_eq!(inputs.len(), 1, "one job per unchanged input");
    let connections = inputs[0]["connections"].as_array().unwrap();
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0]["pointsToConnect"].as_array().unwrap().len(), 2);
    assert_eq!(inputs[0]["obstacles"].as_array().unwrap().len(), 4);
    assert_eq!(*mock.polls.lock().unwrap(), 3);

    let store = engine.store();
    let traces: Vec<_> = store
        .list("pcb_trace")
        .into_iter()
        .filter_map(|r| match r {
            CircuitRecord::PcbTrace(t) => Some(t.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(traces.len(), 1);
    assert_eq!(
        traces[0].subcircuit_connectivity_map_key.as_ref(),
        connections[0]["name"].as_str().map(str::to_string).as_ref()
    );
    assert_eq!(traces[0].route.len(), 2);
    assert!(store.list("pcb_trace_error").is_empty());
    assert_eq!(engine.pending_effects(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn job_errors_propagate_out_of_settle() {
    let mock = Mock {
        fail: true,
        ..Mock::default()
    };
    let url = serve(mock).await;
    let mut engine = engine_for(routed_board(&url));
    let err = engine.settle().await.unwrap_err();
    match err {
        RenderError::Autorouting { message, .. } => assert_eq!(message, "no route found"),
        other => panic!("expected an autorouting error, got {other}"),
    }
}

#[tokio::test]
async fn auto_without_a_server_routes_directly_and_reports() {
    let design = Element::new("board", json!({ "autorouter": "auto" })).with_children([
        Element::new("resistor", json!({ "name": "R1" })),
        Element::new("resistor", json!({ "name": "R2" })),
        Element::new("trace", json!({ "from": ".R1 > .pin2", "to": ".R2 > .pin1" })),
    ]);
    let mut engine = engine_for(design);
    engine.settle().await.unwrap();

    let store = engine.store();
    assert_eq!(store.list("pcb_trace").len(), 1);
    assert_eq!(store.list("pcb_autorouting_error").len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn nested_subcircuits_route_before_their_parent() {
    let mock = Mock::default();
    let url = serve(mock.clone()).await;
    let inner = Element::new(
        "group",
        json!({ "name": "A", "subcircuit": true, "autorouter": { "serverUrl": url } }),
    )
    .with_children([
        Element::new("resistor", json!({ "name": "R1", "resistance": "1k" })),
        Element::new("resistor", json!({ "name": "R2", "resistance": "1k" })),
        Element::new("trace", json!({ "from": ".R1 > .pin2", "to": ".R2 > .pin1" })),
    ]);
    let board = Element::new("board", json!({ "autorouter": { "serverUrl": url } })).with_children([
        inner,
        Element::new("resistor", json!({ "name": "R3", "resistance": "1k" })),
        Element::new("resistor", json!({ "name": "R4", "resistance": "1k" })),
        Element::new("trace", json!({ "from": ".R3 > .pin2", "to": ".R4 > .pin1" })),
    ]);
    let mut engine = engine_for(board);
    engine.settle().await.unwrap();

    let inputs = mock.inputs.lock().unwrap().clone();
    assert_eq!(inputs.len(), 2, "one job per subcircuit");
    let names = |input: &Value| -> Vec<String> {
        input["connections"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|c| c["name"].as_str().map(str::to_string))
            .collect()
    };
    let (first, second) = (names(&inputs[0]), names(&inputs[1]));
    assert_eq!(first, vec!["A_connectivity_net0".to_string()]);
    assert_eq!(second.len(), 1);
    assert!(second[0].starts_with("subcircuit_"), "{second:?}");

    assert_eq!(engine.store().list("pcb_trace").len(), 2);
    assert!(engine.store().list("pcb_trace_error").is_empty());
}
