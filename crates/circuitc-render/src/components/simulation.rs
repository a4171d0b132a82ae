//! `analogsimulation` experiments.
//!
//! During pcb analysis the node writes a `simulation_experiment` and runs
//! every registered [`SimulationEngine`] (or only the one it names) as an
//! async effect on a blocking thread. Engine failures are logged and kept
//! as `simulation_error` records; they never fail the render.

use std::sync::Arc;

use tracing::{info, warn};

use circuitc_core::props::SimulationProps;
use circuitc_core::{NodeId, NodeProps, RenderPhase};
use circuitc_store::record::{SimulationError, SimulationExperiment, SimulationResult};
use circuitc_store::CircuitRecord;

use super::clear_extra;
use crate::context::RenderContext;
use crate::effects::EffectApply;
use crate::error::RenderError;
use crate::registry::NodeBehavior;
use crate::simulation::{SimulationEngine, SimulationRequest};

const SIMULATION_KINDS: &[&str] = &["simulation_experiment", "simulation_result", "simulation_error"];

#[derive(Debug, Clone, Copy, Default)]
pub struct SimulationBehavior;

impl NodeBehavior for SimulationBehavior {
    fn initial(&self, ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
        self.render(ctx, node)
    }

    fn update(&self, ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
        self.render(ctx, node)
    }
}

impl SimulationBehavior {
    fn render(&self, ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
        if ctx.phase != RenderPhase::PcbAnalysis {
            return Ok(());
        }
        let NodeProps::AnalogSimulation(props) = ctx.props(node)? else {
            return Ok(());
        };
        clear_extra(ctx, node, SIMULATION_KINDS)?;

        let name = ctx
            .node(node)?
            .declared
            .get("name")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("experiment_{node}"));
        let experiment_id = ctx.insert(CircuitRecord::SimulationExperiment(SimulationExperiment {
            name,
            duration_ms: props.duration_ms,
            engine: props.engine.clone(),
            ..Default::default()
        }))?;
        ctx.refs_mut(node)?.extra.push(experiment_id.clone());

        let engines = selected_engines(&ctx.services.simulators, &props);
        if engines.is_empty() {
            warn!(node = %node, engine = ?props.engine, "no simulation engine available");
            return Ok(());
        }

        let records = ctx.store.to_array();
        for engine in engines {
            let request = SimulationRequest {
                experiment_id: experiment_id.clone(),
                duration_ms: props.duration_ms,
                records: records.clone(),
            };
            let effect_id = format!("simulate:{}", engine.name());
            info!(node = %node, engine = %engine.name(), "starting simulation");
            let future = run_engine(engine, request, node);
            ctx.queue_effect(node, &effect_id, future);
        }
        Ok(())
    }
}

fn selected_engines(
    available: &[Arc<dyn SimulationEngine>],
    props: &SimulationProps,
) -> Vec<Arc<dyn SimulationEngine>> {
    available
        .iter()
        .filter(|e| props.engine.as_deref().map_or(true, |wanted| e.name() == wanted))
        .cloned()
        .collect()
}

fn run_engine(
    engine: Arc<dyn SimulationEngine>,
    request: SimulationRequest,
    node: NodeId,
) -> crate::effects::EffectFuture {
    Box::pin(async move {
        let name = engine.name().to_string();
        let experiment_id = request.experiment_id.clone();
        let outcome = tokio::task::spawn_blocking(move || engine.simulate(&request)).await?;

        let apply: EffectApply = Box::new(move |ctx: &mut RenderContext<'_>| {
            let record = match outcome {
                Ok(data) => {
                    info!(node = %node, engine = %name, "simulation finished");
                    CircuitRecord::SimulationResult(SimulationResult {
                        simulation_experiment_id: experiment_id,
                        engine: name,
                        data,
                        ..Default::default()
                    })
                }
                Err(message) => {
                    warn!(node = %node, engine = %name, error = %message, "simulation engine failed");
                    CircuitRecord::SimulationError(SimulationError {
                        engine: name,
                        message,
                        simulation_experiment_id: Some(experiment_id),
                        ..Default::default()
                    })
                }
            };
            let id = ctx.insert(record)?;
            if let Ok(refs) = ctx.refs_mut(node) {
                refs.extra.push(id);
            }
            Ok(())
        });
        Ok(apply)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::InventoryEngine;

    struct Named(&'static str);

    impl SimulationEngine for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn simulate(&self, _request: &SimulationRequest) -> Result<serde_json::Value, String> {
            Err("unsupported".to_string())
        }
    }

    #[test]
    fn engine_name_filters_the_registered_engines() {
        let available: Vec<Arc<dyn SimulationEngine>> =
            vec![Arc::new(InventoryEngine), Arc::new(Named("spice"))];
        let all = SimulationProps {
            engine: None,
            duration_ms: 10.0,
        };
        assert_eq!(selected_engines(&available, &all).len(), 2);

        let spice = SimulationProps {
            engine: Some("spice".to_string()),
            duration_ms: 10.0,
        };
        let picked = selected_engines(&available, &spice);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].name(), "spice");
    }
}
