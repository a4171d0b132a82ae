//! Pcb trace routing per subcircuit, including remote autorouting jobs.
//!
//! A subcircuit routes with the built-in direct router unless its
//! `autorouter` property asks for a remote server. Remote routing submits
//! the subcircuit as simple-route JSON, polls the job at a fixed interval,
//! and writes the returned traces when the job finishes. A job failure
//! fails the whole render.
//!
//! Subcircuits route bottom-up: one whose descendant subcircuits still wait
//! on their own remote jobs defers until every one of them has a result.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use circuitc_core::props::AutorouterSetting;
use circuitc_core::{NodeId, RenderPhase};
use circuitc_store::record::{PcbAutoroutingError, PcbTrace, RoutePoint};
use circuitc_store::{hash_value, CircuitRecord, Side};

use crate::config::{AutorouterConfig, RenderConfig};
use crate::connectivity::scope_label;
use crate::context::RenderContext;
use crate::effects::EffectApply;
use crate::error::RenderError;
use crate::isolation;
use crate::routing::{clear_routes, direct_route, pcb_ports_by_source, sorted_points};

/// Effect id of a subcircuit's remote routing job.
pub const AUTOROUTE_EFFECT: &str = "autoroute";

/// Server a setting resolves to. `None` means route directly.
pub fn server_for(setting: &AutorouterSetting, config: &RenderConfig) -> Option<AutorouterConfig> {
    match setting {
        AutorouterSetting::SequentialTrace => None,
        AutorouterSetting::Auto => config.autorouter.clone(),
        AutorouterSetting::Server { url } => Some(match &config.autorouter {
            Some(defaults) => AutorouterConfig {
                server_url: url.clone(),
                ..defaults.clone()
            },
            None => AutorouterConfig::new(url.clone()),
        }),
    }
}

fn setting_of(ctx: &RenderContext<'_>, scope: NodeId) -> AutorouterSetting {
    ctx.tree
        .get(scope)
        .and_then(|n| n.props.as_group())
        .map(|g| g.autorouter.clone())
        .unwrap_or_default()
}

/// Routes the traces of subcircuit `scope`.
pub fn route_scope(ctx: &mut RenderContext<'_>, scope: NodeId) -> Result<(), RenderError> {
    let setting = setting_of(ctx, scope);
    if !setting.is_remote() {
        direct_route(ctx, scope)?;
        return Ok(());
    }

    let Some(server) = server_for(&setting, ctx.config()) else {
        let label = scope_label(ctx, scope);
        warn!(subcircuit = %label, "autorouter=\"auto\" without a configured server, routing directly");
        direct_route(ctx, scope)?;
        let error = PcbAutoroutingError {
            message: format!(
                "{label} requests autorouter=\"auto\" but no autorouter server is configured"
            ),
            subcircuit_id: ctx.subcircuit_id(scope),
            ..Default::default()
        };
        let id = ctx.insert(CircuitRecord::PcbAutoroutingError(error))?;
        ctx.refs_mut(scope)?.extra.push(id.clone());
        ctx.state.routes.entry(scope).or_default().record_ids.push(id);
        return Ok(());
    };

    if !descendants_routed(ctx, scope) {
        debug!(scope = %scope, "deferring autorouting until nested subcircuits are routed");
        return Ok(());
    }
    start_job(ctx, scope, server)
}

/// Whether `scope` routes through a remote job.
pub fn routes_remotely(ctx: &RenderContext<'_>, scope: NodeId) -> bool {
    server_for(&setting_of(ctx, scope), ctx.config()).is_some()
}

/// Whether every nested subcircuit of `scope` that routes remotely already
/// has a result.
pub fn descendants_routed(ctx: &RenderContext<'_>, scope: NodeId) -> bool {
    ctx.tree
        .full_descendants(scope)
        .into_iter()
        .filter(|&d| ctx.tree.get(d).is_some_and(|n| n.caps.subcircuit && !n.pending_removal))
        .filter(|&d| !isolation::inside_isolated(&*ctx.tree, ctx.config(), d))
        .all(|d| {
            if ctx.isolates(d) {
                ctx.state.isolated.get(&d).is_some_and(|s| s.merged)
            } else if routes_remotely(ctx, d) {
                ctx.state
                    .routes
                    .get(&d)
                    .is_some_and(|r| r.finished && !r.pending)
            } else {
                true
            }
        })
}

/// The simple-route JSON a remote autorouter receives for `scope`.
pub fn simple_route_json(ctx: &RenderContext<'_>, scope: NodeId) -> Value {
    let groups = ctx.state.connectivity.get(&scope).cloned().unwrap_or_default();
    let ports = pcb_ports_by_source(ctx);

    let connections: Vec<Value> = groups
        .iter()
        .filter_map(|group| {
            let points = sorted_points(&ports, &group.source_port_ids);
            (points.len() >= 2).then(|| {
                json!({
                    "name": group.key,
                    "pointsToConnect": points
                        .iter()
                        .map(|p| json!({
                            "x": p.at.x,
                            "y": p.at.y,
                            "layer": p.layer,
                            "pcb_port_id": p.pcb_port_id,
                        }))
                        .collect::<Vec<_>>(),
                })
            })
        })
        .collect();

    let obstacles: Vec<Value> = ctx
        .subtree_record_ids(scope)
        .iter()
        .filter_map(|id| match ctx.store.get(id) {
            Some(CircuitRecord::PcbSmtpad(pad)) => Some(json!({
                "type": "rect",
                "layers": [pad.layer],
                "center": { "x": pad.x, "y": pad.y },
                "width": pad.width,
                "height": pad.height,
                "connectedTo": pad.pcb_port_id.iter().collect::<Vec<_>>(),
            })),
            _ => None,
        })
        .collect();

    let bounds = ctx
        .side_bounds(scope, Side::Pcb)
        .map(|b| b.expand(2.0))
        .map(|b| json!({ "minX": b.min_x, "maxX": b.max_x, "minY": b.min_y, "maxY": b.max_y }))
        .unwrap_or_else(|| json!({ "minX": 0.0, "maxX": 0.0, "minY": 0.0, "maxY": 0.0 }));

    json!({
        "layerCount": 2,
        "minTraceWidth": ctx.config().trace_width,
        "obstacles": obstacles,
        "connections": connections,
        "bounds": bounds,
    })
}

fn start_job(ctx: &mut RenderContext<'_>, scope: NodeId, server: AutorouterConfig) -> Result<(), RenderError> {
    let input = simple_route_json(ctx, scope);
    let hash = hash_value(&input)?.to_hex().to_string();
    let label = scope_label(ctx, scope);

    let state = ctx.state.routes.entry(scope).or_default();
    if state.input_hash.as_deref() == Some(hash.as_str()) && (state.pending || state.finished) {
        debug!(subcircuit = %label, "autorouter input unchanged");
        return Ok(());
    }

    let has_connections = input["connections"].as_array().is_some_and(|c| !c.is_empty());
    if !has_connections {
        clear_routes(ctx, scope)?;
        let state = ctx.state.routes.entry(scope).or_default();
        state.input_hash = Some(hash);
        state.pending = false;
        state.finished = true;
        return Ok(());
    }

    let state = ctx.state.routes.entry(scope).or_default();
    state.input_hash = Some(hash.clone());
    state.pending = true;
    state.finished = false;

    info!(subcircuit = %label, server = %server.server_url, "submitting autorouting job");
    let client = ctx.services.http.clone();
    let future = async move {
        let traces = run_job(&client, &server, &label, &input).await?;
        let apply: EffectApply =
            Box::new(move |ctx: &mut RenderContext<'_>| apply_routes(ctx, scope, &hash, traces));
        Ok(apply)
    };
    ctx.queue_effect(scope, AUTOROUTE_EFFECT, Box::pin(future));
    Ok(())
}

fn apply_routes(
    ctx: &mut RenderContext<'_>,
    scope: NodeId,
    hash: &str,
    traces: Vec<OutputTrace>,
) -> Result<(), RenderError> {
    if ctx.tree.get(scope).is_none() {
        return Ok(());
    }
    clear_routes(ctx, scope)?;
    let subcircuit_id = ctx.subcircuit_id(scope);
    let width = ctx.config().trace_width;

    let mut written = Vec::with_capacity(traces.len());
    for trace in traces {
        let record = PcbTrace {
            route: trace
                .route
                .into_iter()
                .map(|p| p.into_route_point(width))
                .collect(),
            subcircuit_id: subcircuit_id.clone(),
            subcircuit_connectivity_map_key: trace.connection_name,
            ..Default::default()
        };
        written.push(ctx.insert(CircuitRecord::PcbTrace(record))?);
    }

    info!(scope = %scope, traces = written.len(), "autorouting job finished");
    ctx.refs_mut(scope)?.extra.extend(written.iter().cloned());
    let state = ctx.state.routes.entry(scope).or_default();
    state.record_ids = written;
    state.input_hash = Some(hash.to_string());
    state.pending = false;
    state.finished = true;

    ctx.mark_ancestors_dirty(scope, &[RenderPhase::PcbTraceRender]);
    let root = ctx.tree.root_id();
    ctx.tree.mark_dirty(root, RenderPhase::PcbAnalysis);
    Ok(())
}

// ---------------------------------------------------------------------------
// HTTP protocol
// ---------------------------------------------------------------------------

async fn run_job(
    client: &reqwest::Client,
    server: &AutorouterConfig,
    subcircuit: &str,
    input: &Value,
) -> Result<Vec<OutputTrace>, RenderError> {
    let base = server.server_url.trim_end_matches('/');

    let created: CreateJobResponse = post_json(
        client,
        &format!("{base}/autorouting/jobs/create"),
        &json!({ "input_simple_route_json": input }),
        subcircuit,
    )
    .await?;
    let job_id = created.autorouting_job.autorouting_job_id;
    info!(subcircuit, job = %job_id, "autorouting job created");

    let mut polls: u32 = 0;
    loop {
        let status: GetJobResponse = post_json(
            client,
            &format!("{base}/autorouting/jobs/get"),
            &json!({ "autorouting_job_id": job_id }),
            subcircuit,
        )
        .await?;
        let job = status.autorouting_job;
        if job.has_error {
            let message = match job.error {
                Some(Value::String(s)) => s,
                Some(Value::Object(o)) => o
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| Value::Object(o).to_string()),
                Some(other) => other.to_string(),
                None => "job reported an error".to_string(),
            };
            return Err(RenderError::Autorouting {
                subcircuit: subcircuit.to_string(),
                message,
            });
        }
        if job.is_finished {
            break;
        }
        polls += 1;
        if polls >= server.max_polls {
            return Err(RenderError::Autorouting {
                subcircuit: subcircuit.to_string(),
                message: format!("job {job_id} did not finish after {polls} polls"),
            });
        }
        tokio::time::sleep(Duration::from_millis(server.poll_interval_ms)).await;
    }

    let output: GetOutputResponse = post_json(
        client,
        &format!("{base}/autorouting/jobs/get_output"),
        &json!({ "autorouting_job_id": job_id }),
        subcircuit,
    )
    .await?;
    Ok(output.autorouting_job_output.output_pcb_traces)
}

async fn post_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    endpoint: &str,
    body: &Value,
    subcircuit: &str,
) -> Result<T, RenderError> {
    let response = client.post(endpoint).json(body).send().await?;

    let status = response.status();
    let body_text = response.text().await?;

    if !status.is_success() {
        return Err(RenderError::Autorouting {
            subcircuit: subcircuit.to_string(),
            message: format!("{endpoint} failed ({status}): {body_text}"),
        });
    }

    serde_json::from_str(&body_text).map_err(|err| RenderError::Autorouting {
        subcircuit: subcircuit.to_string(),
        message: format!("unreadable response from {endpoint}: {err}"),
    })
}

#[derive(Debug, Deserialize)]
struct CreateJobResponse {
    autorouting_job: JobRef,
}

#[derive(Debug, Deserialize)]
struct JobRef {
    autorouting_job_id: String,
}

#[derive(Debug, Deserialize)]
struct GetJobResponse {
    autorouting_job: JobStatus,
}

#[derive(Debug, Deserialize)]
struct JobStatus {
    #[serde(default)]
    is_finished: bool,
    #[serde(default)]
    has_error: bool,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GetOutputResponse {
    autorouting_job_output: JobOutput,
}

#[derive(Debug, Deserialize)]
struct JobOutput {
    #[serde(default)]
    output_pcb_traces: Vec<OutputTrace>,
}

#[derive(Debug, Deserialize)]
struct OutputTrace {
    #[serde(default)]
    connection_name: Option<String>,
    #[serde(default)]
    route: Vec<OutputPoint>,
}

#[derive(Debug, Deserialize)]
struct OutputPoint {
    #[serde(default)]
    route_type: Option<String>,
    x: f64,
    y: f64,
    #[serde(default)]
    width: Option<f64>,
    #[serde(default)]
    layer: Option<String>,
}

impl OutputPoint {
    fn into_route_point(self, default_width: f64) -> RoutePoint {
        RoutePoint {
            route_type: self.route_type.unwrap_or_else(|| "wire".to_string()),
            x: self.x,
            y: self.y,
            width: self.width.unwrap_or(default_width),
            layer: self.layer.unwrap_or_else(|| "top".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_server_inherits_poll_settings() {
        let config = RenderConfig {
            autorouter: Some(AutorouterConfig {
                server_url: "http://default".to_string(),
                poll_interval_ms: 5,
                max_polls: 3,
            }),
            ..Default::default()
        };
        let server = server_for(
            &AutorouterSetting::Server {
                url: "http://other".to_string(),
            },
            &config,
        )
        .unwrap();
        assert_eq!(server.server_url, "http://other");
        assert_eq!(server.poll_interval_ms, 5);
        assert_eq!(server.max_polls, 3);
    }

    #[test]
    fn auto_without_server_routes_directly() {
        let config = RenderConfig::default();
        assert!(server_for(&AutorouterSetting::Auto, &config).is_none());
        assert!(server_for(&AutorouterSetting::SequentialTrace, &config).is_none());
    }

    #[test]
    fn output_points_fill_defaults() {
        let trace: OutputTrace = serde_json::from_value(json!({
            "connection_name": "net0",
            "route": [{ "x": 1.0, "y": 2.0 }]
        }))
        .unwrap();
        let point = trace.route.into_iter().next().unwrap().into_route_point(0.2);
        assert_eq!(point.route_type, "wire");
        assert_eq!(point.width, 0.2);
        assert_eq!(point.layer, "top");
    }
}
