//! Generic pin components: `resistor`, `capacitor`, `chip`.
//!
//! A component expands into one port per pin and one trace per entry of
//! `connections`, then renders a box symbol on the schematic, a row (or
//! dual row) of rectangular pads on the pcb and a cad model.

use std::collections::HashSet;

use serde_json::json;
use tracing::debug;

use circuitc_core::geometry::{Bounds, Point, Size};
use circuitc_core::props::{ComponentProps, Layer};
use circuitc_core::{NodeId, NodeProps, RenderPhase};
use circuitc_store::record::{
    CadComponent, PcbComponent, PcbPort, PcbSmtpad, Point3, SchematicComponent, SchematicPort,
    SourceComponent,
};
use circuitc_store::{CircuitRecord, Side};

use super::{clear_ref, is_generated, placement, upsert};
use crate::context::RenderContext;
use crate::error::RenderError;
use crate::isolation::GENERATED_FLAG;
use crate::registry::NodeBehavior;

/// Height of a cad model above (or below) the board.
const CAD_Z: f64 = 0.7;

#[derive(Debug, Clone, Copy, Default)]
pub struct ComponentBehavior;

impl NodeBehavior for ComponentBehavior {
    fn initial(&self, ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
        self.render(ctx, node)
    }

    fn update(&self, ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
        self.render(ctx, node)
    }
}

impl ComponentBehavior {
    fn render(&self, ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
        let Some(props) = ctx.node(node)?.props.as_component().cloned() else {
            return Ok(());
        };
        match ctx.phase {
            RenderPhase::SubtreeExpansion => {
                expand_ports(ctx, node, &props)?;
                expand_connections(ctx, node, &props)
            }
            RenderPhase::SourceBinding => bind_source(ctx, node, &props),
            RenderPhase::PortDiscovery => check_duplicate_ports(ctx, node),
            RenderPhase::SchematicComponentRender => render_schematic(ctx, node, &props),
            RenderPhase::PcbComponentRender => render_pcb(ctx, node, &props),
            RenderPhase::CadModelRender => render_cad(ctx, node, &props),
            _ => Ok(()),
        }
    }
}

/// Port children with their parsed properties.
fn ports(ctx: &RenderContext<'_>, node: NodeId) -> Vec<(NodeId, circuitc_core::props::PortProps)> {
    ctx.tree
        .children(node)
        .iter()
        .filter_map(|&c| {
            let child = ctx.tree.get(c)?;
            if child.pending_removal {
                return None;
            }
            child.props.as_port().map(|p| (c, p.clone()))
        })
        .collect()
}

fn port_for_pin(ports: &[(NodeId, circuitc_core::props::PortProps)], pin: u32) -> Option<NodeId> {
    ports
        .iter()
        .find(|(_, p)| p.pin_number == Some(pin))
        .map(|(id, _)| *id)
}

// ---------------------------------------------------------------------------
// Subtree expansion
// ---------------------------------------------------------------------------

fn expand_ports(ctx: &mut RenderContext<'_>, node: NodeId, props: &ComponentProps) -> Result<(), RenderError> {
    let mut wanted = HashSet::new();
    for pin in 1..=props.pin_count {
        wanted.insert(pin);
        let declared = json!({
            "name": format!("pin{pin}"),
            "aliases": props.pin_aliases(pin),
            "pinNumber": pin,
            GENERATED_FLAG: true,
        });
        match port_for_pin(&ports(ctx, node), pin) {
            None => {
                ctx.add_child(node, "port", declared)?;
            }
            Some(existing) => {
                let current = &ctx.node(existing)?.declared;
                if is_generated(current) && *current != declared {
                    ctx.tree.update_props(existing, &declared)?;
                }
            }
        }
    }

    let stale: Vec<NodeId> = ctx
        .tree
        .children(node)
        .iter()
        .copied()
        .filter(|&c| {
            ctx.tree.get(c).is_some_and(|n| {
                !n.pending_removal
                    && is_generated(&n.declared)
                    && n.props
                        .as_port()
                        .is_some_and(|p| p.pin_number.map_or(true, |pin| !wanted.contains(&pin)))
            })
        })
        .collect();
    for id in stale {
        debug!(component = %node, port = %id, "removing port of dropped pin");
        ctx.tree.remove(id)?;
    }
    Ok(())
}

fn expand_connections(
    ctx: &mut RenderContext<'_>,
    node: NodeId,
    props: &ComponentProps,
) -> Result<(), RenderError> {
    let wanted: Vec<serde_json::Value> = props
        .connections
        .iter()
        .map(|(pin, target)| {
            json!({
                "from": format!(".{} > .{}", props.name, pin),
                "to": target,
                GENERATED_FLAG: true,
            })
        })
        .collect();

    let existing: Vec<(NodeId, serde_json::Value)> = ctx
        .tree
        .children(node)
        .iter()
        .filter_map(|&c| {
            let child = ctx.tree.get(c)?;
            (matches!(child.props, NodeProps::Trace(_))
                && !child.pending_removal
                && is_generated(&child.declared))
            .then(|| (c, child.declared.clone()))
        })
        .collect();

    for (id, declared) in &existing {
        if !wanted.contains(declared) {
            ctx.tree.remove(*id)?;
        }
    }
    for declared in wanted {
        if !existing.iter().any(|(_, d)| *d == declared) {
            ctx.add_child(node, "trace", declared)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

fn bind_source(ctx: &mut RenderContext<'_>, node: NodeId, props: &ComponentProps) -> Result<(), RenderError> {
    let kind = ctx.node(node)?.kind.clone();
    let record = CircuitRecord::SourceComponent(SourceComponent {
        name: props.name.clone(),
        ftype: format!("simple_{kind}"),
        display_value: props.value.clone(),
        subcircuit_id: ctx.subcircuit_id(node),
        ..Default::default()
    });
    let existing = ctx.refs(node)?.source_component_id.clone();
    let id = upsert(ctx, existing.as_deref(), record)?;
    ctx.refs_mut(node)?.source_component_id = Some(id.clone());

    let patch = json!({ "source_component_id": id });
    for (port, _) in ports(ctx, node) {
        if let Some(source_port) = ctx.refs(port)?.source_port_id.clone() {
            ctx.update(&source_port, patch.clone())?;
        }
    }
    Ok(())
}

fn check_duplicate_ports(ctx: &mut RenderContext<'_>, node: NodeId) -> Result<(), RenderError> {
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for (_, port) in ports(ctx, node) {
        if !seen.insert(port.name.clone()) {
            duplicates.push(port.name);
        }
    }
    if duplicates.is_empty() {
        return Ok(());
    }
    Err(RenderError::Structural {
        reason: format!("{} declares conflicting ports", ctx.node(node)?.describe()),
        names: duplicates,
    })
}

// ---------------------------------------------------------------------------
// Schematic
// ---------------------------------------------------------------------------

/// Symbol size and local port positions by pin number.
fn symbol(pin_count: u32) -> (Size, Vec<(u32, Point)>) {
    if pin_count <= 2 {
        let pins = (1..=pin_count)
            .map(|pin| (pin, Point::new(if pin == 1 { -0.5 } else { 0.5 }, 0.0)))
            .collect();
        return (Size::new(1.0, 0.4), pins);
    }
    let left = pin_count.div_ceil(2);
    let height = left as f64 * 0.2 + 0.2;
    let row_y = |row: u32| height / 2.0 - 0.2 - row as f64 * 0.2;
    let pins = (1..=pin_count)
        .map(|pin| {
            if pin <= left {
                (pin, Point::new(-1.0, row_y(pin - 1)))
            } else {
                (pin, Point::new(1.0, row_y(pin_count - pin)))
            }
        })
        .collect();
    (Size::new(2.0, height), pins)
}

fn render_schematic(
    ctx: &mut RenderContext<'_>,
    node: NodeId,
    props: &ComponentProps,
) -> Result<(), RenderError> {
    let ports = ports(ctx, node);
    let old = ctx.refs_mut(node)?.schematic_component_id.take();
    clear_ref(ctx, old)?;
    for (port, _) in &ports {
        let old = ctx.refs_mut(*port)?.schematic_port_id.take();
        clear_ref(ctx, old)?;
    }

    let Some(source_component_id) = ctx.refs(node)?.source_component_id.clone() else {
        return Ok(());
    };
    let subcircuit_id = ctx.subcircuit_id(node);
    let t = placement(&props.position, Side::Schematic);
    let (size, pins) = symbol(props.pin_count);

    let mut component = CircuitRecord::SchematicComponent(SchematicComponent {
        source_component_id,
        center: Point::ORIGIN,
        size,
        subcircuit_id: subcircuit_id.clone(),
        ..Default::default()
    });
    component.transform(&t);
    let component_id = ctx.insert(component)?;
    ctx.refs_mut(node)?.schematic_component_id = Some(component_id.clone());

    for (pin, at) in pins {
        let Some(port) = port_for_pin(&ports, pin) else {
            continue;
        };
        let Some(source_port_id) = ctx.refs(port)?.source_port_id.clone() else {
            continue;
        };
        let mut record = CircuitRecord::SchematicPort(SchematicPort {
            source_port_id,
            schematic_component_id: Some(component_id.clone()),
            center: at,
            subcircuit_id: subcircuit_id.clone(),
            ..Default::default()
        });
        record.transform(&t);
        let id = ctx.insert(record)?;
        ctx.refs_mut(port)?.schematic_port_id = Some(id);
    }

    ctx.clear_frame(node, Side::Schematic);
    Ok(())
}

// ---------------------------------------------------------------------------
// Pcb
// ---------------------------------------------------------------------------

/// Local pad centers by pin number: one pad at the origin, two pads
/// `pitch` apart, or a dual row for more pins.
fn pad_layout(pin_count: u32, pitch: f64, pad: Size) -> Vec<(u32, Point)> {
    match pin_count {
        1 => vec![(1, Point::ORIGIN)],
        2 => vec![
            (1, Point::new(-pitch / 2.0, 0.0)),
            (2, Point::new(pitch / 2.0, 0.0)),
        ],
        n => {
            let rows = n.div_ceil(2);
            let half_span = pitch + pad.width / 2.0;
            let row_y = |row: u32| (rows as f64 - 1.0) / 2.0 * pitch - row as f64 * pitch;
            (1..=n)
                .map(|pin| {
                    if pin <= rows {
                        (pin, Point::new(-half_span, row_y(pin - 1)))
                    } else {
                        (pin, Point::new(half_span, row_y(n - pin)))
                    }
                })
                .collect()
        }
    }
}

fn layer_name(layer: Layer) -> &'static str {
    match layer {
        Layer::Top => "top",
        Layer::Bottom => "bottom",
    }
}

fn render_pcb(ctx: &mut RenderContext<'_>, node: NodeId, props: &ComponentProps) -> Result<(), RenderError> {
    let ports = ports(ctx, node);
    let old = ctx.refs_mut(node)?.pcb_component_id.take();
    clear_ref(ctx, old)?;
    super::clear_extra(ctx, node, &["pcb_smtpad"])?;
    for (port, _) in &ports {
        let old = ctx.refs_mut(*port)?.pcb_port_id.take();
        clear_ref(ctx, old)?;
    }

    let Some(source_component_id) = ctx.refs(node)?.source_component_id.clone() else {
        return Ok(());
    };
    let subcircuit_id = ctx.subcircuit_id(node);
    let layer = layer_name(props.position.layer).to_string();
    let t = placement(&props.position, Side::Pcb);
    let pads = pad_layout(props.pin_count, props.pitch, props.pad_size);
    let extent = Bounds::union_all(
        pads.iter()
            .map(|(_, at)| Bounds::from_center(*at, props.pad_size)),
    )
    .unwrap_or_else(|| Bounds::from_center(Point::ORIGIN, props.pad_size));

    let mut component = CircuitRecord::PcbComponent(PcbComponent {
        source_component_id,
        center: extent.center(),
        width: extent.width(),
        height: extent.height(),
        layer: layer.clone(),
        subcircuit_id: subcircuit_id.clone(),
        ..Default::default()
    });
    component.transform(&t);
    let component_id = ctx.insert(component)?;
    ctx.refs_mut(node)?.pcb_component_id = Some(component_id.clone());

    let mut pad_ids = Vec::with_capacity(pads.len());
    for (pin, at) in pads {
        let port = port_for_pin(&ports, pin);
        let mut pcb_port_id = None;
        if let Some(port) = port {
            if let Some(source_port_id) = ctx.refs(port)?.source_port_id.clone() {
                let mut record = CircuitRecord::PcbPort(PcbPort {
                    source_port_id,
                    pcb_component_id: Some(component_id.clone()),
                    x: at.x,
                    y: at.y,
                    layers: vec![layer.clone()],
                    subcircuit_id: subcircuit_id.clone(),
                    ..Default::default()
                });
                record.transform(&t);
                let id = ctx.insert(record)?;
                ctx.refs_mut(port)?.pcb_port_id = Some(id.clone());
                pcb_port_id = Some(id);
            }
        }

        let mut pad = CircuitRecord::PcbSmtpad(PcbSmtpad {
            pcb_component_id: component_id.clone(),
            pcb_port_id,
            shape: "rect".to_string(),
            x: at.x,
            y: at.y,
            width: props.pad_size.width,
            height: props.pad_size.height,
            layer: layer.clone(),
            subcircuit_id: subcircuit_id.clone(),
            ..Default::default()
        });
        pad.transform(&t);
        pad_ids.push(ctx.insert(pad)?);
    }
    ctx.refs_mut(node)?.extra.extend(pad_ids);

    ctx.clear_frame(node, Side::Pcb);
    Ok(())
}

fn render_cad(ctx: &mut RenderContext<'_>, node: NodeId, props: &ComponentProps) -> Result<(), RenderError> {
    let old = ctx.refs_mut(node)?.cad_component_id.take();
    clear_ref(ctx, old)?;

    let Some(pcb) = ctx
        .refs(node)?
        .pcb_component_id
        .as_deref()
        .and_then(|id| ctx.store.get(id))
    else {
        return Ok(());
    };
    let CircuitRecord::PcbComponent(pcb) = pcb else {
        return Ok(());
    };
    let z = match props.position.layer {
        Layer::Top => CAD_Z,
        Layer::Bottom => -CAD_Z,
    };
    let record = CircuitRecord::CadComponent(CadComponent {
        pcb_component_id: pcb.pcb_component_id.clone(),
        source_component_id: pcb.source_component_id.clone(),
        position: Point3 {
            x: pcb.center.x,
            y: pcb.center.y,
            z,
        },
        rotation: Point3 {
            x: 0.0,
            y: 0.0,
            z: pcb.rotation,
        },
        layer: pcb.layer.clone(),
        subcircuit_id: pcb.subcircuit_id.clone(),
        ..Default::default()
    });
    let id = ctx.insert(record)?;
    ctx.refs_mut(node)?.cad_component_id = Some(id);
    Ok(())
}
