//! The circuit-JSON record model.
//!
//! Every record is one variant of [`CircuitRecord`], internally tagged by
//! `type` with snake_case kind names (`source_component`, `pcb_smtpad`, ...).
//! Each kind has an id field named `<kind>_id`. Spatial records carry the
//! id of the subcircuit that owns them; ports, nets and traces carry a
//! connectivity key once the subcircuit has been mapped.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use circuitc_core::geometry::{is_quarter_turn, normalize_degrees, Bounds, Point, Size, Transform};

use crate::error::StorageError;

/// Which rendering of the design a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Source,
    Schematic,
    Pcb,
}

// ---------------------------------------------------------------------------
// Source layer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SourceComponent {
    #[serde(default)]
    pub source_component_id: String,
    pub name: String,
    /// Component kind, e.g. `resistor`.
    pub ftype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcircuit_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SourcePort {
    #[serde(default)]
    pub source_port_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin_number: Option<u32>,
    #[serde(default)]
    pub port_hints: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_component_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcircuit_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcircuit_connectivity_map_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SourceNet {
    #[serde(default)]
    pub source_net_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcircuit_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcircuit_connectivity_map_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SourceTrace {
    #[serde(default)]
    pub source_trace_id: String,
    #[serde(default)]
    pub connected_source_port_ids: Vec<String>,
    #[serde(default)]
    pub connected_source_net_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcircuit_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcircuit_connectivity_map_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SourceGroup {
    #[serde(default)]
    pub source_group_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub is_subcircuit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_source_group_id: Option<String>,
    /// For subcircuits, the id their descendants use as `subcircuit_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcircuit_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_subcircuit_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Schematic layer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SchematicComponent {
    #[serde(default)]
    pub schematic_component_id: String,
    pub source_component_id: String,
    pub center: Point,
    pub size: Size,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcircuit_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SchematicPort {
    #[serde(default)]
    pub schematic_port_id: String,
    pub source_port_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schematic_component_id: Option<String>,
    pub center: Point,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcircuit_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SchematicEdge {
    pub from: Point,
    pub to: Point,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SchematicTrace {
    #[serde(default)]
    pub schematic_trace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_trace_id: Option<String>,
    pub edges: Vec<SchematicEdge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcircuit_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcircuit_connectivity_map_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SchematicNetLabel {
    #[serde(default)]
    pub schematic_net_label_id: String,
    pub source_net_id: String,
    pub text: String,
    pub anchor_position: Point,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcircuit_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SchematicGroup {
    #[serde(default)]
    pub schematic_group_id: String,
    pub source_group_id: String,
    pub center: Point,
    pub width: f64,
    pub height: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcircuit_id: Option<String>,
}

// ---------------------------------------------------------------------------
// PCB layer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PcbBoard {
    #[serde(default)]
    pub pcb_board_id: String,
    pub center: Point,
    pub width: f64,
    pub height: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcircuit_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PcbGroup {
    #[serde(default)]
    pub pcb_group_id: String,
    pub source_group_id: String,
    pub center: Point,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub is_subcircuit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcircuit_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PcbComponent {
    #[serde(default)]
    pub pcb_component_id: String,
    pub source_component_id: String,
    pub center: Point,
    /// Unrotated footprint extent.
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default = "default_layer")]
    pub layer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcircuit_id: Option<String>,
}

impl PcbComponent {
    /// Axis-aligned extent with rotation applied.
    pub fn bounds(&self) -> Bounds {
        Bounds::from_center(
            self.center,
            Size::new(self.width, self.height).rotated(self.rotation),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PcbSmtpad {
    #[serde(default)]
    pub pcb_smtpad_id: String,
    pub pcb_component_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pcb_port_id: Option<String>,
    pub shape: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default = "default_layer")]
    pub layer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcircuit_id: Option<String>,
}

impl PcbSmtpad {
    pub fn bounds(&self) -> Bounds {
        Bounds::from_center(Point::new(self.x, self.y), Size::new(self.width, self.height))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PcbPort {
    #[serde(default)]
    pub pcb_port_id: String,
    pub source_port_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pcb_component_id: Option<String>,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub layers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcircuit_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RoutePoint {
    pub route_type: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub layer: String,
}

impl RoutePoint {
    pub fn wire(p: Point, width: f64, layer: &str) -> Self {
        RoutePoint {
            route_type: "wire".to_string(),
            x: p.x,
            y: p.y,
            width,
            layer: layer.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PcbTrace {
    #[serde(default)]
    pub pcb_trace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_trace_id: Option<String>,
    pub route: Vec<RoutePoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcircuit_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcircuit_connectivity_map_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CadComponent {
    #[serde(default)]
    pub cad_component_id: String,
    pub pcb_component_id: String,
    pub source_component_id: String,
    pub position: Point3,
    pub rotation: Point3,
    #[serde(default = "default_layer")]
    pub layer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcircuit_id: Option<String>,
}

fn default_layer() -> String {
    "top".to_string()
}

// ---------------------------------------------------------------------------
// Errors and simulation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PcbPlacementError {
    #[serde(default)]
    pub pcb_placement_error_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pcb_component_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcircuit_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PcbTraceError {
    #[serde(default)]
    pub pcb_trace_error_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_trace_id: Option<String>,
    #[serde(default)]
    pub pcb_port_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcircuit_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcircuit_connectivity_map_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PcbAutoroutingError {
    #[serde(default)]
    pub pcb_autorouting_error_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcircuit_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimulationError {
    #[serde(default)]
    pub simulation_error_id: String,
    pub engine: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation_experiment_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimulationExperiment {
    #[serde(default)]
    pub simulation_experiment_id: String,
    pub name: String,
    pub duration_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimulationResult {
    #[serde(default)]
    pub simulation_result_id: String,
    pub simulation_experiment_id: String,
    pub engine: String,
    #[serde(default)]
    pub data: Value,
}

// ---------------------------------------------------------------------------
// The tagged union
// ---------------------------------------------------------------------------

/// One record of the compiled output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CircuitRecord {
    SourceComponent(SourceComponent),
    SourcePort(SourcePort),
    SourceNet(SourceNet),
    SourceTrace(SourceTrace),
    SourceGroup(SourceGroup),
    SchematicComponent(SchematicComponent),
    SchematicPort(SchematicPort),
    SchematicTrace(SchematicTrace),
    SchematicNetLabel(SchematicNetLabel),
    SchematicGroup(SchematicGroup),
    PcbBoard(PcbBoard),
    PcbGroup(PcbGroup),
    PcbComponent(PcbComponent),
    PcbSmtpad(PcbSmtpad),
    PcbPort(PcbPort),
    PcbTrace(PcbTrace),
    CadComponent(CadComponent),
    PcbPlacementError(PcbPlacementError),
    PcbTraceError(PcbTraceError),
    PcbAutoroutingError(PcbAutoroutingError),
    SimulationError(SimulationError),
    SimulationExperiment(SimulationExperiment),
    SimulationResult(SimulationResult),
}

macro_rules! record_kinds {
    ($($variant:ident => $tag:literal, $id:ident, $side:expr;)*) => {
        /// Every record kind name, in declaration order.
        pub const RECORD_KINDS: &[&str] = &[$($tag),*];

        impl CircuitRecord {
            /// The `type` tag, e.g. `pcb_component`.
            pub fn kind(&self) -> &'static str {
                match self {
                    $(CircuitRecord::$variant(_) => $tag,)*
                }
            }

            /// The value of the `<kind>_id` field.
            pub fn id(&self) -> &str {
                match self {
                    $(CircuitRecord::$variant(r) => &r.$id,)*
                }
            }

            pub(crate) fn set_id(&mut self, id: String) {
                match self {
                    $(CircuitRecord::$variant(r) => r.$id = id,)*
                }
            }

            pub fn side(&self) -> Option<Side> {
                match self {
                    $(CircuitRecord::$variant(_) => $side,)*
                }
            }
        }
    };
}

record_kinds! {
    SourceComponent => "source_component", source_component_id, Some(Side::Source);
    SourcePort => "source_port", source_port_id, Some(Side::Source);
    SourceNet => "source_net", source_net_id, Some(Side::Source);
    SourceTrace => "source_trace", source_trace_id, Some(Side::Source);
    SourceGroup => "source_group", source_group_id, Some(Side::Source);
    SchematicComponent => "schematic_component", schematic_component_id, Some(Side::Schematic);
    SchematicPort => "schematic_port", schematic_port_id, Some(Side::Schematic);
    SchematicTrace => "schematic_trace", schematic_trace_id, Some(Side::Schematic);
    SchematicNetLabel => "schematic_net_label", schematic_net_label_id, Some(Side::Schematic);
    SchematicGroup => "schematic_group", schematic_group_id, Some(Side::Schematic);
    PcbBoard => "pcb_board", pcb_board_id, Some(Side::Pcb);
    PcbGroup => "pcb_group", pcb_group_id, Some(Side::Pcb);
    PcbComponent => "pcb_component", pcb_component_id, Some(Side::Pcb);
    PcbSmtpad => "pcb_smtpad", pcb_smtpad_id, Some(Side::Pcb);
    PcbPort => "pcb_port", pcb_port_id, Some(Side::Pcb);
    PcbTrace => "pcb_trace", pcb_trace_id, Some(Side::Pcb);
    CadComponent => "cad_component", cad_component_id, Some(Side::Pcb);
    PcbPlacementError => "pcb_placement_error", pcb_placement_error_id, None;
    PcbTraceError => "pcb_trace_error", pcb_trace_error_id, None;
    PcbAutoroutingError => "pcb_autorouting_error", pcb_autorouting_error_id, None;
    SimulationError => "simulation_error", simulation_error_id, None;
    SimulationExperiment => "simulation_experiment", simulation_experiment_id, None;
    SimulationResult => "simulation_result", simulation_result_id, None;
}

impl CircuitRecord {
    /// The record as a JSON object (including its `type` tag).
    pub fn to_json(&self) -> Result<Map<String, Value>, StorageError> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Err(StorageError::InvalidUpdate {
                id: self.id().to_string(),
                reason: "record did not serialize to an object".to_string(),
            }),
        }
    }

    pub fn from_json(map: Map<String, Value>) -> Result<Self, StorageError> {
        Ok(serde_json::from_value(Value::Object(map))?)
    }

    /// Whether every field in `fields` equals the record's field.
    pub fn matches(&self, fields: &Map<String, Value>) -> bool {
        match self.to_json() {
            Ok(json) => fields.iter().all(|(k, v)| json.get(k) == Some(v)),
            Err(_) => false,
        }
    }

    /// Shallow-merges `partial` into this record, keeping `type` and the id.
    pub fn merged(&self, partial: &Map<String, Value>) -> Result<Self, StorageError> {
        let id_field = format!("{}_id", self.kind());
        if partial.contains_key("type") || partial.contains_key(&id_field) {
            return Err(StorageError::InvalidUpdate {
                id: self.id().to_string(),
                reason: format!("'type' and '{id_field}' cannot be updated"),
            });
        }
        let mut json = self.to_json()?;
        for (k, v) in partial {
            json.insert(k.clone(), v.clone());
        }
        Self::from_json(json)
    }

    pub fn subcircuit_id(&self) -> Option<&str> {
        match self {
            CircuitRecord::SourceComponent(r) => r.subcircuit_id.as_deref(),
            CircuitRecord::SourcePort(r) => r.subcircuit_id.as_deref(),
            CircuitRecord::SourceNet(r) => r.subcircuit_id.as_deref(),
            CircuitRecord::SourceTrace(r) => r.subcircuit_id.as_deref(),
            CircuitRecord::SourceGroup(r) => r.parent_subcircuit_id.as_deref(),
            CircuitRecord::SchematicComponent(r) => r.subcircuit_id.as_deref(),
            CircuitRecord::SchematicPort(r) => r.subcircuit_id.as_deref(),
            CircuitRecord::SchematicTrace(r) => r.subcircuit_id.as_deref(),
            CircuitRecord::SchematicNetLabel(r) => r.subcircuit_id.as_deref(),
            CircuitRecord::SchematicGroup(r) => r.subcircuit_id.as_deref(),
            CircuitRecord::PcbBoard(r) => r.subcircuit_id.as_deref(),
            CircuitRecord::PcbGroup(r) => r.subcircuit_id.as_deref(),
            CircuitRecord::PcbComponent(r) => r.subcircuit_id.as_deref(),
            CircuitRecord::PcbSmtpad(r) => r.subcircuit_id.as_deref(),
            CircuitRecord::PcbPort(r) => r.subcircuit_id.as_deref(),
            CircuitRecord::PcbTrace(r) => r.subcircuit_id.as_deref(),
            CircuitRecord::CadComponent(r) => r.subcircuit_id.as_deref(),
            CircuitRecord::PcbPlacementError(r) => r.subcircuit_id.as_deref(),
            CircuitRecord::PcbTraceError(r) => r.subcircuit_id.as_deref(),
            CircuitRecord::PcbAutoroutingError(r) => r.subcircuit_id.as_deref(),
            CircuitRecord::SimulationError(_)
            | CircuitRecord::SimulationExperiment(_)
            | CircuitRecord::SimulationResult(_) => None,
        }
    }

    /// Applies a rigid transform to every coordinate the record carries.
    ///
    /// Rotations accumulate into the record's rotation field; rectangular
    /// pads swap width and height on quarter turns.
    pub fn transform(&mut self, t: &Transform) {
        let degrees = t.rotation_degrees();
        match self {
            CircuitRecord::SchematicComponent(r) => {
                r.center = t.apply(r.center);
                r.rotation = normalize_degrees(r.rotation + degrees);
            }
            CircuitRecord::SchematicPort(r) => r.center = t.apply(r.center),
            CircuitRecord::SchematicTrace(r) => {
                for edge in &mut r.edges {
                    edge.from = t.apply(edge.from);
                    edge.to = t.apply(edge.to);
                }
            }
            CircuitRecord::SchematicNetLabel(r) => r.anchor_position = t.apply(r.anchor_position),
            CircuitRecord::SchematicGroup(r) => r.center = t.apply(r.center),
            CircuitRecord::PcbBoard(r) => r.center = t.apply(r.center),
            CircuitRecord::PcbGroup(r) => r.center = t.apply(r.center),
            CircuitRecord::PcbComponent(r) => {
                r.center = t.apply(r.center);
                r.rotation = normalize_degrees(r.rotation + degrees);
            }
            CircuitRecord::PcbSmtpad(r) => {
                let p = t.apply(Point::new(r.x, r.y));
                r.x = p.x;
                r.y = p.y;
                if is_quarter_turn(degrees) {
                    std::mem::swap(&mut r.width, &mut r.height);
                }
            }
            CircuitRecord::PcbPort(r) => {
                let p = t.apply(Point::new(r.x, r.y));
                r.x = p.x;
                r.y = p.y;
            }
            CircuitRecord::PcbTrace(r) => {
                for point in &mut r.route {
                    let p = t.apply(Point::new(point.x, point.y));
                    point.x = p.x;
                    point.y = p.y;
                }
            }
            CircuitRecord::CadComponent(r) => {
                let p = t.apply(Point::new(r.position.x, r.position.y));
                r.position.x = p.x;
                r.position.y = p.y;
                r.rotation.z = normalize_degrees(r.rotation.z + degrees);
            }
            _ => {}
        }
    }

    /// Axis-aligned extent of spatial records that have one.
    pub fn bounds(&self) -> Option<Bounds> {
        match self {
            CircuitRecord::PcbComponent(r) => Some(r.bounds()),
            CircuitRecord::PcbSmtpad(r) => Some(r.bounds()),
            CircuitRecord::PcbPort(r) => Some(Bounds::from_point(Point::new(r.x, r.y))),
            CircuitRecord::SchematicComponent(r) => {
                Some(Bounds::from_center(r.center, r.size.rotated(r.rotation)))
            }
            CircuitRecord::SchematicPort(r) => Some(Bounds::from_point(r.center)),
            CircuitRecord::PcbGroup(r) => Some(Bounds::from_center(
                r.center,
                Size::new(r.width, r.height),
            )),
            CircuitRecord::SchematicGroup(r) => Some(Bounds::from_center(
                r.center,
                Size::new(r.width, r.height),
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pad() -> CircuitRecord {
        CircuitRecord::PcbSmtpad(PcbSmtpad {
            pcb_smtpad_id: "pcb_smtpad_0".to_string(),
            pcb_component_id: "pcb_component_0".to_string(),
            shape: "rect".to_string(),
            x: 1.0,
            y: 0.0,
            width: 0.6,
            height: 0.4,
            layer: "top".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_value(pad()).unwrap();
        assert_eq!(json["type"], "pcb_smtpad");
        assert_eq!(json["pcb_smtpad_id"], "pcb_smtpad_0");
        assert!(json.get("subcircuit_id").is_none());
    }

    #[test]
    fn kind_table_matches_serde_tags() {
        assert_eq!(pad().kind(), "pcb_smtpad");
        assert!(RECORD_KINDS.contains(&"schematic_net_label"));
        assert_eq!(RECORD_KINDS.len(), 23);
    }

    #[test]
    fn quarter_turn_moves_and_swaps_pads() {
        let mut rec = pad();
        rec.transform(&Transform::rotation(90.0));
        let CircuitRecord::PcbSmtpad(p) = rec else {
            panic!("kind changed");
        };
        assert!(p.x.abs() < 1e-12);
        assert!((p.y - 1.0).abs() < 1e-12);
        assert_eq!((p.width, p.height), (0.4, 0.6));
    }

    #[test]
    fn merge_rejects_id_changes() {
        let rec = pad();
        let ok = rec
            .merged(json!({ "x": 5.0 }).as_object().unwrap())
            .unwrap();
        assert!(ok.matches(json!({ "x": 5.0 }).as_object().unwrap()));
        assert!(rec
            .merged(json!({ "pcb_smtpad_id": "x" }).as_object().unwrap())
            .is_err());
    }

    #[test]
    fn rotated_component_bounds() {
        let c = PcbComponent {
            center: Point::new(0.0, 0.0),
            width: 4.0,
            height: 2.0,
            rotation: 90.0,
            ..Default::default()
        };
        let b = c.bounds();
        assert_eq!((b.width(), b.height()), (2.0, 4.0));
    }
}
