//! Parsed, validated node properties.
//!
//! Declared properties arrive as plain JSON objects (camelCase keys). Each
//! built-in kind has a schema check that turns them into one typed
//! [`NodeProps`] variant, filling defaults, or fails with a
//! [`ValidationError`] naming the kind and property.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::geometry::{Anchor, Size};

/// Typed properties, one variant per built-in kind family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum NodeProps {
    /// The synthetic tree root.
    Root,
    Group(GroupProps),
    Component(ComponentProps),
    Port(PortProps),
    Net(NetProps),
    Trace(TraceProps),
    Constraint(ConstraintProps),
    AnalogSimulation(SimulationProps),
    /// Caller-registered kinds keep their declared object unchanged.
    Custom(Value),
}

impl NodeProps {
    /// The node's `name`, if its kind has one.
    pub fn name(&self) -> Option<&str> {
        match self {
            NodeProps::Group(g) => g.name.as_deref(),
            NodeProps::Component(c) => Some(&c.name),
            NodeProps::Port(p) => Some(&p.name),
            NodeProps::Net(n) => Some(&n.name),
            NodeProps::Custom(v) => v.get("name").and_then(Value::as_str),
            _ => None,
        }
    }

    pub fn position(&self) -> Option<&PositionProps> {
        match self {
            NodeProps::Group(g) => Some(&g.position),
            NodeProps::Component(c) => Some(&c.position),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&GroupProps> {
        match self {
            NodeProps::Group(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_component(&self) -> Option<&ComponentProps> {
        match self {
            NodeProps::Component(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_trace(&self) -> Option<&TraceProps> {
        match self {
            NodeProps::Trace(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_constraint(&self) -> Option<&ConstraintProps> {
        match self {
            NodeProps::Constraint(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_port(&self) -> Option<&PortProps> {
        match self {
            NodeProps::Port(p) => Some(p),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared pieces
// ---------------------------------------------------------------------------

/// A coordinate that is either a literal or a calculated expression such as
/// `"R1.maxx + 2"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Coordinate {
    Value(f64),
    Expr(String),
}

impl Coordinate {
    pub fn as_value(&self) -> Option<f64> {
        match self {
            Coordinate::Value(v) => Some(*v),
            Coordinate::Expr(_) => None,
        }
    }
}

/// Copper layer a component is placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    #[default]
    Top,
    Bottom,
}

/// Placement properties shared by components and groups.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PositionProps {
    pub pcb_x: Option<Coordinate>,
    pub pcb_y: Option<Coordinate>,
    pub pcb_rotation: f64,
    pub sch_x: Option<Coordinate>,
    pub sch_y: Option<Coordinate>,
    pub sch_rotation: f64,
    pub layer: Layer,
}

impl PositionProps {
    pub fn has_explicit_pcb(&self) -> bool {
        self.pcb_x.is_some() || self.pcb_y.is_some()
    }

    pub fn has_explicit_sch(&self) -> bool {
        self.sch_x.is_some() || self.sch_y.is_some()
    }

    /// Literal pcb offset; expressions count as zero until resolved.
    pub fn pcb_offset(&self) -> (f64, f64) {
        (
            self.pcb_x.as_ref().and_then(Coordinate::as_value).unwrap_or(0.0),
            self.pcb_y.as_ref().and_then(Coordinate::as_value).unwrap_or(0.0),
        )
    }

    pub fn sch_offset(&self) -> (f64, f64) {
        (
            self.sch_x.as_ref().and_then(Coordinate::as_value).unwrap_or(0.0),
            self.sch_y.as_ref().and_then(Coordinate::as_value).unwrap_or(0.0),
        )
    }

    fn parse(r: &PropReader<'_>) -> Result<Self, ValidationError> {
        Ok(PositionProps {
            pcb_x: r.coordinate("pcbX")?,
            pcb_y: r.coordinate("pcbY")?,
            pcb_rotation: r.f64_or("pcbRotation", 0.0)?,
            sch_x: r.coordinate("schX")?,
            sch_y: r.coordinate("schY")?,
            sch_rotation: r.f64_or("schRotation", 0.0)?,
            layer: r
                .enum_value("layer", &[("top", Layer::Top), ("bottom", Layer::Bottom)])?
                .unwrap_or_default(),
        })
    }
}

// ---------------------------------------------------------------------------
// Groups and boards
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlexDirection {
    Row,
    Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JustifyContent {
    Start,
    Center,
    End,
    SpaceBetween,
    SpaceAround,
    SpaceEvenly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignItems {
    Start,
    Center,
    End,
    Stretch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridOptions {
    pub cols: Option<usize>,
    pub rows: Option<usize>,
    pub gap: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlexOptions {
    pub direction: FlexDirection,
    pub justify: JustifyContent,
    pub align: AlignItems,
    pub gap: f64,
}

/// Placement strategy declared for one side (pcb or schematic) of a group.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum LayoutStrategy {
    /// Nothing declared: pack unless children carry explicit positions.
    #[default]
    Auto,
    Pack,
    Grid(GridOptions),
    Flex(FlexOptions),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SideLayout {
    pub strategy: LayoutStrategy,
    pub anchor: Option<Anchor>,
    pub pack_gap: Option<f64>,
}

impl SideLayout {
    fn parse(r: &PropReader<'_>, prefix: &str) -> Result<Self, ValidationError> {
        let key = |suffix: &str| format!("{prefix}{suffix}");
        let pack = r.bool_or(&key("Pack"), false)?;
        let grid = r.bool_or(&key("Grid"), false)?;
        let flex = r.bool_or(&key("Flex"), false)?;

        let declared: Vec<String> = [("Pack", pack), ("Grid", grid), ("Flex", flex)]
            .into_iter()
            .filter(|(_, on)| *on)
            .map(|(name, _)| key(name))
            .collect();
        if declared.len() > 1 {
            return Err(ValidationError::MutuallyExclusive {
                kind: r.kind.to_string(),
                props: declared,
            });
        }

        let strategy = if pack {
            LayoutStrategy::Pack
        } else if grid {
            LayoutStrategy::Grid(GridOptions {
                cols: r.usize_opt(&key("GridCols"))?,
                rows: r.usize_opt(&key("GridRows"))?,
                gap: r.f64_or(&key("GridGap"), 1.0)?,
            })
        } else if flex {
            LayoutStrategy::Flex(FlexOptions {
                direction: r
                    .enum_value(
                        &key("FlexDirection"),
                        &[("row", FlexDirection::Row), ("column", FlexDirection::Column)],
                    )?
                    .unwrap_or(FlexDirection::Row),
                justify: r
                    .enum_value(
                        &key("JustifyContent"),
                        &[
                            ("start", JustifyContent::Start),
                            ("center", JustifyContent::Center),
                            ("end", JustifyContent::End),
                            ("space-between", JustifyContent::SpaceBetween),
                            ("space-around", JustifyContent::SpaceAround),
                            ("space-evenly", JustifyContent::SpaceEvenly),
                        ],
                    )?
                    .unwrap_or(JustifyContent::Start),
                align: r
                    .enum_value(
                        &key("AlignItems"),
                        &[
                            ("start", AlignItems::Start),
                            ("center", AlignItems::Center),
                            ("end", AlignItems::End),
                            ("stretch", AlignItems::Stretch),
                        ],
                    )?
                    .unwrap_or(AlignItems::Center),
                gap: r.f64_or(&key("FlexGap"), 0.0)?,
            })
        } else {
            LayoutStrategy::Auto
        };

        let anchor = match r.str_opt(&key("AnchorAlignment"))? {
            None => None,
            Some(s) => Some(Anchor::parse(s).ok_or_else(|| ValidationError::InvalidEnumValue {
                kind: r.kind.to_string(),
                prop: key("AnchorAlignment"),
                value: s.to_string(),
                expected: Anchor::ALL.map(Anchor::as_str).join(", "),
            })?),
        };

        Ok(SideLayout {
            strategy,
            anchor,
            pack_gap: r.f64_opt(&key("PackGap"))?,
        })
    }
}

/// How a subcircuit's pcb traces are produced.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AutorouterSetting {
    /// Built-in straight-segment router, synchronous.
    #[default]
    SequentialTrace,
    /// Remote autorouter at the configured default server.
    Auto,
    /// Remote autorouter at an explicit server.
    Server { url: String },
}

impl AutorouterSetting {
    pub fn is_remote(&self) -> bool {
        !matches!(self, AutorouterSetting::SequentialTrace)
    }
}

/// Properties of `<group>` and `<board>`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GroupProps {
    pub name: Option<String>,
    pub position: PositionProps,
    pub is_board: bool,
    pub subcircuit: bool,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub pcb_layout: SideLayout,
    pub sch_layout: SideLayout,
    pub autorouter: AutorouterSetting,
    pub cacheable: bool,
}

impl GroupProps {
    pub fn parse(kind: &str, declared: &Value, is_board: bool) -> Result<Self, ValidationError> {
        let r = PropReader::new(kind, declared)?;
        let autorouter = match r.obj.get("autorouter") {
            None | Some(Value::Null) => AutorouterSetting::SequentialTrace,
            Some(Value::String(s)) if s == "sequential-trace" => AutorouterSetting::SequentialTrace,
            Some(Value::String(s)) if s == "auto" || s == "auto-cloud" => AutorouterSetting::Auto,
            Some(Value::Object(o)) => match o.get("serverUrl").and_then(Value::as_str) {
                Some(url) => AutorouterSetting::Server {
                    url: url.to_string(),
                },
                None => {
                    return Err(r.invalid("autorouter", "object form requires a serverUrl string"))
                }
            },
            Some(other) => {
                return Err(ValidationError::InvalidEnumValue {
                    kind: kind.to_string(),
                    prop: "autorouter".to_string(),
                    value: other.to_string(),
                    expected: "sequential-trace, auto, { serverUrl }".to_string(),
                })
            }
        };

        let cacheable = r.bool_or("cacheable", false)?;
        Ok(GroupProps {
            name: r.str_opt("name")?.map(str::to_string),
            position: PositionProps::parse(&r)?,
            is_board,
            // Caching isolates the subtree, which only makes sense at a
            // subcircuit boundary.
            subcircuit: is_board || cacheable || r.bool_or("subcircuit", false)?,
            width: r.positive_opt("width")?,
            height: r.positive_opt("height")?,
            pcb_layout: SideLayout::parse(&r, "pcb")?,
            sch_layout: SideLayout::parse(&r, "sch")?,
            autorouter,
            cacheable,
        })
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// Properties shared by the generic pin-based components
/// (`resistor`, `capacitor`, `chip`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentProps {
    pub name: String,
    pub position: PositionProps,
    pub pin_count: u32,
    /// Extra aliases per pin, keyed by `pinN`.
    pub pin_labels: BTreeMap<String, Vec<String>>,
    pub pad_size: Size,
    pub pitch: f64,
    /// `pinN` (or alias) -> selector of what it connects to.
    pub connections: IndexMap<String, String>,
    pub pack_rotations: Vec<f64>,
    /// Display value such as a resistance.
    pub value: Option<String>,
}

impl ComponentProps {
    /// Parses a generic component; `default_pins` is the kind's pin count
    /// when `pinCount`/`pinLabels` are not declared.
    pub fn parse(
        kind: &str,
        declared: &Value,
        default_pins: Option<u32>,
    ) -> Result<Self, ValidationError> {
        let r = PropReader::new(kind, declared)?;
        let name = r.required_str("name")?.to_string();

        let mut pin_labels: BTreeMap<String, Vec<String>> = BTreeMap::new();
        if let Some(labels) = r.obj.get("pinLabels") {
            let labels = labels
                .as_object()
                .ok_or_else(|| r.invalid("pinLabels", "expected an object of pin -> label"))?;
            for (pin, label) in labels {
                let aliases = match label {
                    Value::String(s) => vec![s.clone()],
                    Value::Array(items) => items
                        .iter()
                        .map(|v| {
                            v.as_str()
                                .map(str::to_string)
                                .ok_or_else(|| r.invalid("pinLabels", "labels must be strings"))
                        })
                        .collect::<Result<_, _>>()?,
                    _ => return Err(r.invalid("pinLabels", "labels must be strings")),
                };
                pin_labels.insert(normalize_pin_key(pin), aliases);
            }
        }

        let pin_count = match r.usize_opt("pinCount")? {
            Some(n) => n as u32,
            None => {
                let from_labels = pin_labels
                    .keys()
                    .filter_map(|k| k.strip_prefix("pin").and_then(|n| n.parse::<u32>().ok()))
                    .max();
                match (from_labels, default_pins) {
                    (Some(n), _) => n,
                    (None, Some(n)) => n,
                    (None, None) => {
                        return Err(ValidationError::MissingProperty {
                            kind: kind.to_string(),
                            prop: "pinCount".to_string(),
                        })
                    }
                }
            }
        };
        if pin_count == 0 {
            return Err(r.invalid("pinCount", "must be at least 1"));
        }

        let pad_size = match r.obj.get("footprintPadSize") {
            None => Size::new(0.6, 0.6),
            Some(v) => {
                let w = v.get("width").and_then(Value::as_f64);
                let h = v.get("height").and_then(Value::as_f64);
                match (w, h) {
                    (Some(w), Some(h)) if w > 0.0 && h > 0.0 => Size::new(w, h),
                    _ => {
                        return Err(r.invalid(
                            "footprintPadSize",
                            "expected { width, height } with positive numbers",
                        ))
                    }
                }
            }
        };

        let mut connections = IndexMap::new();
        if let Some(conns) = r.obj.get("connections") {
            let conns = conns
                .as_object()
                .ok_or_else(|| r.invalid("connections", "expected an object of pin -> selector"))?;
            for (pin, target) in conns {
                let target = target
                    .as_str()
                    .ok_or_else(|| r.invalid("connections", "targets must be selector strings"))?;
                connections.insert(pin.clone(), target.to_string());
            }
        }

        let pack_rotations = match r.obj.get("pcbPackRotations") {
            None => vec![0.0, 90.0, 180.0, 270.0],
            Some(Value::Array(items)) => {
                let rots: Option<Vec<f64>> = items.iter().map(Value::as_f64).collect();
                match rots {
                    Some(r) if !r.is_empty() => r,
                    _ => return Err(r.invalid("pcbPackRotations", "expected non-empty number list")),
                }
            }
            Some(_) => return Err(r.invalid("pcbPackRotations", "expected non-empty number list")),
        };

        let value = ["resistance", "capacitance", "value"]
            .iter()
            .find_map(|k| match r.obj.get(*k) {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            });

        Ok(ComponentProps {
            name,
            position: PositionProps::parse(&r)?,
            pin_count,
            pin_labels,
            pad_size,
            pitch: r.positive_opt("pitch")?.unwrap_or(1.0),
            connections,
            pack_rotations,
            value,
        })
    }

    /// Aliases for pin `n` (1-based), always including `pinN` and `N`.
    pub fn pin_aliases(&self, n: u32) -> Vec<String> {
        let key = format!("pin{n}");
        let mut aliases = vec![n.to_string()];
        if let Some(extra) = self.pin_labels.get(&key) {
            aliases.extend(extra.iter().cloned());
        }
        aliases
    }
}

fn normalize_pin_key(pin: &str) -> String {
    if pin.chars().all(|c| c.is_ascii_digit()) {
        format!("pin{pin}")
    } else {
        pin.to_string()
    }
}

/// Properties of an explicit `<port>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortProps {
    pub name: String,
    pub aliases: Vec<String>,
    pub pin_number: Option<u32>,
}

impl PortProps {
    pub fn parse(kind: &str, declared: &Value) -> Result<Self, ValidationError> {
        let r = PropReader::new(kind, declared)?;
        Ok(PortProps {
            name: r.required_str("name")?.to_string(),
            aliases: r.str_list("aliases")?.unwrap_or_default(),
            pin_number: r.usize_opt("pinNumber")?.map(|n| n as u32),
        })
    }

    /// Whether `.token` addresses this port.
    pub fn answers_to(&self, token: &str) -> bool {
        self.name == token || self.aliases.iter().any(|a| a == token)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetProps {
    pub name: String,
}

impl NetProps {
    pub fn parse(kind: &str, declared: &Value) -> Result<Self, ValidationError> {
        let r = PropReader::new(kind, declared)?;
        let name = r.required_str("name")?;
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(r.invalid("name", "net names must be non-empty and contain no spaces"));
        }
        Ok(NetProps {
            name: name.to_string(),
        })
    }
}

/// Properties of a `<trace>`: two or more endpoint selectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceProps {
    pub endpoints: Vec<String>,
    pub width: Option<f64>,
}

impl TraceProps {
    pub fn parse(kind: &str, declared: &Value) -> Result<Self, ValidationError> {
        let r = PropReader::new(kind, declared)?;
        let endpoints = match r.str_list("path")? {
            Some(path) => path,
            None => match (r.str_opt("from")?, r.str_opt("to")?) {
                (Some(from), Some(to)) => vec![from.to_string(), to.to_string()],
                (None, _) => {
                    return Err(ValidationError::MissingProperty {
                        kind: kind.to_string(),
                        prop: "from".to_string(),
                    })
                }
                (_, None) => {
                    return Err(ValidationError::MissingProperty {
                        kind: kind.to_string(),
                        prop: "to".to_string(),
                    })
                }
            },
        };
        if endpoints.len() < 2 {
            return Err(r.invalid("path", "a trace needs at least two endpoints"));
        }
        Ok(TraceProps {
            endpoints,
            width: r.positive_opt("thickness")?,
        })
    }

    /// Net name if `selector` is the `net.NAME` shorthand.
    pub fn net_shorthand(selector: &str) -> Option<&str> {
        selector.strip_prefix("net.").filter(|n| !n.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Constraints
// ---------------------------------------------------------------------------

/// Whether a distance is measured between centers or facing edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeMode {
    #[default]
    CenterToCenter,
    EdgeToEdge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConstraintKind {
    XDist {
        dist: f64,
        left: String,
        right: String,
        mode: EdgeMode,
    },
    YDist {
        dist: f64,
        top: String,
        bottom: String,
        mode: EdgeMode,
    },
    SameX {
        members: Vec<String>,
    },
    SameY {
        members: Vec<String>,
    },
}

impl ConstraintKind {
    /// Every selector this constraint references.
    pub fn selectors(&self) -> Vec<&str> {
        match self {
            ConstraintKind::XDist { left, right, .. } => vec![left, right],
            ConstraintKind::YDist { top, bottom, .. } => vec![top, bottom],
            ConstraintKind::SameX { members } | ConstraintKind::SameY { members } => {
                members.iter().map(String::as_str).collect()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintProps {
    pub kind: ConstraintKind,
    pub pcb: bool,
    pub schematic: bool,
}

impl ConstraintProps {
    pub fn parse(kind: &str, declared: &Value) -> Result<Self, ValidationError> {
        let r = PropReader::new(kind, declared)?;
        let edge = r.bool_or("edgeToEdge", false)?;
        let center = r.bool_or("centerToCenter", false)?;
        if edge && center {
            return Err(ValidationError::MutuallyExclusive {
                kind: kind.to_string(),
                props: vec!["edgeToEdge".to_string(), "centerToCenter".to_string()],
            });
        }
        let mode = if edge {
            EdgeMode::EdgeToEdge
        } else {
            EdgeMode::CenterToCenter
        };

        let mut found = Vec::new();
        for key in ["xDist", "yDist", "sameX", "sameY"] {
            if r.obj.contains_key(key) {
                found.push(key.to_string());
            }
        }
        let constraint = match found.as_slice() {
            [k] if k == "xDist" => ConstraintKind::XDist {
                dist: r.required_f64("xDist")?,
                left: r.required_str("left")?.to_string(),
                right: r.required_str("right")?.to_string(),
                mode,
            },
            [k] if k == "yDist" => ConstraintKind::YDist {
                dist: r.required_f64("yDist")?,
                top: r.required_str("top")?.to_string(),
                bottom: r.required_str("bottom")?.to_string(),
                mode,
            },
            [k] if k == "sameX" || k == "sameY" => {
                if !r.bool_or(k, false)? {
                    return Err(r.invalid(k, "must be true when present"));
                }
                let members = r.str_list("for")?.ok_or_else(|| ValidationError::MissingProperty {
                    kind: kind.to_string(),
                    prop: "for".to_string(),
                })?;
                if members.len() < 2 {
                    return Err(r.invalid("for", "needs at least two selectors"));
                }
                if k == "sameX" {
                    ConstraintKind::SameX { members }
                } else {
                    ConstraintKind::SameY { members }
                }
            }
            [] => {
                return Err(ValidationError::MissingProperty {
                    kind: kind.to_string(),
                    prop: "xDist | yDist | sameX | sameY".to_string(),
                })
            }
            _ => {
                return Err(ValidationError::MutuallyExclusive {
                    kind: kind.to_string(),
                    props: found,
                })
            }
        };

        let schematic = r.bool_or("schematic", false)?;
        Ok(ConstraintProps {
            kind: constraint,
            pcb: r.bool_or("pcb", !schematic)?,
            schematic,
        })
    }
}

/// Properties of `<analogsimulation>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationProps {
    pub engine: Option<String>,
    pub duration_ms: f64,
}

impl SimulationProps {
    pub fn parse(kind: &str, declared: &Value) -> Result<Self, ValidationError> {
        let r = PropReader::new(kind, declared)?;
        Ok(SimulationProps {
            engine: r.str_opt("engine")?.map(str::to_string),
            duration_ms: r.f64_or("duration", 10.0)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Reader helper
// ---------------------------------------------------------------------------

/// Typed accessors over a declared property object, producing
/// [`ValidationError`]s that name the kind and property.
pub struct PropReader<'a> {
    pub kind: &'a str,
    pub obj: &'a Map<String, Value>,
}

static EMPTY: std::sync::OnceLock<Map<String, Value>> = std::sync::OnceLock::new();

impl<'a> PropReader<'a> {
    pub fn new(kind: &'a str, declared: &'a Value) -> Result<Self, ValidationError> {
        let obj = match declared {
            Value::Object(o) => o,
            Value::Null => EMPTY.get_or_init(Map::new),
            other => {
                return Err(ValidationError::NotAnObject {
                    kind: kind.to_string(),
                    found: json_type_name(other).to_string(),
                })
            }
        };
        Ok(PropReader { kind, obj })
    }

    pub fn invalid(&self, prop: &str, reason: &str) -> ValidationError {
        ValidationError::InvalidProperty {
            kind: self.kind.to_string(),
            prop: prop.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn str_opt(&self, key: &str) -> Result<Option<&'a str>, ValidationError> {
        match self.obj.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(self.invalid(
                key,
                &format!("expected a string, got {}", json_type_name(other)),
            )),
        }
    }

    pub fn required_str(&self, key: &str) -> Result<&'a str, ValidationError> {
        self.str_opt(key)?
            .ok_or_else(|| ValidationError::MissingProperty {
                kind: self.kind.to_string(),
                prop: key.to_string(),
            })
    }

    pub fn f64_opt(&self, key: &str) -> Result<Option<f64>, ValidationError> {
        match self.obj.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_f64()
                .filter(|v| v.is_finite())
                .map(Some)
                .ok_or_else(|| self.invalid(key, "expected a finite number")),
            Some(other) => Err(self.invalid(
                key,
                &format!("expected a number, got {}", json_type_name(other)),
            )),
        }
    }

    pub fn f64_or(&self, key: &str, default: f64) -> Result<f64, ValidationError> {
        Ok(self.f64_opt(key)?.unwrap_or(default))
    }

    pub fn required_f64(&self, key: &str) -> Result<f64, ValidationError> {
        self.f64_opt(key)?
            .ok_or_else(|| ValidationError::MissingProperty {
                kind: self.kind.to_string(),
                prop: key.to_string(),
            })
    }

    pub fn positive_opt(&self, key: &str) -> Result<Option<f64>, ValidationError> {
        match self.f64_opt(key)? {
            Some(v) if v <= 0.0 => Err(self.invalid(key, "must be positive")),
            other => Ok(other),
        }
    }

    pub fn usize_opt(&self, key: &str) -> Result<Option<usize>, ValidationError> {
        match self.obj.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(|v| Some(v as usize))
                .ok_or_else(|| self.invalid(key, "expected a non-negative integer")),
            Some(other) => Err(self.invalid(
                key,
                &format!("expected an integer, got {}", json_type_name(other)),
            )),
        }
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool, ValidationError> {
        match self.obj.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(self.invalid(
                key,
                &format!("expected a boolean, got {}", json_type_name(other)),
            )),
        }
    }

    pub fn str_list(&self, key: &str) -> Result<Option<Vec<String>>, ValidationError> {
        match self.obj.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| self.invalid(key, "expected a list of strings"))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(_) => Err(self.invalid(key, "expected a list of strings")),
        }
    }

    pub fn coordinate(&self, key: &str) -> Result<Option<Coordinate>, ValidationError> {
        match self.obj.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(_)) => Ok(self.f64_opt(key)?.map(Coordinate::Value)),
            Some(Value::String(s)) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(self.invalid(key, "expression is empty"));
                }
                match trimmed.strip_suffix("mm").unwrap_or(trimmed).parse::<f64>() {
                    Ok(v) => Ok(Some(Coordinate::Value(v))),
                    Err(_) => Ok(Some(Coordinate::Expr(trimmed.to_string()))),
                }
            }
            Some(other) => Err(self.invalid(
                key,
                &format!("expected a number or expression, got {}", json_type_name(other)),
            )),
        }
    }

    /// Reads a string enum, rejecting unknown values with the full list of
    /// accepted spellings.
    pub fn enum_value<T: Copy>(
        &self,
        key: &str,
        options: &[(&str, T)],
    ) -> Result<Option<T>, ValidationError> {
        let Some(raw) = self.str_opt(key)? else {
            return Ok(None);
        };
        options
            .iter()
            .find(|(name, _)| *name == raw)
            .map(|(_, v)| Some(*v))
            .ok_or_else(|| ValidationError::InvalidEnumValue {
                kind: self.kind.to_string(),
                prop: key.to_string(),
                value: raw.to_string(),
                expected: options
                    .iter()
                    .map(|(name, _)| *name)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resistor_defaults_to_two_pins() {
        let props = ComponentProps::parse("resistor", &json!({ "name": "R1" }), Some(2)).unwrap();
        assert_eq!(props.pin_count, 2);
        assert_eq!(props.pack_rotations, vec![0.0, 90.0, 180.0, 270.0]);
        assert_eq!(props.pin_aliases(1), vec!["1".to_string()]);
    }

    #[test]
    fn chip_pin_count_inferred_from_labels() {
        let props = ComponentProps::parse(
            "chip",
            &json!({ "name": "U1", "pinLabels": { "pin3": "VCC", "1": ["GND", "AGND"] } }),
            None,
        )
        .unwrap();
        assert_eq!(props.pin_count, 3);
        assert_eq!(
            props.pin_aliases(1),
            vec!["1".to_string(), "GND".to_string(), "AGND".to_string()]
        );
    }

    #[test]
    fn chip_without_pins_is_rejected() {
        let err = ComponentProps::parse("chip", &json!({ "name": "U1" }), None).unwrap_err();
        assert!(matches!(err, ValidationError::MissingProperty { ref prop, .. } if prop == "pinCount"));
    }

    #[test]
    fn component_requires_name() {
        let err = ComponentProps::parse("resistor", &json!({}), Some(2)).unwrap_err();
        assert_eq!(err.to_string(), "<resistor> is missing required property 'name'");
    }

    #[test]
    fn coordinates_accept_numbers_units_and_expressions() {
        let props = ComponentProps::parse(
            "resistor",
            &json!({ "name": "R1", "pcbX": "3mm", "pcbY": "R2.maxy + 1" }),
            Some(2),
        )
        .unwrap();
        assert_eq!(props.position.pcb_x, Some(Coordinate::Value(3.0)));
        assert_eq!(
            props.position.pcb_y,
            Some(Coordinate::Expr("R2.maxy + 1".to_string()))
        );
    }

    #[test]
    fn invalid_justify_is_rejected_with_choices() {
        let err = GroupProps::parse(
            "group",
            &json!({ "pcbFlex": true, "pcbJustifyContent": "space-sideways" }),
            false,
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("pcbJustifyContent"), "{msg}");
        assert!(msg.contains("space-sideways"), "{msg}");
        assert!(msg.contains("space-between"), "{msg}");
    }

    #[test]
    fn layout_strategies_are_mutually_exclusive() {
        let err = GroupProps::parse("group", &json!({ "pcbPack": true, "pcbGrid": true }), false)
            .unwrap_err();
        assert!(matches!(err, ValidationError::MutuallyExclusive { .. }));
    }

    #[test]
    fn cacheable_group_is_a_subcircuit() {
        let g = GroupProps::parse("group", &json!({ "name": "G", "cacheable": true }), false)
            .unwrap();
        assert!(g.subcircuit);
        assert!(g.cacheable);
        let board = GroupProps::parse("board", &json!({}), true).unwrap();
        assert!(board.subcircuit);
    }

    #[test]
    fn autorouter_forms() {
        let g = GroupProps::parse(
            "group",
            &json!({ "autorouter": { "serverUrl": "http://localhost:1234" } }),
            false,
        )
        .unwrap();
        assert_eq!(
            g.autorouter,
            AutorouterSetting::Server {
                url: "http://localhost:1234".to_string()
            }
        );
        assert!(GroupProps::parse("group", &json!({ "autorouter": 3 }), false).is_err());
    }

    #[test]
    fn anchor_alignment_parses() {
        let g = GroupProps::parse("group", &json!({ "pcbAnchorAlignment": "top_left" }), false)
            .unwrap();
        assert_eq!(g.pcb_layout.anchor, Some(Anchor::TopLeft));
        assert!(GroupProps::parse("group", &json!({ "pcbAnchorAlignment": "nw" }), false).is_err());
    }

    #[test]
    fn trace_from_to_and_path() {
        let t = TraceProps::parse("trace", &json!({ "from": ".R1 > .pin1", "to": "net.GND" }))
            .unwrap();
        assert_eq!(t.endpoints.len(), 2);
        assert_eq!(TraceProps::net_shorthand(&t.endpoints[1]), Some("GND"));
        assert!(TraceProps::parse("trace", &json!({ "from": ".R1 > .pin1" })).is_err());
    }

    #[test]
    fn constraint_shapes() {
        let c = ConstraintProps::parse(
            "constraint",
            &json!({ "xDist": 10, "left": ".R1", "right": ".R2", "edgeToEdge": true }),
        )
        .unwrap();
        assert!(matches!(c.kind, ConstraintKind::XDist { mode: EdgeMode::EdgeToEdge, .. }));
        assert!(c.pcb && !c.schematic);

        let same = ConstraintProps::parse(
            "constraint",
            &json!({ "sameY": true, "for": [".R1", ".R2", ".R3"], "schematic": true }),
        )
        .unwrap();
        assert_eq!(same.kind.selectors(), vec![".R1", ".R2", ".R3"]);
        assert!(!same.pcb && same.schematic);

        assert!(ConstraintProps::parse(
            "constraint",
            &json!({ "xDist": 1, "yDist": 1, "left": "a", "right": "b" })
        )
        .is_err());
    }

    #[test]
    fn non_object_props_are_rejected() {
        let err = NetProps::parse("net", &json!([1, 2])).unwrap_err();
        assert!(matches!(err, ValidationError::NotAnObject { .. }));
    }
}
