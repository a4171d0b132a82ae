//! The circuitc render engine: turns a design tree into circuit JSON.
//!
//! # Modules
//!
//! - [`engine`]: RenderEngine, the phase loop and the settle loop
//! - [`registry`]: ComponentRegistry, NodeBehavior and the Element builder
//! - [`components`]: behaviors of the built-in kinds
//! - [`context`]: RenderContext handed to every handler
//! - [`effects`]: async effect tracking
//! - [`layout`]: group layout on both sides
//! - [`connectivity`]: connectivity maps per subcircuit
//! - [`routing`] / [`autoroute`]: direct and remote trace routing
//! - [`isolation`]: isolated subcircuit renders and the subcircuit cache
//! - [`simulation`]: pluggable simulation engines
//! - [`config`]: RenderConfig
//! - [`error`]: RenderError

pub mod autoroute;
pub mod components;
pub mod config;
pub mod connectivity;
pub mod context;
pub mod effects;
pub mod engine;
pub mod error;
pub mod isolation;
pub mod layout;
pub mod registry;
pub mod routing;
pub mod simulation;

pub use config::{AutorouterConfig, RenderConfig};
pub use connectivity::ConnectivityGroup;
pub use context::RenderContext;
pub use engine::{EngineServices, RenderEngine};
pub use error::RenderError;
pub use isolation::SubcircuitCache;
pub use registry::{parse_custom, ComponentRegistry, Element, NodeBehavior};
pub use simulation::{InventoryEngine, SimulationEngine, SimulationRequest};
