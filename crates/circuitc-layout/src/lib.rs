//! Pure layout solvers for circuitc.
//!
//! Everything here works on plain boxes and ids; the render crate turns
//! design nodes and records into solver input and applies the results.
//!
//! # Modules
//!
//! - [`pack`]: PackSolver trait and the built-in candidate-point packer
//! - [`grid`]: uniform grid placement
//! - [`flex`]: FlexSolver trait and a single-line flexbox
//! - [`constraint`]: weighted linear-equality solver and authored constraints
//! - [`cluster`]: union-find constraint clusters and macro components
//! - [`anchor`]: anchor alignment
//! - [`expr`]: calculated position expressions

pub mod anchor;
pub mod cluster;
pub mod constraint;
pub mod error;
pub mod expr;
pub mod flex;
pub mod grid;
pub mod pack;

pub use anchor::anchor_shift;
pub use cluster::{build_macro, find_clusters, Cluster, ClusterMember, MacroComponent};
pub use constraint::{solve_pinned, solve_relative, LayoutBox, LinearProblem, RelativeConstraint, Strength};
pub use error::LayoutError;
pub use expr::{resolve_positions, ExprItem, PositionExpr};
pub use flex::{FlexInput, FlexItem, FlexOutput, FlexSolver, FlexboxSolver};
pub use grid::{grid_layout, GridItem, GridLayout};
pub use pack::{CandidatePacker, PackInput, PackItem, PackSolver, Placement};
