//! Layout error types for circuitc-layout.

use thiserror::Error;

/// Errors produced by the layout solvers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutError {
    /// The authored equalities contradict each other.
    #[error("constraints are inconsistent: {}", names.join(", "))]
    InconsistentConstraints { names: Vec<String> },

    /// A constraint names a box the solver was not given.
    #[error("constraint references unknown component '{name}'")]
    UnknownBox { name: String },

    /// The numeric system could not be solved.
    #[error("linear system is singular")]
    Singular,

    /// A calculated position failed to parse.
    #[error("cannot parse expression \"{expr}\": {reason}")]
    ExpressionParse { expr: String, reason: String },

    /// A calculated position references a component that does not exist.
    #[error("expression \"{expr}\" references unknown component '{reference}'")]
    UnresolvedReference { expr: String, reference: String },

    /// Calculated positions depend on each other in a cycle.
    #[error("cyclic position expressions; unresolved: {}", names.join(", "))]
    CyclicExpressions { names: Vec<String> },

    /// A packing problem had no items or no allowed rotation.
    #[error("invalid pack input: {reason}")]
    InvalidPackInput { reason: String },
}
