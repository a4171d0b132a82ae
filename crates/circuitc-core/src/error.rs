//! Core error types for circuitc-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! design tree, property validation and selector parsing/resolution.

use thiserror::Error;

use crate::id::NodeId;

/// Errors produced by design tree operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A node id does not refer to a live node.
    #[error("node not found: NodeId({id})", id = id.0)]
    NodeNotFound { id: NodeId },

    /// Attempted to attach a node that already has an owner.
    #[error("node {child} already has parent {parent}")]
    AlreadyOwned { child: NodeId, parent: NodeId },

    /// Attaching would make a node its own ancestor.
    #[error("attaching {child} under {parent} would create a cycle")]
    CyclicOwnership { child: NodeId, parent: NodeId },

    /// The root node cannot be removed or re-parented.
    #[error("the tree root cannot be detached")]
    RootDetach,

    /// No explicit or inferred root node could be resolved for selection.
    #[error("cannot infer root node: {reason}")]
    AmbiguousRoot { reason: String },

    /// Property validation failed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A selector failed to parse.
    #[error(transparent)]
    Selector(#[from] SelectorError),
}

/// A declared property failed its schema check.
///
/// Raised synchronously at node construction (or property update) and fatal
/// to that construction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Declared properties must be a JSON object.
    #[error("<{kind}> properties must be an object, got {found}")]
    NotAnObject { kind: String, found: String },

    /// A property has the wrong JSON type or an out-of-range value.
    #[error("<{kind}> property '{prop}' is invalid: {reason}")]
    InvalidProperty {
        kind: String,
        prop: String,
        reason: String,
    },

    /// A required property is missing.
    #[error("<{kind}> is missing required property '{prop}'")]
    MissingProperty { kind: String, prop: String },

    /// A string property is not one of the accepted enum values.
    #[error("<{kind}> property '{prop}' has invalid value \"{value}\", expected one of: {expected}")]
    InvalidEnumValue {
        kind: String,
        prop: String,
        value: String,
        expected: String,
    },

    /// Two or more mutually exclusive properties were declared together.
    #[error("<{kind}> properties {props:?} are mutually exclusive")]
    MutuallyExclusive { kind: String, props: Vec<String> },

    /// No schema is registered for a node kind.
    #[error("unknown component kind '{kind}'")]
    UnknownKind { kind: String },
}

/// Selector parse and resolution failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SelectorError {
    /// The selector text is malformed.
    #[error("invalid selector \"{selector}\": {reason}")]
    Parse { selector: String, reason: String },

    /// A selector that must resolve matched nothing.
    #[error("{origin} could not find \"{selector}\"")]
    NotFound { origin: String, selector: String },
}
