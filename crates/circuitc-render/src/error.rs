//! Render error types for circuitc-render.
//!
//! [`RenderError`] is the pipeline-facing taxonomy: authoring mistakes
//! (validation, resolution, structural) are never retried, async job
//! failures propagate out of the settle loop, and lower-layer errors from
//! the store and solvers convert via `From`.

use thiserror::Error;

use circuitc_core::{CoreError, SelectorError, ValidationError};
use circuitc_layout::LayoutError;
use circuitc_store::StorageError;

/// Errors surfaced by rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Declared properties failed their schema check.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A selector used by a node matched nothing.
    #[error("{node} could not find \"{selector}\"")]
    Resolution { node: String, selector: String },

    /// Authoring errors implicating several names (cyclic expressions,
    /// duplicate ports, ambiguous references).
    #[error("{reason}: {}", names.join(", "))]
    Structural { reason: String, names: Vec<String> },

    /// An autorouting job failed.
    #[error("autorouting failed for {subcircuit}: {message}")]
    Autorouting { subcircuit: String, message: String },

    /// A nested isolated render failed or its result was lost.
    #[error("isolated render of {subcircuit} failed: {message}")]
    Isolation { subcircuit: String, message: String },

    /// The settle loop ran out of cycles with work still pending.
    #[error("render did not settle after {cycles} cycles")]
    NotSettled { cycles: usize },

    #[error(transparent)]
    Core(CoreError),

    #[error("invalid selector: {0}")]
    Selector(SelectorError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// An async effect task panicked or was aborted.
    #[error("effect task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl RenderError {
    /// Whether this error is an authoring mistake in declared properties.
    pub fn is_validation(&self) -> bool {
        matches!(self, RenderError::Validation(_))
    }
}

impl From<SelectorError> for RenderError {
    fn from(err: SelectorError) -> Self {
        match err {
            SelectorError::NotFound { origin, selector } => RenderError::Resolution {
                node: origin,
                selector,
            },
            other => RenderError::Selector(other),
        }
    }
}

impl From<CoreError> for RenderError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => RenderError::Validation(e),
            CoreError::Selector(e) => e.into(),
            other => RenderError::Core(other),
        }
    }
}
