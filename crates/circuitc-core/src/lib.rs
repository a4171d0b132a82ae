pub mod error;
pub mod geometry;
pub mod id;
pub mod phase;
pub mod props;
pub mod selector;
pub mod tree;

// Re-export commonly used types
pub use error::{CoreError, SelectorError, ValidationError};
pub use geometry::{Anchor, Bounds, Point, Size, Transform};
pub use id::NodeId;
pub use phase::{PhaseState, RenderPhase};
pub use props::{NodeProps, PositionProps};
pub use selector::Selector;
pub use tree::{AsyncEffect, Capabilities, DesignNode, DesignTree, EntityRefs, PropsParser};
