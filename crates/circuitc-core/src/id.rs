//! Stable ID newtype for design tree nodes.
//!
//! Node ids are arena indices: they are never reused within one
//! [`DesignTree`](crate::tree::DesignTree), even after a node is detached.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable node identifier within a design tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Returns the arena slot for this id.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
