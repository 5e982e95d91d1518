//! Node arena and topology-integrity search.
//!
//! Nodes and elements cross-reference each other: a node records which
//! element terminals land on it, and each element records the node index of
//! each of its terminals. Both sides are index-based (dense arrays referenced
//! by `usize`) so a topology rebuild can discard and recreate the whole node
//! list without lifetime gymnastics.

mod path;
mod types;

pub use path::{PathFinder, PathMode};
pub use types::{CircuitNode, NodeLink, Point};
