//! Core types for the node arena.

use std::fmt;

/// A terminal location key, used only during topology discovery to merge
/// element posts that share a physical position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    /// Create a new post location.
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// An (element, terminal) pair recording which element post maps to a node.
///
/// Owned by the node; the element side of the back-reference is the node
/// index stored via `Element::set_node`.
#[derive(Debug, Clone, Copy)]
pub struct NodeLink {
    /// Index of the element in the simulator's element list.
    pub element: usize,
    /// Terminal index on that element.
    pub post: usize,
}

/// A point where one or more element terminals connect.
///
/// Node 0 is always the ground reference and is never assigned a matrix row.
/// The node list is discarded and rebuilt on every topology re-analysis.
#[derive(Debug, Clone, Default)]
pub struct CircuitNode {
    /// Position key used during discovery. `None` for synthetic nodes
    /// (ground fallback, element-internal nodes).
    pub pos: Option<Point>,
    /// A synthetic node private to one element (e.g. a companion-model
    /// auxiliary node). Internal nodes are excluded from the unconnected-node
    /// stub insertion.
    pub internal: bool,
    /// Element terminals connected to this node.
    pub links: Vec<NodeLink>,
}

impl CircuitNode {
    /// Create a node at a physical post position.
    pub fn at(pos: Point) -> Self {
        Self {
            pos: Some(pos),
            internal: false,
            links: Vec::new(),
        }
    }

    /// Create a synthetic node with no physical position.
    pub fn synthetic(internal: bool) -> Self {
        Self {
            pos: None,
            internal,
            links: Vec::new(),
        }
    }
}
