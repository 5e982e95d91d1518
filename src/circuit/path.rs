//! Graph search for topology-integrity checks.
//!
//! Answers "does a path exist between two nodes through element
//! connections, subject to a predicate on which elements may be traversed?"
//! The search may pass through ground via any terminal flagged as having a
//! ground connection.
//!
//! The search is breadth-first with an explicit queue and a visited buffer
//! allocated per invocation, so it is re-entrant per element pair and never
//! recurses - no shared mutable state across checks, no stack-depth
//! surprises on large circuits.

use std::collections::VecDeque;

use crate::elements::{Element, ElementKind};

/// Inductor current-continuity match tolerance in amperes.
const CURRENT_MATCH_TOLERANCE: f64 = 1e-10;

/// Which elements a path search may traverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathMode {
    /// Exclude current sources; inductor hops must carry a matching current.
    /// Used to find a current-continuity path for an inductor or a current
    /// source.
    Inductor,
    /// Only wires and voltage sources: detects resistance-free
    /// voltage-source loops.
    Voltage,
    /// Only wires: detects capacitors shorted by pure wire.
    Short,
    /// Wires, capacitors, and voltage sources: detects resistance-free
    /// capacitor loops.
    CapVoltage,
}

/// A single path query over the element graph.
pub struct PathFinder<'a> {
    mode: PathMode,
    /// Element index the query is about; never traversed.
    first: usize,
    /// Destination node index.
    dest: usize,
    elements: &'a [Box<dyn Element>],
    node_count: usize,
}

impl<'a> PathFinder<'a> {
    /// Set up a query for paths ending at node `dest`, ignoring element
    /// `first` (the element under test).
    pub fn new(
        mode: PathMode,
        first: usize,
        dest: usize,
        elements: &'a [Box<dyn Element>],
        node_count: usize,
    ) -> Self {
        Self {
            mode,
            first,
            dest,
            elements,
            node_count,
        }
    }

    /// Search for a path from `start` with no depth bound.
    pub fn find_path(&self, start: usize) -> bool {
        self.find_path_bounded(start, usize::MAX)
    }

    /// Search for a path from `start` of at most `max_depth` hops.
    pub fn find_path_bounded(&self, start: usize, max_depth: usize) -> bool {
        let mut visited = vec![false; self.node_count];
        let mut queue: VecDeque<(usize, usize)> = VecDeque::new();
        visited[start] = true;
        queue.push_back((start, 0));

        while let Some((n1, depth)) = queue.pop_front() {
            if n1 == self.dest {
                return true;
            }
            if depth >= max_depth {
                continue;
            }

            for (i, ce) in self.elements.iter().enumerate() {
                if i == self.first || !self.traversable(ce.as_ref()) {
                    continue;
                }

                // From ground the path may enter any terminal that has its
                // own ground connection.
                if n1 == 0 {
                    for j in 0..ce.post_count() {
                        if ce.has_ground_connection(j) {
                            Self::visit(&mut visited, &mut queue, ce.node(j), depth + 1);
                        }
                    }
                }

                let Some(j) = (0..ce.post_count()).find(|&j| ce.node(j) == n1) else {
                    continue;
                };

                if ce.has_ground_connection(j) {
                    Self::visit(&mut visited, &mut queue, 0, depth + 1);
                }

                // For current-continuity searches an inductor only carries
                // the path if its current matches the element under test.
                if self.mode == PathMode::Inductor && ce.kind() == ElementKind::Inductor {
                    let mut c = ce.current();
                    if j == 0 {
                        c = -c;
                    }
                    let first_current = self.elements[self.first].current();
                    if (c - first_current).abs() > CURRENT_MATCH_TOLERANCE {
                        continue;
                    }
                }

                for k in 0..ce.post_count() {
                    if k != j && ce.get_connection(j, k) {
                        Self::visit(&mut visited, &mut queue, ce.node(k), depth + 1);
                    }
                }
            }
        }

        false
    }

    fn visit(visited: &mut [bool], queue: &mut VecDeque<(usize, usize)>, node: usize, depth: usize) {
        if !visited[node] {
            visited[node] = true;
            queue.push_back((node, depth));
        }
    }

    fn traversable(&self, ce: &dyn Element) -> bool {
        match self.mode {
            PathMode::Inductor => ce.kind() != ElementKind::CurrentSource,
            PathMode::Voltage => ce.is_wire() || ce.kind().is_voltage_source(),
            PathMode::Short => ce.is_wire(),
            PathMode::CapVoltage => {
                ce.is_wire()
                    || ce.kind() == ElementKind::Capacitor
                    || ce.kind().is_voltage_source()
            }
        }
    }
}
