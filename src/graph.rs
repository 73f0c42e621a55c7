//! Minimal structure model for cross-run aggregation
//!
//! Graphs returned by independent discovery runs are compared **by
//! variable name**, never by reference. [`EdgeKey`] canonicalizes an
//! unordered variable pair so that `{a,b}` and `{b,a}` count as the same
//! candidate; [`Orientation`] records how a particular run oriented that
//! adjacency, relative to the canonical pair ordering.
//!
//! Only the operations aggregation needs live here: edge insertion,
//! adjacency iteration, distinct-pair iteration, and directed
//! reachability for the ancestor diagnostic.

use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// Canonical unordered variable pair; the unit counted in edge mode.
///
/// The constructor sorts the two names so `EdgeKey::new("B", "A") ==
/// EdgeKey::new("A", "B")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    a: String,
    b: String,
}

impl EdgeKey {
    pub fn new(x: &str, y: &str) -> Self {
        if x <= y {
            Self {
                a: x.to_string(),
                b: y.to_string(),
            }
        } else {
            Self {
                a: y.to_string(),
                b: x.to_string(),
            }
        }
    }

    /// First endpoint in canonical (lexicographic) order.
    pub fn first(&self) -> &str {
        &self.a
    }

    /// Second endpoint in canonical order.
    pub fn second(&self) -> &str {
        &self.b
    }
}

impl std::fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -- {}", self.a, self.b)
    }
}

/// How a run oriented an adjacency, relative to the canonical pair order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    /// No direction claimed.
    Undirected,
    /// Directed from `first()` to `second()`.
    Forward,
    /// Directed from `second()` to `first()`.
    Backward,
}

/// One edge of a discovered structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureEdge {
    pub key: EdgeKey,
    pub orientation: Orientation,
}

/// A discovered structure: named variables plus a list of edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureGraph {
    variables: Vec<String>,
    edges: Vec<StructureEdge>,
}

impl StructureGraph {
    pub fn new(variables: Vec<String>) -> Self {
        Self {
            variables,
            edges: Vec::new(),
        }
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn edges(&self) -> &[StructureEdge] {
        &self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.iter().any(|v| v == name)
    }

    /// Add an undirected adjacency between `x` and `y`.
    pub fn add_undirected(&mut self, x: &str, y: &str) {
        self.edges.push(StructureEdge {
            key: EdgeKey::new(x, y),
            orientation: Orientation::Undirected,
        });
    }

    /// Add a directed edge `from -> to`.
    pub fn add_directed(&mut self, from: &str, to: &str) {
        let key = EdgeKey::new(from, to);
        let orientation = if key.first() == from {
            Orientation::Forward
        } else {
            Orientation::Backward
        };
        self.edges.push(StructureEdge { key, orientation });
    }

    /// True if any edge (of any orientation) joins `x` and `y`.
    pub fn is_adjacent(&self, x: &str, y: &str) -> bool {
        let key = EdgeKey::new(x, y);
        self.edges.iter().any(|e| e.key == key)
    }

    /// Distinct unordered pairs present in this graph. A pair appearing
    /// more than once (e.g. once directed, once undirected) yields one
    /// entry; the first occurrence's orientation wins.
    pub fn distinct_pairs(&self) -> Vec<StructureEdge> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for edge in &self.edges {
            if seen.insert(edge.key.clone()) {
                out.push(edge.clone());
            }
        }
        out
    }

    /// Directed endpoints of an edge, if it is directed.
    fn directed_ends(edge: &StructureEdge) -> Option<(&str, &str)> {
        match edge.orientation {
            Orientation::Forward => Some((edge.key.first(), edge.key.second())),
            Orientation::Backward => Some((edge.key.second(), edge.key.first())),
            Orientation::Undirected => None,
        }
    }

    /// True if `ancestor` reaches `descendant` through directed edges.
    ///
    /// Used only for the evaluation-time ancestor annotation; a variable
    /// is considered an ancestor of itself, matching the convention of
    /// the diagnostic this feeds.
    pub fn is_ancestor_of(&self, ancestor: &str, descendant: &str) -> bool {
        if ancestor == descendant {
            return self.has_variable(ancestor);
        }

        let mut queue = VecDeque::from([ancestor]);
        let mut visited = HashSet::from([ancestor]);

        while let Some(current) = queue.pop_front() {
            for edge in &self.edges {
                if let Some((from, to)) = Self::directed_ends(edge) {
                    if from == current && visited.insert(to) {
                        if to == descendant {
                            return true;
                        }
                        queue.push_back(to);
                    }
                }
            }
        }

        false
    }
}
