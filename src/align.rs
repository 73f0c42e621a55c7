//! Canonical variable identity reconciliation
//!
//! Graphs returned by independent runs carry their own variable objects;
//! nothing guarantees those are the same allocations, or even the same
//! column order, across runs. Before any structural comparison or
//! counting, every run result is mapped onto one canonical identity set
//! by name. Counting against un-reconciled identities is a correctness
//! bug, so the aggregators only accept graphs that went through here.

use crate::error::{Result, StabilityError};
use crate::graph::{Orientation, StructureGraph};
use std::collections::HashMap;

/// The canonical variable set for one aggregation run, fixed by the
/// source dataset's column order.
#[derive(Debug, Clone)]
pub struct CanonicalVariables {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl CanonicalVariables {
    pub fn from_names(names: &[String]) -> Self {
        let index = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        Self {
            names: names.to_vec(),
            index,
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Resolve a name to its canonical slot, or fail.
    pub fn require(&self, name: &str) -> Result<&str> {
        match self.index.get(name) {
            Some(&i) => Ok(&self.names[i]),
            None => Err(StabilityError::MissingVariable {
                name: name.to_string(),
            }),
        }
    }

    /// Rewrite a run result onto the canonical identity set.
    ///
    /// The output graph's variable list is the full canonical list in
    /// canonical order, and every edge endpoint is the canonical name
    /// slot. Fails with `MissingVariable` if the run result references a
    /// name with no canonical counterpart. Never mutates the input, and
    /// aligning an already-aligned graph is a no-op.
    pub fn align(&self, result: &StructureGraph) -> Result<StructureGraph> {
        for name in result.variables() {
            self.require(name)?;
        }

        let mut aligned = StructureGraph::new(self.names.clone());

        for edge in result.edges() {
            let first = self.require(edge.key.first())?;
            let second = self.require(edge.key.second())?;

            match edge.orientation {
                Orientation::Undirected => aligned.add_undirected(first, second),
                Orientation::Forward => aligned.add_directed(first, second),
                Orientation::Backward => aligned.add_directed(second, first),
            }
        }

        Ok(aligned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canon() -> CanonicalVariables {
        CanonicalVariables::from_names(&[
            "A".to_string(),
            "B".to_string(),
            "C".to_string(),
        ])
    }

    #[test]
    fn test_align_remaps_to_full_canonical_list() {
        let canon = canon();
        // Run result over a subset, different order
        let mut g = StructureGraph::new(vec!["C".to_string(), "A".to_string()]);
        g.add_directed("C", "A");

        let aligned = canon.align(&g).unwrap();
        assert_eq!(aligned.variables(), &["A", "B", "C"]);
        assert!(aligned.is_adjacent("A", "C"));
        assert_eq!(aligned.edge_count(), 1);
    }

    #[test]
    fn test_align_preserves_orientation() {
        let canon = canon();
        let mut g = StructureGraph::new(vec!["A".to_string(), "B".to_string()]);
        g.add_directed("B", "A");

        let aligned = canon.align(&g).unwrap();
        assert_eq!(aligned.edges()[0].orientation, Orientation::Backward);
        assert!(!aligned.is_ancestor_of("A", "B"));
        assert!(aligned.is_ancestor_of("B", "A"));
    }

    #[test]
    fn test_align_idempotent() {
        let canon = canon();
        let mut g = StructureGraph::new(vec!["B".to_string(), "C".to_string()]);
        g.add_undirected("B", "C");

        let once = canon.align(&g).unwrap();
        let twice = canon.align(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_align_does_not_mutate_input() {
        let canon = canon();
        let mut g = StructureGraph::new(vec!["B".to_string()]);
        g.add_undirected("B", "B"); // degenerate but owned by the input
        let before = g.clone();
        let _ = canon.align(&g);
        assert_eq!(g, before);
    }

    #[test]
    fn test_unknown_variable_fails() {
        let canon = canon();
        let mut g = StructureGraph::new(vec!["A".to_string(), "Z".to_string()]);
        g.add_undirected("A", "Z");

        let result = canon.align(&g);
        assert!(matches!(
            result,
            Err(StabilityError::MissingVariable { name }) if name == "Z"
        ));
    }

    #[test]
    fn test_unknown_edge_endpoint_fails() {
        let canon = canon();
        // Variables check out but an edge references a stranger
        let mut g = StructureGraph::new(vec!["A".to_string()]);
        g.add_undirected("A", "Q");
        assert!(canon.align(&g).is_err());
    }

    #[test]
    fn test_require() {
        let canon = canon();
        assert_eq!(canon.require("B").unwrap(), "B");
        assert!(canon.require("missing").is_err());
        assert!(canon.contains("A"));
        assert!(!canon.contains("missing"));
        assert_eq!(canon.len(), 3);
    }
}
