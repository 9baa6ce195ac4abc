//! C2: a mutable (un)directed simple graph with toggleable dyads and attribute storage.

use hashbrown::HashSet;
use std::collections::HashMap;

use crate::error::{Result, SamplerError};

/// The reserved vertex attribute name the engine stamps with each vertex's rank in the
/// sampled visitation order (`SPEC_FULL.md` §3, §4.6.1).
pub const ORDER_ATTRIBUTE: &str = "__order__";

/// A mutable, simple (no self-loops, no multi-edges) graph on vertices `0..n`.
///
/// Adjacency is a `HashSet<usize>` per vertex (grounded on the sparse set-of-neighbours
/// representation `SPEC_FULL.md` §9 recommends for the graph sizes this engine targets),
/// giving O(1) expected `has_edge`/`toggle` and O(deg(v)) `neighbors`.
#[derive(Debug, Clone)]
pub struct Graph {
    n: usize,
    directed: bool,
    adjacency: Vec<HashSet<usize>>,
    attributes: HashMap<String, Vec<f64>>,
}

impl Graph {
    /// Construct an empty graph on `n` vertices.
    pub fn empty_graph(n: usize, directed: bool) -> Self {
        Self {
            n,
            directed,
            adjacency: vec![HashSet::new(); n],
            attributes: HashMap::new(),
        }
    }

    /// Number of vertices.
    pub fn size(&self) -> usize {
        self.n
    }

    /// Whether this graph treats dyads as ordered pairs.
    pub fn is_directed(&self) -> bool {
        self.directed
    }

    /// Maximum number of dyads: `n(n-1)` directed, `n(n-1)/2` undirected.
    pub fn max_edges(&self) -> usize {
        if self.directed {
            self.n * self.n.saturating_sub(1)
        } else {
            self.n * self.n.saturating_sub(1) / 2
        }
    }

    fn check_vertex(&self, v: usize) -> Result<()> {
        if v >= self.n {
            return Err(SamplerError::configuration(format!(
                "vertex {v} out of range for graph of size {}",
                self.n
            )));
        }
        Ok(())
    }

    /// Whether dyad `(u, v)` is present. Symmetric iff the graph is undirected.
    pub fn has_edge(&self, u: usize, v: usize) -> bool {
        self.adjacency[u].contains(&v)
    }

    /// Fallible variant of [`Graph::has_edge`] that validates vertex indices.
    pub fn try_has_edge(&self, u: usize, v: usize) -> Result<bool> {
        self.check_vertex(u)?;
        self.check_vertex(v)?;
        Ok(self.has_edge(u, v))
    }

    /// Flip the presence of dyad `(u, v)`. Its own inverse: `toggle` twice restores the
    /// original state.
    pub fn toggle(&mut self, u: usize, v: usize) {
        if u == v {
            return;
        }
        if self.adjacency[u].contains(&v) {
            self.adjacency[u].remove(&v);
            if !self.directed {
                self.adjacency[v].remove(&u);
            }
        } else {
            self.adjacency[u].insert(v);
            if !self.directed {
                self.adjacency[v].insert(u);
            }
        }
    }

    /// Fallible variant of [`Graph::toggle`] that validates vertex indices and rejects
    /// self-loops.
    pub fn try_toggle(&mut self, u: usize, v: usize) -> Result<()> {
        self.check_vertex(u)?;
        self.check_vertex(v)?;
        if u == v {
            return Err(SamplerError::configuration("self-loops are not permitted"));
        }
        self.toggle(u, v);
        Ok(())
    }

    /// Out-neighbors of `v` (for undirected graphs, simply the neighbors of `v`).
    pub fn neighbors(&self, v: usize) -> impl Iterator<Item = usize> + '_ {
        self.adjacency[v].iter().copied()
    }

    /// All present dyads, each undirected pair emitted once with `u < v`; each directed
    /// pair emitted as stored.
    pub fn edgelist(&self) -> Vec<(usize, usize)> {
        let mut edges = Vec::new();
        for u in 0..self.n {
            for &v in &self.adjacency[u] {
                if self.directed || u < v {
                    edges.push((u, v));
                }
            }
        }
        edges
    }

    /// Number of dyads currently present.
    pub fn edge_count(&self) -> usize {
        self.edgelist().len()
    }

    /// Read a previously-set per-vertex attribute vector.
    pub fn attribute(&self, name: &str) -> Option<&[f64]> {
        self.attributes.get(name).map(Vec::as_slice)
    }

    /// Set a per-vertex attribute vector; must have exactly `size()` entries.
    pub fn set_attribute(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        if values.len() != self.n {
            return Err(SamplerError::configuration(format!(
                "attribute vector has length {} but graph has {} vertices",
                values.len(),
                self.n
            )));
        }
        self.attributes.insert(name.into(), values);
        Ok(())
    }

    /// Store a discrete per-vertex variable, encoded as `f64` for uniform attribute
    /// storage (matching the spec's "named vector-valued per-vertex data" model, §3).
    pub fn add_discrete_variable(&mut self, name: impl Into<String>, values: &[i64]) -> Result<()> {
        let as_f64: Vec<f64> = values.iter().map(|&v| v as f64).collect();
        self.set_attribute(name, as_f64)
    }

    /// Stamp [`ORDER_ATTRIBUTE`] with the inverse permutation of `vert_order`: vertex `v`'s
    /// value is `v`'s rank (position) within `vert_order`.
    pub fn stamp_order(&mut self, vert_order: &[usize]) -> Result<()> {
        if vert_order.len() != self.n {
            return Err(SamplerError::configuration(format!(
                "vert_order has length {} but graph has {} vertices",
                vert_order.len(),
                self.n
            )));
        }
        let mut ranks = vec![0.0; self.n];
        for (rank, &vertex) in vert_order.iter().enumerate() {
            ranks[vertex] = rank as f64;
        }
        self.set_attribute(ORDER_ATTRIBUTE, ranks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_is_its_own_inverse() {
        let mut g = Graph::empty_graph(4, false);
        assert!(!g.has_edge(0, 1));
        g.toggle(0, 1);
        assert!(g.has_edge(0, 1));
        assert!(g.has_edge(1, 0));
        g.toggle(0, 1);
        assert!(!g.has_edge(0, 1));
        assert!(!g.has_edge(1, 0));
    }

    #[test]
    fn directed_toggle_is_asymmetric() {
        let mut g = Graph::empty_graph(3, true);
        g.toggle(0, 1);
        assert!(g.has_edge(0, 1));
        assert!(!g.has_edge(1, 0));
    }

    #[test]
    fn max_edges_matches_formula() {
        let undirected = Graph::empty_graph(4, false);
        assert_eq!(undirected.max_edges(), 6);
        let directed = Graph::empty_graph(4, true);
        assert_eq!(directed.max_edges(), 12);
    }

    #[test]
    fn edgelist_lists_each_undirected_pair_once() {
        let mut g = Graph::empty_graph(3, false);
        g.toggle(0, 1);
        g.toggle(1, 2);
        let mut edges = g.edgelist();
        edges.sort_unstable();
        assert_eq!(edges, vec![(0, 1), (1, 2)]);
    }

    #[test]
    fn stamp_order_is_inverse_permutation() {
        let mut g = Graph::empty_graph(3, false);
        g.stamp_order(&[2, 0, 1]).unwrap();
        let order = g.attribute(ORDER_ATTRIBUTE).unwrap();
        // vertex 2 is first visited (rank 0), vertex 0 second (rank 1), vertex 1 third (rank 2)
        assert_eq!(order, &[1.0, 2.0, 0.0]);
    }

    #[test]
    fn rejects_mismatched_attribute_length() {
        let mut g = Graph::empty_graph(3, false);
        assert!(g.set_attribute("x", vec![1.0, 2.0]).is_err());
    }

    #[test]
    fn self_loop_toggle_is_rejected() {
        let mut g = Graph::empty_graph(3, false);
        assert!(g.try_toggle(1, 1).is_err());
    }
}
