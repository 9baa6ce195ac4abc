//! The triangle-count term: graph-shape-dependent, order-independent.

use hashbrown::HashSet;

use crate::graph::Graph;
use crate::term::Term;

#[derive(Debug, Clone)]
struct Pending {
    u: usize,
    v: usize,
    delta: f64,
}

/// Counts the number of triangles (3-cycles) in an undirected graph.
///
/// Maintains its own mirror of the committed adjacency so that `dyad_update` — which is
/// never handed a live `&Graph` (`SPEC_FULL.md` §4.3) — can still compute
/// `|N(u) ∩ N(v)|`, the number of triangles the proposed edge `(u, v)` would close.
#[derive(Debug, Clone)]
pub struct TrianglesTerm {
    adjacency: Vec<HashSet<usize>>,
    count: f64,
    pending: Option<Pending>,
}

impl TrianglesTerm {
    /// A fresh, uninitialized triangle term. Call [`Term::initialize`] before use.
    pub fn new() -> Self {
        Self {
            adjacency: Vec::new(),
            count: 0.0,
            pending: None,
        }
    }

    fn count_triangles(adjacency: &[HashSet<usize>]) -> f64 {
        let mut total = 0usize;
        for u in 0..adjacency.len() {
            for &v in &adjacency[u] {
                if v <= u {
                    continue;
                }
                for &w in &adjacency[u] {
                    if w <= v {
                        continue;
                    }
                    if adjacency[v].contains(&w) {
                        total += 1;
                    }
                }
            }
        }
        total as f64
    }
}

impl Default for TrianglesTerm {
    fn default() -> Self {
        Self::new()
    }
}

impl Term for TrianglesTerm {
    fn initialize(&mut self, graph: &Graph) {
        self.adjacency = (0..graph.size())
            .map(|v| graph.neighbors(v).collect())
            .collect();
        self.count = Self::count_triangles(&self.adjacency);
        self.pending = None;
    }

    fn dyad_update(&mut self, u: usize, v: usize, _order: &[usize], _i: usize) {
        let delta = self.adjacency[u].intersection(&self.adjacency[v]).count() as f64;
        self.pending = Some(Pending { u, v, delta });
    }

    fn rollback(&mut self) {
        self.pending = None;
    }

    fn commit(&mut self) {
        if let Some(Pending { u, v, delta }) = self.pending.take() {
            self.count += delta;
            self.adjacency[u].insert(v);
            self.adjacency[v].insert(u);
        }
    }

    fn value(&self) -> f64 {
        match &self.pending {
            Some(p) => self.count + p.delta,
            None => self.count,
        }
    }

    fn name(&self) -> &str {
        "triangles"
    }

    fn is_dyad_independent(&self) -> bool {
        false
    }

    fn is_order_independent(&self) -> bool {
        true
    }

    fn clone_box(&self) -> Box<dyn Term> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_triangle_in_k3() {
        let mut g = Graph::empty_graph(3, false);
        g.toggle(0, 1);
        g.toggle(1, 2);
        g.toggle(0, 2);
        let mut term = TrianglesTerm::new();
        term.initialize(&g);
        assert_eq!(term.value(), 1.0);
    }

    #[test]
    fn closing_a_triangle_adds_one() {
        let mut g = Graph::empty_graph(3, false);
        g.toggle(0, 1);
        g.toggle(1, 2);
        let mut term = TrianglesTerm::new();
        term.initialize(&g);
        assert_eq!(term.value(), 0.0);
        let order = vec![0, 1, 2];
        term.dyad_update(0, 2, &order, 2);
        assert_eq!(term.value(), 1.0);
        term.commit();
        assert_eq!(term.value(), 1.0);
    }

    #[test]
    fn rollback_after_proposal_restores_count() {
        let mut g = Graph::empty_graph(3, false);
        g.toggle(0, 1);
        g.toggle(1, 2);
        let mut term = TrianglesTerm::new();
        term.initialize(&g);
        let order = vec![0, 1, 2];
        term.dyad_update(0, 2, &order, 2);
        term.rollback();
        assert_eq!(term.value(), 0.0);
    }
}
