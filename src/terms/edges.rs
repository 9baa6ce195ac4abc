//! The edge-count term: the canonical dyad-independent, order-independent statistic.

use crate::graph::Graph;
use crate::term::Term;

/// Counts the number of present dyads.
///
/// Dyad-independent (its delta for flipping `(u, v)` never depends on the rest of the
/// graph) and order-independent (never consults `order`/`i`).
#[derive(Debug, Clone, Default)]
pub struct EdgesTerm {
    count: f64,
    pending: bool,
}

impl EdgesTerm {
    /// A fresh, uninitialized edges term. Call [`Term::initialize`] before use.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Term for EdgesTerm {
    fn initialize(&mut self, graph: &Graph) {
        self.count = graph.edge_count() as f64;
        self.pending = false;
    }

    fn dyad_update(&mut self, _u: usize, _v: usize, _order: &[usize], _i: usize) {
        // Every dyad_update proposes adding a currently-absent dyad (SPEC_FULL.md §4.6),
        // so the edge count always increases by exactly one.
        self.pending = true;
    }

    fn rollback(&mut self) {
        self.pending = false;
    }

    fn commit(&mut self) {
        if self.pending {
            self.count += 1.0;
            self.pending = false;
        }
    }

    fn value(&self) -> f64 {
        if self.pending {
            self.count + 1.0
        } else {
            self.count
        }
    }

    fn name(&self) -> &str {
        "edges"
    }

    fn is_dyad_independent(&self) -> bool {
        true
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
    fn initializes_from_graph() {
        let mut g = Graph::empty_graph(3, false);
        g.toggle(0, 1);
        let mut term = EdgesTerm::new();
        term.initialize(&g);
        assert_eq!(term.value(), 1.0);
    }

    fn ones_order() -> Vec<usize> {
        vec![0, 1, 2]
    }

    #[test]
    fn dyad_update_then_rollback_restores_value() {
        let g = Graph::empty_graph(3, false);
        let mut term = EdgesTerm::new();
        term.initialize(&g);
        let before = term.value();
        let order = ones_order();
        term.dyad_update(0, 1, &order, 1);
        assert_eq!(term.value(), before + 1.0);
        term.rollback();
        assert_eq!(term.value(), before);
    }

    #[test]
    fn commit_persists_the_increment() {
        let g = Graph::empty_graph(3, false);
        let mut term = EdgesTerm::new();
        term.initialize(&g);
        let order = ones_order();
        term.dyad_update(0, 1, &order, 1);
        term.commit();
        assert_eq!(term.value(), 1.0);
        term.dyad_update(0, 2, &order, 2);
        assert_eq!(term.value(), 2.0);
        term.rollback();
        assert_eq!(term.value(), 1.0);
    }
}
