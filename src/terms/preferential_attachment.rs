//! A toy order-dependent term: a preferential-attachment-style score.
//!
//! Real preferential-attachment terms weigh new edges by how "popular" the alter already
//! is among vertices placed so far in the visitation order. This fixture captures that
//! shape — consulting `order[0..i]` rather than the whole graph — without claiming to be a
//! production statistic; it exists so the engine's order-dependent plumbing has something
//! real to exercise in tests (`SPEC_FULL.md` §1 scopes the real term library out).

use hashbrown::HashSet;

use crate::graph::Graph;
use crate::term::Term;

#[derive(Debug, Clone)]
struct Pending {
    u: usize,
    v: usize,
    delta: f64,
}

/// Sums, over every accepted edge, the number of already-placed vertices (per the
/// committed visitation prefix `order[0..i]`) that are adjacent to the edge's alter at the
/// moment the edge is proposed.
#[derive(Debug, Clone)]
pub struct PreferentialAttachmentTerm {
    adjacency: Vec<HashSet<usize>>,
    score: f64,
    pending: Option<Pending>,
}

impl PreferentialAttachmentTerm {
    /// A fresh, uninitialized term. Call [`Term::initialize`] before use.
    pub fn new() -> Self {
        Self {
            adjacency: Vec::new(),
            score: 0.0,
            pending: None,
        }
    }
}

impl Default for PreferentialAttachmentTerm {
    fn default() -> Self {
        Self::new()
    }
}

impl Term for PreferentialAttachmentTerm {
    fn initialize(&mut self, graph: &Graph) {
        self.adjacency = (0..graph.size())
            .map(|v| graph.neighbors(v).collect())
            .collect();
        self.score = 0.0;
        self.pending = None;
    }

    fn dyad_update(&mut self, u: usize, v: usize, order: &[usize], i: usize) {
        let placed = &order[..i.min(order.len())];
        let alter_degree_among_placed = placed
            .iter()
            .filter(|&&w| w != u && self.adjacency[v].contains(&w))
            .count() as f64;
        self.pending = Some(Pending {
            u,
            v,
            delta: alter_degree_among_placed,
        });
    }

    fn rollback(&mut self) {
        self.pending = None;
    }

    fn commit(&mut self) {
        if let Some(Pending { u, v, delta }) = self.pending.take() {
            self.score += delta;
            self.adjacency[u].insert(v);
            self.adjacency[v].insert(u);
        }
    }

    fn value(&self) -> f64 {
        match &self.pending {
            Some(p) => self.score + p.delta,
            None => self.score,
        }
    }

    fn name(&self) -> &str {
        "preferential_attachment"
    }

    fn is_dyad_independent(&self) -> bool {
        false
    }

    fn is_order_independent(&self) -> bool {
        false
    }

    fn clone_box(&self) -> Box<dyn Term> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_on_empty_graph() {
        let g = Graph::empty_graph(3, false);
        let mut term = PreferentialAttachmentTerm::new();
        term.initialize(&g);
        assert_eq!(term.value(), 0.0);
    }

    #[test]
    fn counts_placed_neighbors_of_alter() {
        let mut g = Graph::empty_graph(4, false);
        g.toggle(1, 2);
        g.toggle(1, 3);
        let mut term = PreferentialAttachmentTerm::new();
        term.initialize(&g);
        let order = vec![2, 3, 0, 1];
        // proposing (0, 1): alter = 1, already adjacent to {2, 3}, both placed before i=2
        term.dyad_update(0, 1, &order, 2);
        assert_eq!(term.value(), 2.0);
    }
}
