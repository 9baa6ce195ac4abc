//! C4: Model — a graph, its terms, θ, and an optional partial vertex order, bundled so the
//! sampler can propose/accept/roll-back dyad flips without knowing about individual terms.

use crate::error::{Result, SamplerError};
use crate::graph::Graph;
use crate::term::Term;

/// Holds a [`Graph`], an ordered list of [`Term`]s, a parameter vector θ, and an optional
/// partial vertex order π.
///
/// Grounded on the teacher crate's `Particle`/`Particles` pattern (`SPEC_FULL.md`
/// DESIGN.md): derived state (here, the statistic vector and log-likelihood) is always
/// recomputed from the owned terms rather than cached independently, so it can never drift
/// out of sync with the underlying graph.
pub struct Model {
    graph: Graph,
    terms: Vec<Box<dyn Term>>,
    theta: Vec<f64>,
    partial_order: Option<Vec<f64>>,
    /// The dyad a `dyad_update` is currently outstanding for, if any. Enforces the
    /// at-most-one-outstanding-proposal invariant (`SPEC_FULL.md` §3).
    pending: Option<(usize, usize)>,
}

impl Model {
    /// Construct a `Model`, initializing every term from `graph`.
    pub fn new(
        graph: Graph,
        mut terms: Vec<Box<dyn Term>>,
        theta: Vec<f64>,
        partial_order: Option<Vec<f64>>,
    ) -> Result<Self> {
        if theta.len() != terms.len() {
            return Err(SamplerError::configuration(format!(
                "theta has {} entries but there are {} terms",
                theta.len(),
                terms.len()
            )));
        }
        if let Some(pi) = &partial_order {
            if pi.len() != graph.size() {
                return Err(SamplerError::configuration(format!(
                    "partial order has length {} but graph has {} vertices",
                    pi.len(),
                    graph.size()
                )));
            }
        }
        for term in &mut terms {
            term.initialize(&graph);
        }
        Ok(Self {
            graph,
            terms,
            theta,
            partial_order,
            pending: None,
        })
    }

    /// The underlying graph.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The optional partial vertex order π.
    pub fn partial_order(&self) -> Option<&[f64]> {
        self.partial_order.as_deref()
    }

    /// Replace θ. Must have the same length as the term list.
    pub fn set_thetas(&mut self, theta: Vec<f64>) -> Result<()> {
        if theta.len() != self.terms.len() {
            return Err(SamplerError::configuration(format!(
                "theta has {} entries but model has {} terms",
                theta.len(),
                self.terms.len()
            )));
        }
        self.theta = theta;
        Ok(())
    }

    /// θ.
    pub fn thetas(&self) -> &[f64] {
        &self.theta
    }

    /// The number of terms (and hence the dimensionality of [`Model::statistics`]).
    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    /// Term names, in order, for labeling model-frame columns.
    pub fn term_names(&self) -> Vec<&str> {
        self.terms.iter().map(|t| t.name()).collect()
    }

    /// The current statistic vector, reading every term's `value()`.
    pub fn statistics(&self) -> Vec<f64> {
        self.terms.iter().map(|t| t.value()).collect()
    }

    /// θ · stats.
    pub fn log_lik(&self) -> f64 {
        self.theta
            .iter()
            .zip(self.statistics())
            .map(|(t, s)| t * s)
            .sum()
    }

    /// Whether dyad `(u, v)` is currently present in the committed graph.
    pub fn has_edge(&self, u: usize, v: usize) -> bool {
        self.graph.has_edge(u, v)
    }

    /// Fallible variant of [`Model::has_edge`] that rejects out-of-range vertex indices
    /// instead of panicking (`SPEC_FULL.md` §4.7 error kind 1: "head/tail out of range").
    pub fn try_has_edge(&self, u: usize, v: usize) -> Result<bool> {
        self.graph.try_has_edge(u, v)
    }

    /// Stamp the graph's `__order__` vertex attribute with `vert_order` (`SPEC_FULL.md`
    /// §4.6.1), so a generated network records the visitation order that produced it.
    pub fn stamp_order(&mut self, vert_order: &[usize]) -> Result<()> {
        self.graph.stamp_order(vert_order)
    }

    /// Consume the model and return its graph, discarding terms/θ/π. Used once generation
    /// is finished and only the resulting network is needed.
    pub fn into_graph(self) -> Graph {
        self.graph
    }

    /// Propose flipping dyad `(u, v)`, given the committed visitation history
    /// `order[0..i]`. Fails with [`SamplerError::InvariantViolation`] if a proposal is
    /// already outstanding or if `(u, v)` already exists (sequential generation only ever
    /// proposes adding an absent dyad, `SPEC_FULL.md` §4.6/§4.7).
    pub fn dyad_update(&mut self, u: usize, v: usize, order: &[usize], i: usize) -> Result<()> {
        if self.pending.is_some() {
            return Err(SamplerError::invariant(
                "dyad_update called with a proposal already outstanding",
            ));
        }
        if self.graph.try_has_edge(u, v)? {
            return Err(SamplerError::invariant(format!(
                "proposed add on dyad ({u}, {v}) which already exists"
            )));
        }
        for term in &mut self.terms {
            term.dyad_update(u, v, order, i);
        }
        self.pending = Some((u, v));
        Ok(())
    }

    /// Accept the outstanding proposal: toggle the dyad into the graph and commit every
    /// term's pending state.
    pub fn commit(&mut self) -> Result<()> {
        let (u, v) = self.pending.take().ok_or_else(|| {
            SamplerError::invariant("commit called with no proposal outstanding")
        })?;
        if self.graph.has_edge(u, v) {
            return Err(SamplerError::invariant(format!(
                "commit would add dyad ({u}, {v}) which already exists"
            )));
        }
        self.graph.toggle(u, v);
        for term in &mut self.terms {
            term.commit();
        }
        Ok(())
    }

    /// Reject the outstanding proposal: every term rolls back to its pre-proposal state,
    /// and the graph is left untouched (it was never toggled).
    pub fn rollback(&mut self) -> Result<()> {
        if self.pending.take().is_none() {
            return Err(SamplerError::invariant(
                "rollback called with no proposal outstanding",
            ));
        }
        for term in &mut self.terms {
            term.rollback();
        }
        Ok(())
    }

    /// Deep-clone the model: the graph, every boxed term (via `Term::clone_box`), θ, and π.
    pub fn deep_clone(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            terms: self.terms.iter().map(|t| t.clone_box()).collect(),
            theta: self.theta.clone(),
            partial_order: self.partial_order.clone(),
            pending: None,
        }
    }

    /// Clone this model's (terms, θ, π) onto a fresh empty graph of the same size and
    /// directedness — the `no_tie_model` construction from `SPEC_FULL.md` §4.6.
    pub fn empty_clone(&self) -> Result<Self> {
        let empty = Graph::empty_graph(self.graph.size(), self.graph.is_directed());
        Model::new(
            empty,
            self.terms.iter().map(|t| t.clone_box()).collect(),
            self.theta.clone(),
            self.partial_order.clone(),
        )
    }
}
