//! C3: the `Term` contract — the one interface the core consumes from a term library.
//!
//! The engine never inspects a term's internals; it only calls the four lifecycle methods
//! below, in the order `initialize` (once) then any interleaving of
//! `dyad_update` → (`value` | drop) → (commit-by-toggling-the-graph | `rollback`).

use crate::graph::Graph;

/// An incremental network statistic.
///
/// Implementors own whatever internal cache they need to report [`Term::value`] in O(1)
/// expected time after every `initialize`/`dyad_update`/`rollback`. See `SPEC_FULL.md` §4.3
/// and §6 for the full contract, including the "compute the delta from the pre-toggle graph"
/// requirement.
pub trait Term: Send + Sync {
    /// Compute this term's internal state from scratch against `graph`.
    fn initialize(&mut self, graph: &Graph);

    /// Propose flipping dyad `(u, v)`, given that `order[0..i]` is the committed
    /// visitation history so far. After this call, [`Term::value`] reports the statistic
    /// as if the flip had already happened; the flip itself has not yet been applied to
    /// `graph`.
    ///
    /// At most one `dyad_update` may be outstanding at a time: a second call before
    /// `rollback` (or an implicit commit via toggling the graph) is a caller error.
    fn dyad_update(&mut self, u: usize, v: usize, order: &[usize], i: usize);

    /// Undo the last `dyad_update`, restoring the state [`Term::value`] reported before it.
    fn rollback(&mut self);

    /// Commit the last `dyad_update`: the proposed flip becomes the term's real state, so
    /// subsequent `value()` calls (absent a new `dyad_update`) report it.
    ///
    /// The spec (`SPEC_FULL.md` §3, §6) describes this as "commit (implicit on actual
    /// toggle)" rather than a named method on the minimal external contract; this port
    /// makes it an explicit trait method so [`crate::model::Model`] has something concrete
    /// to call when it toggles the graph, instead of terms guessing from side effects.
    fn commit(&mut self);

    /// The current statistic value.
    fn value(&self) -> f64;

    /// A short, stable identifier for this term (used in logging and model-frame column
    /// labels).
    fn name(&self) -> &str;

    /// Whether this term's value depends only on the dyad being flipped, never on the rest
    /// of the graph. Documentary only — the engine never branches on it.
    fn is_dyad_independent(&self) -> bool {
        false
    }

    /// Whether this term's `dyad_update` ignores the `order`/`i` arguments. Documentary
    /// only.
    fn is_order_independent(&self) -> bool {
        true
    }

    /// Deep-clone this term into a fresh boxed trait object, so [`crate::model::Model`] can
    /// be cloned without each term needing to implement `Clone` directly (trait objects
    /// can't derive `Clone`).
    fn clone_box(&self) -> Box<dyn Term>;
}

impl Clone for Box<dyn Term> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
