//! C1: Ranker — rank a key vector with random tie-breaking.

use crate::error::Result;
use crate::rng_util::rank_random_ties;
use rand::Rng;

/// Tie-breaking strategy for [`rank`]. `Random` is the only strategy the engine needs; the
/// enum exists so the call site reads as a deliberate choice rather than a bare function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ties {
    /// Break ties uniformly at random.
    Random,
}

/// Returns 1-based ranks of `keys`, with ties broken according to `ties`.
///
/// This is the `rank(keys, ties="random")` primitive from `SPEC_FULL.md` §4.1: it is the
/// randomness source behind partial-order resolution in [`crate::order`].
pub fn rank<R: Rng + ?Sized>(keys: &[f64], ties: Ties, rng: &mut R) -> Result<Vec<usize>> {
    match ties {
        Ties::Random => rank_random_ties(keys, rng),
    }
}
