//! Shared randomness helpers used by every call site that needs a permutation.
//!
//! The design notes flag that the original implementation used two subtly different
//! Fisher-Yates variants across call sites. This port uses exactly one, audited once here,
//! everywhere a shuffle is needed.

use ordered_float::OrderedFloat;
use rand::Rng;

/// In-place Fisher-Yates shuffle of `slice[offset..]`, leaving `slice[..offset]` untouched.
///
/// For `i` in `[offset, len-1)`, swaps `slice[i]` with `slice[uniform(i, len)]`. Passing
/// `offset = 0` shuffles the whole slice.
pub fn fisher_yates_from<T, R: Rng + ?Sized>(slice: &mut [T], offset: usize, rng: &mut R) {
    let len = slice.len();
    if len == 0 {
        return;
    }
    for i in offset..len.saturating_sub(1) {
        let j = rng.gen_range(i..len);
        slice.swap(i, j);
    }
}

/// In-place Fisher-Yates shuffle of the entire slice.
pub fn fisher_yates<T, R: Rng + ?Sized>(slice: &mut [T], rng: &mut R) {
    fisher_yates_from(slice, 0, rng);
}

/// 1-based ranks of `keys`, ties broken uniformly at random.
///
/// Matches §4.1's `rank(keys, ties="random")`: equal keys receive distinct ranks, the
/// assignment among tied keys drawn uniformly at random rather than by stable input order.
pub fn rank_random_ties<R: Rng + ?Sized>(keys: &[f64], rng: &mut R) -> crate::error::Result<Vec<usize>> {
    if keys.iter().any(|k| k.is_nan()) {
        return Err(crate::error::SamplerError::configuration(
            "rank_random_ties: NaN key",
        ));
    }
    let mut indices: Vec<usize> = (0..keys.len()).collect();
    // Shuffle first so that among equal keys the final order (and hence rank) is uniform
    // at random, then stable-sort by key — ties keep their (already-random) relative order.
    // NaN is already rejected above, so every remaining key is a valid `OrderedFloat` and
    // the sort needs no `partial_cmp().unwrap()`.
    fisher_yates(&mut indices, rng);
    indices.sort_by_key(|&i| OrderedFloat(keys[i]));
    let mut ranks = vec![0usize; keys.len()];
    for (rank, &idx) in indices.iter().enumerate() {
        ranks[idx] = rank + 1;
    }
    Ok(ranks)
}

/// Returns the permutation that would sort `ranks` ascending, i.e. `argsort(ranks)`.
///
/// Ties in `ranks` (none should occur after [`rank_random_ties`], since ranks are already
/// distinct) are broken by index order, which is fine since [`rank_random_ties`] already
/// randomized the tie-break.
pub fn argsort(ranks: &[usize]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..ranks.len()).collect();
    order.sort_by_key(|&i| ranks[i]);
    order
}
