//! C5: OrderGenerator — sample a vertex visitation order, honoring an optional partial
//! order π.

use rand::Rng;

use crate::error::{Result, SamplerError};
use crate::ranker::{rank, Ties};
use crate::rng_util::{argsort, fisher_yates};

/// Samples a vertex visitation order.
///
/// Given `n` vertices and an optional partial order `pi` of length `n`:
/// - absent `pi`: a uniform random permutation of `0..n` (Fisher-Yates).
/// - present `pi`: rank `pi` with random tie-breaking, then take the permutation that
///   sorts those ranks ascending — so `vert_order` respects `pi[vert_order[i]] <=
///   pi[vert_order[j]]` for `i < j`, with ties among equal `pi` values broken uniformly at
///   random (`SPEC_FULL.md` §4.5, §8 "Under π with ties, conditional on π, each valid
///   topological order has equal probability").
pub fn generate_order<R: Rng + ?Sized>(
    n: usize,
    partial_order: Option<&[f64]>,
    rng: &mut R,
) -> Result<Vec<usize>> {
    match partial_order {
        None => {
            let mut vert_order: Vec<usize> = (0..n).collect();
            fisher_yates(&mut vert_order, rng);
            Ok(vert_order)
        }
        Some(pi) => {
            if pi.len() != n {
                return Err(SamplerError::configuration(format!(
                    "partial order has length {} but graph has {} vertices",
                    pi.len(),
                    n
                )));
            }
            let ranks = rank(pi, Ties::Random, rng)?;
            Ok(argsort(&ranks))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn absent_partial_order_gives_a_permutation() {
        let mut rng = StdRng::seed_from_u64(4);
        let order = generate_order(6, None, &mut rng).unwrap();
        let set: HashSet<usize> = order.iter().copied().collect();
        assert_eq!(set, (0..6).collect::<HashSet<_>>());
    }

    #[test]
    fn respects_partial_order_without_ties() {
        let mut rng = StdRng::seed_from_u64(9);
        // pi strictly increasing with vertex index => order must equal identity.
        let pi = vec![0.0, 1.0, 2.0, 3.0];
        let order = generate_order(4, Some(&pi), &mut rng).unwrap();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn groups_respect_partial_order_with_ties() {
        // pi = [1, 1, 2, 2]: vertices {0,1} must precede {2,3} in every draw.
        let pi = vec![1.0, 1.0, 2.0, 2.0];
        for seed in 0..50u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let order = generate_order(4, Some(&pi), &mut rng).unwrap();
            let pos = |v: usize| order.iter().position(|&x| x == v).unwrap();
            assert!(pos(0) < pos(2));
            assert!(pos(0) < pos(3));
            assert!(pos(1) < pos(2));
            assert!(pos(1) < pos(3));
        }
    }

    #[test]
    fn rejects_mismatched_partial_order_length() {
        let mut rng = StdRng::seed_from_u64(1);
        let pi = vec![1.0, 2.0];
        assert!(generate_order(4, Some(&pi), &mut rng).is_err());
    }
}
