//! C6: the Sampler — the LOLOG simulator and model-frame producer.
//!
//! Grounded on the teacher crate's `run()`/`Dpmm::scan`/`Dpmm::step` shape: a loop that
//! shuffles positions, then visits each one proposing a probabilistic update against a
//! running state, accepting or rejecting, and folding the result into running totals
//! (`SPEC_FULL.md` DESIGN.md). Both generation modes (§4.6.1, §4.6.2) and both frame modes
//! (§4.6.3) share a single propose/accept/bookkeep routine, parameterised by how the dyad
//! sequence is produced and by how acceptance is decided, per the "two generation modes
//! share ≥80% of their logic" design note (§9).

use hashbrown::HashSet;
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::SamplerConfig;
use crate::error::{Result, SamplerError};
use crate::graph::Graph;
use crate::model::Model;
use crate::order::generate_order;
use crate::rng_util::{fisher_yates, fisher_yates_from};

/// A cooperative cancellation flag, checked between outer iterations of the sampling loops
/// (`SPEC_FULL.md` §5). Cloning shares the same underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A fresh, not-yet-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Observed by the engine at the next checkpoint.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The output of a generation call (`generate_network_with_order`,
/// `generate_network_with_edge_order`): the grown graph plus its statistic bookkeeping.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// The generated graph, stamped with the `__order__` vertex attribute.
    pub network: Graph,
    /// Statistics of the empty graph under the model's terms.
    pub empty_network_stats: Vec<f64>,
    /// Realised statistics accumulated across every accepted dyad
    /// (`Tk.value(network) == stats[k] + empty_network_stats[k]`).
    pub stats: Vec<f64>,
    /// Σ Δ_k · p across every visited dyad — a Rao-Blackwellised expectation.
    pub expected_stats: Vec<f64>,
    /// Per-dyad Δ vectors, indexed canonically, if `store_change_stats` was requested.
    pub change_stats: Option<Array2<f64>>,
}

/// The output of a frame call (`model_frame_given_order`, `model_frame_given_edge_order`):
/// rows of `(outcome, Δ₁..Δ_k)` usable as logistic-regression training data.
#[derive(Debug, Clone)]
pub struct ModelFrame {
    /// One entry per sampled dyad: whether the observed graph has that edge.
    pub outcome: Array1<u8>,
    /// `samples.nrows() == outcome.len()`, `samples.ncols()` == number of terms.
    pub samples: Array2<f64>,
}

impl ModelFrame {
    fn from_rows(outcome: Vec<u8>, rows: Vec<Vec<f64>>, k: usize) -> Self {
        let n = outcome.len();
        let mut samples = Array2::<f64>::zeros((n, k));
        for (r, row) in rows.into_iter().enumerate() {
            for (c, v) in row.into_iter().enumerate() {
                samples[[r, c]] = v;
            }
        }
        Self {
            outcome: Array1::from(outcome),
            samples,
        }
    }

    /// Concatenate several frames (e.g. the output of a batched producer) into one, in
    /// order.
    pub fn concat(frames: Vec<ModelFrame>) -> Self {
        let k = frames
            .iter()
            .find(|f| f.samples.ncols() > 0)
            .map(|f| f.samples.ncols())
            .unwrap_or(0);
        let total_rows: usize = frames.iter().map(|f| f.outcome.len()).sum();
        let mut outcome = Vec::with_capacity(total_rows);
        let mut samples = Array2::<f64>::zeros((total_rows, k));
        let mut offset = 0;
        for frame in frames {
            for o in frame.outcome.iter() {
                outcome.push(*o);
            }
            for r in 0..frame.samples.nrows() {
                for c in 0..k {
                    samples[[offset + r, c]] = frame.samples[[r, c]];
                }
            }
            offset += frame.samples.nrows();
        }
        Self {
            outcome: Array1::from(outcome),
            samples,
        }
    }

    /// Number of rows (sampled dyads).
    pub fn len(&self) -> usize {
        self.outcome.len()
    }

    /// Whether this frame has no rows.
    pub fn is_empty(&self) -> bool {
        self.outcome.is_empty()
    }
}

/// Canonical dyad index for `store_change_stats` in node-sequential mode, undirected case:
/// outer step `i`, inner step `j` maps to `i(i-1)/2 + j` (`SPEC_FULL.md` §6).
pub fn canonical_index_undirected(i: usize, j: usize) -> usize {
    i * i.saturating_sub(1) / 2 + j
}

/// Canonical dyad index for the directed, vertex→alter direction.
pub fn canonical_index_directed_forward(i: usize, j: usize) -> usize {
    i * i.saturating_sub(1) + 2 * j
}

/// Canonical dyad index for the directed, alter→vertex direction.
pub fn canonical_index_directed_backward(i: usize, j: usize) -> usize {
    i * i.saturating_sub(1) + 2 * j + 1
}

/// The standard numerically stable logistic identity: avoids computing `exp` of a
/// large-magnitude argument directly, per the "clamp by computing `p = 1/(1+exp(-Δℓ))`
/// with the standard stable identity for `|Δℓ| > 500`" requirement (`SPEC_FULL.md` §4.7).
fn stable_logistic(delta_ll: f64) -> Result<f64> {
    if !delta_ll.is_finite() {
        return Err(SamplerError::numeric(format!(
            "non-finite log-likelihood delta: {delta_ll}"
        )));
    }
    let p = if delta_ll >= 0.0 {
        let z = (-delta_ll).exp();
        1.0 / (1.0 + z)
    } else {
        let z = delta_ll.exp();
        z / (1.0 + z)
    };
    Ok(p)
}

/// Reject any `(head, tail)` pair whose vertex index is `>= n` before it reaches anything
/// that indexes the graph by it, per `SPEC_FULL.md` §4.7 error kind 1 ("head/tail out of
/// range").
fn validate_dyad_list(n: usize, heads: &[usize], tails: &[usize]) -> Result<()> {
    for (&h, &t) in heads.iter().zip(tails.iter()) {
        if h >= n || t >= n {
            return Err(SamplerError::configuration(format!(
                "head/tail vertex index out of range: dyad ({t}, {h}) but graph has {n} vertices"
            )));
        }
    }
    Ok(())
}

fn canonicalize_pair(u: usize, v: usize, directed: bool) -> (usize, usize) {
    if directed || u <= v {
        (u, v)
    } else {
        (v, u)
    }
}

/// The result of proposing a single dyad flip: the per-term Δ, the acceptance probability
/// `p`, and whether it was accepted.
struct StepOutcome {
    delta: Vec<f64>,
    p: f64,
    accepted: bool,
}

/// The LOLOG simulator and model-frame producer.
///
/// Generic over the injected PRNG type (`SPEC_FULL.md` §9 "process-wide PRNG" note):
/// `StdRng` for reproducible, seeded runs; any other `Rng + SeedableRng` for custom
/// streams. Batched producers (§4.6.4) spin up one independent `R` per parallel task,
/// seeded deterministically from the Sampler's own seed plus the task index.
pub struct Sampler<R: Rng + SeedableRng> {
    observed_model: Model,
    no_tie_model: Model,
    rng: R,
    config: SamplerConfig,
    seed: u64,
}

impl<R: Rng + SeedableRng> Sampler<R> {
    /// Construct a Sampler from an observed model. Builds `no_tie_model` as an empty-graph
    /// clone of `observed_model` sharing its terms and θ (`SPEC_FULL.md` §4.6).
    pub fn new(observed_model: Model, config: SamplerConfig) -> Result<Self> {
        config.validate()?;
        let seed = config.seed.unwrap_or_else(rand::random);
        tracing::info!(seed, "constructing Sampler");
        let rng = R::seed_from_u64(seed);
        let no_tie_model = observed_model.empty_clone()?;
        Ok(Self {
            observed_model,
            no_tie_model,
            rng,
            config,
            seed,
        })
    }

    /// The observed model (reference graph `y`).
    pub fn observed_model(&self) -> &Model {
        &self.observed_model
    }

    /// The empty-graph clone sharing the observed model's terms and θ.
    pub fn no_tie_model(&self) -> &Model {
        &self.no_tie_model
    }

    /// This sampler's configuration (the defaults used by the `_with_config_defaults`
    /// convenience wrappers below).
    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// [`Sampler::model_frame_given_order`] using [`SamplerConfig::downsample_rate`].
    pub fn model_frame_given_order_with_config_defaults(
        &mut self,
        vert_order: Vec<usize>,
    ) -> Result<ModelFrame> {
        let rate = self.config.downsample_rate;
        self.model_frame_given_order(rate, vert_order)
    }

    /// Samples candidates via [`SamplerConfig::trunc_rate`], then generates via
    /// [`Sampler::generate_network_with_edge_order`].
    pub fn generate_network_unconstrained_with_config_defaults(
        &mut self,
        store_change_stats: bool,
    ) -> Result<GenerationResult> {
        let trunc_rate = self.config.trunc_rate;
        let (heads, tails) = self.sample_unconstrained_candidates(trunc_rate)?;
        self.generate_network_with_edge_order(&heads, &tails, store_change_stats)
    }

    fn check_cancellation(token: Option<&CancellationToken>) -> Result<()> {
        if token.map(CancellationToken::is_cancelled).unwrap_or(false) {
            return Err(SamplerError::cancelled());
        }
        Ok(())
    }

    fn propose_accept_generation(
        &mut self,
        running: &mut Model,
        vertex: usize,
        alter: usize,
        order: &[usize],
        i: usize,
    ) -> Result<StepOutcome> {
        let terms_pre = running.statistics();
        let llik_pre = running.log_lik();
        running.dyad_update(vertex, alter, order, i)?;
        let terms_post = running.statistics();
        let delta_ll = running.log_lik() - llik_pre;
        let p = stable_logistic(delta_ll)?;
        let u: f64 = self.rng.gen();
        let accepted = u < p;
        if accepted {
            running.commit()?;
        } else {
            running.rollback()?;
        }
        let delta = terms_post
            .iter()
            .zip(terms_pre.iter())
            .map(|(post, pre)| post - pre)
            .collect();
        Ok(StepOutcome { delta, p, accepted })
    }

    fn frame_step(
        &mut self,
        running: &mut Model,
        observed: &Model,
        vertex: usize,
        alter: usize,
        order: &[usize],
        i: usize,
        downsample_rate: f64,
        outcome_buf: &mut Vec<u8>,
        sample_rows: &mut Vec<Vec<f64>>,
    ) -> Result<()> {
        let terms_pre = running.statistics();
        running.dyad_update(vertex, alter, order, i)?;
        let terms_post = running.statistics();
        let has_edge_obs = observed.try_has_edge(vertex, alter)?;
        let delta: Vec<f64> = terms_post
            .iter()
            .zip(terms_pre.iter())
            .map(|(post, pre)| post - pre)
            .collect();
        let sampled = self.rng.gen::<f64>() < downsample_rate;
        if sampled {
            outcome_buf.push(has_edge_obs as u8);
            sample_rows.push(delta);
        }
        if has_edge_obs {
            running.commit()?;
        } else {
            running.rollback()?;
        }
        Ok(())
    }

    fn accumulate(stats: &mut [f64], expected_stats: &mut [f64], outcome: &StepOutcome) {
        for k in 0..stats.len() {
            expected_stats[k] += outcome.delta[k] * outcome.p;
            if outcome.accepted {
                stats[k] += outcome.delta[k];
            }
        }
    }

    /// §4.6.1: node-sequential generation.
    ///
    /// `vert_order` is consumed and progressively reshuffled (the committed prefix is
    /// preserved at each step); the returned [`GenerationResult::network`] carries the
    /// final order as its `__order__` attribute.
    pub fn generate_network_with_order(
        &mut self,
        mut vert_order: Vec<usize>,
        store_change_stats: bool,
    ) -> Result<GenerationResult> {
        self.generate_network_with_order_cancellable(&mut vert_order, store_change_stats, None)
    }

    /// As [`Sampler::generate_network_with_order`], but checking `token` between outer
    /// iterations and aborting with [`SamplerError::Cancelled`] if it is set.
    pub fn generate_network_with_order_cancellable(
        &mut self,
        vert_order: &mut [usize],
        store_change_stats: bool,
        token: Option<&CancellationToken>,
    ) -> Result<GenerationResult> {
        let n = self.no_tie_model.graph().size();
        if vert_order.len() != n {
            return Err(SamplerError::configuration(format!(
                "vert_order has length {} but graph has {} vertices",
                vert_order.len(),
                n
            )));
        }
        let directed = self.no_tie_model.graph().is_directed();
        let mut running = self.no_tie_model.deep_clone();
        let empty_network_stats = running.statistics();
        let k = running.num_terms();
        let mut stats = vec![0.0; k];
        let mut expected_stats = vec![0.0; k];
        let e = running.graph().max_edges();
        let mut change_stats = store_change_stats.then(|| Array2::<f64>::zeros((e, k)));

        for i in 0..n {
            Self::check_cancellation(token)?;
            fisher_yates_from(vert_order, i, &mut self.rng);
            let vertex = vert_order[i];
            for j in 0..i {
                let alter = vert_order[j];
                let outcome =
                    self.propose_accept_generation(&mut running, vertex, alter, vert_order, i)?;
                Self::accumulate(&mut stats, &mut expected_stats, &outcome);
                if let Some(cs) = change_stats.as_mut() {
                    let idx = if directed {
                        canonical_index_directed_forward(i, j)
                    } else {
                        canonical_index_undirected(i, j)
                    };
                    for (col, d) in outcome.delta.iter().enumerate() {
                        cs[[idx, col]] = *d;
                    }
                }
                if directed {
                    let outcome2 = self.propose_accept_generation(
                        &mut running,
                        alter,
                        vertex,
                        vert_order,
                        i,
                    )?;
                    Self::accumulate(&mut stats, &mut expected_stats, &outcome2);
                    if let Some(cs) = change_stats.as_mut() {
                        let idx = canonical_index_directed_backward(i, j);
                        for (col, d) in outcome2.delta.iter().enumerate() {
                            cs[[idx, col]] = *d;
                        }
                    }
                }
            }
        }
        running.stamp_order(vert_order)?;
        Ok(GenerationResult {
            network: running.into_graph(),
            empty_network_stats,
            stats,
            expected_stats,
            change_stats,
        })
    }

    /// Draw `⌊e · trunc_rate⌋` distinct candidate dyads by rejection-sampling two distinct
    /// uniform vertices, for the unconstrained (edge-permutation) generation mode
    /// (`SPEC_FULL.md` §4.6.2).
    pub fn sample_unconstrained_candidates(
        &mut self,
        trunc_rate: f64,
    ) -> Result<(Vec<usize>, Vec<usize>)> {
        let n = self.no_tie_model.graph().size();
        let directed = self.no_tie_model.graph().is_directed();
        let e = self.no_tie_model.graph().max_edges();
        let target = ((e as f64) * trunc_rate).floor() as usize;
        Ok(Self::draw_candidates(n, directed, target, &mut self.rng))
    }

    fn draw_candidates<R2: Rng + ?Sized>(
        n: usize,
        directed: bool,
        target: usize,
        rng: &mut R2,
    ) -> (Vec<usize>, Vec<usize>) {
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        let mut heads = Vec::with_capacity(target);
        let mut tails = Vec::with_capacity(target);
        if n < 2 {
            return (heads, tails);
        }
        while tails.len() < target && seen.len() < n * n.saturating_sub(1) {
            let u = rng.gen_range(0..n);
            let mut v = rng.gen_range(0..n);
            while v == u {
                v = rng.gen_range(0..n);
            }
            let key = canonicalize_pair(u, v, directed);
            if seen.insert(key) {
                tails.push(u);
                heads.push(v);
            }
        }
        (heads, tails)
    }

    /// Seed an unconstrained candidate list with every observed edge, then pad with random
    /// distinct dyads up to `⌊e · trunc_rate⌋`, then shuffle `heads` and `tails`
    /// **independently** — preserved exactly as the spec's flagged suspect-but-intentional
    /// behaviour (`SPEC_FULL.md` §4.6.2, §9): this deliberately destroys the pairing
    /// between a seeded edge's endpoints, which the spec calls out as unresolved original
    /// intent rather than something to silently "fix" in this port.
    pub fn seed_unconstrained_candidates_with_observed(
        &mut self,
        trunc_rate: f64,
    ) -> (Vec<usize>, Vec<usize>) {
        let observed = self.observed_model.graph();
        let n = observed.size();
        let directed = observed.is_directed();
        let e = observed.max_edges();
        let target = ((e as f64) * trunc_rate).floor() as usize;
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        let mut tails = Vec::new();
        let mut heads = Vec::new();
        for (u, v) in observed.edgelist() {
            seen.insert(canonicalize_pair(u, v, directed));
            tails.push(u);
            heads.push(v);
        }
        while tails.len() < target && seen.len() < n * n.saturating_sub(1).max(1) {
            let u = self.rng.gen_range(0..n);
            let mut v = self.rng.gen_range(0..n);
            while v == u {
                v = self.rng.gen_range(0..n);
            }
            let key = canonicalize_pair(u, v, directed);
            if seen.insert(key) {
                tails.push(u);
                heads.push(v);
            }
        }
        fisher_yates(&mut heads, &mut self.rng);
        fisher_yates(&mut tails, &mut self.rng);
        (heads, tails)
    }

    /// §4.6.2: edge-permutation generation over a prebuilt candidate list.
    ///
    /// An auxiliary `vert_order` is sampled so order-dependent terms have something to
    /// read; per this port's resolution of the spec's "shadowed `actor_index`" open
    /// question (`SPEC_FULL.md` §9), `actor_index` is always the real, freshly recomputed
    /// position of `vertex` within `vert_order`.
    pub fn generate_network_with_edge_order(
        &mut self,
        heads: &[usize],
        tails: &[usize],
        store_change_stats: bool,
    ) -> Result<GenerationResult> {
        self.generate_network_with_edge_order_cancellable(heads, tails, store_change_stats, None)
    }

    /// As [`Sampler::generate_network_with_edge_order`], but checking `token` between outer
    /// iterations and aborting with [`SamplerError::Cancelled`] if it is set.
    pub fn generate_network_with_edge_order_cancellable(
        &mut self,
        heads: &[usize],
        tails: &[usize],
        store_change_stats: bool,
        token: Option<&CancellationToken>,
    ) -> Result<GenerationResult> {
        if heads.len() != tails.len() {
            return Err(SamplerError::configuration(format!(
                "heads has length {} but tails has length {}",
                heads.len(),
                tails.len()
            )));
        }
        let n = self.no_tie_model.graph().size();
        validate_dyad_list(n, heads, tails)?;
        let vert_order = generate_order(n, self.observed_model.partial_order(), &mut self.rng)?;
        let mut running = self.no_tie_model.deep_clone();
        let empty_network_stats = running.statistics();
        let k = running.num_terms();
        let mut stats = vec![0.0; k];
        let mut expected_stats = vec![0.0; k];
        let mut change_stats = store_change_stats.then(|| Array2::<f64>::zeros((heads.len(), k)));

        for idx in 0..heads.len() {
            Self::check_cancellation(token)?;
            let vertex = tails[idx];
            let alter = heads[idx];
            let actor_index = vert_order
                .iter()
                .position(|&v| v == vertex)
                .ok_or_else(|| {
                    SamplerError::configuration(format!("vertex {vertex} not found in vert_order"))
                })?;
            let outcome = self.propose_accept_generation(
                &mut running,
                vertex,
                alter,
                &vert_order,
                actor_index,
            )?;
            Self::accumulate(&mut stats, &mut expected_stats, &outcome);
            if let Some(cs) = change_stats.as_mut() {
                for (col, d) in outcome.delta.iter().enumerate() {
                    cs[[idx, col]] = *d;
                }
            }
        }
        running.stamp_order(&vert_order)?;
        Ok(GenerationResult {
            network: running.into_graph(),
            empty_network_stats,
            stats,
            expected_stats,
            change_stats,
        })
    }

    /// §4.6.3: model-frame production over a node-sequential walk, against the observed
    /// graph's outcomes rather than a Bernoulli draw.
    pub fn model_frame_given_order(
        &mut self,
        downsample_rate: f64,
        mut vert_order: Vec<usize>,
    ) -> Result<ModelFrame> {
        let n = self.no_tie_model.graph().size();
        if vert_order.len() != n {
            return Err(SamplerError::configuration(format!(
                "vert_order has length {} but graph has {} vertices",
                vert_order.len(),
                n
            )));
        }
        let directed = self.no_tie_model.graph().is_directed();
        let mut running = self.no_tie_model.deep_clone();
        let k = running.num_terms();
        let e = running.graph().max_edges();
        let reserve = ((downsample_rate * e as f64).floor() as usize) + 1000;
        let mut outcome_buf: Vec<u8> = Vec::with_capacity(reserve);
        let mut sample_rows: Vec<Vec<f64>> = Vec::with_capacity(reserve);
        let observed = self.observed_model.deep_clone();

        for i in 0..n {
            fisher_yates_from(&mut vert_order, i, &mut self.rng);
            let vertex = vert_order[i];
            for j in 0..i {
                let alter = vert_order[j];
                self.frame_step(
                    &mut running,
                    &observed,
                    vertex,
                    alter,
                    &vert_order,
                    i,
                    downsample_rate,
                    &mut outcome_buf,
                    &mut sample_rows,
                )?;
                if directed {
                    self.frame_step(
                        &mut running,
                        &observed,
                        alter,
                        vertex,
                        &vert_order,
                        i,
                        downsample_rate,
                        &mut outcome_buf,
                        &mut sample_rows,
                    )?;
                }
            }
        }
        Ok(ModelFrame::from_rows(outcome_buf, sample_rows, k))
    }

    /// §4.6.3: the edge-permutation analogue of [`Sampler::model_frame_given_order`].
    pub fn model_frame_given_edge_order(
        &mut self,
        downsample_rate: f64,
        heads: &[usize],
        tails: &[usize],
    ) -> Result<ModelFrame> {
        if heads.len() != tails.len() {
            return Err(SamplerError::configuration(format!(
                "heads has length {} but tails has length {}",
                heads.len(),
                tails.len()
            )));
        }
        let n = self.no_tie_model.graph().size();
        validate_dyad_list(n, heads, tails)?;
        let vert_order = generate_order(n, self.observed_model.partial_order(), &mut self.rng)?;
        let mut running = self.no_tie_model.deep_clone();
        let k = running.num_terms();
        let reserve = ((downsample_rate * heads.len() as f64).floor() as usize) + 1000;
        let mut outcome_buf: Vec<u8> = Vec::with_capacity(reserve);
        let mut sample_rows: Vec<Vec<f64>> = Vec::with_capacity(reserve);
        let observed = self.observed_model.deep_clone();

        for idx in 0..heads.len() {
            let vertex = tails[idx];
            let alter = heads[idx];
            let actor_index = vert_order
                .iter()
                .position(|&v| v == vertex)
                .ok_or_else(|| {
                    SamplerError::configuration(format!("vertex {vertex} not found in vert_order"))
                })?;
            self.frame_step(
                &mut running,
                &observed,
                vertex,
                alter,
                &vert_order,
                actor_index,
                downsample_rate,
                &mut outcome_buf,
                &mut sample_rows,
            )?;
        }
        Ok(ModelFrame::from_rows(outcome_buf, sample_rows, k))
    }

    /// §4.6.5: change statistics only, no acceptance sampling. Walks `(tails[i],
    /// heads[i])` for `i` in `0..e`, computing each Δ from the progressively-grown running
    /// model and then reverting to match the observed graph (commit if the observed graph
    /// has that edge, else rollback).
    ///
    /// This port passes an empty order slice (`i = 0`) to every `dyad_update` call: the
    /// spec never defines a visitation order for this entry point, so order-dependent
    /// terms see no history here by design (`SPEC_FULL.md` DESIGN.md).
    pub fn calc_change_stats(&mut self, heads: &[usize], tails: &[usize]) -> Result<Array2<f64>> {
        if heads.len() != tails.len() {
            return Err(SamplerError::configuration(format!(
                "heads has length {} but tails has length {}",
                heads.len(),
                tails.len()
            )));
        }
        let n = self.no_tie_model.graph().size();
        let e = self.no_tie_model.graph().max_edges();
        if heads.len() != e {
            return Err(SamplerError::configuration(format!(
                "calc_change_stats requires len(heads) == len(tails) == e ({e}), got {}",
                heads.len()
            )));
        }
        validate_dyad_list(n, heads, tails)?;
        let mut running = self.no_tie_model.deep_clone();
        let k = running.num_terms();
        let mut change = Array2::<f64>::zeros((e, k));
        let empty_order: Vec<usize> = Vec::new();

        for idx in 0..e {
            let vertex = tails[idx];
            let alter = heads[idx];
            let terms_pre = running.statistics();
            running.dyad_update(vertex, alter, &empty_order, 0)?;
            let terms_post = running.statistics();
            for col in 0..k {
                change[[idx, col]] = terms_post[col] - terms_pre[col];
            }
            if self.observed_model.try_has_edge(vertex, alter)? {
                running.commit()?;
            } else {
                running.rollback()?;
            }
        }
        Ok(change)
    }

    /// The full canonical dyad list for `n` vertices, in the outer-`i`/inner-`j` order
    /// that matches the canonical indices of §6 (useful for feeding
    /// [`Sampler::calc_change_stats`] a list that lines up with a node-sequential run's
    /// indices).
    pub fn canonical_dyad_list(n: usize, directed: bool) -> (Vec<usize>, Vec<usize>) {
        let mut heads = Vec::new();
        let mut tails = Vec::new();
        for i in 1..n {
            for j in 0..i {
                tails.push(i);
                heads.push(j);
                if directed {
                    tails.push(j);
                    heads.push(i);
                }
            }
        }
        (heads, tails)
    }
}

impl<R: Rng + SeedableRng + Send> Sampler<R> {
    /// [`Sampler::variational_model_frame`] using [`SamplerConfig::n_orders`] and
    /// [`SamplerConfig::downsample_rate`].
    pub fn variational_model_frame_with_config_defaults(&mut self) -> Result<Vec<ModelFrame>> {
        let n_orders = self.config.n_orders;
        let downsample_rate = self.config.downsample_rate;
        self.variational_model_frame(n_orders, downsample_rate)
    }

    /// §4.6.4: `n_orders` independent draws of `vert_order`, each producing a frame via
    /// [`Sampler::model_frame_given_order`], run across a `rayon` thread pool with
    /// per-task independent RNG streams seeded from this Sampler's seed plus the draw
    /// index (`SPEC_FULL.md` §5's "one engine per worker, with per-worker seeds").
    /// Returned in draw-index order regardless of completion order.
    pub fn variational_model_frame(
        &mut self,
        n_orders: usize,
        downsample_rate: f64,
    ) -> Result<Vec<ModelFrame>> {
        self.variational_model_frame_cancellable(n_orders, downsample_rate, None)
    }

    /// As [`Sampler::variational_model_frame`], but checking `token` before each batch item
    /// starts and aborting with [`SamplerError::Cancelled`] if it is set (`SPEC_FULL.md`
    /// §5: "between batch items in 4.6.4"). Items already running when cancellation is
    /// observed still complete; no new item is started afterward.
    pub fn variational_model_frame_cancellable(
        &mut self,
        n_orders: usize,
        downsample_rate: f64,
        token: Option<&CancellationToken>,
    ) -> Result<Vec<ModelFrame>> {
        if n_orders == 0 {
            return Err(SamplerError::configuration("n_orders must be at least 1"));
        }
        let base_seed = self.seed;
        let no_tie_model = &self.no_tie_model;
        let observed_model = &self.observed_model;
        let n = no_tie_model.graph().size();
        (0..n_orders)
            .into_par_iter()
            .map(|draw_idx| {
                Self::check_cancellation(token)?;
                let mut worker_rng =
                    R::seed_from_u64(base_seed ^ (draw_idx as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
                let vert_order =
                    generate_order(n, observed_model.partial_order(), &mut worker_rng)?;
                Self::model_frame_given_order_worker(
                    no_tie_model,
                    observed_model,
                    downsample_rate,
                    vert_order,
                    &mut worker_rng,
                )
            })
            .collect()
    }

    /// §4.6.4: the unconstrained (edge-permutation) analogue of
    /// [`Sampler::variational_model_frame`], seeding each draw's candidate list with the
    /// observed edges padded up to `⌊e · trunc_rate⌋` (see
    /// [`Sampler::seed_unconstrained_candidates_with_observed`]).
    pub fn variational_model_frame_unconstrained(
        &mut self,
        n_orders: usize,
        downsample_rate: f64,
        trunc_rate: f64,
    ) -> Result<Vec<ModelFrame>> {
        self.variational_model_frame_unconstrained_cancellable(
            n_orders,
            downsample_rate,
            trunc_rate,
            None,
        )
    }

    /// As [`Sampler::variational_model_frame_unconstrained`], but checking `token` before
    /// each batch item starts and aborting with [`SamplerError::Cancelled`] if it is set
    /// (`SPEC_FULL.md` §5: "between batch items in 4.6.4").
    pub fn variational_model_frame_unconstrained_cancellable(
        &mut self,
        n_orders: usize,
        downsample_rate: f64,
        trunc_rate: f64,
        token: Option<&CancellationToken>,
    ) -> Result<Vec<ModelFrame>> {
        if n_orders == 0 {
            return Err(SamplerError::configuration("n_orders must be at least 1"));
        }
        let base_seed = self.seed;
        let no_tie_model = &self.no_tie_model;
        let observed_model = &self.observed_model;
        let n = no_tie_model.graph().size();
        let directed = no_tie_model.graph().is_directed();
        let e = no_tie_model.graph().max_edges();
        let target = ((e as f64) * trunc_rate).floor() as usize;

        (0..n_orders)
            .into_par_iter()
            .map(|draw_idx| {
                Self::check_cancellation(token)?;
                let mut worker_rng = R::seed_from_u64(
                    base_seed ^ (draw_idx as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9),
                );
                let mut seen: HashSet<(usize, usize)> = HashSet::new();
                let mut tails = Vec::new();
                let mut heads = Vec::new();
                for (u, v) in observed_model.graph().edgelist() {
                    seen.insert(canonicalize_pair(u, v, directed));
                    tails.push(u);
                    heads.push(v);
                }
                while tails.len() < target && seen.len() < n * n.saturating_sub(1).max(1) {
                    let u = worker_rng.gen_range(0..n);
                    let mut v = worker_rng.gen_range(0..n);
                    while v == u {
                        v = worker_rng.gen_range(0..n);
                    }
                    let key = canonicalize_pair(u, v, directed);
                    if seen.insert(key) {
                        tails.push(u);
                        heads.push(v);
                    }
                }
                fisher_yates(&mut heads, &mut worker_rng);
                fisher_yates(&mut tails, &mut worker_rng);

                let vert_order =
                    generate_order(n, observed_model.partial_order(), &mut worker_rng)?;
                Self::model_frame_given_edge_order_worker(
                    no_tie_model,
                    observed_model,
                    downsample_rate,
                    &heads,
                    &tails,
                    &vert_order,
                    &mut worker_rng,
                )
            })
            .collect()
    }

    /// §4.6.4: like [`Sampler::variational_model_frame`], but `vert_order` for each draw
    /// is supplied by `order_fn` rather than sampled internally. Runs sequentially since
    /// an arbitrary closure isn't assumed `Send`.
    pub fn variational_model_frame_with_func(
        &mut self,
        n_orders: usize,
        downsample_rate: f64,
        mut order_fn: impl FnMut(&mut R) -> Vec<usize>,
    ) -> Result<Vec<ModelFrame>> {
        let mut frames = Vec::with_capacity(n_orders);
        for _ in 0..n_orders {
            let vert_order = order_fn(&mut self.rng);
            frames.push(self.model_frame_given_order(downsample_rate, vert_order)?);
        }
        Ok(frames)
    }

    /// A standalone worker body for [`Sampler::variational_model_frame`]: mirrors
    /// [`Sampler::model_frame_given_order`] but takes its models and RNG as parameters so
    /// it can run inside a `rayon` task without borrowing `self`.
    fn model_frame_given_order_worker(
        no_tie_model: &Model,
        observed_model: &Model,
        downsample_rate: f64,
        mut vert_order: Vec<usize>,
        rng: &mut R,
    ) -> Result<ModelFrame> {
        let n = no_tie_model.graph().size();
        let directed = no_tie_model.graph().is_directed();
        let mut running = no_tie_model.deep_clone();
        let k = running.num_terms();
        let e = running.graph().max_edges();
        let reserve = ((downsample_rate * e as f64).floor() as usize) + 1000;
        let mut outcome_buf: Vec<u8> = Vec::with_capacity(reserve);
        let mut sample_rows: Vec<Vec<f64>> = Vec::with_capacity(reserve);

        for i in 0..n {
            fisher_yates_from(&mut vert_order, i, rng);
            let vertex = vert_order[i];
            for j in 0..i {
                let alter = vert_order[j];
                Self::frame_step_worker(
                    &mut running,
                    observed_model,
                    vertex,
                    alter,
                    &vert_order,
                    i,
                    downsample_rate,
                    &mut outcome_buf,
                    &mut sample_rows,
                    rng,
                )?;
                if directed {
                    Self::frame_step_worker(
                        &mut running,
                        observed_model,
                        alter,
                        vertex,
                        &vert_order,
                        i,
                        downsample_rate,
                        &mut outcome_buf,
                        &mut sample_rows,
                        rng,
                    )?;
                }
            }
        }
        Ok(ModelFrame::from_rows(outcome_buf, sample_rows, k))
    }

    fn model_frame_given_edge_order_worker(
        no_tie_model: &Model,
        observed_model: &Model,
        downsample_rate: f64,
        heads: &[usize],
        tails: &[usize],
        vert_order: &[usize],
        rng: &mut R,
    ) -> Result<ModelFrame> {
        validate_dyad_list(no_tie_model.graph().size(), heads, tails)?;
        let mut running = no_tie_model.deep_clone();
        let k = running.num_terms();
        let reserve = ((downsample_rate * heads.len() as f64).floor() as usize) + 1000;
        let mut outcome_buf: Vec<u8> = Vec::with_capacity(reserve);
        let mut sample_rows: Vec<Vec<f64>> = Vec::with_capacity(reserve);

        for idx in 0..heads.len() {
            let vertex = tails[idx];
            let alter = heads[idx];
            let actor_index = vert_order
                .iter()
                .position(|&v| v == vertex)
                .ok_or_else(|| {
                    SamplerError::configuration(format!("vertex {vertex} not found in vert_order"))
                })?;
            Self::frame_step_worker(
                &mut running,
                observed_model,
                vertex,
                alter,
                vert_order,
                actor_index,
                downsample_rate,
                &mut outcome_buf,
                &mut sample_rows,
                rng,
            )?;
        }
        Ok(ModelFrame::from_rows(outcome_buf, sample_rows, k))
    }

    #[allow(clippy::too_many_arguments)]
    fn frame_step_worker(
        running: &mut Model,
        observed: &Model,
        vertex: usize,
        alter: usize,
        order: &[usize],
        i: usize,
        downsample_rate: f64,
        outcome_buf: &mut Vec<u8>,
        sample_rows: &mut Vec<Vec<f64>>,
        rng: &mut R,
    ) -> Result<()> {
        let n = running.graph().size();
        if vertex >= n || alter >= n {
            return Err(SamplerError::configuration(format!(
                "head/tail vertex index out of range: dyad ({vertex}, {alter}) but graph has {n} vertices"
            )));
        }
        let terms_pre = running.statistics();
        running.dyad_update(vertex, alter, order, i)?;
        let terms_post = running.statistics();
        let has_edge_obs = observed.try_has_edge(vertex, alter)?;
        let delta: Vec<f64> = terms_post
            .iter()
            .zip(terms_pre.iter())
            .map(|(post, pre)| post - pre)
            .collect();
        let sampled = rng.gen::<f64>() < downsample_rate;
        if sampled {
            outcome_buf.push(has_edge_obs as u8);
            sample_rows.push(delta);
        }
        if has_edge_obs {
            running.commit()?;
        } else {
            running.rollback()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::term::Term;
    use crate::terms::{EdgesTerm, TrianglesTerm};
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;

    fn edges_sampler(n: usize, directed: bool, theta: f64, seed: u64) -> Sampler<StdRng> {
        let graph = Graph::empty_graph(n, directed);
        let terms: Vec<Box<dyn Term>> = vec![Box::new(EdgesTerm::new())];
        let model = Model::new(graph, terms, vec![theta], None).unwrap();
        let config = SamplerConfig {
            seed: Some(seed),
            ..SamplerConfig::default()
        };
        Sampler::new(model, config).unwrap()
    }

    #[test]
    fn stable_logistic_matches_closed_form_small_values() {
        assert_abs_diff_eq!(stable_logistic(0.0).unwrap(), 0.5, epsilon = 1e-12);
        let ln9 = 9f64.ln();
        assert_abs_diff_eq!(stable_logistic(ln9).unwrap(), 0.9, epsilon = 1e-9);
    }

    #[test]
    fn stable_logistic_does_not_overflow_on_large_magnitude() {
        assert_abs_diff_eq!(stable_logistic(800.0).unwrap(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(stable_logistic(-800.0).unwrap(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn stable_logistic_rejects_nan() {
        assert!(stable_logistic(f64::NAN).is_err());
    }

    #[test]
    fn n_equals_one_generates_empty_graph_no_dyads() {
        let mut sampler = edges_sampler(1, false, 0.0, 1);
        let result = sampler
            .generate_network_with_order(vec![0], false)
            .unwrap();
        assert_eq!(result.network.edge_count(), 0);
        assert_eq!(result.stats, vec![0.0]);
    }

    #[test]
    fn n_equals_two_visits_exactly_one_dyad() {
        let mut sampler = edges_sampler(2, false, 0.0, 1);
        let result = sampler
            .generate_network_with_order(vec![0, 1], true)
            .unwrap();
        let cs = result.change_stats.unwrap();
        assert_eq!(cs.nrows(), 1);
    }

    #[test]
    fn theta_zero_gives_expected_edge_count_matching_half_the_dyads() {
        let mut sampler = edges_sampler(4, false, 0.0, 42);
        let result = sampler
            .generate_network_with_order(vec![0, 1, 2, 3], false)
            .unwrap();
        // e = 6 dyads, each accepted independently with p = 0.5
        assert_abs_diff_eq!(result.expected_stats[0], 3.0, epsilon = 1e-9);
    }

    #[test]
    fn theta_log9_gives_p_point_nine() {
        let mut sampler = edges_sampler(4, false, 9f64.ln(), 7);
        let result = sampler
            .generate_network_with_order(vec![0, 1, 2, 3], false)
            .unwrap();
        assert_abs_diff_eq!(result.expected_stats[0], 5.4, epsilon = 1e-9);
    }

    #[test]
    fn empirical_edge_count_converges_to_expectation() {
        // Scenario 1 from SPEC_FULL.md §8: n=4 undirected, theta=[0], expect ~3.0 edges.
        let mut total = 0.0;
        let trials = 2000;
        for seed in 0..trials {
            let mut sampler = edges_sampler(4, false, 0.0, seed);
            let result = sampler
                .generate_network_with_order(vec![0, 1, 2, 3], false)
                .unwrap();
            total += result.network.edge_count() as f64;
        }
        let mean = total / trials as f64;
        assert!((mean - 3.0).abs() < 0.2, "mean edge count was {mean}");
    }

    #[test]
    fn dyad_update_rollback_round_trip_via_rejecting_theta() {
        // theta very negative => essentially always rejected => stats stay at 0, and the
        // running model's statistics after the call equal the empty network's.
        let mut sampler = edges_sampler(4, false, -1000.0, 3);
        let result = sampler
            .generate_network_with_order(vec![0, 1, 2, 3], false)
            .unwrap();
        assert_eq!(result.stats, vec![0.0]);
        assert_eq!(result.network.edge_count(), 0);
    }

    #[test]
    fn frame_production_scenario_edges_and_triangles() {
        // Scenario 3 from SPEC_FULL.md §8.
        let mut observed = Graph::empty_graph(4, false);
        observed.toggle(0, 1);
        observed.toggle(1, 2);
        observed.toggle(0, 2);
        let terms: Vec<Box<dyn Term>> = vec![Box::new(EdgesTerm::new()), Box::new(TrianglesTerm::new())];
        let theta = vec![-1.609, 0.693];
        let model = Model::new(observed, terms, theta, None).unwrap();
        let config = SamplerConfig {
            seed: Some(5),
            ..SamplerConfig::default()
        };
        let mut sampler: Sampler<StdRng> = Sampler::new(model, config).unwrap();
        let frame = sampler
            .model_frame_given_order(1.0, vec![0, 1, 2, 3])
            .unwrap();
        assert_eq!(frame.len(), 6);
        let outcomes: Vec<u8> = frame.outcome.iter().copied().collect();
        assert_eq!(outcomes, vec![1, 1, 1, 0, 0, 0]);
        for r in 0..6 {
            assert_eq!(frame.samples[[r, 0]], 1.0);
        }
        let triangle_col: Vec<f64> = (0..6).map(|r| frame.samples[[r, 1]]).collect();
        assert_eq!(triangle_col, vec![0.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn downsample_zero_yields_empty_frame() {
        let mut observed = Graph::empty_graph(4, false);
        observed.toggle(0, 1);
        let terms: Vec<Box<dyn Term>> = vec![Box::new(EdgesTerm::new())];
        let model = Model::new(observed, terms, vec![0.0], None).unwrap();
        let config = SamplerConfig {
            seed: Some(1),
            ..SamplerConfig::default()
        };
        let mut sampler: Sampler<StdRng> = Sampler::new(model, config).unwrap();
        let frame = sampler
            .model_frame_given_order(0.0, vec![0, 1, 2, 3])
            .unwrap();
        assert!(frame.is_empty());
    }

    #[test]
    fn downsample_one_yields_frame_length_equal_to_dyads_visited() {
        let mut observed = Graph::empty_graph(4, false);
        observed.toggle(0, 1);
        let terms: Vec<Box<dyn Term>> = vec![Box::new(EdgesTerm::new())];
        let model = Model::new(observed, terms, vec![0.0], None).unwrap();
        let config = SamplerConfig {
            seed: Some(1),
            ..SamplerConfig::default()
        };
        let mut sampler: Sampler<StdRng> = Sampler::new(model, config).unwrap();
        let frame = sampler
            .model_frame_given_order(1.0, vec![0, 1, 2, 3])
            .unwrap();
        assert_eq!(frame.len(), 6);
    }

    #[test]
    fn calc_change_stats_on_observed_graph_returns_e_unit_vectors() {
        let mut observed = Graph::empty_graph(4, false);
        observed.toggle(0, 1);
        observed.toggle(1, 2);
        observed.toggle(0, 2);
        let terms: Vec<Box<dyn Term>> = vec![Box::new(EdgesTerm::new())];
        let model = Model::new(observed, terms, vec![0.0], None).unwrap();
        let config = SamplerConfig {
            seed: Some(1),
            ..SamplerConfig::default()
        };
        let mut sampler: Sampler<StdRng> = Sampler::new(model, config).unwrap();
        let (heads, tails) = Sampler::<StdRng>::canonical_dyad_list(4, false);
        assert_eq!(heads.len(), 6);
        let change = sampler.calc_change_stats(&heads, &tails).unwrap();
        assert_eq!(change.nrows(), 6);
        for r in 0..6 {
            assert_eq!(change[[r, 0]], 1.0);
        }
    }

    #[test]
    fn edge_permutation_mode_matches_expected_edge_count() {
        // Scenario 6 from SPEC_FULL.md §8: trunc_rate=1 on observed K3, theta=[0].
        let mut observed = Graph::empty_graph(3, false);
        observed.toggle(0, 1);
        observed.toggle(1, 2);
        observed.toggle(0, 2);
        let terms: Vec<Box<dyn Term>> = vec![Box::new(EdgesTerm::new())];
        let model = Model::new(observed, terms, vec![0.0], None).unwrap();
        let config = SamplerConfig {
            seed: Some(1),
            ..SamplerConfig::default()
        };
        let mut sampler: Sampler<StdRng> = Sampler::new(model, config).unwrap();
        let (heads, tails) = sampler.sample_unconstrained_candidates(1.0).unwrap();
        let result = sampler
            .generate_network_with_edge_order(&heads, &tails, false)
            .unwrap();
        assert_abs_diff_eq!(
            result.expected_stats[0],
            heads.len() as f64 * 0.5,
            epsilon = 1e-9
        );
    }

    #[test]
    fn variational_model_frame_is_deterministic_given_seed() {
        let mut observed = Graph::empty_graph(4, false);
        observed.toggle(0, 1);
        let terms: Vec<Box<dyn Term>> = vec![Box::new(EdgesTerm::new())];
        let model = Model::new(observed.clone(), terms, vec![0.0], None).unwrap();
        let config = SamplerConfig {
            seed: Some(99),
            ..SamplerConfig::default()
        };
        let mut sampler_a: Sampler<StdRng> = Sampler::new(model, config.clone()).unwrap();
        let frames_a = sampler_a.variational_model_frame(4, 1.0).unwrap();

        let terms2: Vec<Box<dyn Term>> = vec![Box::new(EdgesTerm::new())];
        let model2 = Model::new(observed, terms2, vec![0.0], None).unwrap();
        let mut sampler_b: Sampler<StdRng> = Sampler::new(model2, config).unwrap();
        let frames_b = sampler_b.variational_model_frame(4, 1.0).unwrap();

        let lens_a: Vec<usize> = frames_a.iter().map(ModelFrame::len).collect();
        let lens_b: Vec<usize> = frames_b.iter().map(ModelFrame::len).collect();
        assert_eq!(lens_a, lens_b);
    }

    #[test]
    fn cancellation_aborts_generation() {
        let token = CancellationToken::new();
        token.cancel();
        let mut sampler = edges_sampler(4, false, 0.0, 1);
        let result = sampler.generate_network_with_order_cancellable(
            &mut [0, 1, 2, 3],
            false,
            Some(&token),
        );
        assert!(matches!(result, Err(SamplerError::Cancelled)));
    }

    #[test]
    fn mismatched_vert_order_length_is_configuration_error() {
        let mut sampler = edges_sampler(4, false, 0.0, 1);
        let result = sampler.generate_network_with_order(vec![0, 1], false);
        assert!(matches!(result, Err(SamplerError::Configuration(_))));
    }
}
