//! A latent-order likelihood engine for random graphs (LOLOG): given a growing-graph
//! process that visits dyads one at a time and accepts or rejects each one by a logistic
//! draw on a linear combination of incremental change statistics, this crate provides the
//! pieces needed to simulate from such a process and to build the training frames used to
//! fit its parameters by maximum pseudo-likelihood.
//!
//! The public surface is organised the way the spec's own module boundaries are drawn:
//! - [`ranker`] — C1, rank-with-random-tiebreak.
//! - [`graph`] — C2, the mutable dyad-toggling graph.
//! - [`term`] — C3, the incremental statistic contract (plus a small bundled [`terms`]
//!   library used for testing).
//! - [`model`] — C4, a graph bound to its terms, θ, and an optional partial order.
//! - [`order`] — C5, sampling a partial-order-respecting visitation order.
//! - [`sampler`] — C6, the simulator and model-frame producer.

pub mod config;
pub mod error;
pub mod graph;
pub mod model;
pub mod order;
pub mod ranker;
pub mod rng_util;
pub mod sampler;
pub mod term;
pub mod terms;

pub use config::SamplerConfig;
pub use error::{Result, SamplerError};
pub use graph::Graph;
pub use model::Model;
pub use order::generate_order;
pub use ranker::{rank, Ties};
pub use sampler::{CancellationToken, GenerationResult, ModelFrame, Sampler};
pub use term::Term;
