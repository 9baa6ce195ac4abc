//! Engine-level configuration knobs.
//!
//! Generalizes the teacher crate's CLI-facing `Config` struct into a library-level
//! surface: there is no CLI here, but the same "one struct of tunables, deserializable
//! from JSON" shape is worth keeping.

use serde::{Deserialize, Serialize};

/// Tunables for a [`crate::sampler::Sampler`] run.
///
/// `seed: None` means "seed from entropy once at construction and log the seed used" so a
/// run can still be reproduced after the fact from its logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// RNG seed. `None` draws a fresh seed from entropy.
    pub seed: Option<u64>,
    /// Default downsample rate used by `model_frame_*` calls when the caller doesn't
    /// override it. Must lie in `[0, 1]`.
    pub downsample_rate: f64,
    /// Default truncation rate used by the unconstrained edge-permutation generators.
    /// Must lie in `(0, 1]`.
    pub trunc_rate: f64,
    /// Default batch size for `variational_model_frame*`.
    pub n_orders: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            seed: None,
            downsample_rate: 1.0,
            trunc_rate: 1.0,
            n_orders: 1,
        }
    }
}

impl SamplerConfig {
    /// Validate the ranges documented on each field.
    pub fn validate(&self) -> crate::error::Result<()> {
        if !(0.0..=1.0).contains(&self.downsample_rate) {
            return Err(crate::error::SamplerError::configuration(format!(
                "downsample_rate must lie in [0, 1], got {}",
                self.downsample_rate
            )));
        }
        if !(self.trunc_rate > 0.0 && self.trunc_rate <= 1.0) {
            return Err(crate::error::SamplerError::configuration(format!(
                "trunc_rate must lie in (0, 1], got {}",
                self.trunc_rate
            )));
        }
        if self.n_orders == 0 {
            return Err(crate::error::SamplerError::configuration(
                "n_orders must be at least 1",
            ));
        }
        Ok(())
    }
}
