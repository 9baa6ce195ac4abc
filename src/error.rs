//! Error types returned by the latent-order likelihood engine.

/// Errors that can arise from constructing or driving a [`crate::sampler::Sampler`].
///
/// Every call into the engine either succeeds cleanly or returns one of these; there is no
/// partial-success path (see `SPEC_FULL.md` §7).
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum SamplerError {
    /// A caller-supplied argument was malformed: a size mismatch, an out-of-range vertex
    /// index, a partial-order vector whose length doesn't match the graph, or a NaN rank
    /// key.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A design invariant was violated — most commonly, a proposed edge addition landed on
    /// a dyad that already exists. This indicates a bug in a [`crate::term::Term`]
    /// implementation or in the engine itself, never a user-input problem.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A term reported a non-finite change statistic, or the running log-likelihood delta
    /// was non-finite.
    #[error("numeric error: {0}")]
    Numeric(String),

    /// The caller's cooperative cancellation flag was observed set.
    #[error("sampling cancelled")]
    Cancelled,
}

impl SamplerError {
    /// Construct a [`SamplerError::Configuration`] from any displayable message.
    ///
    /// Configuration errors are expected, caller-triggerable outcomes (bad input, not a
    /// bug), so they're logged at `warn` rather than `error` (`SPEC_FULL.md` §7).
    pub fn configuration(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!(%msg, "configuration error");
        Self::Configuration(msg)
    }

    /// Construct a [`SamplerError::InvariantViolation`] from any displayable message.
    pub fn invariant(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!(%msg, "invariant violation");
        Self::InvariantViolation(msg)
    }

    /// Construct a [`SamplerError::Numeric`] from any displayable message.
    pub fn numeric(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!(%msg, "numeric error");
        Self::Numeric(msg)
    }

    /// Construct a [`SamplerError::Cancelled`], logging the observed cancellation.
    pub fn cancelled() -> Self {
        tracing::info!("sampling cancelled");
        Self::Cancelled
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SamplerError>;
