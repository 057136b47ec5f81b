//! Error types for the node-selection engine

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds, matching the error taxonomy of the selection engine.
///
/// `NoFit` is the ordinary outcome of a failed placement attempt and is not
/// logged as an error by callers. `Invariant` covers state-drift recovered
/// by clamping (underflowed counters, a missing per-partition entry); the
/// call still returns an error so the caller can log it, but `State` stays
/// usable. `Unsupported` and `Fatal` are narrower: `Unsupported` for a
/// request the engine deliberately refuses (GRES-bearing expand),
/// `Fatal` for a misconfiguration that should abort the host process
/// (an unknown scheduling mode).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No set of nodes satisfies the request under the current state.
    #[error("no fit for request")]
    NoFit,

    /// Recovered state-drift: a counter underflowed or a partition entry
    /// was missing where one should exist. The anomaly has been clamped.
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// A job requested something this engine explicitly will not do.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A bad scheduling mode or other condition the caller must not rely on.
    #[error("fatal: {0}")]
    Fatal(String),

    /// Invalid request shape: fewer nodes than `min_nodes`, required bits
    /// absent from candidates, or `min > max`.
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl Error {
    /// True for the one error kind callers should retry later rather than
    /// treat as a bug.
    pub fn is_no_fit(&self) -> bool {
        matches!(self, Error::NoFit)
    }
}
