//! Error taxonomy (§7), in the teacher's `thiserror`-derived-enum idiom.

/// Unreadable or malformed taint configuration. Surfaced at initialization;
/// aborts the run (§7).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("malformed taint configuration: {0}")]
    MalformedConfig(String),
    #[error("failed to read taint configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// A transfer function returned a result that is not `⊒` its input — a
/// defect, not a recoverable condition (§7). In debug builds the solver
/// additionally `debug_assert!`s monotonicity at the point of violation, so
/// this variant is mostly surfaced in release builds.
#[derive(Debug, thiserror::Error)]
#[error("lattice invariant violated at {location}: {detail}")]
pub struct LatticeInvariantViolation {
    pub location: String,
    pub detail: String,
}

/// Top-level error type returned by fallible entry points (config loading).
/// `ResolutionFailure` (§7) is deliberately not a variant here: per spec it
/// is logged and the call edge is simply omitted, never propagated as an
/// error.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    LatticeInvariant(#[from] LatticeInvariantViolation),
}
