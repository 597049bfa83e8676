use thiserror::Error;

/// Rejected eagerly at matcher construction. Strategy validation happens
/// once, not per comparison.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("numeric tolerance must be a non-negative finite number, got {0}")]
    InvalidTolerance(f64),
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error("invalid JSON schema: {0}")]
    InvalidSchema(String),
}

/// Raised while a comparison runs.
///
/// A failing caller-supplied predicate indicates a bug in the caller's
/// matcher, so it propagates as an error and is never folded into a 0.0
/// score.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("custom predicate failed: {0}")]
    Predicate(anyhow::Error),
}
