//! Structured error types for data operations.

use thiserror::Error;

/// Errors from fetching, normalizing, and persisting data.
///
/// A fetch either fully succeeds or fails with one of these; there is no
/// partial-result mode.
#[derive(Debug, Error)]
pub enum DataError {
    /// No API key configured. Fatal at construction time; nothing to retry.
    #[error("missing credential: {0} is not set")]
    MissingCredential(&'static str),

    /// Provider unreachable, or returned a non-success status after the
    /// bounded retries were exhausted.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response violated the expected structure, or a requested series
    /// came back empty. Distinct from transport: the provider answered, but
    /// broke its contract.
    #[error("schema error: {0}")]
    Schema(String),

    /// Local cache file could not be written or read back. The freshness
    /// check never propagates this variant: an unreadable file is treated
    /// as stale and triggers a refetch instead.
    #[error("cache error: {0}")]
    Cache(String),
}
