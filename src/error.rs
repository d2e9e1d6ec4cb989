//! Error taxonomy for the closure engine, storage adapter and worker loop.

use thiserror::Error;

/// Errors surfaced by `Server`, the closure engine and the storage adapter.
///
/// `NoWork` is deliberately not a variant here: an empty queue after waiting
/// is expected steady-state behavior, not a failure. See [`crate::worker::ProcessOutcome`].
#[derive(Debug, Error)]
pub enum Error {
    /// `check` was asked about `system:users:<relation>` for a relation other
    /// than `*` or `authenticated`.
    #[error("invalid system group relation '{relation}'")]
    InvalidSystemGroup { relation: String },

    /// The underlying storage adapter failed.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// The closure engine failed mid-change; the worker will roll back and retry.
    #[error("processing error: {0}")]
    Processing(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_system_group_message_names_the_relation() {
        let err = Error::InvalidSystemGroup { relation: "god".to_string() };
        assert!(err.to_string().contains("god"));
    }

    #[test]
    fn processing_error_message_carries_the_reason() {
        let err = Error::Processing("dfs blew the stack".to_string());
        assert!(err.to_string().contains("dfs blew the stack"));
    }
}
