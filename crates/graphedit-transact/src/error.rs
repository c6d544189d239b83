//! Edit-layer error types.
//!
//! There are two error classes: transaction-invalid (recoverable, always
//! resolved by rollback, surfaced as a reason string) and programmer errors
//! (API misuse), which panic rather than appearing here.

use thiserror::Error;

use graphedit_core::CoreError;

/// Errors produced by the editing machinery.
#[derive(Debug, Error)]
pub enum EditError {
    /// A transaction failed validation and was rolled back. The graph is in
    /// its exact pre-transaction state.
    #[error("transaction invalid: {reason}")]
    Invalid { reason: String },

    /// A core graph operation was misdirected (stale id, wrong item kind).
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl EditError {
    pub(crate) fn invalid(reason: impl Into<String>) -> EditError {
        EditError::Invalid {
            reason: reason.into(),
        }
    }
}
