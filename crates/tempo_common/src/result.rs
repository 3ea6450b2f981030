//! Common result and error types for the Tempo analyzer.

/// The standard result type for fallible internal operations.
///
/// `Err` indicates an unrecoverable internal error (a bug in Tempo), not a
/// user-facing failure. Recoverable failures (missing iteration, disconnected
/// window, archive I/O) have their own error enums in the crates that raise
/// them; malformed-trace conditions are reported through
/// `tempo_diagnostics` and the operation still returns `Ok`.
pub type TempoResult<T> = Result<T, InternalError>;

/// An internal analyzer error indicating a bug in Tempo, not a problem with
/// the input trace.
///
/// Raised when a structural invariant of the critical-path graph is violated,
/// e.g. a duplicate node pair for one event or an edge pointing backwards in
/// time surviving into the solver.
#[derive(Debug, thiserror::Error)]
#[error("internal analyzer error: {message}")]
pub struct InternalError {
    /// Description of the violated invariant.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}
