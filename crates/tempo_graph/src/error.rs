//! Error types for graph construction and solving.

use tempo_common::InternalError;

/// Recoverable failures of a critical-path analysis.
///
/// Malformed-trace conditions are *not* errors: they are reported through
/// `tempo_diagnostics` and the build continues best-effort. This enum covers
/// the failures a caller is expected to handle, plus internal invariant
/// violations which indicate a bug.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The iteration selector matched nothing: the annotation does not occur
    /// in the trace, or the instance ordinal is out of range.
    #[error("no instance {instance} of annotation {annotation:?} in trace")]
    NoSuchIteration {
        /// The annotation that was searched for.
        annotation: String,
        /// The requested instance ordinal.
        instance: u64,
    },

    /// The iteration window selected no events at all.
    #[error("iteration window contains no events")]
    EmptyWindow,

    /// The window is non-empty but there is no dependency path from the
    /// iteration's start to its end.
    #[error("no dependency path from iteration start to iteration end")]
    Disconnected,

    /// A structural invariant was violated; a bug in the analyzer, not a
    /// property of the input trace.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_such_iteration_display() {
        let err = GraphError::NoSuchIteration {
            annotation: "ProfilerStep".to_string(),
            instance: 7,
        };
        let msg = err.to_string();
        assert!(msg.contains("instance 7"));
        assert!(msg.contains("ProfilerStep"));
    }

    #[test]
    fn internal_error_wraps() {
        let err: GraphError = InternalError::new("duplicate start node for event 12").into();
        assert!(err.to_string().contains("duplicate start node"));
    }
}
