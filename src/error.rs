use thiserror::Error;

/// The error type for fitting and applying transformation models.
#[derive(Debug, Error)]
pub enum DecompositionError {
    /// Input or configuration rejected before any computation started.
    #[error("precondition violated: {0}")]
    Precondition(String),

    /// An iterative weight matrix picked up NaN or infinite entries.
    #[error(
        "{algorithm} diverged at iteration {iteration}: weight matrix contains NaN or infinite values; \
         try a lower learning rate or tolerance"
    )]
    Divergence {
        algorithm: &'static str,
        iteration: usize,
    },

    /// The dataset handed to `apply` does not carry the fields the model was trained on.
    #[error("shape mismatch: model expects {expected} regular fields, dataset has {found}{detail}")]
    ShapeMismatch {
        expected: usize,
        found: usize,
        detail: String,
    },

    /// The caller requested a stop through a `StopHandle`.
    #[error("operation stopped on request")]
    Stopped,

    #[error("linear algebra operation failed: {0}")]
    Linalg(String),

    #[error("model persistence failed: {0}")]
    Persistence(String),
}

impl DecompositionError {
    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        DecompositionError::Precondition(msg.into())
    }

    pub(crate) fn linalg(context: &str, err: impl std::fmt::Display) -> Self {
        DecompositionError::Linalg(format!("{}: {}", context, err))
    }

    /// Whether this is the cancellation path rather than a failure.
    pub fn is_stopped(&self) -> bool {
        matches!(self, DecompositionError::Stopped)
    }
}

pub type Result<T> = std::result::Result<T, DecompositionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divergence_message_names_iteration() {
        let err = DecompositionError::Divergence {
            algorithm: "GHA",
            iteration: 17,
        };
        let msg = err.to_string();
        assert!(msg.contains("GHA"));
        assert!(msg.contains("iteration 17"));
        assert!(msg.contains("learning rate"));
        assert!(!err.is_stopped());
    }

    #[test]
    fn shape_mismatch_reports_both_counts() {
        let err = DecompositionError::ShapeMismatch {
            expected: 4,
            found: 3,
            detail: String::new(),
        };
        let msg = err.to_string();
        assert!(msg.contains('4') && msg.contains('3'));
    }

    #[test]
    fn stopped_is_distinguished() {
        assert!(DecompositionError::Stopped.is_stopped());
    }
}
