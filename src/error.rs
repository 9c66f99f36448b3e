use thiserror::Error;

/// Failure kinds of the training and inference core.
///
/// Unknown categorical values are not listed here: they are encoded through
/// the configured fallback policy and logged. Only the `Reject` policy turns
/// them into a [`PredictorError::Validation`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictorError {
    /// Malformed or missing input fields. Caller's fault, never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Not enough data (or class diversity) to fit a model.
    #[error("insufficient training data: {0}")]
    DataInsufficient(String),

    /// A feature vector does not match the width the model was trained on.
    #[error("feature schema mismatch: model expects {expected} features, got {actual}")]
    SchemaMismatch { expected: usize, actual: usize },
}

impl PredictorError {
    pub fn validation(msg: impl Into<String>) -> Self {
        PredictorError::Validation(msg.into())
    }

    pub fn insufficient(msg: impl Into<String>) -> Self {
        PredictorError::DataInsufficient(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, PredictorError>;
