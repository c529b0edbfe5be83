use thiserror::Error;

/// The error type for `scunet-burn` operations.
#[derive(Error, Debug)]
pub enum ScunetError {
    /// The model or layer configuration is logically inconsistent.
    #[error("Invalid model configuration: {reason}")]
    InvalidConfiguration {
        /// Why the configuration was rejected.
        reason: String,
    },

    /// An input tensor has a shape the model cannot process.
    #[error("Invalid input tensor shape: expected {expected}, got {actual}")]
    InvalidTensorShape {
        /// Description of the accepted shape.
        expected: String,
        /// The shape that was received.
        actual: String,
    },

    /// Reading or mapping pretrained weights failed.
    #[error("Failed to load weights: {reason}")]
    WeightLoadingFailed {
        /// The underlying cause.
        reason: String,
    },

    /// Writing a model record failed.
    #[error("Failed to save model record: {reason}")]
    RecordSaveFailed {
        /// The underlying cause.
        reason: String,
    },

    /// Converting between images and tensors failed.
    #[error("Image processing failed: {reason}")]
    ImageProcessing {
        /// The underlying cause.
        reason: String,
    },

    /// The network produced NaN or infinite values.
    #[error("Model output contains non-finite values")]
    NonFiniteOutput,
}

/// A specialized `Result` type for `scunet-burn` operations.
pub type ScunetResult<T> = Result<T, ScunetError>;
