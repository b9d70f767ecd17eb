// src/core/errors.rs
use ndarray; // Required for ndarray::ShapeError
use std::fmt;

#[derive(Debug)]
pub enum LimeError {
    InvalidInput(String),
    /// Shape inconsistency between image, segmentation map, or fudged image.
    ShapeMismatch(String),
    /// The segmentation function failed or produced an unusable label map.
    /// Fatal to the explanation request.
    InvalidSegmentation(String),
    /// An explanation or visualization was requested for a label that was
    /// never fit. Recoverable by the caller; signals a usage error.
    MissingLabel(usize),
    ModelPredictionError(String),
    InpaintingError(String),
    InternalError(String),
    NdarrayError(String),
}

impl fmt::Display for LimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimeError::InvalidInput(msg) => write!(f, "Invalid Input: {}", msg),
            LimeError::ShapeMismatch(msg) => write!(f, "Shape Mismatch: {}", msg),
            LimeError::InvalidSegmentation(msg) => write!(f, "Invalid Segmentation: {}", msg),
            LimeError::MissingLabel(label) => {
                write!(f, "Label {} is not in the explanation", label)
            }
            LimeError::ModelPredictionError(msg) => write!(f, "Model Prediction Error: {}", msg),
            LimeError::InpaintingError(msg) => write!(f, "Inpainting Error: {}", msg),
            LimeError::InternalError(msg) => write!(f, "Internal Error: {}", msg),
            LimeError::NdarrayError(msg) => write!(f, "Ndarray Error: {}", msg),
        }
    }
}

impl std::error::Error for LimeError {} // Allow ? operator with this error type

impl From<ndarray::ShapeError> for LimeError {
    fn from(err: ndarray::ShapeError) -> Self {
        LimeError::NdarrayError(format!("ndarray ShapeError: {}", err))
    }
}

// Convenience type alias for Result
pub type Result<T> = std::result::Result<T, LimeError>;
