use ort::Error as OrtError;
use std::time::Duration;
use thiserror::Error;

/// Who is expected to act on a failure: the caller (bad input) or the service (retry later).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Client,
    Server,
}

/// Represents the different types of errors that can occur in the scan pipeline.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// The label map could not be read or parsed. Recovered by the default labels.
    #[error("Label map unavailable: {0}")]
    LabelMapUnavailable(String),
    /// No model artifact exists at the configured path
    #[error("Model not found at {0}")]
    ModelNotFound(String),
    /// The model artifact exists but could not be deserialized or verified
    #[error("Model load error: {0}")]
    ModelLoadError(String),
    /// The uploaded image could not be read or decoded
    #[error("Image decode error: {0}")]
    ImageDecode(String),
    /// Inference ran but did not produce a usable score vector
    #[error("Prediction failed for model '{model}' with input shape {input_shape:?}: {detail}")]
    PredictionFailed {
        model: String,
        input_shape: Vec<usize>,
        detail: String,
    },
    /// No care record is stored for the label. Recovered by the generic tip.
    #[error("No care content for label '{0}'")]
    CareContentMissing(String),
    /// Inference did not finish within the caller's deadline
    #[error("Prediction timed out after {0:?}")]
    Timeout(Duration),
    /// Configuration values are unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ImageDecode(_) => ErrorKind::Client,
            _ => ErrorKind::Server,
        }
    }

    /// HTTP status the outer layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ImageDecode(_) => 400,
            Self::ModelNotFound(_) | Self::ModelLoadError(_) | Self::Timeout(_) => 503,
            _ => 500,
        }
    }

    /// Message safe to hand back to a remote caller. Diagnostics stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::ImageDecode(_) => "The uploaded file is not a readable image".to_string(),
            Self::ModelNotFound(_) | Self::ModelLoadError(_) => {
                "The classification model is not available".to_string()
            }
            Self::PredictionFailed { .. } => "The image could not be classified".to_string(),
            Self::Timeout(_) => "Classification took too long, please retry".to_string(),
            _ => "Internal error".to_string(),
        }
    }

    pub(crate) fn prediction(
        model: impl Into<String>,
        input_shape: &[usize],
        detail: impl Into<String>,
    ) -> Self {
        Self::PredictionFailed {
            model: model.into(),
            input_shape: input_shape.to_vec(),
            detail: detail.into(),
        }
    }
}

impl From<OrtError> for PipelineError {
    fn from(err: OrtError) -> Self {
        PipelineError::ModelLoadError(err.to_string())
    }
}
