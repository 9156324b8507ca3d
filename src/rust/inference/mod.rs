mod calibration;
mod error;
mod model;
mod normalizer;
mod predictor;

pub use calibration::{argmax, calibrate, is_distribution, softmax, Calibrated, DISTRIBUTION_TOLERANCE};
pub use error::{ErrorKind, PipelineError};
pub use model::{
    ClassifierModel, InputGeometry, ModelLoader, ModelOutput, OnnxModel, OnnxModelLoader,
    TensorLayout,
};
pub use normalizer::{decode_image, load_normalized, normalize_image, ImageSource};
pub use predictor::{predict_scores, to_batch, Preprocessing, ScoreVector};
