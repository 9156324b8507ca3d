mod builder;
mod context;
mod report;

pub use builder::InferenceContextBuilder;
pub use context::{InferenceContext, PipelineStatus};
pub use report::{format_percent, ClassProbability, PredictionResult, ScanReport};
