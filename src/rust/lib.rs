//! Skin-rash image classification with calibrated confidence and localized care guidance.
//!
//! An [`InferenceContext`] owns the label map, the lazily loaded ONNX classifier and the
//! care catalog. A scan decodes the upload, resizes it to the model's input geometry, runs
//! the classifier, turns its scores into a probability distribution and attaches the care
//! tips for the winning label.
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use rashscan::{InferenceContext, ImageSource};
//!
//! let context = InferenceContext::builder()
//!     .with_model_path("artifacts/model.onnx")
//!     .with_labels_path("artifacts/class_index_to_label.json")
//!     .build()?;
//!
//! let report = context.scan(ImageSource::Path("scan.jpg".as_ref()), Some("en"))?;
//! println!("{}", report.to_json_pretty()?);
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! The context is `Send + Sync`. Share it between request handlers with `Arc`; the model is
//! loaded once, by whichever request needs it first:
//!
//! ```rust,no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use rashscan::{InferenceContext, ImageSource};
//! use std::sync::Arc;
//! use std::thread;
//!
//! let context = Arc::new(InferenceContext::builder().build()?);
//!
//! let mut handles = vec![];
//! for path in ["a.png", "b.png", "c.png"] {
//!     let context = Arc::clone(&context);
//!     handles.push(thread::spawn(move || {
//!         context.predict(ImageSource::Path(path.as_ref()))
//!     }));
//! }
//!
//! for handle in handles {
//!     println!("{:?}", handle.join().unwrap().map(|p| p.label));
//! }
//! # Ok(())
//! # }
//! ```

pub mod care;
pub mod config;
pub mod inference;
pub mod labels;
pub mod model_manager;
pub mod pipeline;
mod runtime;

pub use care::{CareCatalog, CareContent, CareRecord, LocalizedTips};
pub use config::PipelineConfig;
pub use inference::{ErrorKind, ImageSource, Preprocessing, PipelineError};
pub use labels::{LabelMap, LabelSource};
pub use model_manager::{ModelHandle, ModelManager};
pub use pipeline::{InferenceContext, InferenceContextBuilder, PipelineStatus, PredictionResult, ScanReport};
pub use runtime::{create_session_builder, RuntimeConfig};

/// Initializes `env_logger` at `info` unless `RUST_LOG` says otherwise. Safe to call twice.
pub fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
