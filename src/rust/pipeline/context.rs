use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use serde::Serialize;

use super::builder::InferenceContextBuilder;
use super::report::{PredictionResult, ScanReport};
use crate::care::CareCatalog;
use crate::config::PipelineConfig;
use crate::inference::{calibrate, load_normalized, predict_scores, ImageSource, PipelineError};
use crate::labels::LabelMap;
use crate::model_manager::{ModelHandle, ModelManager};

/// Health snapshot of an [`InferenceContext`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStatus {
    pub model_loaded: bool,
    pub model_path: String,
    /// Cached model load failure, while its cooldown lasts
    pub last_model_error: Option<String>,
    pub num_labels: usize,
    /// True when the default placeholder labels are in use
    pub labels_degraded: bool,
    pub label_error: Option<String>,
    pub care_records: usize,
    /// Why the configured care catalog was replaced by the built-in one
    pub care_error: Option<String>,
}

/// Everything a prediction request needs: labels, the lazily loaded model and care content.
///
/// Build one per process and share it by `Arc` between request handlers. All methods take
/// `&self`.
///
/// ```rust,no_run
/// # fn main() -> Result<(), rashscan::PipelineError> {
/// use rashscan::{InferenceContext, ImageSource};
///
/// let context = InferenceContext::builder()
///     .with_model_path("artifacts/model.onnx")
///     .with_labels_path("artifacts/class_index_to_label.json")
///     .build()?;
///
/// let bytes = std::fs::read("scan.jpg").unwrap();
/// let report = context.scan(ImageSource::Bytes(&bytes), Some("en"))?;
/// println!("{} ({})", report.rash_type, report.confidence);
/// # Ok(())
/// # }
/// ```
pub struct InferenceContext {
    config: PipelineConfig,
    labels: LabelMap,
    models: ModelManager,
    care: CareCatalog,
    care_error: Option<String>,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<InferenceContext>();
    }
};

impl InferenceContext {
    /// Creates a new InferenceContextBuilder for fluent construction
    pub fn builder() -> InferenceContextBuilder {
        InferenceContextBuilder::new()
    }

    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        Self::builder().with_config(config).build()
    }

    pub(super) fn from_parts(
        config: PipelineConfig,
        labels: LabelMap,
        models: ModelManager,
        care: CareCatalog,
        care_error: Option<String>,
    ) -> Self {
        Self {
            config,
            labels,
            models,
            care,
            care_error,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn labels(&self) -> &LabelMap {
        &self.labels
    }

    pub fn care_catalog(&self) -> &CareCatalog {
        &self.care
    }

    /// The shared model handle, loading it if this is the first use.
    pub fn model(&self) -> Result<Arc<ModelHandle>, PipelineError> {
        self.models.acquire()
    }

    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            model_loaded: self.models.is_loaded(),
            model_path: self.models.model_path().display().to_string(),
            last_model_error: self.models.last_error().map(|e| e.to_string()),
            num_labels: self.labels.len(),
            labels_degraded: self.labels.is_fallback(),
            label_error: self.labels.fallback_reason().map(String::from),
            care_records: self.care.len(),
            care_error: self.care_error.clone(),
        }
    }

    /// Classifies one image.
    ///
    /// # Errors
    /// - `ModelNotFound` / `ModelLoadError` when no model can be loaded
    /// - `ImageDecode` when the input is not a readable image
    /// - `PredictionFailed` when inference or calibration fails
    pub fn predict(&self, source: ImageSource<'_>) -> Result<PredictionResult, PipelineError> {
        let handle = self.models.acquire()?;
        let geometry = handle.geometry();
        let image = load_normalized(source, &geometry)?;

        let calibrated = predict_scores(handle.model(), &geometry, self.config.preprocessing, image)
            .and_then(|scores| {
                calibrate(scores).map_err(|e| match e {
                    PipelineError::PredictionFailed { detail, .. } => {
                        PipelineError::prediction(handle.name(), &geometry.batch_shape(), detail)
                    }
                    other => other,
                })
            })
            .map_err(|e| {
                error!("{}", e);
                e
            })?;

        Ok(PredictionResult::from_calibrated(calibrated, &self.labels))
    }

    /// Classifies one image and attaches care guidance in `language`.
    pub fn scan(
        &self,
        source: ImageSource<'_>,
        language: Option<&str>,
    ) -> Result<ScanReport, PipelineError> {
        let prediction = self.predict(source)?;
        let care = self.care.resolve(&prediction.label, language);
        info!(
            "Scan classified as '{}' ({})",
            prediction.label, prediction.confidence_percent
        );
        Ok(ScanReport::new(&prediction, care))
    }

    /// [`scan`](Self::scan) on a blocking worker, bounded by `limit`.
    ///
    /// On timeout the caller gets `Timeout` right away; the worker finishes in the background
    /// and its result is discarded.
    pub async fn scan_with_timeout(
        self: &Arc<Self>,
        bytes: Vec<u8>,
        language: Option<String>,
        limit: Duration,
    ) -> Result<ScanReport, PipelineError> {
        let context = Arc::clone(self);
        let task = tokio::task::spawn_blocking(move || {
            context.scan(ImageSource::Bytes(&bytes), language.as_deref())
        });

        match tokio::time::timeout(limit, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                error!("Scan worker failed: {}", join_error);
                Err(PipelineError::prediction(
                    self.models.model_path().display().to_string(),
                    &[],
                    format!("scan worker failed: {}", join_error),
                ))
            }
            Err(_) => {
                warn!("Scan exceeded {:?}", limit);
                Err(PipelineError::Timeout(limit))
            }
        }
    }
}
