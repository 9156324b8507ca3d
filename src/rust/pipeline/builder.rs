use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use super::context::InferenceContext;
use crate::care::CareCatalog;
use crate::config::PipelineConfig;
use crate::inference::{ModelLoader, OnnxModelLoader, PipelineError, Preprocessing};
use crate::labels::LabelMap;
use crate::model_manager::ModelManager;
use crate::runtime::RuntimeConfig;

/// A builder for constructing an [`InferenceContext`] with a fluent interface.
///
/// Nothing expensive happens in [`build`](Self::build): labels and care content are read,
/// the model itself is loaded on the first prediction.
pub struct InferenceContextBuilder {
    config: PipelineConfig,
    runtime_config: RuntimeConfig,
    loader: Option<Arc<dyn ModelLoader>>,
    labels: Option<LabelMap>,
    care: Option<CareCatalog>,
    failure_cooldown: Option<Duration>,
}

impl Default for InferenceContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceContextBuilder {
    /// Creates a builder starting from [`PipelineConfig::default`]
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            runtime_config: RuntimeConfig::default(),
            loader: None,
            labels: None,
            care: None,
            failure_cooldown: None,
        }
    }

    /// Replaces the whole configuration
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the ONNX Runtime session settings used by the default loader
    pub fn with_runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.runtime_config = config;
        self
    }

    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.model_path = path.into();
        self
    }

    pub fn with_labels_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.labels_path = path.into();
        self
    }

    /// Uses an already resolved label map instead of reading `labels_path`
    pub fn with_labels(mut self, labels: LabelMap) -> Self {
        self.labels = Some(labels);
        self
    }

    pub fn with_care_catalog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.care_catalog_path = Some(path.into());
        self
    }

    /// Uses an in-memory catalog instead of the configured or built-in one
    pub fn with_care_catalog(mut self, catalog: CareCatalog) -> Self {
        self.care = Some(catalog);
        self
    }

    pub fn with_default_language(mut self, language: impl Into<String>) -> Self {
        self.config.default_language = language.into();
        self
    }

    pub fn with_preprocessing(mut self, preprocessing: Preprocessing) -> Self {
        self.config.preprocessing = preprocessing;
        self
    }

    /// How long a failed model load is remembered. Overrides `failure_cooldown_secs`.
    pub fn with_failure_cooldown(mut self, cooldown: Duration) -> Self {
        self.failure_cooldown = Some(cooldown);
        self
    }

    pub fn with_expected_sha256(mut self, hash: impl Into<String>) -> Self {
        self.config.expected_model_sha256 = Some(hash.into());
        self
    }

    /// Replaces the ONNX loader, e.g. with an in-process model for tests
    pub fn with_loader(mut self, loader: Arc<dyn ModelLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Builds the context.
    ///
    /// # Errors
    /// Only invalid configuration values fail. Unusable labels or care data degrade to
    /// their defaults and show up in [`InferenceContext::status`].
    pub fn build(self) -> Result<InferenceContext, PipelineError> {
        let config = self.config;
        config.validate()?;

        let labels = self
            .labels
            .unwrap_or_else(|| LabelMap::load(&config.labels_path));
        if let Some(reason) = labels.fallback_reason() {
            warn!("Predictions will use placeholder labels: {}", reason);
        }

        let (care, care_error) = match (self.care, &config.care_catalog_path) {
            (Some(catalog), _) => (catalog, None),
            (None, Some(path)) => match CareCatalog::from_path(path) {
                Ok(catalog) => (catalog, None),
                Err(e) => {
                    warn!("Using built-in care content: {}", e);
                    (CareCatalog::builtin(), Some(e.to_string()))
                }
            },
            (None, None) => (CareCatalog::builtin(), None),
        };
        let care = care.with_default_language(config.default_language.clone());

        let loader = self
            .loader
            .unwrap_or_else(|| {
                Arc::new(OnnxModelLoader::new(self.runtime_config)) as Arc<dyn ModelLoader>
            });
        let cooldown = self.failure_cooldown.unwrap_or_else(|| config.failure_cooldown());
        let models = ModelManager::new(config.model_path.clone(), loader, cooldown)
            .with_expected_sha256(config.expected_model_sha256.clone());

        info!(
            "Inference context ready: {} labels, {} care records, model {:?}",
            labels.len(),
            care.len(),
            config.model_path
        );

        Ok(InferenceContext::from_parts(config, labels, models, care, care_error))
    }
}
