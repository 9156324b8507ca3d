use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::inference::{ClassifierModel, InputGeometry, ModelLoader, PipelineError};

/// A loaded classifier together with the input geometry inferred from it.
pub struct ModelHandle {
    model: Box<dyn ClassifierModel>,
    geometry: InputGeometry,
    path: PathBuf,
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("model", &self.model.name())
            .field("geometry", &self.geometry)
            .field("path", &self.path)
            .finish()
    }
}

impl ModelHandle {
    pub fn new(model: Box<dyn ClassifierModel>, path: impl Into<PathBuf>) -> Self {
        let geometry = InputGeometry::from_input_shape(model.input_shape().as_deref());
        Self {
            model,
            geometry,
            path: path.into(),
        }
    }

    pub fn model(&self) -> &dyn ClassifierModel {
        self.model.as_ref()
    }

    pub fn name(&self) -> &str {
        self.model.name()
    }

    pub fn geometry(&self) -> InputGeometry {
        self.geometry
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

struct CachedFailure {
    error: PipelineError,
    at: Instant,
}

/// Loads the classifier at most once and hands out the shared handle.
///
/// The first successful [`acquire`](ModelManager::acquire) stores the handle; later calls read
/// it without locking. Loading happens under a mutex so concurrent first callers never load
/// twice. A failed load is remembered for `cooldown` and returned without touching the
/// artifact again. The remembered failure sits behind its own lock, written only after a
/// load returns, so [`last_error`](ModelManager::last_error) never waits on a load.
pub struct ModelManager {
    model_path: PathBuf,
    expected_sha256: Option<String>,
    loader: Arc<dyn ModelLoader>,
    cooldown: Duration,
    handle: OnceLock<Arc<ModelHandle>>,
    load_lock: Mutex<()>,
    failure: RwLock<Option<CachedFailure>>,
}

impl ModelManager {
    pub fn new(
        model_path: impl Into<PathBuf>,
        loader: Arc<dyn ModelLoader>,
        cooldown: Duration,
    ) -> Self {
        Self {
            model_path: model_path.into(),
            expected_sha256: None,
            loader,
            cooldown,
            handle: OnceLock::new(),
            load_lock: Mutex::new(()),
            failure: RwLock::new(None),
        }
    }

    /// Requires the artifact to hash to `hash` (hex SHA-256) before it is loaded.
    pub fn with_expected_sha256(mut self, hash: Option<String>) -> Self {
        self.expected_sha256 = hash.map(|h| h.to_ascii_lowercase());
        self
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.get().is_some()
    }

    /// The cached handle, if a load already succeeded. Never loads.
    pub fn loaded(&self) -> Option<Arc<ModelHandle>> {
        self.handle.get().cloned()
    }

    /// The most recent load failure, if it is still cached.
    pub fn last_error(&self) -> Option<PipelineError> {
        self.cached_failure()
    }

    /// Returns the shared handle, loading the model on first use.
    pub fn acquire(&self) -> Result<Arc<ModelHandle>, PipelineError> {
        if let Some(handle) = self.handle.get() {
            return Ok(Arc::clone(handle));
        }

        let _loading = self.load_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Another caller may have finished loading while we waited
        if let Some(handle) = self.handle.get() {
            return Ok(Arc::clone(handle));
        }
        if let Some(error) = self.cached_failure() {
            log::debug!("Model load failed recently, not retrying: {}", error);
            return Err(error);
        }

        let result = self.load();
        let mut failure = self.failure.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        match result {
            Ok(handle) => {
                *failure = None;
                Ok(Arc::clone(self.handle.get_or_init(|| Arc::new(handle))))
            }
            Err(e) => {
                log::error!("Failed to load model from {:?}: {}", self.model_path, e);
                *failure = Some(CachedFailure {
                    error: e.clone(),
                    at: Instant::now(),
                });
                Err(e)
            }
        }
    }

    /// The remembered failure while its cooldown lasts.
    fn cached_failure(&self) -> Option<PipelineError> {
        let failure = self.failure.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        failure
            .as_ref()
            .filter(|f| f.at.elapsed() < self.cooldown)
            .map(|f| f.error.clone())
    }

    fn load(&self) -> Result<ModelHandle, PipelineError> {
        let path = &self.model_path;
        log::info!("Loading model from {:?}", path);
        if !path.exists() {
            return Err(PipelineError::ModelNotFound(path.display().to_string()));
        }

        if let Some(expected) = &self.expected_sha256 {
            if !verify_file(path, expected)? {
                return Err(PipelineError::ModelLoadError(format!(
                    "hash mismatch for {:?}",
                    path
                )));
            }
            log::info!("Model file hash verified");
        }

        let model = self.loader.load(path).map_err(|e| match e {
            e @ (PipelineError::ModelNotFound(_) | PipelineError::ModelLoadError(_)) => e,
            other => PipelineError::ModelLoadError(other.to_string()),
        })?;
        let handle = ModelHandle::new(model, path.clone());
        log::info!(
            "Model '{}' ready, input {}x{} ({:?})",
            handle.name(),
            handle.geometry.height,
            handle.geometry.width,
            handle.geometry.layout
        );
        Ok(handle)
    }
}

/// Hex SHA-256 of the file at `path`.
pub fn file_sha256(path: &Path) -> Result<String, PipelineError> {
    let bytes = fs::read(path)
        .map_err(|e| PipelineError::ModelLoadError(format!("cannot read {:?}: {}", path, e)))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

fn verify_file(path: &Path, expected_hash: &str) -> Result<bool, PipelineError> {
    log::info!("Verifying file: {:?}", path);
    let hash = file_sha256(path)?;
    log::debug!("Calculated hash: {}", hash);
    log::debug!("Expected hash:   {}", expected_hash);
    Ok(hash == expected_hash)
}
