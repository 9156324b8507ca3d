use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::care::DEFAULT_LANGUAGE;
use crate::inference::{PipelineError, Preprocessing};

/// File name of the classifier inside the artifact directory
pub const MODEL_FILE_NAME: &str = "model.onnx";
/// File name of the label map inside the artifact directory
pub const LABELS_FILE_NAME: &str = "class_index_to_label.json";

const DEFAULT_FAILURE_COOLDOWN_SECS: u64 = 30;

/// Settings for an [`InferenceContext`](crate::InferenceContext).
///
/// Can be deserialized from JSON; any omitted field keeps its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Path to the ONNX classifier
    pub model_path: PathBuf,
    /// Path to the label-map JSON
    pub labels_path: PathBuf,
    /// Optional care-content catalog; the built-in catalog is used when absent
    pub care_catalog_path: Option<PathBuf>,
    /// Language used when a requested translation is missing
    pub default_language: String,
    /// Feature scaling the model was trained with
    pub preprocessing: Preprocessing,
    /// How long a failed model load is remembered before it is retried
    pub failure_cooldown_secs: u64,
    /// Hex SHA-256 the model file must match, if set
    pub expected_model_sha256: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_dir(Self::default_artifact_dir())
    }
}

impl PipelineConfig {
    /// Configuration with both artifacts expected under `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            model_path: dir.join(MODEL_FILE_NAME),
            labels_path: dir.join(LABELS_FILE_NAME),
            care_catalog_path: None,
            default_language: DEFAULT_LANGUAGE.to_string(),
            preprocessing: Preprocessing::default(),
            failure_cooldown_secs: DEFAULT_FAILURE_COOLDOWN_SECS,
            expected_model_sha256: None,
        }
    }

    /// Returns the default artifact directory
    pub fn default_artifact_dir() -> PathBuf {
        // 1. Check environment variable
        if let Ok(path) = env::var("RASHSCAN_HOME") {
            return PathBuf::from(path);
        }

        // 2. Use platform-specific data directory
        if let Some(data_dir) = dirs::data_dir() {
            return data_dir.join("rashscan");
        }

        // 3. Fallback to user's home directory
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".local").join("share").join("rashscan");
        }

        // 4. If all else fails, use system temp directory
        env::temp_dir().join("rashscan")
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            PipelineError::InvalidConfig(format!("cannot read {:?}: {}", path, e))
        })?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| PipelineError::InvalidConfig(format!("{:?}: {}", path, e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn failure_cooldown(&self) -> Duration {
        Duration::from_secs(self.failure_cooldown_secs)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.default_language.trim().is_empty() {
            return Err(PipelineError::InvalidConfig("default_language cannot be empty".into()));
        }
        if let Some(hash) = &self.expected_model_sha256 {
            if hash.len() != 64 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(PipelineError::InvalidConfig(format!(
                    "expected_model_sha256 must be 64 hex characters, got '{}'",
                    hash
                )));
            }
        }
        Ok(())
    }
}
