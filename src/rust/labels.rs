use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde_json::{Map, Value};

use crate::inference::PipelineError;

/// Labels used when no usable label map is available.
pub const DEFAULT_LABELS: [&str; 3] = ["class_0", "class_1", "class_2"];

/// Upper bound on the class index accepted from a label map.
const MAX_CLASS_INDEX: usize = 65_535;

/// Placeholder name for a class index without an explicit label.
pub fn placeholder_label(index: usize) -> String {
    format!("label_{}", index)
}

/// Where the labels of a [`LabelMap`] came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelSource {
    /// Parsed from a label-map artifact
    Artifact(Option<PathBuf>),
    /// The artifact was unusable and the default labels were substituted
    Fallback { reason: String },
}

/// Ordered class names, indexed by the model's output position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    labels: Vec<String>,
    source: LabelSource,
}

impl LabelMap {
    /// Loads the label map at `path`, falling back to [`DEFAULT_LABELS`] when the file is
    /// missing or malformed. Never fails; check [`LabelMap::is_fallback`] for degraded labels.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let parsed = fs::read_to_string(path)
            .map_err(|e| {
                PipelineError::LabelMapUnavailable(format!("cannot read {:?}: {}", path, e))
            })
            .and_then(|text| Self::parse(&text));

        match parsed {
            Ok(labels) => {
                info!("Loaded {} labels from {:?}", labels.len(), path);
                Self {
                    labels,
                    source: LabelSource::Artifact(Some(path.to_path_buf())),
                }
            }
            Err(e) => {
                warn!("Falling back to default labels: {}", e);
                Self::fallback(e.to_string())
            }
        }
    }

    /// Parses label-map JSON in either direction. Errors instead of falling back.
    pub fn from_json_str(text: &str) -> Result<Self, PipelineError> {
        Ok(Self {
            labels: Self::parse(text)?,
            source: LabelSource::Artifact(None),
        })
    }

    /// Builds a map from labels already in index order.
    pub fn from_labels(labels: Vec<impl Into<String>>) -> Result<Self, PipelineError> {
        if labels.is_empty() {
            return Err(PipelineError::LabelMapUnavailable("label list is empty".into()));
        }
        Ok(Self {
            labels: labels.into_iter().map(Into::into).collect(),
            source: LabelSource::Artifact(None),
        })
    }

    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            labels: DEFAULT_LABELS.iter().map(|s| s.to_string()).collect(),
            source: LabelSource::Fallback { reason: reason.into() },
        }
    }

    fn parse(text: &str) -> Result<Vec<String>, PipelineError> {
        let object: Map<String, Value> = serde_json::from_str(text)
            .map_err(|e| PipelineError::LabelMapUnavailable(format!("invalid JSON object: {}", e)))?;
        if object.is_empty() {
            return Err(PipelineError::LabelMapUnavailable("label map is empty".into()));
        }

        // Keys iterate in file order, so a repeated index keeps its last label
        let index_keyed = object.keys().all(|k| is_index(k));
        let mut entries = Vec::with_capacity(object.len());
        for (key, value) in &object {
            let entry = if index_keyed {
                (parse_index(key)?, label_text(value)?)
            } else {
                (index_value(value)?, key.clone())
            };
            entries.push(entry);
        }

        // Validated non-empty above
        let max_index = entries.iter().map(|(i, _)| *i).max().unwrap_or(0);
        let mut labels: Vec<Option<String>> = vec![None; max_index + 1];
        for (index, label) in entries {
            labels[index] = Some(label);
        }

        Ok(labels
            .into_iter()
            .enumerate()
            .map(|(i, label)| label.unwrap_or_else(|| placeholder_label(i)))
            .collect())
    }

    /// Label at `index`, or `label_<index>` when the map is shorter.
    pub fn name_for(&self, index: usize) -> String {
        self.labels
            .get(index)
            .cloned()
            .unwrap_or_else(|| placeholder_label(index))
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.labels
    }

    pub fn source(&self) -> &LabelSource {
        &self.source
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.source, LabelSource::Fallback { .. })
    }

    /// Reason the defaults were substituted, if they were.
    pub fn fallback_reason(&self) -> Option<&str> {
        match &self.source {
            LabelSource::Fallback { reason } => Some(reason),
            LabelSource::Artifact(_) => None,
        }
    }
}

fn is_index(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit())
}

fn check_bound(index: usize) -> Result<usize, PipelineError> {
    if index > MAX_CLASS_INDEX {
        return Err(PipelineError::LabelMapUnavailable(format!(
            "class index {} exceeds the supported maximum of {}",
            index, MAX_CLASS_INDEX
        )));
    }
    Ok(index)
}

fn parse_index(key: &str) -> Result<usize, PipelineError> {
    key.parse::<usize>()
        .map_err(|_| PipelineError::LabelMapUnavailable(format!("invalid class index '{}'", key)))
        .and_then(check_bound)
}

fn index_value(value: &Value) -> Result<usize, PipelineError> {
    let index = match value {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) if is_index(s.trim()) => s.trim().parse::<usize>().ok(),
        _ => None,
    };
    index
        .ok_or_else(|| PipelineError::LabelMapUnavailable(format!("invalid class index {}", value)))
        .and_then(check_bound)
}

fn label_text(value: &Value) -> Result<String, PipelineError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(PipelineError::LabelMapUnavailable(format!(
            "label must be a string, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_index_keyed_map() {
        let map = LabelMap::from_json_str(r#"{"0": "a", "1": "b"}"#).unwrap();
        assert_eq!(map.as_slice(), &["a", "b"]);
        assert!(!map.is_fallback());
    }

    #[test]
    fn test_direction_invariance() {
        let by_index = LabelMap::from_json_str(r#"{"0": "a", "1": "b"}"#).unwrap();
        let by_label = LabelMap::from_json_str(r#"{"a": 0, "b": 1}"#).unwrap();
        assert_eq!(by_index.as_slice(), by_label.as_slice());
    }

    #[test]
    fn test_gaps_are_filled_with_placeholders() {
        let map = LabelMap::from_json_str(r#"{"0": "healthy", "3": "heat_rash"}"#).unwrap();
        assert_eq!(map.as_slice(), &["healthy", "label_1", "label_2", "heat_rash"]);

        let inverted = LabelMap::from_json_str(r#"{"eczema_rash": 2}"#).unwrap();
        assert_eq!(inverted.as_slice(), &["label_0", "label_1", "eczema_rash"]);
    }

    #[test]
    fn test_mixed_keys_are_treated_as_label_to_index() {
        // "10" is numeric but "x" is not, so every key is a label
        let map = LabelMap::from_json_str(r#"{"10": 1, "x": 0}"#).unwrap();
        assert_eq!(map.as_slice(), &["x", "10"]);
    }

    #[test]
    fn test_duplicate_index_keeps_last_in_file_order() {
        let map = LabelMap::from_json_str(r#"{"zeta": 0, "alpha": 0, "mid": 1}"#).unwrap();
        assert_eq!(map.as_slice(), &["alpha", "mid"]);

        let map = LabelMap::from_json_str(r#"{"alpha": 0, "zeta": 0}"#).unwrap();
        assert_eq!(map.as_slice(), &["zeta"]);
    }

    #[test]
    fn test_string_index_values_are_accepted() {
        let map = LabelMap::from_json_str(r#"{"a": "1", "b": "0"}"#).unwrap();
        assert_eq!(map.as_slice(), &["b", "a"]);
    }

    #[test]
    fn test_invalid_maps_are_rejected() {
        for text in [
            "[]",
            "{}",
            "not json",
            r#"{"a": -1}"#,
            r#"{"a": "first"}"#,
            r#"{"0": ["nested"]}"#,
            r#"{"99999999": "too_far"}"#,
        ] {
            let result = LabelMap::from_json_str(text);
            assert!(
                matches!(result, Err(PipelineError::LabelMapUnavailable(_))),
                "expected rejection for {}",
                text
            );
        }
    }

    #[test]
    fn test_missing_file_falls_back() {
        let map = LabelMap::load("/nonexistent/rashscan/labels.json");
        assert!(map.is_fallback());
        assert_eq!(map.as_slice(), &DEFAULT_LABELS);
        assert!(map.fallback_reason().unwrap().contains("cannot read"));
    }

    #[test]
    fn test_malformed_file_falls_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"0\": \"a\",").unwrap();
        let map = LabelMap::load(file.path());
        assert!(map.is_fallback());
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"diaper_rash": 0, "healthy": 1}}"#).unwrap();
        let map = LabelMap::load(file.path());
        assert_eq!(map.as_slice(), &["diaper_rash", "healthy"]);
        assert_eq!(map.source(), &LabelSource::Artifact(Some(file.path().to_path_buf())));
    }

    #[test]
    fn test_name_for_out_of_range() {
        let map = LabelMap::from_labels(vec!["a", "b"]).unwrap();
        assert_eq!(map.name_for(1), "b");
        assert_eq!(map.name_for(7), "label_7");
        assert_eq!(map.get(7), None);
    }
}
