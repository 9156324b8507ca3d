//! Care guidance attached to a classification label.
//!
//! Every record has three sections (`home_care`, `prevention`, `doctor_if`). A section is
//! either a plain list of tips or a map from language tag to list. Sections are resolved
//! independently: requested language, then the catalog's default language, then empty.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use lazy_static::lazy_static;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::inference::PipelineError;

/// Language used when a requested translation is missing
pub const DEFAULT_LANGUAGE: &str = "en";

/// Tip returned for labels without a care record
pub const FALLBACK_TIP: &str = "If uncertain, consult a pediatrician.";

lazy_static! {
    static ref BUILTIN_RECORDS: HashMap<String, CareRecord> =
        parse_records(include_str!("builtin_catalog.json")).unwrap_or_default();
}

/// Tips for one section, optionally translated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocalizedTips {
    Plain(Vec<String>),
    ByLanguage(HashMap<String, Vec<String>>),
}

impl LocalizedTips {
    /// Picks the tips for `language`, falling back to `default_language`, then to nothing.
    /// An empty translation counts as missing.
    pub fn resolve(&self, language: &str, default_language: &str) -> Vec<String> {
        match self {
            Self::Plain(tips) => tips.clone(),
            Self::ByLanguage(by_language) => [language, default_language]
                .iter()
                .filter_map(|lang| by_language.get(*lang))
                .find(|tips| !tips.is_empty())
                .cloned()
                .unwrap_or_default(),
        }
    }
}

/// Stored guidance for one label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CareRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_care: Option<LocalizedTips>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prevention: Option<LocalizedTips>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctor_if: Option<LocalizedTips>,
}

/// Legacy shapes a stored record may take.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRecord {
    Sections(CareRecord),
    /// A bare list is read as home-care tips
    List(Vec<String>),
    /// Free text, one tip per line
    Text(String),
}

impl From<StoredRecord> for CareRecord {
    fn from(stored: StoredRecord) -> Self {
        let home_care = |tips: Vec<String>| CareRecord {
            home_care: Some(LocalizedTips::Plain(tips)),
            ..CareRecord::default()
        };
        match stored {
            StoredRecord::Sections(record) => record,
            StoredRecord::List(tips) => home_care(tips),
            StoredRecord::Text(text) => home_care(
                text.lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(String::from)
                    .collect(),
            ),
        }
    }
}

/// Guidance resolved for one label and language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CareContent {
    pub home_care: Vec<String>,
    pub prevention: Vec<String>,
    pub doctor_if: Vec<String>,
}

impl CareContent {
    /// Content for a label without a record: the generic tip and nothing else.
    pub fn fallback() -> Self {
        Self {
            home_care: vec![FALLBACK_TIP.to_string()],
            ..Self::default()
        }
    }
}

/// Read-only lookup table from label to [`CareRecord`].
#[derive(Debug, Clone)]
pub struct CareCatalog {
    records: HashMap<String, CareRecord>,
    default_language: String,
}

impl Default for CareCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CareCatalog {
    /// Catalog with the guidance shipped in the crate.
    pub fn builtin() -> Self {
        Self {
            records: BUILTIN_RECORDS.clone(),
            default_language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    pub fn empty() -> Self {
        Self {
            records: HashMap::new(),
            default_language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    /// Parses a `{label: record}` JSON object. Malformed records are skipped with a warning;
    /// only a document that is not a JSON object is an error.
    pub fn from_json_str(text: &str) -> Result<Self, PipelineError> {
        Ok(Self {
            records: parse_records(text)?,
            default_language: DEFAULT_LANGUAGE.to_string(),
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            PipelineError::InvalidConfig(format!("cannot read care catalog {:?}: {}", path, e))
        })?;
        Self::from_json_str(&text)
    }

    pub fn with_default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = language.into();
        self
    }

    pub fn with_record(mut self, label: impl Into<String>, record: CareRecord) -> Self {
        self.records.insert(label.into(), record);
        self
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.records.contains_key(label)
    }

    /// Exact, case-sensitive lookup.
    pub fn lookup(&self, label: &str, language: Option<&str>) -> Result<CareContent, PipelineError> {
        let record = self
            .records
            .get(label)
            .ok_or_else(|| PipelineError::CareContentMissing(label.to_string()))?;
        let language = language
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(self.default_language.as_str());
        let section = |tips: &Option<LocalizedTips>| {
            tips.as_ref()
                .map(|t| t.resolve(language, &self.default_language))
                .unwrap_or_default()
        };
        Ok(CareContent {
            home_care: section(&record.home_care),
            prevention: section(&record.prevention),
            doctor_if: section(&record.doctor_if),
        })
    }

    /// Like [`lookup`](Self::lookup), but a missing record yields [`CareContent::fallback`].
    pub fn resolve(&self, label: &str, language: Option<&str>) -> CareContent {
        match self.lookup(label, language) {
            Ok(content) => content,
            Err(e) => {
                debug!("{}; using generic guidance", e);
                CareContent::fallback()
            }
        }
    }
}

fn parse_records(text: &str) -> Result<HashMap<String, CareRecord>, PipelineError> {
    let object: Map<String, Value> = serde_json::from_str(text).map_err(|e| {
        PipelineError::InvalidConfig(format!("care catalog must be a JSON object: {}", e))
    })?;

    let mut records = HashMap::with_capacity(object.len());
    for (label, value) in object {
        // Records persisted by older tooling hold the JSON document as a string
        let value = match value {
            Value::String(s) if s.trim_start().starts_with('{') => {
                serde_json::from_str(&s).unwrap_or(Value::String(s))
            }
            other => other,
        };
        match serde_json::from_value::<StoredRecord>(value) {
            Ok(stored) => {
                records.insert(label, stored.into());
            }
            Err(e) => warn!("Skipping malformed care record '{}': {}", label, e),
        }
    }
    Ok(records)
}
