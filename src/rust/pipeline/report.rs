use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::care::CareContent;
use crate::inference::Calibrated;
use crate::labels::LabelMap;

/// Probability assigned to one class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassProbability {
    pub label: String,
    pub probability: f32,
}

/// The calibrated outcome of one prediction, labels resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub label: String,
    pub class_index: usize,
    /// Probability of the winning class, in `[0, 1]`
    pub confidence_fraction: f32,
    /// Same value as a one-decimal percentage, e.g. `"88.1%"`
    pub confidence_percent: String,
    /// Every class in model order
    pub probabilities: Vec<ClassProbability>,
}

impl PredictionResult {
    pub fn from_calibrated(calibrated: Calibrated, labels: &LabelMap) -> Self {
        let probabilities = calibrated
            .probabilities
            .iter()
            .enumerate()
            .map(|(i, &probability)| ClassProbability {
                label: labels.name_for(i),
                probability,
            })
            .collect();
        Self {
            label: labels.name_for(calibrated.top_index),
            class_index: calibrated.top_index,
            confidence_fraction: calibrated.confidence,
            confidence_percent: format_percent(calibrated.confidence, 1),
            probabilities,
        }
    }

    /// Label to two-decimal percentage, in model order. A label that occurs twice keeps its
    /// first position and the later value.
    pub fn per_class_probabilities(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = Vec::with_capacity(self.probabilities.len());
        for class in &self.probabilities {
            let percent = format_percent(class.probability, 2);
            match out.iter_mut().find(|(label, _)| *label == class.label) {
                Some(entry) => entry.1 = percent,
                None => out.push((class.label.clone(), percent)),
            }
        }
        out
    }
}

/// Formats a fraction as a percentage with `decimals` digits after the point.
pub fn format_percent(fraction: f32, decimals: usize) -> String {
    format!("{:.*}%", decimals, fraction * 100.0)
}

/// Payload handed to the HTTP layer for one scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    pub rash_type: String,
    pub confidence: String,
    pub confidence_raw: f64,
    pub care_tips: Vec<String>,
    pub prevention_tips: Vec<String>,
    pub consult_doctor_if: Vec<String>,
    #[serde(serialize_with = "serialize_ordered_map")]
    pub probs: Vec<(String, String)>,
}

impl ScanReport {
    pub fn new(prediction: &PredictionResult, care: CareContent) -> Self {
        Self {
            rash_type: prediction.label.clone(),
            confidence: prediction.confidence_percent.clone(),
            confidence_raw: f64::from(prediction.confidence_fraction),
            care_tips: care.home_care,
            prevention_tips: care.prevention,
            consult_doctor_if: care.doctor_if,
            probs: prediction.per_class_probabilities(),
        }
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn serialize_ordered_map<S: Serializer>(
    entries: &[(String, String)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(entries.len()))?;
    for (key, value) in entries {
        map.serialize_entry(key, value)?;
    }
    map.end()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    fn calibrated(probabilities: &[f32], top_index: usize) -> Calibrated {
        Calibrated {
            probabilities: arr1(probabilities),
            top_index,
            confidence: probabilities.get(top_index).copied().unwrap_or(0.0),
        }
    }

    #[test]
    fn test_percent_formatting() {
        assert_eq!(format_percent(0.880_797, 1), "88.1%");
        assert_eq!(format_percent(0.119_203, 2), "11.92%");
        assert_eq!(format_percent(1.0, 1), "100.0%");
    }

    #[test]
    fn test_labels_beyond_map_are_synthesized() {
        let labels = LabelMap::from_labels(vec!["diaper_rash"]).unwrap();
        let result = PredictionResult::from_calibrated(calibrated(&[0.1, 0.2, 0.7], 2), &labels);
        assert_eq!(result.label, "label_2");
        assert_eq!(result.class_index, 2);
        let names: Vec<_> = result.probabilities.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(names, ["diaper_rash", "label_1", "label_2"]);
    }

    #[test]
    fn test_duplicate_labels_collapse() {
        let labels = LabelMap::from_labels(vec!["rash", "rash", "healthy"]).unwrap();
        let result = PredictionResult::from_calibrated(calibrated(&[0.5, 0.3, 0.2], 0), &labels);
        assert_eq!(
            result.per_class_probabilities(),
            vec![
                ("rash".to_string(), "30.00%".to_string()),
                ("healthy".to_string(), "20.00%".to_string()),
            ]
        );
    }

    #[test]
    fn test_report_json_keeps_class_order() {
        let labels = LabelMap::from_labels(vec!["zeta", "alpha"]).unwrap();
        let result = PredictionResult::from_calibrated(calibrated(&[0.25, 0.75], 1), &labels);
        let report = ScanReport::new(&result, CareContent::fallback());
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains(r#""probs":{"zeta":"25.00%","alpha":"75.00%"}"#));
        assert!(json.contains(r#""rash_type":"alpha""#));
        assert!(json.contains(r#""confidence":"75.0%""#));
        assert!(json.contains(r#""care_tips":["If uncertain, consult a pediatrician."]"#));
    }
}
