use ndarray::Array1;

use super::error::PipelineError;
use super::predictor::ScoreVector;

/// How far from 1.0 the sum of a non-negative vector may be and still count as a distribution.
pub const DISTRIBUTION_TOLERANCE: f32 = 1e-2;

/// A probability distribution and its winning class.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibrated {
    pub probabilities: Array1<f32>,
    pub top_index: usize,
    pub confidence: f32,
}

/// True when every entry is non-negative and the sum is within tolerance of 1.
pub fn is_distribution(scores: &ScoreVector) -> bool {
    scores.iter().all(|&p| p >= 0.0) && (scores.sum() - 1.0).abs() <= DISTRIBUTION_TOLERANCE
}

/// Softmax with the maximum subtracted first, so large logits do not overflow.
pub fn softmax(scores: &ScoreVector) -> Array1<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps = scores.mapv(|s| (s - max).exp());
    let sum = exps.sum();
    exps / sum
}

/// Index of the largest value; the lowest index wins ties.
pub fn argmax(values: &Array1<f32>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, top)) if v <= top => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Turns raw scores into a probability distribution.
///
/// Vectors that already are a distribution pass through untouched, everything else goes
/// through [`softmax`]. Scores must be finite and non-empty.
pub fn calibrate(scores: ScoreVector) -> Result<Calibrated, PipelineError> {
    if scores.is_empty() {
        return Err(calibration_error("score vector is empty"));
    }
    if let Some(i) = scores.iter().position(|s| !s.is_finite()) {
        return Err(calibration_error(&format!(
            "score at index {} is not finite ({})",
            i, scores[i]
        )));
    }

    let probabilities = if is_distribution(&scores) {
        scores
    } else {
        softmax(&scores)
    };

    let top_index = argmax(&probabilities)
        .ok_or_else(|| calibration_error("no maximum in probability vector"))?;
    Ok(Calibrated {
        confidence: probabilities[top_index],
        probabilities,
        top_index,
    })
}

fn calibration_error(detail: &str) -> PipelineError {
    PipelineError::prediction("calibrator", &[], detail)
}
