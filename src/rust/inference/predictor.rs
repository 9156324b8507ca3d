use ndarray::{Array1, Array3, Array4, ArrayD, Axis, Ix1};
use serde::{Deserialize, Serialize};

use super::error::PipelineError;
use super::model::{ClassifierModel, InputGeometry, ModelOutput, TensorLayout};

/// Per-class scores aligned with the label map by position.
pub type ScoreVector = Array1<f32>;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Feature scaling applied to 0..=255 RGB input. Must match what the model was trained with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preprocessing {
    /// Keras EfficientNet: the rescaling lives inside the graph, pixels pass through
    #[default]
    EfficientNet,
    /// `x / 255`
    UnitRange,
    /// `x / 127.5 - 1` (MobileNet, Inception)
    SymmetricUnit,
    /// `x / 255`, then ImageNet per-channel mean/std
    ImageNet,
}

impl Preprocessing {
    /// Scales an `(h, w, 3)` image in place.
    pub fn apply(&self, image: &mut Array3<f32>) {
        match self {
            Self::EfficientNet => {}
            Self::UnitRange => image.mapv_inplace(|v| v / 255.0),
            Self::SymmetricUnit => image.mapv_inplace(|v| v / 127.5 - 1.0),
            Self::ImageNet => {
                for (c, mut channel) in image.axis_iter_mut(Axis(2)).enumerate() {
                    let (mean, std) = (IMAGENET_MEAN[c], IMAGENET_STD[c]);
                    channel.mapv_inplace(|v| (v / 255.0 - mean) / std);
                }
            }
        }
    }
}

impl ModelOutput {
    /// Reduces the output to one score per class.
    ///
    /// Several named outputs: the first is used. Then a `(1, n)` tensor yields its row, a
    /// 1-D tensor is used as is and anything else is flattened.
    pub fn into_scores(self) -> ScoreVector {
        let tensor = match self {
            ModelOutput::Tensor(tensor) => tensor,
            ModelOutput::Named(outputs) => match outputs.into_iter().next() {
                Some((_, tensor)) => tensor,
                None => return Array1::zeros(0),
            },
        };
        flatten_scores(tensor)
    }
}

fn flatten_scores(tensor: ArrayD<f32>) -> ScoreVector {
    if tensor.ndim() == 2 && tensor.shape()[0] == 1 {
        return tensor.index_axis_move(Axis(0), 0).iter().copied().collect();
    }
    if tensor.ndim() == 1 {
        return tensor
            .into_dimensionality::<Ix1>()
            .unwrap_or_else(|_| Array1::zeros(0));
    }
    tensor.iter().copied().collect()
}

/// Wraps an `(h, w, 3)` image into a batch of one in the model's layout.
pub fn to_batch(image: Array3<f32>, layout: TensorLayout) -> Array4<f32> {
    let image = match layout {
        TensorLayout::Nhwc => image,
        TensorLayout::Nchw => image.permuted_axes([2, 0, 1]),
    };
    image.insert_axis(Axis(0)).as_standard_layout().into_owned()
}

/// Runs a normalized image through the model and returns its raw score vector.
pub fn predict_scores(
    model: &dyn ClassifierModel,
    geometry: &InputGeometry,
    preprocessing: Preprocessing,
    mut image: Array3<f32>,
) -> Result<ScoreVector, PipelineError> {
    preprocessing.apply(&mut image);
    let batch = to_batch(image, geometry.layout);
    let input_shape = batch.shape().to_vec();

    let output = model.run(batch).map_err(|e| match e {
        failure @ PipelineError::PredictionFailed { .. } => failure,
        other => PipelineError::prediction(model.name(), &input_shape, other.to_string()),
    })?;

    let scores = output.into_scores();
    if scores.is_empty() {
        return Err(PipelineError::prediction(
            model.name(),
            &input_shape,
            "model produced an empty score vector",
        ));
    }
    Ok(scores)
}
