use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use log::{info, warn};
use ndarray::{Array4, ArrayD};
use ort::session::Session;
use ort::value::{Tensor, ValueType};

use super::error::PipelineError;
use crate::runtime::{create_session_builder, RuntimeConfig};

/// Raw output of one inference call, before it is reduced to a score vector.
#[derive(Debug, Clone)]
pub enum ModelOutput {
    /// A single output tensor
    Tensor(ArrayD<f32>),
    /// Several named output tensors, in the model's declared output order
    Named(Vec<(String, ArrayD<f32>)>),
}

/// Memory layout of the model's image input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    /// `(batch, height, width, channels)`
    Nhwc,
    /// `(batch, channels, height, width)`
    Nchw,
}

/// Spatial input size the model expects. Channels are always RGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputGeometry {
    pub height: u32,
    pub width: u32,
    pub layout: TensorLayout,
}

impl Default for InputGeometry {
    fn default() -> Self {
        Self {
            height: Self::DEFAULT_SIZE,
            width: Self::DEFAULT_SIZE,
            layout: TensorLayout::Nhwc,
        }
    }
}

impl InputGeometry {
    pub const DEFAULT_SIZE: u32 = 224;
    pub const CHANNELS: usize = 3;

    /// Infers the geometry from a declared input shape.
    ///
    /// Only a 4-D shape with positive spatial dimensions is adopted. Dynamic (`-1`) or
    /// missing dimensions yield the 224x224 default. A shape with 3 in position 1 and not
    /// in position 3 is read as channel-first.
    pub fn from_input_shape(dims: Option<&[i64]>) -> Self {
        let Some(dims) = dims.filter(|d| d.len() == 4) else {
            return Self::default();
        };
        let channels = InputGeometry::CHANNELS as i64;
        let (layout, h, w) = if dims[1] == channels && dims[3] != channels {
            (TensorLayout::Nchw, dims[2], dims[3])
        } else {
            (TensorLayout::Nhwc, dims[1], dims[2])
        };
        match (u32::try_from(h), u32::try_from(w)) {
            (Ok(height), Ok(width)) if height > 0 && width > 0 => Self { height, width, layout },
            _ => Self { layout, ..Self::default() },
        }
    }

    /// Shape of a batch of one in this geometry.
    pub fn batch_shape(&self) -> [usize; 4] {
        let (h, w, c) = (self.height as usize, self.width as usize, Self::CHANNELS);
        match self.layout {
            TensorLayout::Nhwc => [1, h, w, c],
            TensorLayout::Nchw => [1, c, h, w],
        }
    }
}

/// A loaded image classifier.
///
/// Implementations must be shareable between request threads. The pipeline never
/// calls `run` on the same model from two threads unless the implementation allows it.
pub trait ClassifierModel: Send + Sync {
    /// Human-readable identifier used in diagnostics
    fn name(&self) -> &str;

    /// Declared input shape, with `-1` for dynamic dimensions
    fn input_shape(&self) -> Option<Vec<i64>>;

    /// Runs a batch through the model
    fn run(&self, batch: Array4<f32>) -> Result<ModelOutput, PipelineError>;
}

/// Deserializes a [`ClassifierModel`] from an artifact on disk.
pub trait ModelLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Box<dyn ClassifierModel>, PipelineError>;
}

/// An ONNX Runtime session wrapped as a [`ClassifierModel`].
///
/// Calls to `run` are serialized through the session mutex.
#[derive(Debug)]
pub struct OnnxModel {
    name: String,
    session: Mutex<Session>,
    input_name: String,
    input_dims: Option<Vec<i64>>,
    output_names: Vec<String>,
}

impl OnnxModel {
    pub fn from_session(name: impl Into<String>, session: Session) -> Result<Self, PipelineError> {
        let name = name.into();
        let input = session.inputs.first().ok_or_else(|| {
            PipelineError::ModelLoadError(format!("model '{}' declares no inputs", name))
        })?;
        if session.inputs.len() > 1 {
            warn!(
                "Model '{}' declares {} inputs, only '{}' will be fed",
                name,
                session.inputs.len(),
                input.name
            );
        }
        let input_dims = match &input.input_type {
            ValueType::Tensor { dimensions, .. } => Some(dimensions.clone()),
            _ => None,
        };
        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
        if output_names.is_empty() {
            return Err(PipelineError::ModelLoadError(format!(
                "model '{}' declares no outputs",
                name
            )));
        }

        info!(
            "Model '{}': input '{}' {:?}, outputs {:?}",
            name, input.name, input_dims, output_names
        );

        Ok(Self {
            input_name: input.name.clone(),
            input_dims,
            output_names,
            session: Mutex::new(session),
            name,
        })
    }

    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }
}

impl ClassifierModel for OnnxModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_shape(&self) -> Option<Vec<i64>> {
        self.input_dims.clone()
    }

    fn run(&self, batch: Array4<f32>) -> Result<ModelOutput, PipelineError> {
        let shape = batch.shape().to_vec();
        let failed = |detail: String| PipelineError::prediction(&self.name, &shape, detail);

        let batch_dyn = batch.into_dyn();
        let input = batch_dyn.as_standard_layout();
        let mut input_tensors = HashMap::new();
        input_tensors.insert(
            self.input_name.as_str(),
            Tensor::from_array(&input)
                .map_err(|e| failed(format!("Failed to create input tensor: {}", e)))?,
        );

        let session = self
            .session
            .lock()
            .map_err(|_| failed("session lock poisoned".to_string()))?;
        let outputs = session
            .run(input_tensors)
            .map_err(|e| failed(format!("Failed to run model: {}", e)))?;

        let mut tensors = Vec::with_capacity(self.output_names.len());
        for output_name in &self.output_names {
            let Some(value) = outputs.get(output_name.as_str()) else {
                continue;
            };
            let tensor = value.try_extract_tensor::<f32>().map_err(|e| {
                failed(format!("Failed to extract output '{}': {}", output_name, e))
            })?;
            tensors.push((output_name.clone(), tensor.to_owned().into_dyn()));
        }

        match tensors.len() {
            0 => Err(failed("model returned no outputs".to_string())),
            1 => Ok(ModelOutput::Tensor(tensors.remove(0).1)),
            _ => Ok(ModelOutput::Named(tensors)),
        }
    }
}

/// Loads `.onnx` artifacts through the shared ONNX Runtime environment.
#[derive(Debug, Clone, Default)]
pub struct OnnxModelLoader {
    runtime_config: RuntimeConfig,
}

impl OnnxModelLoader {
    pub fn new(runtime_config: RuntimeConfig) -> Self {
        Self { runtime_config }
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn ClassifierModel>, PipelineError> {
        let session = create_session_builder(&self.runtime_config)?
            .commit_from_file(path)
            .map_err(|e| {
                PipelineError::ModelLoadError(format!("Failed to load {:?}: {}", path, e))
            })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Box::new(OnnxModel::from_session(name, session)?))
    }
}
