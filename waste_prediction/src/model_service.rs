use async_trait::async_trait;
use ndarray::{Array4, ArrayD};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model file not found: {0:?}")]
    NotFound(PathBuf),
    #[error("Failed to load model: {0}")]
    Load(String),
    #[error("Model declares no {0} tensor")]
    MissingTensor(&'static str),
    #[error("Unsupported {kind} tensor: {found}")]
    UnsupportedTensor { kind: &'static str, found: String },
    #[error("Inference failed: {0}")]
    Inference(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Float32,
    Uint8,
}

/// Name, shape and element type a model declares for one of its tensors.
/// Dynamic dimensions are negative.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorSpec {
    pub name: String,
    pub shape: Vec<i64>,
    pub element_type: ElementType,
}

impl TensorSpec {
    pub fn accepts(&self, shape: &[usize]) -> bool {
        self.shape.len() == shape.len()
            && self
                .shape
                .iter()
                .zip(shape)
                .all(|(&declared, &actual)| declared < 0 || declared as usize == actual)
    }

    /// Size of the last dimension when it is static.
    pub fn class_count(&self) -> Option<usize> {
        self.shape
            .last()
            .copied()
            .filter(|&d| d > 0)
            .map(|d| d as usize)
    }
}

/// Single-sample batch, already cast to the model's declared input type.
#[derive(Debug, Clone, PartialEq)]
pub enum InputTensor {
    Float32(Array4<f32>),
    Uint8(Array4<u8>),
}

impl InputTensor {
    pub fn cast(input: Array4<f32>, element_type: ElementType) -> Self {
        match element_type {
            ElementType::Float32 => InputTensor::Float32(input),
            ElementType::Uint8 => {
                InputTensor::Uint8(input.mapv(|v| v.round().clamp(0.0, 255.0) as u8))
            }
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            InputTensor::Float32(array) => array.shape(),
            InputTensor::Uint8(array) => array.shape(),
        }
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            InputTensor::Float32(_) => ElementType::Float32,
            InputTensor::Uint8(_) => ElementType::Uint8,
        }
    }
}

#[async_trait]
pub trait ModelService: Send + Sync + 'static {
    fn input_spec(&self) -> &TensorSpec;

    fn output_spec(&self) -> &TensorSpec;

    /// Runs one forward pass and returns the raw output tensor.
    async fn infer(&self, input: InputTensor) -> Result<ArrayD<f32>, ModelError>;
}
