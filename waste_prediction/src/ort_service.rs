use crate::{
    config::{ModelConfig, Validatable},
    model_service::{ElementType, InputTensor, ModelError, ModelService, TensorSpec},
};
use async_trait::async_trait;
use ndarray::ArrayD;
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    tensor::TensorElementType,
    value::{TensorRef, ValueType},
};
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

fn load_error(e: ort::Error) -> ModelError {
    ModelError::Load(e.to_string())
}

fn inference_error(e: ort::Error) -> ModelError {
    ModelError::Inference(e.to_string())
}

fn describe_tensor(
    kind: &'static str,
    name: &str,
    value_type: &ValueType,
) -> Result<TensorSpec, ModelError> {
    match value_type {
        ValueType::Tensor { ty, shape, .. } => {
            let element_type = match ty {
                TensorElementType::Float32 => ElementType::Float32,
                TensorElementType::Uint8 => ElementType::Uint8,
                other => {
                    return Err(ModelError::UnsupportedTensor {
                        kind,
                        found: format!("{:?}", other),
                    })
                }
            };
            Ok(TensorSpec {
                name: name.to_string(),
                shape: shape.iter().copied().collect(),
                element_type,
            })
        }
        other => Err(ModelError::UnsupportedTensor {
            kind,
            found: format!("{:?}", other),
        }),
    }
}

/// Pool of ONNX Runtime sessions over the same quantized artifact, used
/// round-robin. A session needs exclusive access while it runs.
#[derive(Clone)]
pub struct OrtModelService {
    sessions: Arc<Vec<Mutex<Session>>>,
    counter: Arc<AtomicUsize>,
    input: TensorSpec,
    output: TensorSpec,
}

impl OrtModelService {
    pub fn new(model_config: &ModelConfig) -> Result<Self, ModelError> {
        let model_path = model_config.get_path();
        if !model_path.exists() {
            return Err(ModelError::NotFound(model_path));
        }

        let num_instances = model_config.num_instances.max(1);
        let sessions = (0..num_instances)
            .map(|_| {
                Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .commit_from_file(&model_path)
                    .map(Mutex::new)
            })
            .collect::<Result<Vec<_>, ort::Error>>()
            .map_err(load_error)?;

        let (input, output) = {
            let session = sessions
                .first()
                .ok_or(ModelError::MissingTensor("input"))?
                .lock();
            let input = session
                .inputs
                .first()
                .ok_or(ModelError::MissingTensor("input"))?;
            let output = session
                .outputs
                .first()
                .ok_or(ModelError::MissingTensor("output"))?;
            (
                describe_tensor("input", &input.name, &input.input_type)?,
                describe_tensor("output", &output.name, &output.output_type)?,
            )
        };
        if output.element_type != ElementType::Float32 {
            return Err(ModelError::UnsupportedTensor {
                kind: "output",
                found: format!("{:?}", output.element_type),
            });
        }

        tracing::info!(
            model = ?model_path,
            sessions = num_instances,
            input_name = %input.name,
            input_shape = ?input.shape,
            input_type = ?input.element_type,
            output_name = %output.name,
            output_shape = ?output.shape,
            "Loaded ONNX model"
        );

        Ok(Self {
            sessions: Arc::new(sessions),
            counter: Arc::new(AtomicUsize::new(0)),
            input,
            output,
        })
    }

    pub fn run_inference(&self, input: &InputTensor) -> Result<ArrayD<f32>, ModelError> {
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = self.sessions[index].lock();
        tracing::debug!("Handling request with session {}", index);

        let outputs = match input {
            InputTensor::Float32(array) => {
                let tensor = TensorRef::from_array_view(array.view()).map_err(inference_error)?;
                session.run(ort::inputs![tensor])
            }
            InputTensor::Uint8(array) => {
                let tensor = TensorRef::from_array_view(array.view()).map_err(inference_error)?;
                session.run(ort::inputs![tensor])
            }
        }
        .map_err(inference_error)?;

        let (shape, data) = outputs[self.output.name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(inference_error)?;

        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        ArrayD::from_shape_vec(dims, data.to_vec())
            .map_err(|e| ModelError::Inference(format!("invalid tensor shape: {}", e)))
    }
}

#[async_trait]
impl ModelService for OrtModelService {
    fn input_spec(&self) -> &TensorSpec {
        &self.input
    }

    fn output_spec(&self) -> &TensorSpec {
        &self.output
    }

    async fn infer(&self, input: InputTensor) -> Result<ArrayD<f32>, ModelError> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.run_inference(&input))
            .await
            .map_err(|e| ModelError::Inference(format!("inference task failed: {}", e)))?
    }
}
