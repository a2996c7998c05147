use crate::{
    labels::LabelSet,
    model_service::{ElementType, InputTensor, ModelError, ModelService, TensorSpec},
};
use async_trait::async_trait;
use axum::body::Bytes;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use ndarray::{ArrayD, IxDyn};
use parking_lot::Mutex;
use std::{
    io::Cursor,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

pub const WASTE_LABELS: [&str; 5] = [
    "EWaste",
    "NonRecyclable",
    "Organic",
    "Recyclable",
    "StoreDropOff",
];

pub fn waste_labels() -> LabelSet {
    LabelSet::new(WASTE_LABELS).unwrap()
}

pub fn png_bytes(width: u32, height: u32) -> Bytes {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut image_data: Vec<u8> = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut image_data), ImageFormat::Png)
        .unwrap();
    Bytes::from(image_data)
}

#[derive(Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Model stand-in returning fixed scores and recording every call.
pub struct MockModelService {
    scores: Vec<f32>,
    input: TensorSpec,
    output: TensorSpec,
    calls: CallCounter,
    seen_inputs: Arc<Mutex<Vec<InputTensor>>>,
}

impl MockModelService {
    pub fn with_scores(scores: Vec<f32>) -> Self {
        let output = TensorSpec {
            name: "output".to_string(),
            shape: vec![1, scores.len() as i64],
            element_type: ElementType::Float32,
        };
        Self {
            scores,
            input: TensorSpec {
                name: "input".to_string(),
                shape: vec![-1, 224, 224, 3],
                element_type: ElementType::Float32,
            },
            output,
            calls: CallCounter::default(),
            seen_inputs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_input_type(mut self, element_type: ElementType) -> Self {
        self.input.element_type = element_type;
        self
    }

    pub fn with_input_spec(mut self, input: TensorSpec) -> Self {
        self.input = input;
        self
    }

    pub fn with_output_spec(mut self, output: TensorSpec) -> Self {
        self.output = output;
        self
    }

    pub fn calls(&self) -> CallCounter {
        self.calls.clone()
    }

    pub fn seen_inputs(&self) -> Arc<Mutex<Vec<InputTensor>>> {
        self.seen_inputs.clone()
    }
}

#[async_trait]
impl ModelService for MockModelService {
    fn input_spec(&self) -> &TensorSpec {
        &self.input
    }

    fn output_spec(&self) -> &TensorSpec {
        &self.output
    }

    async fn infer(&self, input: InputTensor) -> Result<ArrayD<f32>, ModelError> {
        self.calls.0.fetch_add(1, Ordering::SeqCst);
        self.seen_inputs.lock().push(input);
        ArrayD::from_shape_vec(IxDyn(&[1, self.scores.len()]), self.scores.clone())
            .map_err(|e| ModelError::Inference(e.to_string()))
    }
}
