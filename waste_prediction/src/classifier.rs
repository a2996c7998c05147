use crate::{
    config::{Config, PredictionConfig},
    labels::LabelSet,
    model_service::{InputTensor, ModelError, ModelService},
    prediction::{Prediction, ScoreError},
    preprocessing::{PreprocessError, Preprocessor},
};
use axum::body::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Model not loaded: {0}")]
    ModelUnavailable(String),
    #[error("Model expects input {expected:?}, preprocessing produces {actual:?}")]
    InputShapeMismatch { expected: Vec<i64>, actual: Vec<usize> },
    #[error("Model declares {declared} output classes but {labels} labels are configured")]
    LabelCountMismatch { declared: usize, labels: usize },
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Score(#[from] ScoreError),
    #[error("Preprocessing task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierSettings {
    pub confidence_threshold: f32,
    pub apply_softmax: bool,
}

impl ClassifierSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            confidence_threshold: config.prediction.confidence_threshold,
            apply_softmax: config.model.apply_softmax,
        }
    }
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: PredictionConfig::default().confidence_threshold,
            apply_softmax: false,
        }
    }
}

enum ModelState<M> {
    Ready(Arc<M>),
    Unavailable(String),
}

/// The loaded model together with everything needed to turn raw upload
/// bytes into a labelled prediction.
pub struct Classifier<M: ModelService> {
    model: ModelState<M>,
    labels: LabelSet,
    preprocessor: Preprocessor,
    settings: ClassifierSettings,
}

impl<M: ModelService> Classifier<M> {
    pub fn new(
        model_service: M,
        labels: LabelSet,
        preprocessor: Preprocessor,
        settings: ClassifierSettings,
    ) -> Result<Self, ClassifierError> {
        let input_shape = preprocessor.input_shape();
        let input_spec = model_service.input_spec();
        if !input_spec.accepts(&input_shape) {
            return Err(ClassifierError::InputShapeMismatch {
                expected: input_spec.shape.clone(),
                actual: input_shape.to_vec(),
            });
        }

        if let Some(declared) = model_service.output_spec().class_count() {
            if declared != labels.len() {
                return Err(ClassifierError::LabelCountMismatch {
                    declared,
                    labels: labels.len(),
                });
            }
        } else {
            tracing::warn!(
                "Model output shape is dynamic, label count {} is only checked per request",
                labels.len()
            );
        }

        Ok(Self {
            model: ModelState::Ready(Arc::new(model_service)),
            labels,
            preprocessor,
            settings,
        })
    }

    /// A classifier whose model failed to load. Every prediction is refused.
    pub fn unavailable(
        reason: impl Into<String>,
        labels: LabelSet,
        preprocessor: Preprocessor,
        settings: ClassifierSettings,
    ) -> Self {
        Self {
            model: ModelState::Unavailable(reason.into()),
            labels,
            preprocessor,
            settings,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.model, ModelState::Ready(_))
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    #[instrument(skip_all, fields(bytes = image_data.len()))]
    pub async fn predict(&self, image_data: Bytes) -> Result<Prediction, ClassifierError> {
        let model = match &self.model {
            ModelState::Ready(model) => model,
            ModelState::Unavailable(reason) => {
                return Err(ClassifierError::ModelUnavailable(reason.clone()))
            }
        };

        let preprocessor = self.preprocessor;
        let input = tokio::task::spawn_blocking(move || preprocessor.transform(&image_data))
            .await
            .map_err(|e| ClassifierError::Task(e.to_string()))??;
        let input = InputTensor::cast(input, model.input_spec().element_type);

        let output = model.infer(input).await?;
        let scores: Vec<f32> = output.iter().copied().collect();

        let prediction = Prediction::from_scores(
            &scores,
            &self.labels,
            self.settings.confidence_threshold,
            self.settings.apply_softmax,
        )?;

        tracing::info!(
            "Prediction: {} (confidence: {:.3})",
            prediction.label,
            prediction.confidence
        );

        Ok(prediction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_service::{ElementType, TensorSpec};
    use crate::test_support::{png_bytes, waste_labels, MockModelService};

    fn preprocessor() -> Preprocessor {
        Preprocessor::new(&Default::default())
    }

    #[tokio::test]
    async fn test_predict_maps_arg_max_to_label() {
        let mock_model = MockModelService::with_scores(vec![0.05, 0.05, 0.8, 0.05, 0.05]);
        let calls = mock_model.calls();
        let classifier = Classifier::new(
            mock_model,
            waste_labels(),
            preprocessor(),
            ClassifierSettings::default(),
        )
        .unwrap();

        let prediction = classifier.predict(png_bytes(120, 90)).await.unwrap();

        assert_eq!(prediction.label, "Organic");
        assert_eq!(prediction.confidence, 0.8);
        assert!(prediction.all_probabilities.is_none());
        assert_eq!(calls.count(), 1);
    }

    #[tokio::test]
    async fn test_predict_is_idempotent() {
        let classifier = Classifier::new(
            MockModelService::with_scores(vec![0.1, 0.2, 0.42, 0.18, 0.1]),
            waste_labels(),
            preprocessor(),
            ClassifierSettings::default(),
        )
        .unwrap();
        let image = png_bytes(300, 200);

        let first = classifier.predict(image.clone()).await.unwrap();
        let second = classifier.predict(image).await.unwrap();

        assert_eq!(first, second);
        assert!(classifier.labels().contains(&first.label));
        assert!((0.0..=1.0).contains(&first.confidence));
    }

    #[tokio::test]
    async fn test_model_receives_declared_shape_and_type() {
        let mock_model = MockModelService::with_scores(vec![0.9, 0.025, 0.025, 0.025, 0.025])
            .with_input_type(ElementType::Uint8);
        let seen = mock_model.seen_inputs();
        let classifier = Classifier::new(
            mock_model,
            waste_labels(),
            preprocessor(),
            ClassifierSettings::default(),
        )
        .unwrap();

        classifier.predict(png_bytes(10, 10)).await.unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].shape(), &[1, 224, 224, 3]);
        assert_eq!(seen[0].element_type(), ElementType::Uint8);
    }

    #[tokio::test]
    async fn test_corrupt_image_never_reaches_model() {
        let mock_model = MockModelService::with_scores(vec![0.2; 5]);
        let calls = mock_model.calls();
        let classifier = Classifier::new(
            mock_model,
            waste_labels(),
            preprocessor(),
            ClassifierSettings::default(),
        )
        .unwrap();

        let result = classifier
            .predict(Bytes::from_static(b"\x89PNG\r\n\x1a\nbroken"))
            .await;

        assert!(matches!(result, Err(ClassifierError::Preprocess(_))));
        assert_eq!(calls.count(), 0);
    }

    #[test]
    fn test_rejects_model_with_other_input_layout() {
        let mock_model = MockModelService::with_scores(vec![0.2; 5]).with_input_spec(TensorSpec {
            name: "input".to_string(),
            shape: vec![1, 3, 224, 224],
            element_type: ElementType::Float32,
        });

        let result = Classifier::new(
            mock_model,
            waste_labels(),
            preprocessor(),
            ClassifierSettings::default(),
        );

        assert!(matches!(
            result,
            Err(ClassifierError::InputShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_rejects_label_count_mismatch() {
        let mock_model = MockModelService::with_scores(vec![0.5, 0.5]);

        let result = Classifier::new(
            mock_model,
            waste_labels(),
            preprocessor(),
            ClassifierSettings::default(),
        );

        assert!(matches!(
            result,
            Err(ClassifierError::LabelCountMismatch {
                declared: 2,
                labels: 5
            })
        ));
    }

    #[tokio::test]
    async fn test_dynamic_output_is_checked_per_request() {
        let mock_model = MockModelService::with_scores(vec![0.5, 0.5]).with_output_spec(TensorSpec {
            name: "output".to_string(),
            shape: vec![-1, -1],
            element_type: ElementType::Float32,
        });
        let classifier = Classifier::new(
            mock_model,
            waste_labels(),
            preprocessor(),
            ClassifierSettings::default(),
        )
        .unwrap();

        let result = classifier.predict(png_bytes(10, 10)).await;

        assert!(matches!(
            result,
            Err(ClassifierError::Score(ScoreError::LengthMismatch {
                expected: 5,
                got: 2
            }))
        ));
    }

    #[tokio::test]
    async fn test_unavailable_model_refuses_predictions() {
        let classifier: Classifier<MockModelService> = Classifier::unavailable(
            "Model file not found",
            waste_labels(),
            preprocessor(),
            ClassifierSettings::default(),
        );

        assert!(!classifier.is_ready());
        let result = classifier.predict(png_bytes(10, 10)).await;
        assert!(matches!(result, Err(ClassifierError::ModelUnavailable(_))));
    }
}
