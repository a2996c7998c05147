use crate::{
    classifier::{Classifier, ClassifierError, ClassifierSettings},
    config::{Config, Validatable},
    labels::LabelSet,
    ort_service::OrtModelService,
    preprocessing::Preprocessor,
    server::HttpServer,
};
use std::{error::Error, sync::Arc};

fn build_classifier(
    config: &Config,
    labels: LabelSet,
    preprocessor: Preprocessor,
    settings: ClassifierSettings,
) -> Result<Classifier<OrtModelService>, ClassifierError> {
    let model_service = OrtModelService::new(&config.model)?;
    Classifier::new(model_service, labels, preprocessor, settings)
}

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let labels = match LabelSet::load(&config.labels.get_path()) {
        Ok(labels) => labels,
        Err(e) => {
            tracing::error!("Failed to load labels: {:?}", e);
            return Err(Box::new(e));
        }
    };
    tracing::info!(
        "Loaded {} labels: {}",
        labels.len(),
        labels.iter().collect::<Vec<_>>().join(", ")
    );

    let preprocessor = Preprocessor::new(&config.preprocessing);
    let settings = ClassifierSettings::from_config(&config);

    let classifier = match build_classifier(&config, labels.clone(), preprocessor, settings) {
        Ok(classifier) => classifier,
        Err(e) if config.model.required => {
            tracing::error!("Failed to initialize classifier: {}", e);
            return Err(Box::new(e));
        }
        Err(e) => {
            tracing::error!(
                "Failed to initialize classifier, serving in degraded mode: {}",
                e
            );
            Classifier::unavailable(e.to_string(), labels, preprocessor, settings)
        }
    };

    let server = HttpServer::new(Arc::new(classifier), &config).await?;
    server.run().await?;

    Ok(())
}
