use crate::{
    balancing::{class_weights, oversample},
    cleaning::{clean_directory, CleaningReport},
    config::{Balancing, TrainingConfig},
    dataset::{Dataset, DatasetError},
    evaluation::{self, load_labels, parse_predictions, EvaluationError, EvaluationReport},
    history::{load_history, HistoryError},
    manifest::{split_summaries, write_labels, CleaningSummary, TrainingManifest},
    monitor::{replay, MonitorError, RunSummary},
    publish::{publish, PublishError, Published},
    se_block::{check_head, SeBlockError},
};
use std::{fs, io, path::Path};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Image check failed: {0}")]
    Cleaning(#[source] io::Error),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error("Invalid network head: {0}")]
    Network(#[from] SeBlockError),
    #[error("Failed to write {what}: {source}")]
    Write {
        what: &'static str,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Monitor(#[from] MonitorError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

const HEAD_CHECK_SEED: u64 = 42;

/// Checks the attention head, cleans every split, scans the class layout and writes the labels file and
/// training manifest into the results directory.
pub fn prepare(config: &TrainingConfig) -> Result<TrainingManifest, PipelineError> {
    let head_check = check_head(config.network.se_reduction, HEAD_CHECK_SEED)?;

    let dataset_config = &config.dataset;
    let mut cleaning = CleaningReport {
        dry_run: dataset_config.dry_run,
        ..Default::default()
    };
    for split in [
        dataset_config.train_path(),
        dataset_config.val_path(),
        dataset_config.test_path(),
    ] {
        let report =
            clean_directory(&split, dataset_config.dry_run).map_err(PipelineError::Cleaning)?;
        cleaning.scanned += report.scanned;
        cleaning.removed += report.removed;
        cleaning.corrupt.extend(report.corrupt);
    }

    let dataset = Dataset::scan(
        &dataset_config.train_path(),
        &dataset_config.val_path(),
        &dataset_config.test_path(),
    )?;
    let labels = dataset.labels().to_vec();
    let counts = dataset.train.class_counts();

    let weights = class_weights(&counts);
    let sample_plan = match config.balancing {
        Balancing::ClassWeights => Vec::new(),
        Balancing::Oversample { seed } => {
            let train_labels: Vec<usize> =
                dataset.train.samples.iter().map(|s| s.class_index).collect();
            oversample(&train_labels, labels.len(), seed)
        }
    };

    let (train, val, test) = split_summaries(&dataset);
    let manifest = TrainingManifest {
        class_weights: labels.iter().cloned().zip(weights).collect(),
        labels,
        train,
        val,
        test,
        balancing: config.balancing.clone(),
        sample_plan,
        cleaning: CleaningSummary::from(&cleaning),
        preprocessing: config.preprocessing,
        network: config.network.clone(),
        head_check,
        augmentation: config.augmentation.clone(),
        schedule: config.schedule.clone(),
    };

    let output = &config.output;
    write_labels(&manifest.labels, &output.labels_path()).map_err(|source| {
        PipelineError::Write {
            what: "labels",
            source,
        }
    })?;
    manifest
        .write(&output.manifest_path())
        .map_err(|source| PipelineError::Write {
            what: "manifest",
            source,
        })?;

    tracing::info!(
        labels = ?manifest.labels,
        class_weights = ?manifest.class_weights,
        oversampled = manifest.sample_plan.len(),
        manifest = %output.manifest_path().display(),
        "Dataset prepared"
    );

    Ok(manifest)
}

/// Replays a recorded per-epoch log through the schedule and reports which
/// epoch's weights the run keeps.
pub fn review(config: &TrainingConfig, history: &Path) -> Result<RunSummary, PipelineError> {
    let history = load_history(history)?;
    let summary = replay(&config.schedule, &history)?;

    match &summary.best {
        Some(best) => tracing::info!(
            epochs_run = summary.epochs_run,
            stopped_early = summary.stopped_early,
            best_epoch = best.epoch + 1,
            best_val_loss = best.val_loss,
            best_val_accuracy = best.val_accuracy,
            "Run reviewed"
        ),
        None => tracing::warn!("History contains no epochs"),
    }

    Ok(summary)
}

/// Scores test-set predictions against the labels written by `prepare` and
/// stores the report next to the manifest.
pub fn evaluate(
    config: &TrainingConfig,
    predictions: &Path,
) -> Result<EvaluationReport, PipelineError> {
    let output = &config.output;
    let labels = load_labels(&output.labels_path())?;
    let text = fs::read_to_string(predictions).map_err(EvaluationError::Io)?;
    let report = evaluation::evaluate(&labels, &parse_predictions(&text, &labels)?)?;

    report
        .write(&output.evaluation_path())
        .map_err(|source| PipelineError::Write {
            what: "evaluation report",
            source,
        })?;

    tracing::info!(
        accuracy = report.accuracy,
        samples = report.weighted_avg.support,
        report = %output.evaluation_path().display(),
        "Predictions evaluated"
    );

    Ok(report)
}

pub fn release(config: &TrainingConfig) -> Result<Published, PipelineError> {
    let output = &config.output;
    Ok(publish(
        &output.exported_model_path(),
        &output.labels_path(),
        &output.serving_dir,
        &output.serving_model_file,
    )?)
}
