use crate::{
    cleaning::CleaningReport,
    config::{AugmentationConfig, Balancing, NetworkConfig, PreprocessingConfig, ScheduleConfig},
    dataset::Dataset,
    se_block::HeadCheck,
};
use serde::Serialize;
use std::{collections::BTreeMap, fs, io, path::Path};

#[derive(Debug, Serialize)]
pub struct SplitSummary {
    pub total: usize,
    pub per_class: BTreeMap<String, usize>,
}

impl SplitSummary {
    fn new(labels: &[String], counts: &[usize]) -> Self {
        Self {
            total: counts.iter().sum(),
            per_class: labels.iter().cloned().zip(counts.iter().copied()).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CleaningSummary {
    pub scanned: usize,
    pub corrupt: usize,
    pub removed: usize,
    pub dry_run: bool,
}

impl From<&CleaningReport> for CleaningSummary {
    fn from(report: &CleaningReport) -> Self {
        Self {
            scanned: report.scanned,
            corrupt: report.corrupt.len(),
            removed: report.removed,
            dry_run: report.dry_run,
        }
    }
}

/// Everything the external trainer needs to reproduce a run against the
/// prepared dataset.
#[derive(Debug, Serialize)]
pub struct TrainingManifest {
    /// Output index `i` of the trained network corresponds to `labels[i]`.
    pub labels: Vec<String>,
    pub train: SplitSummary,
    pub val: SplitSummary,
    pub test: SplitSummary,
    pub balancing: Balancing,
    pub class_weights: BTreeMap<String, f32>,
    /// Training indices after oversampling, empty when class weights are used.
    pub sample_plan: Vec<usize>,
    pub cleaning: CleaningSummary,
    pub preprocessing: PreprocessingConfig,
    pub network: NetworkConfig,
    pub head_check: HeadCheck,
    pub augmentation: AugmentationConfig,
    pub schedule: ScheduleConfig,
}

impl TrainingManifest {
    pub fn write(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
    }
}

pub fn write_labels(labels: &[String], path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut text = labels.join("\n");
    text.push('\n');
    fs::write(path, text)
}

pub fn split_summaries(dataset: &Dataset) -> (SplitSummary, SplitSummary, SplitSummary) {
    let labels = dataset.labels();
    (
        SplitSummary::new(labels, &dataset.train.class_counts()),
        SplitSummary::new(labels, &dataset.val.class_counts()),
        SplitSummary::new(labels, &dataset.test.class_counts()),
    )
}
