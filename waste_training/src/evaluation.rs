use serde::Serialize;
use std::{collections::BTreeMap, fs, io, path::Path};
use thiserror::Error;

const TRUE_COLUMN: &str = "true";
const PREDICTED_COLUMN: &str = "predicted";

#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Failed to read predictions: {0}")]
    Io(#[from] io::Error),
    #[error("Predictions have no header row")]
    MissingHeader,
    #[error("Predictions are missing column `{0}`")]
    MissingColumn(&'static str),
    #[error("Line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("Line {line}: unknown label `{label}`")]
    UnknownLabel { line: usize, label: String },
    #[error("Labels file is empty")]
    NoLabels,
    #[error("Predictions contain no rows")]
    Empty,
}

/// One test sample as class indices into the labels file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub actual: usize,
    pub predicted: usize,
}

/// Reads a labels file, one class per line, in output-index order.
pub fn load_labels(path: &Path) -> Result<Vec<String>, EvaluationError> {
    let labels: Vec<String> = fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    if labels.is_empty() {
        return Err(EvaluationError::NoLabels);
    }
    Ok(labels)
}

/// Parses a CSV of `true,predicted` label names with a header row. Columns
/// may appear in any order and extra columns are ignored.
pub fn parse_predictions(
    text: &str,
    labels: &[String],
) -> Result<Vec<Prediction>, EvaluationError> {
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
    let (_, header) = lines.next().ok_or(EvaluationError::MissingHeader)?;
    let columns: Vec<&str> = header.split(',').map(str::trim).collect();
    let column = |name: &'static str| {
        columns
            .iter()
            .position(|c| *c == name)
            .ok_or(EvaluationError::MissingColumn(name))
    };
    let (true_index, predicted_index) = (column(TRUE_COLUMN)?, column(PREDICTED_COLUMN)?);

    lines
        .map(|(n, line)| {
            let line_no = n + 1;
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let class = |index: usize, name: &str| -> Result<usize, EvaluationError> {
                let label = fields.get(index).ok_or_else(|| EvaluationError::Malformed {
                    line: line_no,
                    reason: format!("missing `{}`", name),
                })?;
                labels
                    .iter()
                    .position(|l| l.as_str() == *label)
                    .ok_or_else(|| EvaluationError::UnknownLabel {
                        line: line_no,
                        label: label.to_string(),
                    })
            };

            Ok(Prediction {
                actual: class(true_index, TRUE_COLUMN)?,
                predicted: class(predicted_index, PREDICTED_COLUMN)?,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    /// Correct predictions over the samples of this class. Equal to recall,
    /// reported separately to match the accuracy-per-class chart.
    pub accuracy: f64,
    pub support: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AverageMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

#[derive(Debug, Serialize)]
pub struct EvaluationReport {
    pub labels: Vec<String>,
    /// `confusion_matrix[actual][predicted]`, indexed like `labels`.
    pub confusion_matrix: Vec<Vec<usize>>,
    pub per_class: BTreeMap<String, ClassMetrics>,
    /// True-class sample counts.
    pub class_distribution: BTreeMap<String, usize>,
    pub accuracy: f64,
    pub macro_avg: AverageMetrics,
    pub weighted_avg: AverageMetrics,
}

impl EvaluationReport {
    pub fn write(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
    }
}

// Undefined ratios (no predictions or no samples for a class) count as 0.
fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

fn average(metrics: &[ClassMetrics], weights: &[f64], support: usize) -> AverageMetrics {
    let norm: f64 = weights.iter().sum();
    let mean = |value: fn(&ClassMetrics) -> f64| {
        if norm == 0.0 {
            return 0.0;
        }
        metrics
            .iter()
            .zip(weights)
            .map(|(m, w)| value(m) * w)
            .sum::<f64>()
            / norm
    };
    AverageMetrics {
        precision: mean(|m| m.precision),
        recall: mean(|m| m.recall),
        f1_score: mean(|m| m.f1_score),
        support,
    }
}

/// Confusion matrix and per-class scores for a set of test predictions.
pub fn evaluate(
    labels: &[String],
    predictions: &[Prediction],
) -> Result<EvaluationReport, EvaluationError> {
    if predictions.is_empty() {
        return Err(EvaluationError::Empty);
    }

    let classes = labels.len();
    let mut matrix = vec![vec![0usize; classes]; classes];
    for p in predictions {
        matrix[p.actual][p.predicted] += 1;
    }

    let correct: usize = (0..classes).map(|i| matrix[i][i]).sum();
    let total = predictions.len();

    let metrics: Vec<ClassMetrics> = (0..classes)
        .map(|i| {
            let support: usize = matrix[i].iter().sum();
            let predicted: usize = matrix.iter().map(|row| row[i]).sum();
            let precision = ratio(matrix[i][i], predicted);
            let recall = ratio(matrix[i][i], support);
            ClassMetrics {
                precision,
                recall,
                f1_score: f1(precision, recall),
                accuracy: recall,
                support,
            }
        })
        .collect();

    let uniform = vec![1.0; classes];
    let supports: Vec<f64> = metrics.iter().map(|m| m.support as f64).collect();
    let macro_avg = average(&metrics, &uniform, total);
    let weighted_avg = average(&metrics, &supports, total);

    Ok(EvaluationReport {
        labels: labels.to_vec(),
        class_distribution: labels
            .iter()
            .cloned()
            .zip(metrics.iter().map(|m| m.support))
            .collect(),
        per_class: labels.iter().cloned().zip(metrics).collect(),
        confusion_matrix: matrix,
        accuracy: ratio(correct, total),
        macro_avg,
        weighted_avg,
    })
}
