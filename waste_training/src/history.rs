use crate::monitor::EpochMetrics;
use std::{fs, io, path::Path};
use thiserror::Error;

const REQUIRED_COLUMNS: [&str; 5] = ["epoch", "accuracy", "loss", "val_accuracy", "val_loss"];

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Failed to read history: {0}")]
    Io(#[from] io::Error),
    #[error("History has no header row")]
    MissingHeader,
    #[error("History is missing column `{0}`")]
    MissingColumn(&'static str),
    #[error("Line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// Parses a per-epoch CSV log with a header row. Columns may appear in any
/// order and extra columns are ignored.
pub fn parse_history(text: &str) -> Result<Vec<EpochMetrics>, HistoryError> {
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
    let (_, header) = lines.next().ok_or(HistoryError::MissingHeader)?;
    let columns: Vec<&str> = header.split(',').map(str::trim).collect();

    let mut index = [0usize; 5];
    for (slot, name) in index.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = columns
            .iter()
            .position(|c| *c == name)
            .ok_or(HistoryError::MissingColumn(name))?;
    }

    lines
        .map(|(n, line)| {
            let line_no = n + 1;
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let field = |i: usize| -> Result<f64, HistoryError> {
                let raw = fields.get(index[i]).ok_or_else(|| HistoryError::Malformed {
                    line: line_no,
                    reason: format!("missing `{}`", REQUIRED_COLUMNS[i]),
                })?;
                raw.parse::<f64>().map_err(|e| HistoryError::Malformed {
                    line: line_no,
                    reason: format!("`{}`: {}", REQUIRED_COLUMNS[i], e),
                })
            };

            let epoch = field(0)?;
            if epoch < 0.0 || epoch.fract() != 0.0 {
                return Err(HistoryError::Malformed {
                    line: line_no,
                    reason: format!("invalid epoch {}", epoch),
                });
            }

            Ok(EpochMetrics {
                epoch: epoch as usize,
                accuracy: field(1)?,
                loss: field(2)?,
                val_accuracy: field(3)?,
                val_loss: field(4)?,
            })
        })
        .collect()
}

pub fn load_history(path: &Path) -> Result<Vec<EpochMetrics>, HistoryError> {
    parse_history(&fs::read_to_string(path)?)
}
