use std::{
    collections::HashSet,
    fs::File,
    io::{self, BufRead},
    path::Path,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelError {
    #[error("Failed to read labels: {0}")]
    Io(#[from] io::Error),
    #[error("Label set is empty")]
    Empty,
    #[error("Blank label on line {0}")]
    Blank(usize),
    #[error("Duplicate label: {0}")]
    Duplicate(String),
}

/// Ordered class names. The position of a name is the class index the
/// model emits, so the order has to be the one used during training.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    pub fn new<I, S>(labels: I) -> Result<Self, LabelError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(LabelError::Empty);
        }

        let mut seen = HashSet::new();
        for (line, label) in labels.iter().enumerate() {
            if label.trim().is_empty() {
                return Err(LabelError::Blank(line + 1));
            }
            if !seen.insert(label.as_str()) {
                return Err(LabelError::Duplicate(label.clone()));
            }
        }

        Ok(Self { labels })
    }

    /// Reads one label per line.
    pub fn load(filepath: &Path) -> Result<Self, LabelError> {
        let file = File::open(filepath)?;
        let reader = io::BufReader::new(file);

        let labels = reader
            .lines()
            .map(|line| line.map(|l| l.trim().to_string()))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(labels)
    }

    pub fn get(&self, class_id: usize) -> Option<&str> {
        self.labels.get(class_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}
