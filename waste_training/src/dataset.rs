use std::{
    fs,
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Formats the training data loader reads. Anything else in a class
/// directory is never seen by the trainer and must not be counted.
const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "bmp", "ppm", "tif", "tiff"];

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Split {0} contains no class directories")]
    NoClasses(PathBuf),
    #[error("Class {class} in split {split} contains no images")]
    EmptyClass { split: PathBuf, class: String },
    #[error("Split {split} has classes {found:?}, expected {expected:?}")]
    ClassMismatch {
        split: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> DatasetError + '_ {
    move |source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    }
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Sorted sub-directory names of `dir`.
fn class_dirs(dir: &Path) -> Result<Vec<String>, DatasetError> {
    let mut classes = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error(dir))? {
        let entry = entry.map_err(io_error(dir))?;
        if entry.file_type().map_err(io_error(dir))?.is_dir() {
            classes.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    classes.sort();
    Ok(classes)
}

/// Sorted image files directly under `dir`.
fn image_files(dir: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error(dir))? {
        let path = entry.map_err(io_error(dir))?.path();
        if path.is_file() && is_image_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub path: PathBuf,
    pub class_index: usize,
}

/// One split of a directory-per-class dataset. Class indices follow the
/// lexicographic order of the directory names.
#[derive(Debug, Clone)]
pub struct Split {
    pub root: PathBuf,
    pub classes: Vec<String>,
    pub samples: Vec<Sample>,
}

impl Split {
    pub fn scan(root: &Path) -> Result<Self, DatasetError> {
        let classes = class_dirs(root)?;
        if classes.is_empty() {
            return Err(DatasetError::NoClasses(root.to_path_buf()));
        }

        let mut samples = Vec::new();
        for (class_index, class) in classes.iter().enumerate() {
            let files = image_files(&root.join(class))?;
            if files.is_empty() {
                return Err(DatasetError::EmptyClass {
                    split: root.to_path_buf(),
                    class: class.clone(),
                });
            }
            samples.extend(files.into_iter().map(|path| Sample { path, class_index }));
        }

        Ok(Self {
            root: root.to_path_buf(),
            classes,
            samples,
        })
    }

    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.classes.len()];
        for sample in &self.samples {
            counts[sample.class_index] += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Dataset {
    pub train: Split,
    pub val: Split,
    pub test: Split,
}

impl Dataset {
    /// Scans all three splits and requires them to share one class set.
    pub fn scan(train: &Path, val: &Path, test: &Path) -> Result<Self, DatasetError> {
        let train = Split::scan(train)?;
        let val = Split::scan(val)?;
        let test = Split::scan(test)?;

        for split in [&val, &test] {
            if split.classes != train.classes {
                return Err(DatasetError::ClassMismatch {
                    split: split.root.clone(),
                    expected: train.classes.clone(),
                    found: split.classes.clone(),
                });
            }
        }

        tracing::info!(
            classes = ?train.classes,
            train = train.len(),
            val = val.len(),
            test = test.len(),
            "Dataset scanned"
        );

        Ok(Self { train, val, test })
    }

    pub fn labels(&self) -> &[String] {
        &self.train.classes
    }
}
