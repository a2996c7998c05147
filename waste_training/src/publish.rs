use std::{
    ffi::OsStr,
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Model artifact not found at {0}")]
    MissingArtifact(PathBuf),
    #[error("Model artifact at {0} is empty")]
    EmptyArtifact(PathBuf),
    #[error("Labels file not found at {0}")]
    MissingLabels(PathBuf),
    #[error("Failed to copy {path}: {source}")]
    Copy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, PartialEq)]
pub struct Published {
    pub model: PathBuf,
    pub labels: PathBuf,
    pub model_bytes: u64,
}

/// Checks the exported model and copies it, together with its labels file,
/// into the directory the inference service loads from.
pub fn publish(
    artifact: &Path,
    labels: &Path,
    serving_dir: &Path,
    model_file: &str,
) -> Result<Published, PublishError> {
    let metadata =
        fs::metadata(artifact).map_err(|_| PublishError::MissingArtifact(artifact.to_path_buf()))?;
    if !metadata.is_file() {
        return Err(PublishError::MissingArtifact(artifact.to_path_buf()));
    }
    if metadata.len() == 0 {
        return Err(PublishError::EmptyArtifact(artifact.to_path_buf()));
    }
    if !labels.is_file() {
        return Err(PublishError::MissingLabels(labels.to_path_buf()));
    }

    let copy_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| PublishError::Copy { path, source }
    };

    fs::create_dir_all(serving_dir).map_err(copy_error(serving_dir))?;

    let model = serving_dir.join(model_file);
    let model_bytes = fs::copy(artifact, &model).map_err(copy_error(artifact))?;

    let labels_name = labels.file_name().unwrap_or(OsStr::new("labels.txt"));
    let labels_target = serving_dir.join(labels_name);
    fs::copy(labels, &labels_target).map_err(copy_error(labels))?;

    tracing::info!(
        model = %model.display(),
        labels = %labels_target.display(),
        model_bytes,
        "Model published"
    );

    Ok(Published {
        model,
        labels: labels_target,
        model_bytes,
    })
}
