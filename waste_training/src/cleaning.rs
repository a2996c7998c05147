use image::ImageReader;
use serde::Serialize;
use std::{
    fs, io,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CorruptImage {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default, Serialize)]
pub struct CleaningReport {
    pub scanned: usize,
    pub corrupt: Vec<CorruptImage>,
    pub removed: usize,
    pub dry_run: bool,
}

/// Fully decodes the file. Header-only checks miss truncated payloads.
pub fn check_image(path: &Path) -> Result<(), String> {
    ImageReader::open(path)
        .map_err(|e| e.to_string())?
        .with_guessed_format()
        .map_err(|e| e.to_string())?
        .decode()
        .map(|_| ())
        .map_err(|e| e.to_string())
}

fn collect_files(dir: &Path, found: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, found)?;
        } else {
            found.push(path);
        }
    }
    Ok(())
}

/// Walks `root` recursively and decodes every file in it. Files that fail,
/// corrupt or not an image at all, are removed. With `dry_run` they are only
/// reported.
pub fn clean_directory(root: &Path, dry_run: bool) -> io::Result<CleaningReport> {
    let mut files = Vec::new();
    collect_files(root, &mut files)?;
    files.sort();

    let mut report = CleaningReport {
        scanned: files.len(),
        dry_run,
        ..Default::default()
    };

    for path in files {
        let Err(reason) = check_image(&path) else {
            continue;
        };
        tracing::warn!(path = %path.display(), reason = %reason, "Corrupt image");

        if !dry_run {
            fs::remove_file(&path)?;
            report.removed += 1;
        }
        report.corrupt.push(CorruptImage { path, reason });
    }

    tracing::info!(
        root = %root.display(),
        scanned = report.scanned,
        corrupt = report.corrupt.len(),
        removed = report.removed,
        dry_run,
        "Image check complete"
    );

    Ok(report)
}
