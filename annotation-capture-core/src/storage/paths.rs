//! Image listing and annotation file naming.
//!
//! The annotation for `images/cat.png` is `<annotations>/cat.wav`; one file
//! per image, re-recording overwrites it.

use std::fs;
use std::path::{Path, PathBuf};

use crate::models::error::CaptureError;

/// Extensions recognised as annotatable images (compared case-insensitively).
pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// Extension of written annotation files.
pub const ANNOTATION_EXTENSION: &str = "wav";

/// List image file names in `dir`, sorted.
pub fn list_images(dir: &Path) -> Result<Vec<String>, CaptureError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| CaptureError::StorageError(format!("failed to read {}: {}", dir.display(), e)))?;

    let mut images: Vec<String> = entries
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| is_image(name))
        .collect();
    images.sort();
    Ok(images)
}

pub fn is_image(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

/// Annotation target for an image: its base name with a `.wav` extension.
pub fn annotation_target(image_name: &str) -> Result<String, CaptureError> {
    let stem = Path::new(image_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CaptureError::InvalidTarget(format!("no base name in {:?}", image_name)))?;
    Ok(format!("{}.{}", stem, ANNOTATION_EXTENSION))
}

/// Check that `target` is a plain file name inside the annotations directory.
pub fn validate_target(target: &str) -> Result<(), CaptureError> {
    if target.is_empty() || target == "." || target == ".." {
        return Err(CaptureError::InvalidTarget(format!("{:?}", target)));
    }
    if target.contains('/') || target.contains('\\') {
        return Err(CaptureError::InvalidTarget(format!(
            "{:?} contains a path separator",
            target
        )));
    }
    Ok(())
}

/// Full output path for `target` under `output_directory`.
pub fn annotation_path(output_directory: &Path, target: &str) -> Result<PathBuf, CaptureError> {
    validate_target(target)?;
    Ok(output_directory.join(target))
}

/// Create the annotations directory if it is missing.
pub fn ensure_directory(output_directory: &Path) -> Result<(), CaptureError> {
    fs::create_dir_all(output_directory)
        .map_err(|e| CaptureError::StorageError(format!("failed to create directory: {}", e)))
}

/// Path of an existing annotation for `target`, if one has been recorded.
pub fn existing_annotation(output_directory: &Path, target: &str) -> Option<PathBuf> {
    annotation_path(output_directory, target)
        .ok()
        .filter(|path| path.is_file())
}
