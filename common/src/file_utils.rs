//! File utility functions for listing and naming NIfTI images.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Volumetric image extensions, longest first so `.nii.gz` wins over `.gz`.
pub const NIFTI_EXTENSIONS: &[&str] = &[".nii.gz", ".nii"];

/// Surface image extension.
pub const GIFTI_EXTENSION: &str = ".gii";

/// Strips a known image extension from a file name, if present.
pub fn strip_image_extension(name: &str) -> &str {
    NIFTI_EXTENSIONS
        .iter()
        .chain(std::iter::once(&GIFTI_EXTENSION))
        .find_map(|ext| name.strip_suffix(ext))
        .unwrap_or(name)
}

pub fn is_image_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| {
            let lower = name.to_ascii_lowercase();
            NIFTI_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
        })
        .unwrap_or(false)
}

/// Returns paths to all volumetric images in a directory, sorted by name.
/// A missing directory yields an empty list.
pub fn image_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|path| path.is_file() && is_image_file(path))
        .collect();
    files.sort();

    Ok(files)
}
