//! Container detection.
//!
//! Whether a file is a JPEG is decided from its leading bytes, not its extension: both
//! metadata stores are only defined for the JPEG container, and a mislabelled file must not
//! be rewritten.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{MetadataError, Result};

pub const JPEG_MIME: &str = "image/jpeg";

/// Enough leading bytes for every signature `image::guess_format` knows.
const SNIFF_LEN: usize = 32;

/// Detect the MIME type of a file from its content.
///
/// Returns `Ok(None)` for content that matches no known image signature.
pub fn detect_mime(path: &Path) -> Result<Option<&'static str>> {
    let mut file = File::open(path).map_err(|e| MetadataError::io(path, e))?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    file.by_ref()
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)
        .map_err(|e| MetadataError::io(path, e))?;

    Ok(image::guess_format(&head)
        .ok()
        .map(|format| format.to_mime_type()))
}

/// Fail with [`MetadataError::NotJpeg`] unless the file content is a JPEG.
pub fn ensure_jpeg(path: &Path) -> Result<()> {
    match detect_mime(path)? {
        Some(JPEG_MIME) => Ok(()),
        detected => Err(MetadataError::NotJpeg {
            path: path.to_path_buf(),
            detected: detected.unwrap_or("unknown").to_string(),
        }),
    }
}

/// Collect JPEG files from the given paths.
///
/// Accepts a mix of file paths and directory paths. Directories are walked recursively
/// (following symlinks). Files are included only if their content is a JPEG.
pub fn collect_jpegs(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut images = Vec::new();

    for path in paths {
        if path.is_file() {
            if is_jpeg(path) {
                images.push(path.clone());
            } else {
                log::warn!("Skipping non-JPEG file: {}", path.display());
            }
        } else if path.is_dir() {
            for entry in WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let p = entry.path();
                if p.is_file() && is_jpeg(p) {
                    images.push(p.to_path_buf());
                }
            }
        } else {
            log::warn!("Path does not exist: {}", path.display());
        }
    }

    images.sort();
    images
}

fn is_jpeg(path: &Path) -> bool {
    matches!(detect_mime(path), Ok(Some(JPEG_MIME)))
}
