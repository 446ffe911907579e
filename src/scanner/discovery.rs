use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::error::{PipelineError, Result};

/// Whether `path` has one of the allowed image extensions (case-insensitive).
pub fn is_allowed_image(path: &Path, extensions: &[String]) -> bool {
    match path.extension() {
        Some(ext) => {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            extensions
                .iter()
                .any(|e| e.trim_start_matches('.').to_lowercase() == ext_lower)
        }
        None => false,
    }
}

/// Find the most recently modified image directly inside `directory`.
///
/// Subdirectories are not searched. Equal modification times are broken by
/// path so the choice is deterministic.
pub fn latest_image(directory: &Path, extensions: &[String]) -> Result<PathBuf> {
    if !directory.is_dir() {
        return Err(PipelineError::NoPhotosFound(directory.to_path_buf()));
    }

    let mut latest: Option<(SystemTime, PathBuf)> = None;

    for entry in WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() || !is_allowed_image(path, extensions) {
            continue;
        }

        let modified = match entry.metadata().ok().and_then(|m| m.modified().ok()) {
            Some(t) => t,
            None => continue,
        };

        let newer = match &latest {
            Some((best_time, best_path)) => {
                (modified, path) > (*best_time, best_path.as_path())
            }
            None => true,
        };
        if newer {
            latest = Some((modified, path.to_path_buf()));
        }
    }

    latest
        .map(|(_, path)| path)
        .ok_or_else(|| PipelineError::NoPhotosFound(directory.to_path_buf()))
}

/// MIME type for an image path, judged by extension. Unknown types are sent
/// as JPEG.
pub fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        _ => "image/jpeg",
    }
}
