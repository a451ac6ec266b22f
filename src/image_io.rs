use std::path::{Path, PathBuf};
use std::fs;
use image::{GrayImage, ImageFormat, RgbImage};

use crate::errors::{RetinopathyError, Result};

/// Extensions the loader accepts when scanning directories
const FUNDUS_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Represents an input fundus image with its metadata
pub struct InputImage {
    pub image: RgbImage,
    pub path: PathBuf,
    /// Full file name including extension, e.g. `eye_01.png`
    pub filename: String,
}

impl InputImage {
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Get all fundus images (PNG/JPEG) from a directory (recursively), skipping
/// overlays written by earlier runs
pub fn get_fundus_files_in_dir<P: AsRef<Path>>(dir_path: P, overlay_prefix: &str) -> Result<Vec<PathBuf>> {
    let dir_path = dir_path.as_ref();

    if !dir_path.exists() {
        return Err(RetinopathyError::InvalidPath(dir_path.to_path_buf()));
    }

    if !dir_path.is_dir() {
        return Err(RetinopathyError::Config(format!(
            "{} is not a directory", dir_path.display()
        )));
    }

    let mut files = Vec::new();
    find_fundus_files_recursive(dir_path, overlay_prefix, &mut files)?;
    files.sort();

    Ok(files)
}

fn find_fundus_files_recursive(
    dir_path: &Path,
    overlay_prefix: &str,
    result: &mut Vec<PathBuf>,
) -> Result<()> {
    for entry in fs::read_dir(dir_path)? {
        let path = entry?.path();

        if path.is_dir() {
            find_fundus_files_recursive(&path, overlay_prefix, result)?;
        } else if path.is_file() && is_fundus_file(&path) && !is_overlay_file(&path, overlay_prefix) {
            result.push(path);
        }
    }

    Ok(())
}

fn is_fundus_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FUNDUS_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_overlay_file(path: &Path, overlay_prefix: &str) -> bool {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(|name| name.starts_with(overlay_prefix))
        .unwrap_or(false)
}

/// Load a fundus photograph as 8-bit RGB.
///
/// Missing, corrupt and unsupported files all surface as
/// [`RetinopathyError::ImageUnreadable`].
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<InputImage> {
    let path = path.as_ref();

    let filename = path.file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| RetinopathyError::InvalidPath(path.to_path_buf()))?
        .to_string();

    let img = image::open(path).map_err(|e| RetinopathyError::ImageUnreadable {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(InputImage {
        image: img.to_rgb8(),
        path: path.to_path_buf(),
        filename,
    })
}

/// Overlay path for a source image: same directory, file name prefixed
pub fn overlay_path_for(source: &Path, prefix: &str) -> Result<PathBuf> {
    let filename = source.file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| RetinopathyError::InvalidPath(source.to_path_buf()))?;

    let parent = source.parent().unwrap_or_else(|| Path::new(""));
    Ok(parent.join(format!("{}{}", prefix, filename)))
}

/// Save a single-channel buffer, format chosen from the path extension
pub fn save_gray_image<P: AsRef<Path>>(image: &GrayImage, path: P) -> Result<()> {
    let path = path.as_ref();
    let format = ImageFormat::from_path(path).unwrap_or(ImageFormat::Png);

    image.save_with_format(path, format).map_err(|e| {
        RetinopathyError::Pipeline(format!("Failed to write {}: {}", path.display(), e))
    })
}
