//! Discovery of input images and naming of outputs.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Returns `input` itself when it is a file, or every image below it (sorted)
/// when it is a directory.
pub fn collect_images(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        bail!("Input does not exist: {}", input.display());
    }

    let mut images = Vec::new();
    for entry in WalkDir::new(input).follow_links(true) {
        let entry = entry.with_context(|| format!("Failed to read {}", input.display()))?;
        if entry.file_type().is_file() && is_image(entry.path()) {
            images.push(entry.into_path());
        }
    }
    images.sort();

    Ok(images)
}

/// Output file for every image: `<output_dir>/<relative dir>/<stem>_denoised.png`,
/// where the relative directory mirrors the image's location below `input`.
///
/// Fails before anything is written when two images would share an output,
/// as `photo.png` and `photo.jpg` in one directory do.
pub fn output_paths(images: &[PathBuf], input: &Path, output_dir: &Path) -> Result<Vec<PathBuf>> {
    let root = if input.is_dir() {
        input
    } else {
        input.parent().unwrap_or_else(|| Path::new(""))
    };

    let mut seen: HashMap<PathBuf, &Path> = HashMap::new();
    let mut outputs = Vec::with_capacity(images.len());
    for image in images {
        let destination = output_path(image, root, output_dir);
        if let Some(previous) = seen.insert(destination.clone(), image) {
            bail!(
                "{} and {} would both be written to {}",
                previous.display(),
                image.display(),
                destination.display()
            );
        }
        outputs.push(destination);
    }

    Ok(outputs)
}

fn output_path(image: &Path, root: &Path, output_dir: &Path) -> PathBuf {
    let relative = image.strip_prefix(root).unwrap_or(image);
    let stem = relative
        .file_stem()
        .map_or_else(|| "image".into(), |s| s.to_string_lossy());
    let dir = relative.parent().unwrap_or_else(|| Path::new(""));

    output_dir.join(dir).join(format!("{stem}_denoised.png"))
}
