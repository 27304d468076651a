use std::path::{Path, PathBuf};

/// Native pixel size of a source image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMeta {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// FAST: read only the header for dimensions.
///
/// # Errors
/// Fails with the decoder's error when the file is unreadable or not a supported image.
pub fn probe(path: &Path) -> image::ImageResult<ImageMeta> {
    let (width, height) = image::image_dimensions(path)?;
    Ok(ImageMeta {
        path: path.to_path_buf(),
        width,
        height,
    })
}

/// Dimensions only, with the decode failure flattened to text for user-facing errors.
pub fn probe_dimensions(path: &Path) -> Result<(u32, u32), String> {
    probe(path)
        .map(|m| (m.width, m.height))
        .map_err(|err| err.to_string())
}
