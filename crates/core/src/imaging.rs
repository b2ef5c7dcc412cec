//! Image-processing collaborator interface
//!
//! The engine only ever holds [`ImageRef`]s. Decoding, transforming and
//! encoding pixels is delegated to an [`ImageProcessor`] implementation.

use crate::project::{ImageRef, ImageSize};
use std::io;
use std::path::{Path, PathBuf};

/// Output encoding for [`ImageProcessor::save`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(ImageFormat::Png),
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }
}

/// A whole-image edit producing a new image file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageTransform {
    Rotate90,
    Rotate180,
    Rotate270,
    FlipHorizontal,
    FlipVertical,
    Crop {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
}

impl ImageTransform {
    /// Size of the result when applied to an image of `size`
    pub fn output_size(&self, size: ImageSize) -> ImageSize {
        match *self {
            ImageTransform::Rotate90 | ImageTransform::Rotate270 => {
                ImageSize::new(size.height, size.width)
            }
            ImageTransform::Rotate180
            | ImageTransform::FlipHorizontal
            | ImageTransform::FlipVertical => size,
            ImageTransform::Crop { width, height, .. } => ImageSize::new(width, height),
        }
    }
}

/// Errors raised by image collaborators
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("failed to access image {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to decode image {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("failed to encode image {path}: {reason}")]
    Encode { path: PathBuf, reason: String },

    #[error("crop {width}x{height} at ({x}, {y}) is outside a {image_width}x{image_height} image")]
    InvalidCrop {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },
}

/// Result type for image operations
pub type ImageResult<T> = Result<T, ImageError>;

/// Decode, transform and encode images on behalf of the engine
pub trait ImageProcessor {
    /// Validate an image file and return a reference to it
    fn load(&self, path: &Path) -> ImageResult<ImageRef>;

    /// Apply `op`, writing the result to a new file
    fn transform(&self, image: &ImageRef, op: ImageTransform) -> ImageResult<ImageRef>;

    /// Encode `image` to `path`; `quality` (1-100) applies to lossy formats
    fn save(&self, image: &ImageRef, path: &Path, format: ImageFormat, quality: u8)
        -> ImageResult<()>;
}

/// Read the dimensions of an encoded image from its header
pub fn inspect(path: &Path) -> ImageResult<ImageRef> {
    let reader = image::ImageReader::open(path)
        .map_err(|source| ImageError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .with_guessed_format()
        .map_err(|source| ImageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let (width, height) = reader.into_dimensions().map_err(|err| ImageError::Decode {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    Ok(ImageRef::new(path, ImageSize::new(width, height)))
}

/// Read the dimensions and format of an in-memory encoded image
pub fn sniff_bytes(bytes: &[u8]) -> Option<(ImageSize, ImageFormat)> {
    let reader = image::ImageReader::new(io::Cursor::new(bytes))
        .with_guessed_format()
        .ok()?;
    let format = match reader.format()? {
        image::ImageFormat::Png => ImageFormat::Png,
        image::ImageFormat::Jpeg => ImageFormat::Jpeg,
        _ => return None,
    };
    let (width, height) = reader.into_dimensions().ok()?;
    Some((ImageSize::new(width, height), format))
}
