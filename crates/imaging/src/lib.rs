//! Image processing backed by the `image` crate
//!
//! Implements the engine's [`ImageProcessor`] collaborator. Every transform
//! decodes the source file, applies the edit and writes the result to a new
//! file in the working directory; source files are never modified.

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use photomeasure_core::imaging::{self, ImageError, ImageFormat, ImageProcessor, ImageResult, ImageTransform};
use photomeasure_core::{ImageRef, ImageSize};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// JPEG quality used for transform outputs
pub const DEFAULT_JPEG_QUALITY: u8 = 92;

/// [`ImageProcessor`] writing its outputs into a working directory
#[derive(Debug, Clone)]
pub struct ImageCrateProcessor {
    work_dir: PathBuf,
}

impl ImageCrateProcessor {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn output_path(&self, source: &Path, op: ImageTransform, format: ImageFormat) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        self.work_dir.join(format!(
            "{stem}-{}-{}.{}",
            transform_name(op),
            uuid::Uuid::new_v4().simple(),
            format.extension()
        ))
    }
}

impl ImageProcessor for ImageCrateProcessor {
    fn load(&self, path: &Path) -> ImageResult<ImageRef> {
        imaging::inspect(path)
    }

    fn transform(&self, image: &ImageRef, op: ImageTransform) -> ImageResult<ImageRef> {
        let decoded = decode(&image.path)?;
        let result = apply(decoded, op)?;

        let format = ImageFormat::from_path(&image.path).unwrap_or(ImageFormat::Png);
        fs::create_dir_all(&self.work_dir).map_err(|source| ImageError::Io {
            path: self.work_dir.clone(),
            source,
        })?;
        let out = self.output_path(&image.path, op, format);
        encode(&result, &out, format, DEFAULT_JPEG_QUALITY)?;

        tracing::debug!(
            source = %image.path.display(),
            output = %out.display(),
            ?op,
            "image transformed"
        );
        Ok(ImageRef::new(out, ImageSize::new(result.width(), result.height())))
    }

    fn save(&self, image: &ImageRef, path: &Path, format: ImageFormat, quality: u8) -> ImageResult<()> {
        let decoded = decode(&image.path)?;
        encode(&decoded, path, format, quality)
    }
}

/// Apply one transform to a decoded image
pub fn apply(image: DynamicImage, op: ImageTransform) -> ImageResult<DynamicImage> {
    Ok(match op {
        ImageTransform::Rotate90 => image.rotate90(),
        ImageTransform::Rotate180 => image.rotate180(),
        ImageTransform::Rotate270 => image.rotate270(),
        ImageTransform::FlipHorizontal => image.fliph(),
        ImageTransform::FlipVertical => image.flipv(),
        ImageTransform::Crop {
            x,
            y,
            width,
            height,
        } => {
            let fits = width > 0
                && height > 0
                && x.checked_add(width).is_some_and(|right| right <= image.width())
                && y.checked_add(height).is_some_and(|bottom| bottom <= image.height());
            if !fits {
                return Err(ImageError::InvalidCrop {
                    x,
                    y,
                    width,
                    height,
                    image_width: image.width(),
                    image_height: image.height(),
                });
            }
            image.crop_imm(x, y, width, height)
        }
    })
}

fn transform_name(op: ImageTransform) -> &'static str {
    match op {
        ImageTransform::Rotate90 => "rot90",
        ImageTransform::Rotate180 => "rot180",
        ImageTransform::Rotate270 => "rot270",
        ImageTransform::FlipHorizontal => "fliph",
        ImageTransform::FlipVertical => "flipv",
        ImageTransform::Crop { .. } => "crop",
    }
}

fn decode(path: &Path) -> ImageResult<DynamicImage> {
    image::open(path).map_err(|err| match err {
        image::ImageError::IoError(source) => ImageError::Io {
            path: path.to_path_buf(),
            source,
        },
        other => ImageError::Decode {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    })
}

fn encode(image: &DynamicImage, path: &Path, format: ImageFormat, quality: u8) -> ImageResult<()> {
    let encode_err = |err: image::ImageError| ImageError::Encode {
        path: path.to_path_buf(),
        reason: err.to_string(),
    };
    match format {
        ImageFormat::Png => image
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(encode_err),
        ImageFormat::Jpeg => {
            let file = File::create(path).map_err(|source| ImageError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let mut writer = BufWriter::new(file);
            let encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
            // JPEG has no alpha channel.
            DynamicImage::ImageRgb8(image.to_rgb8())
                .write_with_encoder(encoder)
                .map_err(encode_err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// 4x2 image with a red pixel in the top-left corner
    fn write_fixture(dir: &Path) -> ImageRef {
        let mut img = RgbImage::new(4, 2);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        let path = dir.join("fixture.png");
        img.save(&path).unwrap();
        ImageRef::new(path, ImageSize::new(4, 2))
    }

    #[test]
    fn test_load_reads_dimensions() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let fixture = write_fixture(dir.path());
        let processor = ImageCrateProcessor::new(dir.path().join("work"));
        assert_eq!(processor.load(&fixture.path).unwrap(), fixture);
    }

    #[test]
    fn test_rotate_writes_new_file() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let fixture = write_fixture(dir.path());
        let processor = ImageCrateProcessor::new(dir.path().join("work"));

        let rotated = processor.transform(&fixture, ImageTransform::Rotate90).unwrap();
        assert_eq!(rotated.size, ImageSize::new(2, 4));
        assert_ne!(rotated.path, fixture.path);
        assert!(rotated.path.starts_with(processor.work_dir()));

        // Top-left moves to top-right after a clockwise quarter turn.
        let pixels = image::open(&rotated.path).unwrap().to_rgb8();
        assert_eq!(pixels.get_pixel(1, 0), &Rgb([255, 0, 0]));

        let source = image::open(&fixture.path).unwrap();
        assert_eq!((source.width(), source.height()), (4, 2));
    }

    #[test]
    fn test_flips() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let fixture = write_fixture(dir.path());
        let processor = ImageCrateProcessor::new(dir.path());

        let flipped = processor.transform(&fixture, ImageTransform::FlipHorizontal).unwrap();
        let pixels = image::open(&flipped.path).unwrap().to_rgb8();
        assert_eq!(pixels.get_pixel(3, 0), &Rgb([255, 0, 0]));

        let flipped = processor.transform(&fixture, ImageTransform::FlipVertical).unwrap();
        let pixels = image::open(&flipped.path).unwrap().to_rgb8();
        assert_eq!(pixels.get_pixel(0, 1), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_crop_bounds() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let fixture = write_fixture(dir.path());
        let processor = ImageCrateProcessor::new(dir.path());

        let cropped = processor
            .transform(
                &fixture,
                ImageTransform::Crop {
                    x: 1,
                    y: 0,
                    width: 3,
                    height: 2,
                },
            )
            .unwrap();
        assert_eq!(cropped.size, ImageSize::new(3, 2));

        let err = processor
            .transform(
                &fixture,
                ImageTransform::Crop {
                    x: 2,
                    y: 0,
                    width: 3,
                    height: 2,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ImageError::InvalidCrop { .. }));
    }

    #[test]
    fn test_save_as_jpeg() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let fixture = write_fixture(dir.path());
        let processor = ImageCrateProcessor::new(dir.path());
        let out = dir.path().join("export.jpg");

        processor.save(&fixture, &out, ImageFormat::Jpeg, 80).unwrap();
        assert_eq!(processor.load(&out).unwrap().size, ImageSize::new(4, 2));
    }

    #[test]
    fn test_missing_source() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let processor = ImageCrateProcessor::new(dir.path());
        let missing = ImageRef::new(dir.path().join("nope.png"), ImageSize::new(1, 1));
        assert!(matches!(
            processor.transform(&missing, ImageTransform::Rotate180),
            Err(ImageError::Io { .. })
        ));
    }
}
