use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fragcanvas::{FrameSource, StillImage, SurfaceSize, TexelImage};
use image::imageops::{self, FilterType};
use image::RgbaImage;

/// Still image sampled through `iChannel0`.
///
/// Rows are flipped on load so texture coordinates match `gl_FragCoord`
/// (origin bottom-left). The identity key changes whenever the pixels do, so
/// the canvas re-uploads exactly once per change.
pub struct ChannelImage {
    path: PathBuf,
    original: RgbaImage,
    current: RgbaImage,
    key: String,
}

impl ChannelImage {
    pub fn load(path: &Path) -> Result<Self> {
        let mut original = image::open(path)
            .with_context(|| format!("failed to decode input image {}", path.display()))?
            .to_rgba8();
        imageops::flip_vertical_in_place(&mut original);
        tracing::debug!(
            path = %path.display(),
            width = original.width(),
            height = original.height(),
            "loaded input image"
        );
        Ok(Self {
            path: path.to_path_buf(),
            key: path.display().to_string(),
            current: original.clone(),
            original,
        })
    }

    pub fn frame_source(&self) -> FrameSource<'_> {
        FrameSource::Still(StillImage {
            key: &self.key,
            ready: true,
            image: TexelImage {
                width: self.current.width(),
                height: self.current.height(),
                pixels: self.current.as_raw(),
            },
        })
    }

    /// Resamples the original image to `size`.
    pub fn resize_to(&mut self, size: SurfaceSize) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        if self.current.dimensions() == (size.width, size.height) {
            return;
        }
        self.current = imageops::resize(&self.original, size.width, size.height, FilterType::Triangle);
        self.key = format!("{}@{}x{}", self.path.display(), size.width, size.height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn write_png(dir: &Path) -> PathBuf {
        let mut image = RgbaImage::new(2, 2);
        image.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        image.put_pixel(0, 1, Rgba([0, 0, 255, 255]));
        let path = dir.join("input.png");
        image.save(&path).expect("write png");
        path
    }

    fn key_of(image: &ChannelImage) -> String {
        match image.frame_source() {
            FrameSource::Still(still) => still.key.to_owned(),
            FrameSource::Live(_) => panic!("expected a still image"),
        }
    }

    #[test]
    fn load_flips_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let image = ChannelImage::load(&write_png(dir.path())).expect("load");
        match image.frame_source() {
            FrameSource::Still(still) => {
                assert!(still.ready);
                assert_eq!((still.image.width, still.image.height), (2, 2));
                assert_eq!(&still.image.pixels[..4], &[0, 0, 255, 255]);
            }
            FrameSource::Live(_) => panic!("expected a still image"),
        }
    }

    #[test]
    fn resize_changes_identity_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut image = ChannelImage::load(&write_png(dir.path())).expect("load");
        let initial = key_of(&image);

        image.resize_to(SurfaceSize::new(4, 4));
        let resized = key_of(&image);
        assert_ne!(initial, resized);

        image.resize_to(SurfaceSize::new(4, 4));
        assert_eq!(key_of(&image), resized);

        image.resize_to(SurfaceSize::new(0, 4));
        assert_eq!(key_of(&image), resized);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(ChannelImage::load(&dir.path().join("absent.png")).is_err());
    }
}
