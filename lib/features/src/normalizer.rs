//! Decode uploaded bytes into a fixed-scale RGB image.

use craftx_core::{Error, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tracing::debug;

pub const DEFAULT_TARGET_EDGE: u32 = 384;

/// Decodes any supported container (PNG, JPEG, GIF, BMP, WebP) and resizes
/// it so the shorter edge equals `target_edge`. Aspect ratio is preserved
/// and the longer edge is truncated, never cropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageNormalizer {
    target_edge: u32,
}

impl Default for ImageNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_EDGE)
    }
}

impl ImageNormalizer {
    #[must_use]
    pub fn new(target_edge: u32) -> Self {
        Self {
            target_edge: target_edge.max(1),
        }
    }

    #[inline]
    #[must_use]
    pub fn target_edge(&self) -> u32 {
        self.target_edge
    }

    pub fn normalize(&self, bytes: &[u8]) -> Result<RgbImage> {
        if bytes.is_empty() {
            return Err(Error::Decode("empty image payload".to_string()));
        }
        let decoded = image::load_from_memory(bytes).map_err(|e| Error::Decode(e.to_string()))?;
        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(Error::Decode("image has zero width or height".to_string()));
        }
        Ok(self.resize(&decoded.to_rgb8()))
    }

    /// Resize an already decoded image.
    #[must_use]
    pub fn resize(&self, rgb: &RgbImage) -> RgbImage {
        let (w, h) = rgb.dimensions();
        let (nw, nh) = self.target_dimensions(w, h);
        if (nw, nh) == (w, h) {
            return rgb.clone();
        }
        debug!("Resizing image {}x{} -> {}x{}", w, h, nw, nh);
        image::imageops::resize(rgb, nw, nh, FilterType::Lanczos3)
    }

    #[must_use]
    pub fn target_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        let target = self.target_edge;
        if width < height {
            let nh = (f64::from(height) * (f64::from(target) / f64::from(width.max(1)))) as u32;
            (target, nh.max(1))
        } else {
            let nw = (f64::from(width) * (f64::from(target) / f64::from(height.max(1)))) as u32;
            (nw.max(1), target)
        }
    }
}
