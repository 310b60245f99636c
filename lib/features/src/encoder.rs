//! Pluggable global image embedding.
//!
//! Retrieval only needs a fixed-dimension vector per image; the model that
//! produces it is behind [`ImageEncoder`]. [`ThumbnailEncoder`] is the
//! built-in, dependency-free implementation: a downsampled, centered RGB
//! thumbnail.

use craftx_core::{Error, Result, Vector};
use image::imageops::FilterType;
use image::RgbImage;

pub trait ImageEncoder: Send + Sync {
    /// Output dimension. Constant for the lifetime of the encoder.
    fn dim(&self) -> usize;

    /// Short identifier recorded alongside persisted indexes.
    fn name(&self) -> &str;

    /// Encode a normalized image into a unit-length vector of [`Self::dim`].
    fn encode(&self, image: &RgbImage) -> Result<Vector>;
}

pub const DEFAULT_GRID: u32 = 8;

/// `grid x grid x 3` thumbnail with channels mapped to `v / 255 - 0.5`,
/// L2-normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailEncoder {
    grid: u32,
}

impl Default for ThumbnailEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_GRID)
    }
}

impl ThumbnailEncoder {
    #[must_use]
    pub fn new(grid: u32) -> Self {
        Self { grid: grid.max(1) }
    }
}

impl ImageEncoder for ThumbnailEncoder {
    fn dim(&self) -> usize {
        (self.grid * self.grid * 3) as usize
    }

    fn name(&self) -> &str {
        "thumbnail"
    }

    fn encode(&self, image: &RgbImage) -> Result<Vector> {
        if image.width() == 0 || image.height() == 0 {
            return Err(Error::Encoder("cannot encode an empty image".to_string()));
        }
        let thumb = image::imageops::resize(image, self.grid, self.grid, FilterType::Triangle);
        let data: Vec<f32> = thumb
            .pixels()
            .flat_map(|p| p.0)
            .map(|c| f32::from(c) / 255.0 - 0.5)
            .collect();
        debug_assert_eq!(data.len(), self.dim());
        Ok(Vector::unit(data))
    }
}
