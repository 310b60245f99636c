//! Surface texture descriptor built on local binary patterns.

use crate::extractor::FeatureExtractor;
use crate::fft::shifted_magnitude;
use crate::imaging::{laplacian, mean, sobel, std_dev, to_gray, variance, Plane};
use craftx_core::{FeatureKind, TextureFeatures, Vector};
use image::{GrayImage, RgbImage};

pub const LBP_RADIUS: usize = 3;
pub const LBP_POINTS: usize = 24;
pub const LBP_BINS: usize = 256;
/// Half-size of the low-frequency block excluded from the periodicity score.
const DC_HALF_WINDOW: usize = 5;

pub const TEXTURE_DIM: usize = LBP_BINS + 5;

#[derive(Debug, Clone, Copy, Default)]
pub struct TextureExtractor;

impl FeatureExtractor for TextureExtractor {
    type Output = TextureFeatures;

    fn kind(&self) -> FeatureKind {
        FeatureKind::Texture
    }

    fn extract(&self, image: &RgbImage) -> TextureFeatures {
        let gray = to_gray(image);
        let lbp = local_binary_pattern(&gray);

        let mut lbp_histogram = vec![0f32; LBP_BINS];
        for &code in lbp.as_raw() {
            lbp_histogram[code as usize] += 1.0;
        }

        let gx = sobel(&gray, 1, 0);
        let gy = sobel(&gray, 0, 1);
        let magnitude = gx.zip_map(&gy, |a, b| (a * a + b * b).sqrt());
        let roughness = (variance(magnitude.data().iter().copied()) / (255.0 * 255.0)).min(1.0);

        let orientation = gy.zip_map(&gx, f64::atan2);
        let grain_direction = 1.0 - (std_dev(orientation.data().iter().copied()) / std::f64::consts::PI).min(1.0);

        let uniformity =
            1.0 - (variance(lbp.as_raw().iter().map(|&v| f64::from(v))) / (256.0 * 256.0)).min(1.0);
        let periodicity = periodicity(&gray);
        let irregularity = (mean(laplacian(&gray).data().iter().map(|v| v.abs())) / 255.0).min(1.0);

        let total = lbp_histogram.iter().sum::<f32>().max(1.0);
        let mut raw: Vec<f32> = lbp_histogram.iter().map(|c| c / total).collect();
        raw.extend(
            [roughness, grain_direction, uniformity, periodicity, irregularity]
                .iter()
                .map(|&v| v as f32),
        );

        TextureFeatures {
            lbp_histogram,
            roughness: roughness as f32,
            grain_direction: grain_direction as f32,
            uniformity: uniformity as f32,
            periodicity: periodicity as f32,
            irregularity: irregularity as f32,
            vector: Vector::unit(raw),
        }
    }
}

/// Circular LBP with radius 3. Neighbour k sits at
/// (row + 3cos(2*pi*k/24), col + 3sin(2*pi*k/24)), truncated. Codes are kept
/// to their low 8 bits; pixels within the radius of the border stay 0.
#[must_use]
pub fn local_binary_pattern(gray: &GrayImage) -> GrayImage {
    let (w, h) = (gray.width() as usize, gray.height() as usize);
    let mut out = GrayImage::new(w as u32, h as u32);
    if w <= 2 * LBP_RADIUS || h <= 2 * LBP_RADIUS {
        return out;
    }

    // Only the first eight neighbours survive the 8-bit truncation.
    let offsets: Vec<(f64, f64)> = (0..8)
        .map(|k| {
            let angle = 2.0 * std::f64::consts::PI * k as f64 / LBP_POINTS as f64;
            (LBP_RADIUS as f64 * angle.cos(), LBP_RADIUS as f64 * angle.sin())
        })
        .collect();

    let src = gray.as_raw();
    for row in LBP_RADIUS..h - LBP_RADIUS {
        for col in LBP_RADIUS..w - LBP_RADIUS {
            let center = src[row * w + col];
            let mut code = 0u8;
            for (k, (dr, dc)) in offsets.iter().enumerate() {
                let r = (row as f64 + dr) as usize;
                let c = (col as f64 + dc) as usize;
                if src[r * w + c] >= center {
                    code |= 1 << k;
                }
            }
            out.put_pixel(col as u32, row as u32, image::Luma([code]));
        }
    }
    out
}

/// Mean spectral magnitude away from the low-frequency block, relative to
/// the spectrum peak.
fn periodicity(gray: &GrayImage) -> f64 {
    let spectrum = shifted_magnitude(&Plane::from_gray(gray));
    let (w, h) = (spectrum.width(), spectrum.height());
    let (ch, cw) = (h / 2, w / 2);
    let rows = ch.saturating_sub(DC_HALF_WINDOW)..(ch + DC_HALF_WINDOW).min(h);
    let cols = cw.saturating_sub(DC_HALF_WINDOW)..(cw + DC_HALF_WINDOW).min(w);

    let peak = spectrum.data().iter().copied().fold(0.0, f64::max);
    if peak <= 0.0 {
        return 0.0;
    }
    let outside = (0..h)
        .flat_map(|y| (0..w).map(move |x| (x, y)))
        .filter(|(x, y)| !(rows.contains(y) && cols.contains(x)))
        .map(|(x, y)| spectrum.get(x, y));
    (mean(outside) / peak).min(1.0)
}
