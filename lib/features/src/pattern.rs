//! Keypoint-based pattern and decorative-detail descriptor.

use crate::extractor::FeatureExtractor;
use crate::imaging::{mean, std_dev, to_gray};
use crate::orb::{detect_and_describe, Descriptor, Keypoint, OrbParams};
use craftx_core::{FeatureKind, PatternFeatures, Vector};
use image::RgbImage;

/// Descriptor statistics are padded to this length before the three
/// summary scalars are appended.
pub const DESCRIPTOR_STATS_DIM: usize = 256;
pub const PATTERN_DIM: usize = DESCRIPTOR_STATS_DIM + 3;

#[derive(Debug, Clone, Default)]
pub struct PatternExtractor {
    params: OrbParams,
}

impl PatternExtractor {
    #[must_use]
    pub fn with_params(params: OrbParams) -> Self {
        Self { params }
    }
}

impl FeatureExtractor for PatternExtractor {
    type Output = PatternFeatures;

    fn kind(&self) -> FeatureKind {
        FeatureKind::Pattern
    }

    fn extract(&self, image: &RgbImage) -> PatternFeatures {
        let gray = to_gray(image);
        let (keypoints, descriptors) = detect_and_describe(&gray, &self.params);

        if keypoints.is_empty() {
            return PatternFeatures {
                keypoint_count: 0,
                density: 0.0,
                distribution: 0.0,
                detail_strength: 0.0,
                vector: Vector::zeros(PATTERN_DIM),
            };
        }

        let (w, h) = (f64::from(image.width()), f64::from(image.height()));
        let density = (keypoints.len() as f64 / (w * h / 10_000.0) / 100.0).min(1.0);
        let distribution = spread(&keypoints, w, h);
        let detail_strength = (mean(keypoints.iter().map(|k| k.response)) / 255.0).min(1.0);

        let mut raw = descriptor_statistics(&descriptors).into_inner();
        raw.extend([density as f32, distribution as f32, detail_strength as f32]);

        PatternFeatures {
            keypoint_count: keypoints.len() as u32,
            density: density as f32,
            distribution: distribution as f32,
            detail_strength: detail_strength as f32,
            vector: Vector::unit(raw),
        }
    }
}

/// Per-byte mean, std, min and max over all descriptors, zero-padded to
/// [`DESCRIPTOR_STATS_DIM`] and normalized.
fn descriptor_statistics(descriptors: &[Descriptor]) -> Vector {
    let column = |i: usize| descriptors.iter().map(move |d| f64::from(d[i]));
    let bytes = std::mem::size_of::<Descriptor>();

    let mut stats = Vec::with_capacity(DESCRIPTOR_STATS_DIM);
    stats.extend((0..bytes).map(|i| mean(column(i)) as f32));
    stats.extend((0..bytes).map(|i| std_dev(column(i)) as f32));
    stats.extend((0..bytes).map(|i| column(i).fold(f64::INFINITY, f64::min) as f32));
    stats.extend((0..bytes).map(|i| column(i).fold(0.0, f64::max) as f32));
    stats.resize(DESCRIPTOR_STATS_DIM, 0.0);
    Vector::unit(stats)
}

fn spread(keypoints: &[Keypoint], width: f64, height: f64) -> f64 {
    let xs = keypoints.iter().map(|k| f64::from(k.x));
    let ys = keypoints.iter().map(|k| f64::from(k.y));
    ((std_dev(xs) / width + std_dev(ys) / height) / 2.0).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_no_keypoints_gives_zero_vector() {
        let img = RgbImage::from_pixel(100, 100, Rgb([40, 40, 40]));
        let p = PatternExtractor::default().extract(&img);
        assert_eq!(p.keypoint_count, 0);
        assert_eq!(p.vector.dim(), PATTERN_DIM);
        assert_eq!(p.vector.norm(), 0.0);
    }

    #[test]
    fn test_textured_image() {
        let img = RgbImage::from_fn(160, 160, |x, y| {
            let on = x % 40 < 20 && y % 40 < 20;
            if on {
                Rgb([240, 240, 240])
            } else {
                Rgb([15, 15, 15])
            }
        });
        let p = PatternExtractor::default().extract(&img);
        assert!(p.keypoint_count > 0);
        assert_eq!(p.vector.dim(), PATTERN_DIM);
        assert!((p.vector.norm() - 1.0).abs() < 1e-5);
        assert!(p.density > 0.0 && p.density <= 1.0);
        assert!(p.distribution > 0.0);
    }

    #[test]
    fn test_descriptor_statistics_layout() {
        let descs = vec![[0u8; 32], [255u8; 32]];
        let v = descriptor_statistics(&descs);
        assert_eq!(v.dim(), DESCRIPTOR_STATS_DIM);
        // mean 127.5, std 127.5, min 0, max 255 per byte, then padding
        let s = v.as_slice();
        assert!((s[0] - s[32]).abs() < 1e-6);
        assert_eq!(s[64], 0.0);
        assert!(s[96] > s[0]);
        assert!(s[128..].iter().all(|x| *x == 0.0));
    }
}
