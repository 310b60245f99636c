//! Shape and structure descriptor.

use crate::contour::{find_external_contours, Contour};
use crate::extractor::FeatureExtractor;
use crate::imaging::{canny, gaussian_blur_5x5, to_gray};
use craftx_core::{FeatureKind, GeometricFeatures, Vector};
use image::{GrayImage, RgbImage};

pub const CANNY_LOW: f64 = 50.0;
pub const CANNY_HIGH: f64 = 150.0;
/// Contours enclosing less than this fraction of the image are noise.
pub const MIN_CONTOUR_FRACTION: f64 = 0.001;
/// Douglas-Peucker tolerance relative to the contour perimeter.
pub const APPROX_EPSILON_RATIO: f64 = 0.02;

#[derive(Debug, Clone, Copy, Default)]
pub struct GeometricExtractor;

impl FeatureExtractor for GeometricExtractor {
    type Output = GeometricFeatures;

    fn kind(&self) -> FeatureKind {
        FeatureKind::Geometric
    }

    fn extract(&self, image: &RgbImage) -> GeometricFeatures {
        let gray = to_gray(image);
        let (w, h) = (f64::from(image.width()), f64::from(image.height()));
        let area = w * h;

        let edges = canny(&gaussian_blur_5x5(&gray), CANNY_LOW, CANNY_HIGH);
        let edge_count = edges.as_raw().iter().filter(|&&v| v > 0).count();
        let edge_density = edge_count as f64 / area;

        let min_area = area * MIN_CONTOUR_FRACTION;
        let contours: Vec<Contour> = find_external_contours(&edges)
            .into_iter()
            .filter(|c| c.area() > min_area)
            .collect();

        let vertex_count: usize = contours
            .iter()
            .map(|c| c.approximate(APPROX_EPSILON_RATIO * c.perimeter()).len())
            .sum();
        let aspect_ratio = w / h.max(1.0);
        let compactness = compactness(&contours);
        let symmetry = symmetry(&gray);
        let curvature = curvature(&contours);
        let complexity = contours.len() as f64 / (area / 10_000.0).max(1.0);

        let vector = Vector::unit(vec![
            edge_density.min(1.0) as f32,
            (vertex_count as f64 / 1000.0).min(1.0) as f32,
            aspect_ratio.min(1.0) as f32,
            compactness.min(1.0) as f32,
            symmetry.min(1.0) as f32,
            curvature.min(1.0) as f32,
            complexity.min(1.0) as f32,
        ]);

        GeometricFeatures {
            edge_density: edge_density as f32,
            vertex_count: vertex_count as u32,
            aspect_ratio: aspect_ratio as f32,
            compactness: compactness as f32,
            symmetry: symmetry as f32,
            curvature: curvature as f32,
            complexity: complexity as f32,
            edge_count: edge_count as u32,
            contour_count: contours.len() as u32,
            vector,
        }
    }
}

/// 4*pi*A / P^2 of the largest contour, capped at 1. Zero without contours.
#[must_use]
pub fn compactness(contours: &[Contour]) -> f64 {
    let Some(largest) = contours.iter().max_by(|a, b| {
        a.area()
            .partial_cmp(&b.area())
            .unwrap_or(std::cmp::Ordering::Equal)
    }) else {
        return 0.0;
    };
    let perimeter = largest.perimeter();
    if perimeter == 0.0 {
        return 0.0;
    }
    (4.0 * std::f64::consts::PI * largest.area() / (perimeter * perimeter)).min(1.0)
}

/// Mean of the top/bottom and left/right mirror agreement.
#[must_use]
pub fn symmetry(gray: &GrayImage) -> f64 {
    let (w, h) = (gray.width(), gray.height());
    let px = |x: u32, y: u32| f64::from(gray.get_pixel(x, y).0[0]);

    let mirror_agreement = |pairs: &mut dyn Iterator<Item = (f64, f64)>| -> f64 {
        let (sum, n) = pairs.fold((0.0, 0usize), |(s, n), (a, b)| (s + (a - b).abs(), n + 1));
        if n == 0 {
            // Degenerate one-pixel axis: mean of an empty slice is undefined,
            // treat it as perfectly mirrored.
            return 1.0;
        }
        1.0 - sum / n as f64 / 255.0
    };

    let horizontal = mirror_agreement(
        &mut (0..h / 2).flat_map(|y| (0..w).map(move |x| (px(x, y), px(x, h - 1 - y)))),
    );
    let vertical = mirror_agreement(
        &mut (0..h).flat_map(|y| (0..w / 2).map(move |x| (px(x, y), px(w - 1 - x, y)))),
    );
    (horizontal + vertical) / 2.0
}

/// Mean ratio of simplified to raw contour points.
fn curvature(contours: &[Contour]) -> f64 {
    let ratios: Vec<f64> = contours
        .iter()
        .filter(|c| c.len() >= 3)
        .map(|c| {
            let approx = c.approximate(APPROX_EPSILON_RATIO * c.perimeter());
            approx.len() as f64 / c.len().max(1) as f64
        })
        .collect();
    if ratios.is_empty() {
        0.0
    } else {
        ratios.iter().sum::<f64>() / ratios.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_flat_image() {
        let img = RgbImage::from_pixel(64, 48, Rgb([120, 80, 40]));
        let g = GeometricExtractor.extract(&img);
        assert_eq!(g.edge_count, 0);
        assert_eq!(g.contour_count, 0);
        assert_eq!(g.compactness, 0.0);
        assert!((g.symmetry - 1.0).abs() < 1e-6);
        assert!((g.aspect_ratio - 64.0 / 48.0).abs() < 1e-6);
        assert_eq!(g.vector.dim(), 7);
        assert!((g.vector.norm() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_centered_square() {
        let img = RgbImage::from_fn(96, 96, |x, y| {
            if (28..68).contains(&x) && (28..68).contains(&y) {
                Rgb([230, 230, 230])
            } else {
                Rgb([10, 10, 10])
            }
        });
        let g = GeometricExtractor.extract(&img);
        assert!(g.edge_count > 0);
        assert!(g.contour_count >= 1);
        assert!(g.compactness > 0.0 && g.compactness <= 1.0);
        assert!(g.symmetry > 0.9);
        assert!(g.vertex_count >= 4);
    }

    #[test]
    fn test_symmetry_of_half_split() {
        let gray = GrayImage::from_fn(10, 10, |x, _| image::Luma([if x < 5 { 0 } else { 255 }]));
        assert!((symmetry(&gray) - 0.5).abs() < 1e-9);
    }
}
