//! Rule-based object-type classifier.

use crate::contour::find_external_contours;
use crate::extractor::FeatureExtractor;
use crate::fft::shifted_magnitude;
use crate::geometric::{compactness, CANNY_HIGH, CANNY_LOW};
use crate::imaging::{canny, gradient_magnitude, mean, nonzero_fraction, otsu_threshold, std_dev, threshold_binary, to_gray, Plane};
use craftx_core::{FeatureKind, GeometricFeatures, ObjectType, Prediction};
use image::{GrayImage, RgbImage};

const TEXTILE_DC_HALF_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ObjectCues {
    pub aspect_ratio: f64,
    pub compactness: f64,
    /// Pixel count of the normalized image.
    pub area: f64,
    pub face_like: bool,
    pub container_like: bool,
    pub fine_detail: bool,
    pub periodic_pattern: bool,
    pub shaded: bool,
}

impl ObjectCues {
    /// Measure the cues. Shape values come from `geometric` when available,
    /// otherwise they are recomputed from an unblurred edge map.
    #[must_use]
    pub fn measure(image: &RgbImage, geometric: Option<&GeometricFeatures>) -> Self {
        let gray = to_gray(image);
        let (w, h) = (f64::from(image.width()), f64::from(image.height()));

        let (aspect_ratio, compactness) = match geometric {
            Some(g) => (f64::from(g.aspect_ratio), f64::from(g.compactness)),
            None => {
                let edges = canny(&gray, CANNY_LOW, CANNY_HIGH);
                (w / h.max(1.0), compactness(&find_external_contours(&edges)))
            }
        };

        Self {
            aspect_ratio,
            compactness,
            area: w * h,
            face_like: has_separate_regions(&gray),
            container_like: has_darker_center(&gray),
            fine_detail: nonzero_fraction(&canny(&gray, CANNY_LOW, CANNY_HIGH)) > 0.15,
            periodic_pattern: has_periodic_pattern(&gray),
            shaded: std_dev(gradient_magnitude(&gray).data().iter().copied()) > 20.0,
        }
    }

    /// Raw rule scores in [`ObjectType`] vocabulary order.
    #[must_use]
    pub fn scores(&self) -> [f32; 6] {
        let (ar, c, area) = (self.aspect_ratio, self.compactness, self.area);
        let bonus = |cond: bool, v: f32| if cond { v } else { 0.0 };

        let mask = bonus(0.7 < ar && ar < 1.3, 0.3)
            + bonus(0.5 < c && c < 0.9, 0.3)
            + bonus(50_000.0 < area && area < 500_000.0, 0.2)
            + bonus(self.face_like, 0.2);
        let pottery = bonus(c > 0.7, 0.4)
            + bonus(ar < 1.5, 0.2)
            + bonus(30_000.0 < area && area < 400_000.0, 0.2)
            + bonus(self.container_like, 0.2);
        let jewelry = bonus(area < 100_000.0, 0.4)
            + bonus(self.fine_detail, 0.3)
            + bonus(ar < 2.0, 0.2)
            + bonus(c > 0.6, 0.1);
        let textile = bonus(ar > 1.5 || ar < 0.7, 0.3)
            + bonus(c < 0.6, 0.3)
            + bonus(area > 50_000.0, 0.2)
            + bonus(self.periodic_pattern, 0.2);
        let sculpture = bonus(100_000.0 < area && area < 1_000_000.0, 0.3)
            + bonus(0.4 < c && c < 0.8, 0.2)
            + bonus(self.shaded, 0.3)
            + bonus(ar < 2.0, 0.2);

        let strongest = [mask, pottery, jewelry, textile, sculpture]
            .into_iter()
            .fold(0.0f32, f32::max);
        let utility = if strongest < 0.4 { 0.5 } else { 0.1 };

        [mask, pottery, jewelry, textile, sculpture, utility]
    }
}

/// Two or more distinct blobs after Otsu binarization.
fn has_separate_regions(gray: &GrayImage) -> bool {
    let binary = threshold_binary(gray, otsu_threshold(gray));
    find_external_contours(&binary).len() >= 2
}

/// Central half-size window darker than 90% of the frame brightness.
fn has_darker_center(gray: &GrayImage) -> bool {
    let (w, h) = gray.dimensions();
    let px = |x: u32, y: u32| f64::from(gray.get_pixel(x, y).0[0]);

    let center = mean((h / 4..3 * h / 4).flat_map(|y| (w / 4..3 * w / 4).map(move |x| px(x, y))));
    let frame = mean(
        (0..w)
            .map(|x| px(x, 0))
            .chain((0..w).map(|x| px(x, h - 1)))
            .chain((0..h).map(|y| px(0, y)))
            .chain((0..h).map(|y| px(w - 1, y))),
    );
    center < frame * 0.9
}

/// High-frequency energy well above the spectrum average.
fn has_periodic_pattern(gray: &GrayImage) -> bool {
    let spectrum = shifted_magnitude(&Plane::from_gray(gray));
    let (w, h) = (spectrum.width(), spectrum.height());
    let (ch, cw) = (h / 2, w / 2);
    let rows = ch.saturating_sub(TEXTILE_DC_HALF_WINDOW)..(ch + TEXTILE_DC_HALF_WINDOW).min(h);
    let cols = cw.saturating_sub(TEXTILE_DC_HALF_WINDOW)..(cw + TEXTILE_DC_HALF_WINDOW).min(w);

    let outside: Vec<f64> = (0..h)
        .flat_map(|y| (0..w).map(move |x| (x, y)))
        .filter(|(x, y)| !(rows.contains(y) && cols.contains(x)))
        .map(|(x, y)| spectrum.get(x, y))
        .collect();
    if outside.is_empty() {
        return false;
    }
    mean(outside) > mean(spectrum.data().iter().copied()) * 1.2
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectTypeClassifier;

impl ObjectTypeClassifier {
    /// Classify, reusing already extracted shape features when present.
    #[must_use]
    pub fn classify_with(&self, image: &RgbImage, geometric: Option<&GeometricFeatures>) -> Prediction<ObjectType> {
        Prediction::from_scores(&ObjectCues::measure(image, geometric).scores())
    }
}

impl FeatureExtractor for ObjectTypeClassifier {
    type Output = Prediction<ObjectType>;

    fn kind(&self) -> FeatureKind {
        FeatureKind::ObjectType
    }

    fn extract(&self, image: &RgbImage) -> Prediction<ObjectType> {
        self.classify_with(image, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn test_small_square_scores() {
        let cues = ObjectCues {
            aspect_ratio: 1.0,
            compactness: 0.8,
            area: 64.0 * 64.0,
            ..Default::default()
        };
        let s = cues.scores();
        assert!((s[0] - 0.6).abs() < 1e-6); // mask
        assert!((s[1] - 0.6).abs() < 1e-6); // pottery
        assert!((s[2] - 0.7).abs() < 1e-6); // jewelry
        assert!((s[5] - 0.1).abs() < 1e-6); // utility
        let p = Prediction::<ObjectType>::from_scores(&s);
        assert_eq!(p.label, ObjectType::Jewelry);
    }

    #[test]
    fn test_wide_patterned_is_textile() {
        let cues = ObjectCues {
            aspect_ratio: 3.0,
            compactness: 0.3,
            area: 2_000_000.0,
            periodic_pattern: true,
            ..Default::default()
        };
        let s = cues.scores();
        assert!((s[3] - 1.0).abs() < 1e-6);
        assert!((s[5] - 0.1).abs() < 1e-6);
        assert_eq!(Prediction::<ObjectType>::from_scores(&s).label, ObjectType::Textile);
    }

    #[test]
    fn test_reuses_geometric_shape() {
        let img = RgbImage::from_pixel(40, 20, Rgb([10, 10, 10]));
        let geometric = GeometricFeatures {
            edge_density: 0.0,
            vertex_count: 0,
            aspect_ratio: 0.5,
            compactness: 0.95,
            symmetry: 1.0,
            curvature: 0.0,
            complexity: 0.0,
            edge_count: 0,
            contour_count: 0,
            vector: craftx_core::Vector::zeros(7),
        };
        let cues = ObjectCues::measure(&img, Some(&geometric));
        assert_eq!(cues.aspect_ratio, 0.5);
        assert!((cues.compactness - 0.95).abs() < 1e-6);

        let recomputed = ObjectCues::measure(&img, None);
        assert_eq!(recomputed.aspect_ratio, 2.0);
        assert_eq!(recomputed.compactness, 0.0);
        assert!(!recomputed.face_like);
        assert!(!recomputed.shaded);
    }

    #[test]
    fn test_shape_helpers() {
        let hollow = GrayImage::from_fn(40, 40, |x, y| {
            Luma([if (10..30).contains(&x) && (10..30).contains(&y) { 20 } else { 200 }])
        });
        assert!(has_darker_center(&hollow));

        let eyes = GrayImage::from_fn(40, 40, |x, y| {
            let left = (8..16).contains(&x) && (10..18).contains(&y);
            let right = (24..32).contains(&x) && (10..18).contains(&y);
            Luma([if left || right { 230 } else { 30 }])
        });
        assert!(has_separate_regions(&eyes));
        assert!(!has_separate_regions(&GrayImage::from_pixel(10, 10, Luma([5]))));
    }
}
