//! Rule-based material classifier.

use crate::extractor::FeatureExtractor;
use crate::imaging::{canny, gray_values, laplacian, mean, nonzero_fraction, std_dev, to_gray, to_hsv, variance};
use craftx_core::{FeatureKind, Material, Prediction};
use image::RgbImage;

/// Image statistics the material rules look at. Hue is on the 0..180 scale;
/// saturation and value are raw 0..255 means.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MaterialCues {
    pub mean_hue: f64,
    pub mean_saturation: f64,
    pub mean_value: f64,
    pub gray_variance: f64,
    pub edge_density: f64,
    pub value_std: f64,
    pub laplacian_variance: f64,
}

impl MaterialCues {
    #[must_use]
    pub fn measure(image: &RgbImage) -> Self {
        let hsv = to_hsv(image);
        let gray = to_gray(image);
        Self {
            mean_hue: mean(gray_values(&hsv.hue)),
            mean_saturation: mean(gray_values(&hsv.saturation)),
            mean_value: mean(gray_values(&hsv.value)),
            gray_variance: variance(gray_values(&gray)),
            edge_density: nonzero_fraction(&canny(&gray, 50.0, 150.0)),
            value_std: std_dev(gray_values(&hsv.value)),
            laplacian_variance: variance(laplacian(&gray).data().iter().copied()),
        }
    }

    /// Raw rule scores in [`Material::ALL`] order.
    ///
    /// The saturation thresholds are fractions while the measured saturation
    /// is on the 0..255 scale, so the wood and stone saturation rules only
    /// fire for nearly grey images and the fabric one for any tint. Stored
    /// catalogs depend on this calibration.
    #[must_use]
    pub fn scores(&self) -> [f32; 6] {
        let c = self;
        let mut wood = 0.0;
        if 10.0 < c.mean_hue && c.mean_hue < 30.0 {
            wood += 0.3;
        }
        if 0.3 < c.mean_saturation && c.mean_saturation < 0.7 {
            wood += 0.2;
        }
        if c.gray_variance > 500.0 {
            wood += 0.3;
        }
        if 0.1 < c.edge_density && c.edge_density < 0.3 {
            wood += 0.2;
        }

        let mut clay = 0.0;
        if (15.0 < c.mean_hue && c.mean_hue < 25.0) || (0.0 < c.mean_hue && c.mean_hue < 10.0) {
            clay += 0.3;
        }
        if c.mean_value < 150.0 {
            clay += 0.2;
        }
        if c.gray_variance < 1000.0 {
            clay += 0.3;
        }
        if c.value_std < 30.0 {
            clay += 0.2;
        }

        let mut fabric = 0.0;
        if c.mean_saturation > 0.4 {
            fabric += 0.2;
        }
        if c.gray_variance > 300.0 {
            fabric += 0.3;
        }
        if 0.2 < c.edge_density && c.edge_density < 0.4 {
            fabric += 0.3;
        }
        if c.laplacian_variance > 100.0 {
            fabric += 0.2;
        }

        let mut metal = 0.0;
        if c.mean_value > 180.0 {
            metal += 0.3;
        }
        if c.value_std > 40.0 {
            metal += 0.3;
        }
        if c.edge_density > 0.3 {
            metal += 0.2;
        }
        if 100.0 < c.mean_hue && c.mean_hue < 130.0 {
            metal += 0.2;
        }

        let mut stone = 0.0;
        if 0.0 < c.mean_saturation && c.mean_saturation < 0.3 {
            stone += 0.3;
        }
        if 100.0 < c.mean_value && c.mean_value < 180.0 {
            stone += 0.2;
        }
        if 200.0 < c.gray_variance && c.gray_variance < 800.0 {
            stone += 0.3;
        }
        if c.edge_density < 0.25 {
            stone += 0.2;
        }

        let strongest = [wood, clay, fabric, metal, stone]
            .into_iter()
            .fold(0.0f32, f32::max);
        let mixed = if strongest < 0.5 { 0.5 } else { 0.0 };

        [wood, clay, fabric, metal, stone, mixed]
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MaterialClassifier;

impl MaterialClassifier {
    #[must_use]
    pub fn classify_cues(&self, cues: &MaterialCues) -> Prediction<Material> {
        Prediction::from_scores(&cues.scores())
    }
}

impl FeatureExtractor for MaterialClassifier {
    type Output = Prediction<Material>;

    fn kind(&self) -> FeatureKind {
        FeatureKind::Material
    }

    fn extract(&self, image: &RgbImage) -> Prediction<Material> {
        self.classify_cues(&MaterialCues::measure(image))
    }
}
