//! Color descriptor: HSV histograms, dominant palette and global statistics.

use crate::extractor::FeatureExtractor;
use crate::imaging::{gray_values, mean, sobel, std_dev, to_hsv};
use crate::kmeans::{kmeans, KMeansParams, Sample};
use craftx_core::{ColorFeatures, FeatureKind, Vector};
use image::{GrayImage, RgbImage};
use std::collections::HashMap;

pub const HISTOGRAM_BINS: usize = 32;
pub const DOMINANT_COLORS: usize = 5;
/// Pixels fed to k-means at most; larger images are subsampled by stride.
pub const MAX_CLUSTER_SAMPLES: usize = 10_000;

/// 3 x 32 histogram bins + 5 x RGB + 5 statistics.
pub const COLOR_DIM: usize = 3 * HISTOGRAM_BINS + 3 * DOMINANT_COLORS + 5;

#[derive(Debug, Clone)]
pub struct ColorExtractor {
    bins: usize,
    palette: KMeansParams,
}

impl Default for ColorExtractor {
    fn default() -> Self {
        Self {
            bins: HISTOGRAM_BINS,
            palette: KMeansParams {
                k: DOMINANT_COLORS,
                ..Default::default()
            },
        }
    }
}

impl FeatureExtractor for ColorExtractor {
    type Output = ColorFeatures;

    fn kind(&self) -> FeatureKind {
        FeatureKind::Color
    }

    fn extract(&self, image: &RgbImage) -> ColorFeatures {
        let hsv = to_hsv(image);

        let hue_histogram = histogram(&hsv.hue, self.bins, 180.0);
        let saturation_histogram = histogram(&hsv.saturation, self.bins, 256.0);
        let value_histogram = histogram(&hsv.value, self.bins, 256.0);
        let dominant_colors = self.dominant_colors(image);

        let brightness = mean(gray_values(&hsv.value)) / 255.0;
        let saturation = mean(gray_values(&hsv.saturation)) / 255.0;
        let contrast = std_dev(gray_values(&hsv.value)) / 255.0;

        let spread = (std_dev(gray_values(&hsv.hue)) / 180.0
            + std_dev(gray_values(&hsv.saturation)) / 255.0
            + std_dev(gray_values(&hsv.value)) / 255.0)
            / 3.0;
        let uniformity = 1.0 - spread.min(1.0);

        let mixed_gradient = |plane: &GrayImage| mean(sobel(plane, 1, 1).data().iter().map(|v| v.abs()));
        let transitions = ((mixed_gradient(&hsv.hue) / 180.0
            + mixed_gradient(&hsv.saturation) / 255.0
            + mixed_gradient(&hsv.value) / 255.0)
            / 3.0)
            .min(1.0);

        let mut raw = Vec::with_capacity(COLOR_DIM);
        for hist in [&hue_histogram, &saturation_histogram, &value_histogram] {
            let total = hist.iter().sum::<f32>().max(1.0);
            raw.extend(hist.iter().map(|c| c / total));
        }
        for color in &dominant_colors {
            raw.extend(color.iter().map(|&c| f32::from(c) / 255.0));
        }
        raw.extend(
            [brightness, saturation, contrast, uniformity, transitions]
                .iter()
                .map(|&v| v as f32),
        );

        ColorFeatures {
            hue_histogram,
            saturation_histogram,
            value_histogram,
            dominant_colors,
            brightness: brightness as f32,
            saturation: saturation as f32,
            contrast: contrast as f32,
            uniformity: uniformity as f32,
            transitions: transitions as f32,
            vector: Vector::unit(raw),
        }
    }
}

impl ColorExtractor {
    /// Exactly [`DOMINANT_COLORS`] entries, largest cluster first. Missing
    /// entries (tiny images) are black.
    fn dominant_colors(&self, image: &RgbImage) -> Vec<[u8; 3]> {
        let pixels: Vec<[u8; 3]> = image.pixels().map(|p| p.0).collect();
        let sampled: Vec<[u8; 3]> = if pixels.len() > MAX_CLUSTER_SAMPLES {
            (0..MAX_CLUSTER_SAMPLES)
                .map(|i| pixels[i * pixels.len() / MAX_CLUSTER_SAMPLES])
                .collect()
        } else {
            pixels
        };

        let samples: Vec<Sample> = sampled.iter().map(|p| p.map(f64::from)).collect();
        let mut palette: Vec<[u8; 3]> = match kmeans(&samples, &self.palette) {
            Some(clustering) => clustering
                .centers_by_size()
                .into_iter()
                .map(|c| c.map(|v| v.clamp(0.0, 255.0) as u8))
                .collect(),
            None => quantized_palette(&sampled, self.palette.k),
        };
        palette.resize(self.palette.k, [0, 0, 0]);
        palette
    }
}

/// Most frequent colors after snapping each channel to a multiple of 64.
fn quantized_palette(pixels: &[[u8; 3]], k: usize) -> Vec<[u8; 3]> {
    let mut counts: HashMap<[u8; 3], usize> = HashMap::new();
    for p in pixels {
        *counts.entry(p.map(|c| (c / 64) * 64)).or_insert(0) += 1;
    }
    let mut ranked: Vec<([u8; 3], usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.into_iter().take(k).map(|(c, _)| c).collect()
}

/// Raw counts over `bins` equal-width bins of `[0, upper)`.
fn histogram(plane: &GrayImage, bins: usize, upper: f64) -> Vec<f32> {
    let mut hist = vec![0f32; bins];
    for &v in plane.as_raw() {
        let bin = (f64::from(v) * bins as f64 / upper) as usize;
        if bin < bins {
            hist[bin] += 1.0;
        }
    }
    hist
}
