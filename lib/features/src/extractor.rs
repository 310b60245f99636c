//! Extractor trait and the pipeline that runs every extractor on one image.

use crate::color::ColorExtractor;
use crate::encoder::ImageEncoder;
use crate::geometric::GeometricExtractor;
use crate::material::MaterialClassifier;
use crate::normalizer::ImageNormalizer;
use crate::object_type::ObjectTypeClassifier;
use crate::pattern::PatternExtractor;
use crate::texture::TextureExtractor;
use craftx_core::{Error, FeatureBundle, FeatureKind, Result, Vector};
use image::RgbImage;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// A pure function from a normalized image to one descriptor.
pub trait FeatureExtractor: Send + Sync {
    type Output: Send;

    fn kind(&self) -> FeatureKind;

    fn extract(&self, image: &RgbImage) -> Self::Output;
}

/// Normalizer, the six extractors and the embedding encoder.
///
/// Extractors are independent (object type only reuses the shape
/// measurements), so they run on the rayon pool.
pub struct FeaturePipeline {
    normalizer: ImageNormalizer,
    geometric: GeometricExtractor,
    color: ColorExtractor,
    texture: TextureExtractor,
    pattern: PatternExtractor,
    material: MaterialClassifier,
    object_type: ObjectTypeClassifier,
    encoder: Arc<dyn ImageEncoder>,
}

impl FeaturePipeline {
    #[must_use]
    pub fn new(normalizer: ImageNormalizer, encoder: Arc<dyn ImageEncoder>) -> Self {
        Self {
            normalizer,
            geometric: GeometricExtractor,
            color: ColorExtractor::default(),
            texture: TextureExtractor,
            pattern: PatternExtractor::default(),
            material: MaterialClassifier,
            object_type: ObjectTypeClassifier,
            encoder,
        }
    }

    #[must_use]
    pub fn normalizer(&self) -> &ImageNormalizer {
        &self.normalizer
    }

    #[must_use]
    pub fn encoder(&self) -> &Arc<dyn ImageEncoder> {
        &self.encoder
    }

    /// Decode and normalize raw upload bytes.
    pub fn normalize(&self, bytes: &[u8]) -> Result<RgbImage> {
        self.normalizer.normalize(bytes)
    }

    /// Embedding only, checked against the encoder's declared dimension.
    pub fn embed(&self, image: &RgbImage) -> Result<Vector> {
        let embedding = self.encoder.encode(image)?;
        if embedding.dim() != self.encoder.dim() {
            return Err(Error::InvalidDimension {
                expected: self.encoder.dim(),
                actual: embedding.dim(),
            });
        }
        Ok(embedding)
    }

    /// Run every extractor and the encoder on a normalized image.
    pub fn extract_all(&self, image: &RgbImage) -> Result<FeatureBundle> {
        let start = Instant::now();

        let ((geometric, object_type), (color, (texture, (pattern, (material, embedding))))) = rayon::join(
            || {
                let geometric = self.geometric.extract(image);
                let object_type = self.object_type.classify_with(image, Some(&geometric));
                (geometric, object_type)
            },
            || {
                rayon::join(
                    || self.color.extract(image),
                    || {
                        rayon::join(
                            || self.texture.extract(image),
                            || {
                                rayon::join(
                                    || self.pattern.extract(image),
                                    || rayon::join(|| self.material.extract(image), || self.embed(image)),
                                )
                            },
                        )
                    },
                )
            },
        );

        let bundle = FeatureBundle {
            geometric: Some(geometric),
            color: Some(color),
            texture: Some(texture),
            pattern: Some(pattern),
            material: Some(material),
            object_type: Some(object_type),
            embedding: Some(embedding?),
        };
        debug!(
            "Extracted features from {}x{} image in {:?}",
            image.width(),
            image.height(),
            start.elapsed()
        );
        Ok(bundle)
    }

    /// Normalize raw bytes, then extract everything.
    pub fn extract_bytes(&self, bytes: &[u8]) -> Result<FeatureBundle> {
        let image = self.normalize(bytes)?;
        self.extract_all(&image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::COLOR_DIM;
    use crate::encoder::ThumbnailEncoder;
    use crate::pattern::PATTERN_DIM;
    use crate::texture::TEXTURE_DIM;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn pipeline() -> FeaturePipeline {
        FeaturePipeline::new(ImageNormalizer::new(64), Arc::new(ThumbnailEncoder::new(4)))
    }

    fn sample() -> RgbImage {
        RgbImage::from_fn(64, 64, |x, y| {
            if (16..48).contains(&x) && (16..48).contains(&y) {
                Rgb([180, 120, 60])
            } else {
                Rgb([20, 20, 20])
            }
        })
    }

    #[test]
    fn test_bundle_is_complete() {
        let bundle = pipeline().extract_all(&sample()).unwrap();
        for kind in FeatureKind::ALL {
            assert!(bundle.has(kind), "missing {kind}");
        }
        assert_eq!(bundle.vector(FeatureKind::Geometric).unwrap().dim(), 7);
        assert_eq!(bundle.vector(FeatureKind::Color).unwrap().dim(), COLOR_DIM);
        assert_eq!(bundle.vector(FeatureKind::Texture).unwrap().dim(), TEXTURE_DIM);
        assert_eq!(bundle.vector(FeatureKind::Pattern).unwrap().dim(), PATTERN_DIM);
        assert_eq!(bundle.embedding.as_ref().unwrap().dim(), 48);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let p = pipeline();
        let a = p.extract_all(&sample()).unwrap();
        let b = p.extract_all(&sample()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_extract_bytes() {
        let mut png = Cursor::new(Vec::new());
        sample().write_to(&mut png, ImageFormat::Png).unwrap();
        let bundle = pipeline().extract_bytes(png.get_ref()).unwrap();
        assert!(bundle.embedding.is_some());
        assert!(matches!(pipeline().extract_bytes(b"nope"), Err(Error::Decode(_))));
    }
}
