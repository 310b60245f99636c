//! # CraftX Features
//!
//! Turns an uploaded product photo into a [`craftx_core::FeatureBundle`].
//!
//! - [`ImageNormalizer`] - decode and rescale to a fixed shorter edge
//! - six extractors: geometric, color, texture, pattern, material, object type
//! - [`ImageEncoder`] - pluggable global embedding ([`ThumbnailEncoder`] built in)
//! - [`FeaturePipeline`] - runs all of the above on the rayon pool
//!
//! All extractors are deterministic: the same pixels always produce the
//! same bundle.

pub mod color;
pub mod contour;
pub mod encoder;
pub mod extractor;
pub mod fft;
pub mod geometric;
pub mod imaging;
pub mod kmeans;
pub mod material;
pub mod normalizer;
pub mod object_type;
pub mod orb;
pub mod pattern;
pub mod texture;

pub use color::ColorExtractor;
pub use encoder::{ImageEncoder, ThumbnailEncoder};
pub use extractor::{FeatureExtractor, FeaturePipeline};
pub use geometric::GeometricExtractor;
pub use material::{MaterialClassifier, MaterialCues};
pub use normalizer::ImageNormalizer;
pub use object_type::{ObjectCues, ObjectTypeClassifier};
pub use pattern::PatternExtractor;
pub use texture::TextureExtractor;
