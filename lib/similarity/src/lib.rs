//! # CraftX Similarity
//!
//! Second-stage scoring for visual product search.
//!
//! - [`FeatureWeights`] - per-feature fusion weights, normalized to sum to 1
//! - [`SimilarityScorer`] - per-feature similarity and weighted fusion
//! - [`Reranker`] - orders index candidates by fused score
//!
//! Unit vectors (geometric, color, texture, pattern, embedding) compare by
//! cosine mapped onto [0, 1]; the material and object-type distributions
//! compare by Bhattacharyya coefficient.
//!
//! ## Example
//!
//! ```rust
//! use craftx_core::{FeatureBundle, Vector};
//! use craftx_similarity::{FeatureWeights, SimilarityScorer};
//!
//! let scorer = SimilarityScorer::new(FeatureWeights::default()).unwrap();
//! let a = FeatureBundle {
//!     embedding: Some(Vector::unit(vec![1.0, 0.0])),
//!     ..Default::default()
//! };
//! let scores = scorer.score(&a, &a);
//! assert!((scores.final_score - 1.0).abs() < 1e-6);
//! ```

pub mod distance;
pub mod rerank;
pub mod scorer;
pub mod weights;

pub use distance::{bhattacharyya, cosine_similarity01, squared_l2_to_similarity01};
pub use rerank::{RankedResult, RerankCandidate, Reranker};
pub use scorer::{ScoreBreakdown, SimilarityScorer};
pub use weights::{FeatureWeights, WeightsError};
