//! # CraftX Core
//!
//! Core data structures for CraftX visual product search.
//!
//! - [`FeatureBundle`] - every descriptor extracted from one product image
//! - [`CandidateIndex`] - nearest-neighbor index over embeddings (exact or HNSW)
//! - [`RelationshipGraph`] - product relationships and outlet registry
//!
//! ## Example
//!
//! ```rust
//! use craftx_core::{CandidateIndex, IndexConfig, ProductId, Vector};
//!
//! let mut index = CandidateIndex::new(IndexConfig::default());
//! index.insert(ProductId::from("mask-01"), Vector::new(vec![1.0, 0.0, 0.0])).unwrap();
//! index.insert(ProductId::from("pot-07"), Vector::new(vec![0.0, 1.0, 0.0])).unwrap();
//!
//! let hits = index.search(&Vector::new(vec![0.9, 0.1, 0.0]), 1);
//! assert_eq!(hits[0].id.as_str(), "mask-01");
//! ```

pub mod bundle;
pub mod error;
pub mod graph;
pub mod hnsw;
pub mod index;
pub mod product;
pub mod vector;

/// Vector kernels: AVX2/FMA on x86_64, unrolled scalar code elsewhere.
pub mod simd;

pub use bundle::{
    ColorFeatures, FeatureBundle, FeatureKind, FeatureMetric, GeometricFeatures, Label, Material,
    ObjectType, PatternFeatures, Prediction, TextureFeatures,
};
pub use error::{Error, Result};
pub use graph::{
    GraphConfig, GraphSnapshot, GraphStats, NodeAttributes, Outlet, RelatedProduct,
    RelationshipGraph, RelationshipKind,
};
pub use hnsw::{HnswIndex, HnswParams};
pub use index::{Candidate, CandidateIndex, IndexConfig, IndexKind};
pub use product::{Product, ProductId, ProductMetadata};
pub use vector::Vector;
