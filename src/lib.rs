//! # CraftX
//!
//! Visual product similarity search for catalogs of handcrafted goods.
//!
//! A query photo is normalized, described by six visual extractors (shape,
//! color, texture, decorative pattern, inferred material, inferred object
//! type) plus a global embedding, and matched in two stages: a nearest
//! neighbor search over the embeddings returns a wide candidate set, which
//! is then re-ranked by a weighted fusion of per-feature similarities. A
//! relationship graph links products sharing a material or object type and
//! records the outlets that carry them.
//!
//! ## Quick Start
//!
//! ### As a Server
//!
//! ```bash
//! cargo install craftx
//! craftx --data-dir ./catalog --http-port 8000
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use craftx::prelude::*;
//!
//! let config = CatalogConfig::default().with_data_dir("./catalog");
//! let catalog = CatalogService::open_default(config).unwrap();
//!
//! let photo = std::fs::read("mask.jpg").unwrap();
//! catalog
//!     .index_product(&photo, ProductId::from("mask-01"), ProductMetadata::new("Carved mask", ""))
//!     .unwrap();
//!
//! let query = std::fs::read("query.jpg").unwrap();
//! for hit in catalog.search(&query, 5).unwrap().results {
//!     println!("{} {} {:.3}", hit.rank, hit.product_id, hit.score);
//! }
//! ```
//!
//! ## Crate Structure
//!
//! - [`craftx-core`](https://docs.rs/craftx-core) - Feature bundles, candidate index, relationship graph
//! - [`craftx-features`](https://docs.rs/craftx-features) - Image normalization and the visual extractors
//! - [`craftx-similarity`](https://docs.rs/craftx-similarity) - Per-feature similarity, fusion and re-ranking
//! - [`craftx-storage`](https://docs.rs/craftx-storage) - LMDB feature store, durable files, catalog service
//! - [`craftx-api`](https://docs.rs/craftx-api) - REST API

// Re-export core types
pub use craftx_core::{
    CandidateIndex, Error, FeatureBundle, FeatureKind, GraphStats, IndexConfig, IndexKind, Material,
    ObjectType, Outlet, Product, ProductId, ProductMetadata, RelatedProduct, RelationshipGraph,
    RelationshipKind, Result, Vector,
};

// Re-export feature extraction
pub use craftx_features::{FeaturePipeline, ImageEncoder, ImageNormalizer, ThumbnailEncoder};

// Re-export scoring
pub use craftx_similarity::{FeatureWeights, Reranker, SimilarityScorer};

// Re-export storage
pub use craftx_storage::{CatalogConfig, CatalogService, SearchHit, SearchResponse};

// Re-export API
pub use craftx_api::RestApi;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        CatalogConfig, CatalogService, Error, FeatureBundle, FeatureKind, FeatureWeights, ImageEncoder,
        Material, ObjectType, Outlet, ProductId, ProductMetadata, RelationshipKind, Result, SearchHit,
        SearchResponse,
    };
}
