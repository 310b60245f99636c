pub mod config;
pub mod lmdb_storage;
pub mod manager;
pub mod persistence;

pub use config::{CatalogConfig, EncoderConfig, NormalizerConfig, RetrievalConfig, StorageConfig};
pub use lmdb_storage::FeatureStore;
pub use manager::{CatalogService, GraphBuild, IndexedProduct, QueryFeatureSummary, SearchHit, SearchResponse};
pub use persistence::{GraphFile, IndexFile};
