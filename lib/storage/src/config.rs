//! Catalog configuration.
//!
//! Every field has a default, so an empty JSON object (or no file at all)
//! is a complete configuration. A `weights` object that is present replaces
//! the default weights wholesale: keys it leaves out weigh zero.

use craftx_core::{Error, GraphConfig, IndexConfig, Result};
use craftx_features::normalizer::DEFAULT_TARGET_EDGE;
use craftx_similarity::FeatureWeights;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub data_dir: PathBuf,
    pub normalizer: NormalizerConfig,
    pub retrieval: RetrievalConfig,
    pub weights: FeatureWeights,
    pub index: IndexConfig,
    pub encoder: EncoderConfig,
    pub graph: GraphConfig,
    pub storage: StorageConfig,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            normalizer: NormalizerConfig::default(),
            retrieval: RetrievalConfig::default(),
            weights: FeatureWeights::default(),
            index: IndexConfig::default(),
            encoder: EncoderConfig::default(),
            graph: GraphConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Length of the shorter image edge after rescaling.
    pub target_edge: u32,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            target_edge: DEFAULT_TARGET_EDGE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_top_k: usize,
    /// Candidates fetched from the index per requested result.
    pub oversampling_factor: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            oversampling_factor: 3,
        }
    }
}

impl RetrievalConfig {
    /// First-stage candidate count for `top_k` results, capped at the
    /// number of indexed products.
    #[must_use]
    pub fn candidate_k(&self, top_k: usize, indexed: usize) -> usize {
        top_k
            .max(top_k.saturating_mul(self.oversampling_factor))
            .min(indexed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Side of the thumbnail grid used by the built-in encoder.
    pub grid: u32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self { grid: 8 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub lmdb_map_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            lmdb_map_size: 1024 * 1024 * 1024,
        }
    }
}

impl CatalogConfig {
    /// Read a JSON configuration file. Unspecified fields keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidConfig(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_data_dir<P: Into<PathBuf>>(mut self, data_dir: P) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.normalizer.target_edge == 0 {
            return Err(Error::InvalidConfig("normalizer.target_edge must be positive".into()));
        }
        if self.retrieval.default_top_k == 0 {
            return Err(Error::InvalidConfig("retrieval.default_top_k must be positive".into()));
        }
        if self.retrieval.oversampling_factor == 0 {
            return Err(Error::InvalidConfig(
                "retrieval.oversampling_factor must be at least 1".into(),
            ));
        }
        self.normalized_weights()?;

        let index = &self.index;
        if index.max_connections < 2 || index.max_layers == 0 {
            return Err(Error::InvalidConfig(
                "index.max_connections must be at least 2 and index.max_layers at least 1".into(),
            ));
        }
        if index.ef_construction == 0 || index.ef_search == 0 {
            return Err(Error::InvalidConfig("index ef parameters must be positive".into()));
        }

        if self.encoder.grid == 0 {
            return Err(Error::InvalidConfig("encoder.grid must be positive".into()));
        }
        self.graph.validate()?;
        if self.storage.lmdb_map_size == 0 {
            return Err(Error::InvalidConfig("storage.lmdb_map_size must be positive".into()));
        }
        Ok(())
    }

    /// Fusion weights scaled to sum to 1.
    pub fn normalized_weights(&self) -> Result<FeatureWeights> {
        let mut weights = self.weights;
        weights
            .validate_and_normalize()
            .map_err(|e| Error::InvalidConfig(format!("weights: {}", e)))?;
        Ok(weights)
    }
}
