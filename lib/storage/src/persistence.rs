//! Durable copies of the candidate index and the relationship graph.
//!
//! Both files are replaced atomically: the new contents go to a temporary
//! file in the same directory which is then renamed over the old one, so a
//! reader sees either the previous or the new version, never a mix.

use anyhow::{anyhow, bail, Result};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use chrono::{DateTime, Utc};
use craftx_core::{GraphSnapshot, ProductId, RelationshipGraph};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

const INDEX_FORMAT_VERSION: u32 = 1;
const GRAPH_FORMAT_VERSION: u32 = 1;

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    AtomicFile::new(path, OverwriteBehavior::AllowOverwrite)
        .write(|f| f.write_all(data))
        .map_err(|e| anyhow!("writing {}: {}", path.display(), e))
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexFileData {
    version: u32,
    /// Milliseconds since the Unix epoch.
    saved_at: i64,
    dim: usize,
    ids: Vec<ProductId>,
    vectors: Vec<Vec<f32>>,
}

/// `index.bin`: product ids and their stored embeddings, bincode encoded.
pub struct IndexFile {
    path: PathBuf,
}

impl IndexFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write every entry, in order, replacing the previous file.
    pub fn save<'a, I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a ProductId, &'a [f32])>,
    {
        let mut ids = Vec::new();
        let mut vectors = Vec::new();
        for (id, vector) in entries {
            ids.push(id.clone());
            vectors.push(vector.to_vec());
        }
        let dim = vectors.first().map_or(0, Vec::len);
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            bail!("index entries disagree on dimension: {} vs {}", dim, bad.len());
        }

        let data = IndexFileData {
            version: INDEX_FORMAT_VERSION,
            saved_at: Utc::now().timestamp_millis(),
            dim,
            ids,
            vectors,
        };
        let bytes = bincode::serialize(&data)?;
        write_atomic(&self.path, &bytes)
    }

    /// Stored entries in insertion order, or `None` when no file exists yet.
    pub fn load(&self) -> Result<Option<Vec<(ProductId, Vec<f32>)>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&self.path)?;
        let data: IndexFileData = bincode::deserialize(&bytes)
            .map_err(|e| anyhow!("corrupt index file {}: {}", self.path.display(), e))?;
        if data.version != INDEX_FORMAT_VERSION {
            bail!("unsupported index file version {}", data.version);
        }
        if data.ids.len() != data.vectors.len() {
            bail!("index file has {} ids but {} vectors", data.ids.len(), data.vectors.len());
        }
        Ok(Some(data.ids.into_iter().zip(data.vectors).collect()))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GraphFileData {
    version: u32,
    saved_at: DateTime<Utc>,
    #[serde(flatten)]
    graph: GraphSnapshot,
}

/// `graph.json`: nodes, edges and the outlet registry.
pub struct GraphFile {
    path: PathBuf,
}

impl GraphFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, graph: &RelationshipGraph) -> Result<()> {
        let data = GraphFileData {
            version: GRAPH_FORMAT_VERSION,
            saved_at: Utc::now(),
            graph: graph.snapshot(),
        };
        let bytes = serde_json::to_vec_pretty(&data)?;
        write_atomic(&self.path, &bytes)
    }

    pub fn load(&self) -> Result<Option<RelationshipGraph>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&self.path)?;
        let data: GraphFileData = serde_json::from_slice(&bytes)?;
        if data.version != GRAPH_FORMAT_VERSION {
            bail!("unsupported graph file version {}", data.version);
        }
        let graph = RelationshipGraph::from_snapshot(data.graph)?;
        Ok(Some(graph))
    }
}
