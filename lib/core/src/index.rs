//! Candidate index over product embeddings.
//!
//! Stage one of retrieval: given a query embedding, return the `k` closest
//! products by squared Euclidean distance over unit vectors
//! (`|a - b|^2 = 2 (1 - cos)`). Small catalogs are scanned exactly in
//! parallel; with `IndexKind::Hnsw` an HNSW graph takes over once the catalog
//! reaches `hnsw_threshold` entries.

use crate::error::{Error, Result};
use crate::hnsw::{HnswIndex, HnswParams};
use crate::product::ProductId;
use crate::vector::Vector;
use ahash::AHashMap;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Contiguous row-major vector storage.
#[derive(Debug, Clone, Default)]
pub struct VectorSlab {
    dim: usize,
    data: Vec<f32>,
}

impl VectorSlab {
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            data: Vec::new(),
        }
    }

    #[inline(always)]
    #[must_use]
    pub fn get(&self, slot: usize) -> &[f32] {
        let start = slot * self.dim;
        &self.data[start..start + self.dim]
    }

    #[inline]
    pub fn push(&mut self, vector: &[f32]) {
        debug_assert_eq!(vector.len(), self.dim);
        self.data.extend_from_slice(vector);
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Exact parallel scan.
    #[default]
    Flat,
    /// HNSW graph above `hnsw_threshold` entries, exact scan below.
    Hnsw,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub kind: IndexKind,
    pub max_connections: usize,
    pub max_layers: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub hnsw_threshold: usize,
    pub seed: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        let hnsw = HnswParams::default();
        Self {
            kind: IndexKind::Flat,
            max_connections: hnsw.max_connections,
            max_layers: hnsw.max_layers,
            ef_construction: hnsw.ef_construction,
            ef_search: hnsw.ef_search,
            hnsw_threshold: 1000,
            seed: hnsw.seed,
        }
    }
}

impl IndexConfig {
    fn hnsw_params(&self) -> HnswParams {
        HnswParams {
            max_connections: self.max_connections,
            max_layers: self.max_layers,
            ef_construction: self.ef_construction,
            ef_search: self.ef_search,
            seed: self.seed,
        }
    }
}

/// One search hit: product id and squared L2 distance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: ProductId,
    pub distance: f32,
}

impl Candidate {
    /// Cosine similarity recovered from the distance between unit vectors.
    #[inline]
    #[must_use]
    pub fn cosine(&self) -> f32 {
        (1.0 - self.distance / 2.0).clamp(-1.0, 1.0)
    }
}

pub struct CandidateIndex {
    config: IndexConfig,
    ids: Vec<ProductId>,
    slab: VectorSlab,
    slots: AHashMap<ProductId, usize>,
    hnsw: Option<HnswIndex>,
}

impl CandidateIndex {
    #[must_use]
    pub fn new(config: IndexConfig) -> Self {
        let hnsw = match config.kind {
            IndexKind::Hnsw => Some(HnswIndex::new(config.hnsw_params())),
            IndexKind::Flat => None,
        };
        Self {
            config,
            ids: Vec::new(),
            slab: VectorSlab::default(),
            slots: AHashMap::new(),
            hnsw,
        }
    }

    /// Rebuild an index from persisted entries, in their stored order.
    pub fn from_entries<I>(config: IndexConfig, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (ProductId, Vec<f32>)>,
    {
        let mut index = Self::new(config);
        for (id, vector) in entries {
            index.insert(id, Vector::new(vector))?;
        }
        Ok(index)
    }

    /// Check that `id` and `vector` could be inserted, and return the vector
    /// as it would be stored. Does not mutate the index.
    pub fn prepare(&self, id: &ProductId, vector: &Vector) -> Result<Vector> {
        if self.slots.contains_key(id) {
            return Err(Error::ProductExists(id.to_string()));
        }
        if vector.is_empty() || (self.slab.dim != 0 && vector.dim() != self.slab.dim) {
            return Err(Error::InvalidDimension {
                expected: self.slab.dim,
                actual: vector.dim(),
            });
        }
        Ok(vector.normalized())
    }

    /// Add one entry. The vector is re-normalized before it is stored; the
    /// first insert fixes the index dimension.
    pub fn insert(&mut self, id: ProductId, vector: Vector) -> Result<()> {
        let stored = self.prepare(&id, &vector)?;
        if self.slab.dim == 0 {
            self.slab = VectorSlab::new(stored.dim());
        }

        let slot = self.ids.len();
        self.slab.push(stored.as_slice());
        self.slots.insert(id.clone(), slot);
        self.ids.push(id);

        if let Some(hnsw) = self.hnsw.as_mut() {
            hnsw.insert(slot, &self.slab);
        }
        Ok(())
    }

    /// Up to `k` nearest products, closest first, ties broken by id.
    /// Returns every entry when `k` exceeds the index size.
    pub fn search(&self, query: &Vector, k: usize) -> Vec<Candidate> {
        if self.ids.is_empty() || k == 0 || query.dim() != self.slab.dim {
            return Vec::new();
        }
        let query = query.normalized();

        let use_graph = k < self.ids.len() && self.ids.len() >= self.config.hnsw_threshold;
        let mut hits: Vec<(usize, f32)> = match self.hnsw.as_ref() {
            Some(hnsw) if use_graph => hnsw.search(query.as_slice(), k, &self.slab),
            _ => self.scan(query.as_slice(), k),
        };

        hits.sort_unstable_by(|a, b| self.order(a, b));
        hits.into_iter()
            .map(|(slot, distance)| Candidate {
                id: self.ids[slot].clone(),
                distance,
            })
            .collect()
    }

    fn scan(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut all: Vec<(usize, f32)> = (0..self.ids.len())
            .into_par_iter()
            .map(|slot| (slot, crate::simd::squared_l2_simd(query, self.slab.get(slot))))
            .collect();

        if k < all.len() {
            all.select_nth_unstable_by(k - 1, |a, b| self.order(a, b));
            all.truncate(k);
        }
        all
    }

    #[inline]
    fn order(&self, a: &(usize, f32), b: &(usize, f32)) -> Ordering {
        OrderedFloat(a.1)
            .cmp(&OrderedFloat(b.1))
            .then_with(|| self.ids[a.0].cmp(&self.ids[b.0]))
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, id: &ProductId) -> bool {
        self.slots.contains_key(id)
    }

    /// Stored (normalized) vector of one product.
    #[must_use]
    pub fn get(&self, id: &ProductId) -> Option<&[f32]> {
        self.slots.get(id).map(|&slot| self.slab.get(slot))
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&ProductId, &[f32])> + '_ {
        self.ids
            .iter()
            .enumerate()
            .map(move |(slot, id)| (id, self.slab.get(slot)))
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Vector dimension, 0 until the first insert.
    #[inline]
    #[must_use]
    pub fn dim(&self) -> usize {
        self.slab.dim
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(kind: IndexKind, threshold: usize, n: usize) -> CandidateIndex {
        let config = IndexConfig {
            kind,
            hnsw_threshold: threshold,
            ..Default::default()
        };
        let mut index = CandidateIndex::new(config);
        for i in 0..n {
            let angle = i as f32 * 0.01;
            index
                .insert(
                    ProductId::new(format!("p{:03}", i)),
                    Vector::new(vec![angle.cos(), angle.sin(), 0.5]),
                )
                .unwrap();
        }
        index
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        let index = CandidateIndex::new(IndexConfig::default());
        assert!(index.search(&Vector::new(vec![1.0, 0.0]), 5).is_empty());
    }

    #[test]
    fn test_k_larger_than_index_returns_all() {
        let index = index_with(IndexKind::Flat, 1000, 4);
        let hits = index.search(&Vector::new(vec![1.0, 0.0, 0.5]), 10);
        assert_eq!(hits.len(), 4);
        assert_eq!(hits[0].id.as_str(), "p000");
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_vectors_are_renormalized() {
        let index = index_with(IndexKind::Flat, 1000, 2);
        let stored = index.get(&ProductId::from("p001")).unwrap();
        let norm: f32 = stored.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_distance_is_squared_l2_of_unit_vectors() {
        let mut index = CandidateIndex::new(IndexConfig::default());
        index.insert("a".into(), Vector::new(vec![1.0, 0.0])).unwrap();
        index.insert("b".into(), Vector::new(vec![0.0, 2.0])).unwrap();
        let hits = index.search(&Vector::new(vec![3.0, 0.0]), 2);
        assert!(hits[0].distance.abs() < 1e-6);
        assert!((hits[1].distance - 2.0).abs() < 1e-5);
        assert!(hits[1].cosine().abs() < 1e-5);
    }

    #[test]
    fn test_ties_broken_by_id() {
        let mut index = CandidateIndex::new(IndexConfig::default());
        index.insert("b".into(), Vector::new(vec![1.0, 0.0])).unwrap();
        index.insert("a".into(), Vector::new(vec![1.0, 0.0])).unwrap();
        let hits = index.search(&Vector::new(vec![1.0, 0.0]), 2);
        assert_eq!(hits[0].id.as_str(), "a");
        assert_eq!(hits[1].id.as_str(), "b");
    }

    #[test]
    fn test_duplicate_and_dimension_errors() {
        let mut index = index_with(IndexKind::Flat, 1000, 2);
        assert!(matches!(
            index.insert("p000".into(), Vector::new(vec![1.0, 0.0, 0.0])),
            Err(Error::ProductExists(_))
        ));
        assert!(matches!(
            index.insert("new".into(), Vector::new(vec![1.0, 0.0])),
            Err(Error::InvalidDimension { expected: 3, actual: 2 })
        ));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_hnsw_agrees_with_flat_on_nearest() {
        let flat = index_with(IndexKind::Flat, 1000, 200);
        let graph = index_with(IndexKind::Hnsw, 50, 200);
        let query = Vector::new(vec![0.8f32.cos(), 0.8f32.sin(), 0.5]);
        let exact = flat.search(&query, 5);
        let approx = graph.search(&query, 5);
        assert_eq!(approx.len(), 5);
        assert_eq!(exact[0].id, approx[0].id);
    }

    #[test]
    fn test_rebuild_from_entries() {
        let index = index_with(IndexKind::Flat, 1000, 5);
        let entries: Vec<(ProductId, Vec<f32>)> = index
            .entries()
            .map(|(id, v)| (id.clone(), v.to_vec()))
            .collect();
        let rebuilt = CandidateIndex::from_entries(IndexConfig::default(), entries).unwrap();
        assert_eq!(rebuilt.len(), 5);
        let q = Vector::new(vec![1.0, 0.0, 0.5]);
        assert_eq!(index.search(&q, 3), rebuilt.search(&q, 3));
    }
}
