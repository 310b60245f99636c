use crate::index::VectorSlab;
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Dense bitset for visited-node tracking during one graph walk.
struct VisitedSet {
    bits: Vec<u64>,
}

impl VisitedSet {
    #[inline]
    fn new(capacity: usize) -> Self {
        Self {
            bits: vec![0; capacity.div_ceil(64)],
        }
    }

    /// Returns true when `idx` was not visited before.
    #[inline]
    fn insert(&mut self, idx: usize) -> bool {
        let word = idx / 64;
        let mask = 1u64 << (idx % 64);
        if word >= self.bits.len() {
            self.bits.resize(word + 1, 0);
        }
        let fresh = self.bits[word] & mask == 0;
        self.bits[word] |= mask;
        fresh
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HnswParams {
    pub max_connections: usize,
    pub max_layers: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub seed: u64,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            max_connections: 16,
            max_layers: 4,
            ef_construction: 200,
            ef_search: 64,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
struct HnswNode {
    layers: Vec<Vec<usize>>,
}

/// HNSW graph over the slots of a [`VectorSlab`].
///
/// The graph only stores links; vectors stay in the slab owned by the
/// candidate index, and slot `i` of the graph is slot `i` of the slab.
/// Searching borrows the graph immutably so concurrent readers never block
/// each other. Layer assignment draws from a seeded RNG, so the same insert
/// sequence always yields the same graph.
pub struct HnswIndex {
    nodes: Vec<HnswNode>,
    entry_point: Option<usize>,
    top_layer: usize,
    params: HnswParams,
    rng: StdRng,
}

impl HnswIndex {
    pub fn new(params: HnswParams) -> Self {
        Self {
            nodes: Vec::new(),
            entry_point: None,
            top_layer: 0,
            rng: StdRng::seed_from_u64(params.seed),
            params: HnswParams {
                max_connections: params.max_connections.max(2),
                max_layers: params.max_layers.max(1),
                ef_construction: params.ef_construction.max(1),
                ef_search: params.ef_search.max(1),
                seed: params.seed,
            },
        }
    }

    /// Exponential decay: each extra layer with probability 1/2.
    #[inline]
    fn select_layer(&mut self) -> usize {
        let mut layer = 0;
        while layer < self.params.max_layers - 1 && self.rng.random::<f32>() < 0.5 {
            layer += 1;
        }
        layer
    }

    #[inline]
    fn layer_capacity(&self, layer: usize) -> usize {
        if layer == 0 {
            self.params.max_connections * 2
        } else {
            self.params.max_connections
        }
    }

    #[inline(always)]
    fn distance(query: &[f32], slab: &VectorSlab, slot: usize) -> f32 {
        crate::simd::squared_l2_simd(query, slab.get(slot))
    }

    /// Best-first search restricted to one layer. Returns up to `ef` slots
    /// sorted by distance, ties by slot.
    fn search_layer(
        &self,
        query: &[f32],
        slab: &VectorSlab,
        entry_point: usize,
        ef: usize,
        layer: usize,
    ) -> Vec<(usize, f32)> {
        let mut visited = VisitedSet::new(self.nodes.len());
        let mut candidates: BinaryHeap<Reverse<(OrderedFloat<f32>, usize)>> =
            BinaryHeap::with_capacity(ef * 2);
        let mut results: BinaryHeap<(OrderedFloat<f32>, usize)> = BinaryHeap::with_capacity(ef + 1);

        let entry_dist = OrderedFloat(Self::distance(query, slab, entry_point));
        visited.insert(entry_point);
        candidates.push(Reverse((entry_dist, entry_point)));
        results.push((entry_dist, entry_point));

        while let Some(Reverse((current_dist, current))) = candidates.pop() {
            let worst = results.peek().map(|(d, _)| *d).unwrap_or(current_dist);
            if results.len() >= ef && current_dist > worst {
                break;
            }

            let Some(neighbors) = self.nodes[current].layers.get(layer) else {
                continue;
            };

            for &neighbor in neighbors {
                if !visited.insert(neighbor) {
                    continue;
                }
                let dist = OrderedFloat(Self::distance(query, slab, neighbor));
                let worst = results.peek().map(|(d, _)| *d).unwrap_or(dist);
                if results.len() < ef || dist < worst {
                    candidates.push(Reverse((dist, neighbor)));
                    results.push((dist, neighbor));
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut found: Vec<(usize, f32)> = results.into_iter().map(|(d, idx)| (idx, d.0)).collect();
        found.sort_unstable_by(|a, b| OrderedFloat(a.1).cmp(&OrderedFloat(b.1)).then(a.0.cmp(&b.0)));
        found
    }

    /// Descend greedily from the top layer down to `stop_layer + 1`.
    fn descend(&self, query: &[f32], slab: &VectorSlab, stop_layer: usize) -> Option<usize> {
        let mut current = self.entry_point?;
        let mut layer = self.top_layer;
        while layer > stop_layer {
            if let Some((best, _)) = self.search_layer(query, slab, current, 1, layer).first() {
                current = *best;
            }
            layer -= 1;
        }
        Some(current)
    }

    /// Link the vector at `slot` into the graph. Slots must be inserted in
    /// order, i.e. `slot == self.len()`.
    pub fn insert(&mut self, slot: usize, slab: &VectorSlab) {
        debug_assert_eq!(slot, self.nodes.len());
        let level = self.select_layer();
        let query = slab.get(slot).to_vec();

        let Some(mut entry) = self.descend(&query, slab, level) else {
            self.nodes.push(HnswNode {
                layers: vec![Vec::new(); level + 1],
            });
            self.entry_point = Some(slot);
            self.top_layer = level;
            return;
        };

        let mut node = HnswNode {
            layers: vec![Vec::new(); level + 1],
        };
        for layer in (0..=level.min(self.top_layer)).rev() {
            let candidates = self.search_layer(&query, slab, entry, self.params.ef_construction, layer);
            if let Some((closest, _)) = candidates.first() {
                entry = *closest;
            }
            node.layers[layer] = candidates
                .iter()
                .take(self.params.max_connections)
                .map(|(idx, _)| *idx)
                .collect();
        }

        self.nodes.push(node);

        for layer in 0..=level.min(self.top_layer) {
            let neighbors = self.nodes[slot].layers[layer].clone();
            for neighbor in neighbors {
                self.nodes[neighbor].layers[layer].push(slot);
                if self.nodes[neighbor].layers[layer].len() > self.layer_capacity(layer) {
                    self.prune(neighbor, layer, slab);
                }
            }
        }

        if level > self.top_layer {
            self.top_layer = level;
            self.entry_point = Some(slot);
        }
    }

    /// Keep only the closest links of `node` on `layer`.
    fn prune(&mut self, node: usize, layer: usize, slab: &VectorSlab) {
        let base = slab.get(node);
        let mut links: Vec<(usize, f32)> = self.nodes[node].layers[layer]
            .iter()
            .map(|&other| (other, Self::distance(base, slab, other)))
            .collect();
        links.sort_unstable_by(|a, b| OrderedFloat(a.1).cmp(&OrderedFloat(b.1)).then(a.0.cmp(&b.0)));
        links.truncate(self.layer_capacity(layer));
        self.nodes[node].layers[layer] = links.into_iter().map(|(idx, _)| idx).collect();
    }

    /// Approximate `k` nearest slots by squared L2 distance.
    pub fn search(&self, query: &[f32], k: usize, slab: &VectorSlab) -> Vec<(usize, f32)> {
        if k == 0 {
            return Vec::new();
        }
        let Some(entry) = self.descend(query, slab, 0) else {
            return Vec::new();
        };
        let ef = self.params.ef_search.max(k);
        let mut results = self.search_layer(query, slab, entry, ef, 0);
        results.truncate(k);
        results
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
