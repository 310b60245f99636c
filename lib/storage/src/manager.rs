use crate::config::CatalogConfig;
use crate::lmdb_storage::FeatureStore;
use crate::persistence::{GraphFile, IndexFile};
use craftx_core::{
    CandidateIndex, Error, FeatureBundle, FeatureKind, GraphStats, Material, NodeAttributes, ObjectType, Outlet,
    Product, ProductId, ProductMetadata, RelatedProduct, RelationshipGraph, RelationshipKind, Result,
};
use craftx_features::{FeaturePipeline, ImageEncoder, ImageNormalizer, ThumbnailEncoder};
use craftx_similarity::{RankedResult, RerankCandidate, Reranker, SimilarityScorer};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const FEATURES_DIR: &str = "features";
const INDEX_FILE: &str = "index.bin";
const GRAPH_FILE: &str = "graph.json";

/// Ranked search response.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query_id: String,
    pub results: Vec<SearchHit>,
    pub total_matches: usize,
    /// Present when the multi-feature path ran.
    pub query_features: Option<QueryFeatureSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    /// 1-based.
    pub rank: usize,
    pub product_id: ProductId,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub score: f32,
    pub embedding_similarity: f32,
    pub feature_scores: BTreeMap<FeatureKind, f32>,
    pub predicted_material: Option<Material>,
    pub predicted_object_type: Option<ObjectType>,
    /// Scored from the index distance alone.
    pub embedding_only: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryFeatureSummary {
    pub material: Option<Material>,
    pub object_type: Option<ObjectType>,
    pub edge_count: u32,
    pub palette_size: usize,
}

impl QueryFeatureSummary {
    fn from_bundle(bundle: &FeatureBundle) -> Self {
        Self {
            material: bundle.predicted_material(),
            object_type: bundle.predicted_object_type(),
            edge_count: bundle.geometric.as_ref().map_or(0, |g| g.edge_count),
            palette_size: bundle.color.as_ref().map_or(0, |c| c.dominant_colors.len()),
        }
    }
}

/// Result of indexing one product.
#[derive(Debug, Clone, Serialize)]
pub struct IndexedProduct {
    pub product_id: ProductId,
    pub predicted_material: Option<Material>,
    pub predicted_object_type: Option<ObjectType>,
}

/// Outcome of a batch graph rebuild.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct GraphBuild {
    pub relationships_created: usize,
    pub stats: GraphStats,
}

/// Owns the candidate index, feature store and relationship graph of one
/// catalog and runs the two-stage retrieval over them.
///
/// Every mutation writes its durable copy first and touches the in-memory
/// structure only once that write succeeded. Writers of the same structure
/// are serialized through upgradable read guards, so searches keep running
/// while a write is being persisted.
pub struct CatalogService {
    config: CatalogConfig,
    pipeline: FeaturePipeline,
    reranker: Reranker,
    index: RwLock<CandidateIndex>,
    store: FeatureStore,
    graph: RwLock<RelationshipGraph>,
    index_file: IndexFile,
    graph_file: GraphFile,
}

impl CatalogService {
    pub fn open(config: CatalogConfig, encoder: Arc<dyn ImageEncoder>) -> Result<Self> {
        config.validate()?;
        let data_dir = config.data_dir.clone();
        std::fs::create_dir_all(&data_dir)?;

        let store = FeatureStore::open(data_dir.join(FEATURES_DIR), config.storage.lmdb_map_size)
            .map_err(|e| Error::Storage(e.to_string()))?;

        let index_file = IndexFile::new(data_dir.join(INDEX_FILE));
        let entries = index_file
            .load()
            .map_err(|e| Error::Persistence(e.to_string()))?
            .unwrap_or_default();
        let index = CandidateIndex::from_entries(config.index.clone(), entries)?;
        if index.dim() != 0 && index.dim() != encoder.dim() {
            return Err(Error::InvalidDimension {
                expected: index.dim(),
                actual: encoder.dim(),
            });
        }

        let graph_file = GraphFile::new(data_dir.join(GRAPH_FILE));
        let graph = graph_file
            .load()
            .map_err(|e| Error::Persistence(e.to_string()))?
            .unwrap_or_default();

        let stored = store.len().map_err(|e| Error::Storage(e.to_string()))?;
        if stored < index.len() {
            warn!(
                "Feature store holds {} bundles for {} indexed products; missing ones rank by embedding only",
                stored,
                index.len()
            );
        }

        let reranker = Reranker::new(
            SimilarityScorer::new(config.normalized_weights()?).map_err(|e| Error::InvalidConfig(e.to_string()))?,
        );
        let pipeline = FeaturePipeline::new(ImageNormalizer::new(config.normalizer.target_edge), encoder);

        info!(
            "Catalog opened at {:?}: {} indexed products, {} graph nodes, encoder {}",
            data_dir,
            index.len(),
            graph.statistics().total_products,
            pipeline.encoder().name()
        );

        Ok(Self {
            config,
            pipeline,
            reranker,
            index: RwLock::new(index),
            store,
            graph: RwLock::new(graph),
            index_file,
            graph_file,
        })
    }

    /// Open with the built-in thumbnail encoder.
    pub fn open_default(config: CatalogConfig) -> Result<Self> {
        let encoder = Arc::new(ThumbnailEncoder::new(config.encoder.grid));
        Self::open(config, encoder)
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    #[must_use]
    pub fn pipeline(&self) -> &FeaturePipeline {
        &self.pipeline
    }

    /// Number of indexed products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &ProductId) -> bool {
        self.index.read().contains(id)
    }

    pub fn product(&self, id: &ProductId) -> Result<Option<Product>> {
        self.store.get_product(id).map_err(|e| Error::Storage(e.to_string()))
    }

    // ==================== Retrieval ====================

    /// Up to `top_k` catalog products most similar to the image, best first.
    pub fn search(&self, image_bytes: &[u8], top_k: usize) -> Result<SearchResponse> {
        self.search_with(image_bytes, top_k, &self.reranker)
    }

    /// Like [`CatalogService::search`] with some fusion weights replaced for
    /// this request only.
    pub fn search_with_weights(
        &self,
        image_bytes: &[u8],
        top_k: usize,
        overrides: &HashMap<FeatureKind, f32>,
    ) -> Result<SearchResponse> {
        let reranker = self
            .reranker
            .with_weights(overrides)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        self.search_with(image_bytes, top_k, &reranker)
    }

    fn search_with(&self, image_bytes: &[u8], top_k: usize, reranker: &Reranker) -> Result<SearchResponse> {
        let start = Instant::now();
        let query_id = uuid::Uuid::new_v4().to_string();
        let image = self.pipeline.normalize(image_bytes)?;

        if self.is_empty() || top_k == 0 {
            debug!("Search {} on an empty catalog", query_id);
            return Ok(SearchResponse {
                query_id,
                results: Vec::new(),
                total_matches: 0,
                query_features: None,
            });
        }

        let cold = self.store.is_empty().map_err(|e| Error::Storage(e.to_string()))?;
        let (ranked, query_features) = if cold {
            warn!("Feature store is empty, ranking by embedding only");
            let embedding = self.pipeline.embed(&image)?;
            let candidates = self.index.read().search(&embedding, top_k);
            let candidates = candidates
                .into_iter()
                .map(|c| RerankCandidate {
                    id: c.id,
                    distance: c.distance,
                    bundle: None,
                })
                .collect();
            (Reranker::embedding_only(candidates), None)
        } else {
            let query = self.pipeline.extract_all(&image)?;
            let Some(embedding) = query.embedding.as_ref() else {
                return Err(Error::Encoder("query bundle has no embedding".into()));
            };
            let candidates = {
                let index = self.index.read();
                let candidate_k = self.config.retrieval.candidate_k(top_k, index.len());
                index.search(embedding, candidate_k)
            };
            let ids: Vec<ProductId> = candidates.iter().map(|c| c.id.clone()).collect();
            let bundles = self.store.get_bundles(&ids).map_err(|e| Error::Storage(e.to_string()))?;

            let candidates: Vec<RerankCandidate> = candidates
                .into_iter()
                .zip(bundles)
                .map(|(c, bundle)| {
                    if bundle.is_none() {
                        warn!("No stored features for {}, using embedding similarity", c.id);
                    }
                    RerankCandidate {
                        id: c.id,
                        distance: c.distance,
                        bundle,
                    }
                })
                .collect();
            debug!("Search {}: re-ranking {} candidates", query_id, candidates.len());
            (reranker.rerank(&query, candidates), Some(QueryFeatureSummary::from_bundle(&query)))
        };

        let results = ranked
            .into_iter()
            .take(top_k)
            .enumerate()
            .map(|(i, result)| self.hit(i + 1, result))
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Search {} returned {} results in {:?}",
            query_id,
            results.len(),
            start.elapsed()
        );
        Ok(SearchResponse {
            query_id,
            total_matches: results.len(),
            results,
            query_features,
        })
    }

    fn hit(&self, rank: usize, result: RankedResult) -> Result<SearchHit> {
        let metadata = self
            .store
            .get_metadata(&result.id)
            .map_err(|e| Error::Storage(e.to_string()))?
            .unwrap_or_default();
        let (material, object_type) = result
            .bundle
            .as_ref()
            .map_or((None, None), |b| (b.predicted_material(), b.predicted_object_type()));
        Ok(SearchHit {
            rank,
            image_url: metadata.image_url(),
            title: metadata.title,
            description: metadata.description,
            product_id: result.id,
            score: result.score,
            embedding_similarity: result.embedding_similarity,
            feature_scores: result.feature_scores,
            predicted_material: material,
            predicted_object_type: object_type,
            embedding_only: result.embedding_only,
        })
    }

    // ==================== Indexing ====================

    /// Extract every feature from the image and add the product to the
    /// index, the feature store and the graph.
    pub fn index_product(
        &self,
        image_bytes: &[u8],
        id: ProductId,
        metadata: ProductMetadata,
    ) -> Result<IndexedProduct> {
        if self.contains(&id) {
            return Err(Error::ProductExists(id.to_string()));
        }
        let bundle = self.pipeline.extract_bytes(image_bytes)?;
        self.index_extracted(id, bundle, metadata)
    }

    /// Index a bundle that was extracted elsewhere. The bundle must carry an
    /// embedding.
    pub fn index_extracted(
        &self,
        id: ProductId,
        bundle: FeatureBundle,
        metadata: ProductMetadata,
    ) -> Result<IndexedProduct> {
        let Some(embedding) = bundle.embedding.as_ref() else {
            return Err(Error::Encoder(format!("bundle for {} has no embedding", id)));
        };
        let expected = self.pipeline.encoder().dim();
        if embedding.dim() != expected {
            return Err(Error::InvalidDimension {
                expected,
                actual: embedding.dim(),
            });
        }

        let index = self.index.upgradable_read();
        let stored = index.prepare(&id, embedding)?;

        let graph = self.graph.upgradable_read();
        let mut next_graph = graph.clone();
        next_graph.add_product(id.clone(), node_attributes(&metadata, &bundle));

        self.store
            .put_product(&id, &metadata, &bundle)
            .map_err(|e| Error::Persistence(e.to_string()))?;

        if let Err(e) = self.graph_file.save(&next_graph) {
            self.rollback_store(&id);
            return Err(Error::Persistence(e.to_string()));
        }

        let entries = index.entries().chain(std::iter::once((&id, stored.as_slice())));
        if let Err(e) = self.index_file.save(entries) {
            self.rollback_store(&id);
            if let Err(graph_err) = self.graph_file.save(&graph) {
                warn!("Failed to restore graph file after aborted insert of {}: {}", id, graph_err);
            }
            return Err(Error::Persistence(e.to_string()));
        }

        let mut index = RwLockUpgradableReadGuard::upgrade(index);
        index.insert(id.clone(), stored)?;
        *RwLockUpgradableReadGuard::upgrade(graph) = next_graph;

        info!("Indexed product {} ({} total)", id, index.len());
        Ok(IndexedProduct {
            product_id: id,
            predicted_material: bundle.predicted_material(),
            predicted_object_type: bundle.predicted_object_type(),
        })
    }

    fn rollback_store(&self, id: &ProductId) {
        if let Err(e) = self.store.delete_product(id) {
            warn!("Failed to roll back stored features of {}: {}", id, e);
        }
    }

    /// Replace the display metadata of an indexed product.
    pub fn update_metadata(&self, id: &ProductId, metadata: ProductMetadata) -> Result<()> {
        if !self.contains(id) {
            return Err(Error::ProductNotFound(id.to_string()));
        }

        let graph = self.graph.upgradable_read();
        let mut next_graph = graph.clone();
        if let Some(attributes) = next_graph.node(id).cloned() {
            next_graph.add_product(
                id.clone(),
                NodeAttributes {
                    title: metadata.title.clone(),
                    ..attributes
                },
            );
        }

        let previous = self
            .store
            .get_metadata(id)
            .map_err(|e| Error::Storage(e.to_string()))?;
        self.store
            .put_metadata(id, &metadata)
            .map_err(|e| Error::Persistence(e.to_string()))?;

        if let Err(e) = self.graph_file.save(&next_graph) {
            self.restore_metadata(id, previous);
            return Err(Error::Persistence(e.to_string()));
        }
        *RwLockUpgradableReadGuard::upgrade(graph) = next_graph;

        debug!("Updated metadata of {}", id);
        Ok(())
    }

    fn restore_metadata(&self, id: &ProductId, previous: Option<ProductMetadata>) {
        let restored = match previous {
            Some(metadata) => self.store.put_metadata(id, &metadata),
            // put_product writes metadata and bundle together, so neither existed.
            None => self.store.delete_product(id).map(|_| ()),
        };
        if let Err(e) = restored {
            warn!("Failed to restore metadata of {}: {}", id, e);
        }
    }

    // ==================== Graph ====================

    /// Apply `change` to a copy of the graph, persist the copy, then swap it
    /// in. Nothing changes if `change` or the write fails.
    fn mutate_graph<T>(&self, change: impl FnOnce(&mut RelationshipGraph) -> Result<T>) -> Result<T> {
        let graph = self.graph.upgradable_read();
        let mut next = graph.clone();
        let value = change(&mut next)?;
        self.graph_file
            .save(&next)
            .map_err(|e| Error::Persistence(e.to_string()))?;
        *RwLockUpgradableReadGuard::upgrade(graph) = next;
        Ok(value)
    }

    /// Direct neighbors of a product, strongest first. Unknown ids yield an
    /// empty list.
    #[must_use]
    pub fn get_related(&self, id: &ProductId, max_results: usize) -> Vec<RelatedProduct> {
        self.graph.read().get_related(id, max_results)
    }

    /// Outlets carrying a product, by outlet id. Empty for unknown ids.
    #[must_use]
    pub fn get_outlets(&self, id: &ProductId) -> Vec<Outlet> {
        self.graph.read().outlets_for(id)
    }

    #[must_use]
    pub fn outlets_for_products(&self, ids: &[ProductId]) -> BTreeMap<ProductId, Vec<Outlet>> {
        self.graph.read().outlets_for_products(ids)
    }

    /// Register or replace an outlet. Returns the record it replaced.
    pub fn add_outlet(&self, outlet: Outlet) -> Result<Option<Outlet>> {
        if outlet.outlet_id.is_empty() {
            return Err(Error::InvalidConfig("outlet id must not be empty".into()));
        }
        let outlet_id = outlet.outlet_id.clone();
        let previous = self.mutate_graph(|graph| Ok(graph.add_outlet(outlet)))?;
        info!("Registered outlet {}", outlet_id);
        Ok(previous)
    }

    pub fn add_relationship(&self, a: &ProductId, b: &ProductId, kind: RelationshipKind, weight: f32) -> Result<()> {
        self.mutate_graph(|graph| graph.add_relationship(a, b, kind, weight))?;
        debug!("Linked {} and {} as {} ({})", a, b, kind.as_str(), weight);
        Ok(())
    }

    /// Rebuild the derived material and object-type links from every stored
    /// product. Quadratic in the catalog size.
    pub fn build_graph(&self) -> Result<GraphBuild> {
        let start = Instant::now();
        let products = self.store.products().map_err(|e| Error::Storage(e.to_string()))?;
        let nodes: Vec<(ProductId, NodeAttributes)> = products
            .into_iter()
            .map(|p| {
                let attributes = node_attributes(&p.metadata, &p.features);
                (p.id, attributes)
            })
            .collect();
        let graph_config = self.config.graph;

        let (relationships_created, stats) = self.mutate_graph(move |graph| {
            let created = graph.build_relationships(nodes, &graph_config);
            Ok((created, graph.statistics()))
        })?;

        info!(
            "Rebuilt relationship graph: {} products, {} links created in {:?}",
            stats.total_products,
            relationships_created,
            start.elapsed()
        );
        Ok(GraphBuild {
            relationships_created,
            stats,
        })
    }

    #[must_use]
    pub fn graph_statistics(&self) -> GraphStats {
        self.graph.read().statistics()
    }
}

fn node_attributes(metadata: &ProductMetadata, bundle: &FeatureBundle) -> NodeAttributes {
    NodeAttributes {
        material: bundle.predicted_material(),
        object_type: bundle.predicted_object_type(),
        title: metadata.title.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use craftx_core::{Label, Prediction, Vector};
    use tempfile::tempdir;

    fn config(dir: &Path) -> CatalogConfig {
        let mut config = CatalogConfig::default().with_data_dir(dir);
        config.storage.lmdb_map_size = 16 * 1024 * 1024;
        config
    }

    fn bundle(embedding: Vec<f32>, material: Material, object_type: ObjectType) -> FeatureBundle {
        let one_hot = |i: usize| {
            let mut scores = vec![0.0; 6];
            scores[i] = 1.0;
            scores
        };
        let m = Material::ALL.iter().position(|x| *x == material).unwrap_or(0);
        let t = ObjectType::ALL.iter().position(|x| *x == object_type).unwrap_or(0);
        FeatureBundle {
            material: Some(Prediction::from_scores(&one_hot(m))),
            object_type: Some(Prediction::from_scores(&one_hot(t))),
            embedding: Some(Vector::unit(embedding)),
            ..Default::default()
        }
    }

    fn service(dir: &Path) -> CatalogService {
        CatalogService::open(config(dir), Arc::new(ThumbnailEncoder::new(1))).unwrap()
    }

    #[test]
    fn test_index_extracted_and_graph_build() {
        let dir = tempdir().unwrap();
        let catalog = service(dir.path());
        catalog
            .index_extracted("A".into(), bundle(vec![1.0, 0.0, 0.0], Material::Wood, ObjectType::Mask), ProductMetadata::new("A", ""))
            .unwrap();
        catalog
            .index_extracted("B".into(), bundle(vec![0.0, 1.0, 0.0], Material::Wood, ObjectType::Pottery), ProductMetadata::new("B", ""))
            .unwrap();
        catalog
            .index_extracted("C".into(), bundle(vec![0.0, 0.0, 1.0], Material::Clay, ObjectType::Mask), ProductMetadata::new("C", ""))
            .unwrap();
        assert_eq!(catalog.len(), 3);

        let build = catalog.build_graph().unwrap();
        assert_eq!(build.relationships_created, 2);
        assert_eq!(build.stats.total_products, 3);

        let related = catalog.get_related(&"A".into(), 10);
        assert_eq!(related.len(), 2);
        assert_eq!(related[0].product_id.as_str(), "B");
        assert_eq!(related[0].relationship, RelationshipKind::SameMaterial);
        assert_eq!(related[1].product_id.as_str(), "C");
        assert_eq!(related[1].relationship, RelationshipKind::SameType);
        assert!(catalog.get_related(&"Z".into(), 10).is_empty());
    }

    #[test]
    fn test_duplicate_and_missing_embedding() {
        let dir = tempdir().unwrap();
        let catalog = service(dir.path());
        let b = bundle(vec![1.0, 0.0, 0.0], Material::Wood, ObjectType::Mask);
        catalog
            .index_extracted("A".into(), b.clone(), ProductMetadata::new("A", ""))
            .unwrap();
        assert!(matches!(
            catalog.index_extracted("A".into(), b.clone(), ProductMetadata::new("A", "")),
            Err(Error::ProductExists(_))
        ));

        let mut no_embedding = b;
        no_embedding.embedding = None;
        assert!(catalog
            .index_extracted("B".into(), no_embedding, ProductMetadata::new("B", ""))
            .is_err());
        assert_eq!(catalog.len(), 1);
        assert!(catalog.product(&"B".into()).unwrap().is_none());
    }

    #[test]
    fn test_failed_graph_write_changes_nothing() {
        let dir = tempdir().unwrap();
        let catalog = service(dir.path());
        catalog
            .index_extracted("A".into(), bundle(vec![1.0, 0.0, 0.0], Material::Wood, ObjectType::Mask), ProductMetadata::new("A", ""))
            .unwrap();

        // A directory where the graph file should be makes the rename fail.
        std::fs::remove_file(dir.path().join(GRAPH_FILE)).unwrap();
        std::fs::create_dir(dir.path().join(GRAPH_FILE)).unwrap();

        let result = catalog.index_extracted(
            "B".into(),
            bundle(vec![0.0, 1.0, 0.0], Material::Clay, ObjectType::Pottery),
            ProductMetadata::new("B", ""),
        );
        assert!(matches!(result, Err(Error::Persistence(_))));
        assert_eq!(catalog.len(), 1);
        assert!(!catalog.contains(&"B".into()));
        assert!(catalog.product(&"B".into()).unwrap().is_none());
        assert_eq!(catalog.graph_statistics().total_products, 1);

        let outlet = Outlet {
            outlet_id: "shop1".into(),
            name: "Shop".into(),
            location: "Lagos".into(),
            coordinates: None,
            products: vec!["A".into()],
        };
        assert!(matches!(catalog.add_outlet(outlet), Err(Error::Persistence(_))));
        assert!(catalog.get_outlets(&"A".into()).is_empty());
    }

    #[test]
    fn test_failed_index_write_changes_nothing() {
        let dir = tempdir().unwrap();
        let catalog = service(dir.path());
        catalog
            .index_extracted("A".into(), bundle(vec![1.0, 0.0, 0.0], Material::Wood, ObjectType::Mask), ProductMetadata::new("A", ""))
            .unwrap();
        let before = catalog.graph.read().snapshot();

        std::fs::remove_file(dir.path().join(INDEX_FILE)).unwrap();
        std::fs::create_dir(dir.path().join(INDEX_FILE)).unwrap();

        let result = catalog.index_extracted(
            "B".into(),
            bundle(vec![0.0, 1.0, 0.0], Material::Wood, ObjectType::Pottery),
            ProductMetadata::new("B", ""),
        );
        assert!(matches!(result, Err(Error::Persistence(_))));
        assert_eq!(catalog.len(), 1);
        assert!(!catalog.contains(&"B".into()));
        assert!(catalog.product(&"B".into()).unwrap().is_none());
        assert!(catalog.product(&"A".into()).unwrap().is_some());
        assert_eq!(catalog.graph_statistics().total_products, 1);
        assert_eq!(catalog.graph.read().snapshot(), before);

        let on_disk = GraphFile::new(dir.path().join(GRAPH_FILE)).load().unwrap().unwrap();
        assert_eq!(on_disk.snapshot(), before);
    }

    #[test]
    fn test_failed_metadata_write_keeps_graph_title() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path());
        config.storage.lmdb_map_size = 256 * 1024;
        let catalog = CatalogService::open(config, Arc::new(ThumbnailEncoder::new(1))).unwrap();
        catalog
            .index_extracted("A".into(), bundle(vec![1.0, 0.0, 0.0], Material::Wood, ObjectType::Mask), ProductMetadata::new("old", ""))
            .unwrap();
        catalog
            .index_extracted("B".into(), bundle(vec![0.0, 1.0, 0.0], Material::Wood, ObjectType::Pottery), ProductMetadata::new("B", ""))
            .unwrap();
        catalog.build_graph().unwrap();

        // Larger than the whole map, so the store rejects it.
        let huge = "x".repeat(2 * 1024 * 1024);
        let result = catalog.update_metadata(&"A".into(), ProductMetadata::new(huge, ""));
        assert!(matches!(result, Err(Error::Persistence(_))));

        let stored = catalog.product(&"A".into()).unwrap().unwrap().metadata.title;
        let related = catalog.get_related(&"B".into(), 10);
        assert_eq!(stored, "old");
        assert_eq!(related[0].title, "old");

        let on_disk = GraphFile::new(dir.path().join(GRAPH_FILE)).load().unwrap().unwrap();
        assert_eq!(on_disk.get_related(&"B".into(), 10)[0].title, "old");
    }

    #[test]
    fn test_failed_graph_write_restores_metadata() {
        let dir = tempdir().unwrap();
        let catalog = service(dir.path());
        catalog
            .index_extracted("A".into(), bundle(vec![1.0, 0.0, 0.0], Material::Wood, ObjectType::Mask), ProductMetadata::new("old", "first"))
            .unwrap();

        std::fs::remove_file(dir.path().join(GRAPH_FILE)).unwrap();
        std::fs::create_dir(dir.path().join(GRAPH_FILE)).unwrap();

        let result = catalog.update_metadata(&"A".into(), ProductMetadata::new("new", "second"));
        assert!(matches!(result, Err(Error::Persistence(_))));

        let metadata = catalog.product(&"A".into()).unwrap().unwrap().metadata;
        assert_eq!(metadata.title, "old");
        assert_eq!(metadata.description, "first");
        assert_eq!(catalog.graph.read().node(&"A".into()).unwrap().title, "old");
    }

    #[test]
    fn test_relationship_errors() {
        let dir = tempdir().unwrap();
        let catalog = service(dir.path());
        catalog
            .index_extracted("A".into(), bundle(vec![1.0, 0.0, 0.0], Material::Wood, ObjectType::Mask), ProductMetadata::new("A", ""))
            .unwrap();
        assert!(matches!(
            catalog.add_relationship(&"A".into(), &"A".into(), RelationshipKind::SimilarTo, 0.5),
            Err(Error::SelfLoop(_))
        ));
        assert!(matches!(
            catalog.add_relationship(&"A".into(), &"Q".into(), RelationshipKind::SimilarTo, 0.5),
            Err(Error::ProductNotFound(_))
        ));
        assert!(matches!(
            catalog.update_metadata(&"Q".into(), ProductMetadata::new("Q", "")),
            Err(Error::ProductNotFound(_))
        ));

        catalog
            .update_metadata(&"A".into(), ProductMetadata::new("Carved mask", "teak"))
            .unwrap();
        assert_eq!(catalog.product(&"A".into()).unwrap().unwrap().metadata.title, "Carved mask");
    }
}
