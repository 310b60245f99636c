//! Second-stage re-ranking of index candidates.
//!
//! Candidates come from the embedding index with their squared L2 distance.
//! Each one is scored against the query bundle; candidates whose stored
//! bundle is missing fall back to embedding similarity from the index
//! distance.

use crate::distance::squared_l2_to_similarity01;
use crate::scorer::{ScoreBreakdown, SimilarityScorer};
use crate::weights::WeightsError;
use craftx_core::{FeatureBundle, FeatureKind, ProductId};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// One first-stage hit handed to the reranker.
#[derive(Debug, Clone)]
pub struct RerankCandidate {
    pub id: ProductId,
    /// Squared L2 distance between unit embeddings.
    pub distance: f32,
    pub bundle: Option<FeatureBundle>,
}

#[derive(Debug, Clone)]
pub struct RankedResult {
    pub id: ProductId,
    pub score: f32,
    /// Per-feature similarities (unweighted).
    pub feature_scores: BTreeMap<FeatureKind, f32>,
    pub embedding_similarity: f32,
    /// The candidate had no stored bundle and was ranked by embedding only.
    pub embedding_only: bool,
    pub bundle: Option<FeatureBundle>,
}

#[derive(Debug, Clone, Default)]
pub struct Reranker {
    scorer: SimilarityScorer,
}

impl Reranker {
    #[must_use]
    pub fn new(scorer: SimilarityScorer) -> Self {
        Self { scorer }
    }

    #[must_use]
    pub fn scorer(&self) -> &SimilarityScorer {
        &self.scorer
    }

    /// Score and sort candidates: final score descending, then embedding
    /// similarity descending, then product id ascending.
    #[must_use]
    pub fn rerank(&self, query: &FeatureBundle, candidates: Vec<RerankCandidate>) -> Vec<RankedResult> {
        let mut results: Vec<RankedResult> = candidates
            .into_iter()
            .map(|candidate| self.rank_one(query, candidate))
            .collect();
        results.sort_by(compare_ranked);
        results
    }

    /// Rank purely by index distance, for a catalog without stored bundles.
    #[must_use]
    pub fn embedding_only(candidates: Vec<RerankCandidate>) -> Vec<RankedResult> {
        let mut results: Vec<RankedResult> = candidates.into_iter().map(fallback).collect();
        results.sort_by(compare_ranked);
        results
    }

    fn rank_one(&self, query: &FeatureBundle, candidate: RerankCandidate) -> RankedResult {
        let Some(bundle) = candidate.bundle else {
            return fallback(candidate);
        };
        let ScoreBreakdown {
            feature_scores,
            final_score,
        } = self.scorer.score(query, &bundle);
        let embedding_similarity = feature_scores
            .get(&FeatureKind::Embedding)
            .copied()
            .unwrap_or_else(|| squared_l2_to_similarity01(candidate.distance));
        RankedResult {
            id: candidate.id,
            score: final_score,
            feature_scores,
            embedding_similarity,
            embedding_only: false,
            bundle: Some(bundle),
        }
    }

    /// A reranker with some weights replaced, renormalized to sum to 1.
    pub fn with_weights(&self, overrides: &HashMap<FeatureKind, f32>) -> Result<Reranker, WeightsError> {
        let weights = self.scorer.weights().overridden(overrides)?;
        Ok(Reranker::new(SimilarityScorer::new(weights)?))
    }
}

fn fallback(candidate: RerankCandidate) -> RankedResult {
    let similarity = squared_l2_to_similarity01(candidate.distance);
    RankedResult {
        id: candidate.id,
        score: similarity,
        feature_scores: BTreeMap::from([(FeatureKind::Embedding, similarity)]),
        embedding_similarity: similarity,
        embedding_only: true,
        bundle: candidate.bundle,
    }
}

fn compare_ranked(a: &RankedResult, b: &RankedResult) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            b.embedding_similarity
                .partial_cmp(&a.embedding_similarity)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.id.cmp(&b.id))
}
