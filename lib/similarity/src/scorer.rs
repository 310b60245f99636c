//! Fused similarity between two feature bundles.

use crate::distance::{bhattacharyya, cosine_similarity01};
use crate::weights::{FeatureWeights, WeightsError};
use craftx_core::{FeatureBundle, FeatureKind, FeatureMetric};
use serde::Serialize;
use std::collections::BTreeMap;

/// Per-feature similarities (unweighted, in [0, 1]) and the fused score.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ScoreBreakdown {
    pub feature_scores: BTreeMap<FeatureKind, f32>,
    pub final_score: f32,
}

impl ScoreBreakdown {
    #[must_use]
    pub fn get(&self, kind: FeatureKind) -> Option<f32> {
        self.feature_scores.get(&kind).copied()
    }
}

#[derive(Debug, Clone)]
pub struct SimilarityScorer {
    weights: FeatureWeights,
}

impl Default for SimilarityScorer {
    fn default() -> Self {
        Self {
            weights: FeatureWeights::default(),
        }
    }
}

impl SimilarityScorer {
    /// Validates and normalizes `weights`.
    pub fn new(mut weights: FeatureWeights) -> Result<Self, WeightsError> {
        weights.validate_and_normalize()?;
        Ok(Self { weights })
    }

    #[must_use]
    pub fn weights(&self) -> &FeatureWeights {
        &self.weights
    }

    /// Similarity of one feature kind, or `None` when either bundle lacks it.
    #[must_use]
    pub fn feature_similarity(
        &self,
        kind: FeatureKind,
        query: &FeatureBundle,
        candidate: &FeatureBundle,
    ) -> Option<f32> {
        match kind.metric() {
            FeatureMetric::Bhattacharyya => {
                let p = query.distribution(kind)?;
                let q = candidate.distribution(kind)?;
                Some(bhattacharyya(p, q))
            }
            FeatureMetric::Cosine => {
                let a = query.vector(kind)?;
                let b = candidate.vector(kind)?;
                Some(cosine_similarity01(&a, &b))
            }
        }
    }

    /// Score every feature present in both bundles and fuse them. The
    /// weighted sum is divided by the weights of the features actually
    /// compared, so a missing feature neither helps nor hurts.
    #[must_use]
    pub fn score(&self, query: &FeatureBundle, candidate: &FeatureBundle) -> ScoreBreakdown {
        let mut feature_scores = BTreeMap::new();
        let mut weighted = 0.0f32;
        let mut used = 0.0f32;

        for kind in FeatureKind::ALL {
            let Some(similarity) = self.feature_similarity(kind, query, candidate) else {
                continue;
            };
            let weight = self.weights.get(kind);
            weighted += similarity * weight;
            used += weight;
            feature_scores.insert(kind, similarity);
        }

        let final_score = if used > 0.0 {
            (weighted / used).clamp(0.0, 1.0)
        } else {
            0.0
        };
        ScoreBreakdown {
            feature_scores,
            final_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use craftx_core::{Material, ObjectType, Prediction, Vector};

    fn bundle(embedding: Vec<f32>, material: [f32; 6]) -> FeatureBundle {
        FeatureBundle {
            embedding: Some(Vector::unit(embedding)),
            material: Some(Prediction::<Material>::from_scores(&material)),
            object_type: Some(Prediction::<ObjectType>::from_scores(&[0.0, 0.6, 0.0, 0.0, 0.0, 0.1])),
            ..Default::default()
        }
    }

    #[test]
    fn test_identical_bundles_score_one() {
        let a = bundle(vec![0.3, 0.4, 0.5], [0.8, 0.0, 0.0, 0.0, 0.3, 0.0]);
        let scores = SimilarityScorer::default().score(&a, &a);
        assert_eq!(scores.feature_scores.len(), 3);
        for s in scores.feature_scores.values() {
            assert!((s - 1.0).abs() < 1e-5);
        }
        assert!((scores.final_score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_missing_features_are_excluded() {
        let a = bundle(vec![1.0, 0.0], [1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let mut b = a.clone();
        b.embedding = Some(Vector::unit(vec![0.0, 1.0]));
        b.material = None;

        let scorer = SimilarityScorer::new(
            FeatureWeights::zero()
                .with(FeatureKind::Embedding, 0.5)
                .with(FeatureKind::Material, 0.3)
                .with(FeatureKind::ObjectType, 0.2),
        )
        .unwrap();
        let scores = scorer.score(&a, &b);
        assert!(scores.get(FeatureKind::Material).is_none());
        // embedding 0.5 (orthogonal) with weight 0.5, object type 1.0 with weight 0.2
        let expected = (0.5 * 0.5 + 1.0 * 0.2) / 0.7;
        assert!((scores.final_score - expected).abs() < 1e-5);
    }

    #[test]
    fn test_no_shared_features() {
        let a = FeatureBundle {
            embedding: Some(Vector::unit(vec![1.0])),
            ..Default::default()
        };
        let scores = SimilarityScorer::default().score(&a, &FeatureBundle::default());
        assert!(scores.feature_scores.is_empty());
        assert_eq!(scores.final_score, 0.0);
    }

    #[test]
    fn test_rejects_bad_weights() {
        assert!(SimilarityScorer::new(FeatureWeights::zero()).is_err());
    }
}
