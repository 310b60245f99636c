//! Per-feature fusion weights.
//!
//! Recognized keys are the seven [`FeatureKind`] names. Weights must be
//! non-negative and are normalized to sum to 1 at configuration time.

use craftx_core::FeatureKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureWeights {
    #[serde(default)]
    pub geometric: f32,
    #[serde(default)]
    pub color: f32,
    #[serde(default)]
    pub texture: f32,
    #[serde(default)]
    pub pattern: f32,
    #[serde(default)]
    pub material: f32,
    #[serde(default)]
    pub object_type: f32,
    #[serde(default)]
    pub embedding: f32,
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self {
            geometric: 0.30,
            color: 0.15,
            texture: 0.15,
            pattern: 0.10,
            material: 0.10,
            object_type: 0.05,
            embedding: 0.15,
        }
    }
}

impl FeatureWeights {
    /// Every weight zero. Useful as a base for [`FeatureWeights::with`].
    #[must_use]
    pub fn zero() -> Self {
        Self {
            geometric: 0.0,
            color: 0.0,
            texture: 0.0,
            pattern: 0.0,
            material: 0.0,
            object_type: 0.0,
            embedding: 0.0,
        }
    }

    #[must_use]
    pub fn get(&self, kind: FeatureKind) -> f32 {
        match kind {
            FeatureKind::Geometric => self.geometric,
            FeatureKind::Color => self.color,
            FeatureKind::Texture => self.texture,
            FeatureKind::Pattern => self.pattern,
            FeatureKind::Material => self.material,
            FeatureKind::ObjectType => self.object_type,
            FeatureKind::Embedding => self.embedding,
        }
    }

    pub fn set(&mut self, kind: FeatureKind, weight: f32) {
        let slot = match kind {
            FeatureKind::Geometric => &mut self.geometric,
            FeatureKind::Color => &mut self.color,
            FeatureKind::Texture => &mut self.texture,
            FeatureKind::Pattern => &mut self.pattern,
            FeatureKind::Material => &mut self.material,
            FeatureKind::ObjectType => &mut self.object_type,
            FeatureKind::Embedding => &mut self.embedding,
        };
        *slot = weight;
    }

    #[must_use]
    pub fn with(mut self, kind: FeatureKind, weight: f32) -> Self {
        self.set(kind, weight);
        self
    }

    #[must_use]
    pub fn total(&self) -> f32 {
        FeatureKind::ALL.iter().map(|k| self.get(*k)).sum()
    }

    /// Reject negative or non-finite weights, then scale so the weights sum
    /// to 1 when they don't already.
    pub fn validate_and_normalize(&mut self) -> Result<(), WeightsError> {
        for kind in FeatureKind::ALL {
            let w = self.get(kind);
            if !w.is_finite() {
                return Err(WeightsError::NonFinite(kind));
            }
            if w < 0.0 {
                return Err(WeightsError::NegativeWeight(kind));
            }
        }

        let sum = self.total();
        if sum <= 0.0 {
            return Err(WeightsError::ZeroTotalWeight);
        }
        if (sum - 1.0).abs() > 0.001 {
            for kind in FeatureKind::ALL {
                self.set(kind, self.get(kind) / sum);
            }
        }
        Ok(())
    }

    /// Apply overrides, then renormalize. Negative overrides clamp to zero.
    pub fn overridden(&self, overrides: &HashMap<FeatureKind, f32>) -> Result<Self, WeightsError> {
        let mut weights = *self;
        for (kind, w) in overrides {
            weights.set(*kind, w.max(0.0));
        }
        weights.validate_and_normalize()?;
        Ok(weights)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WeightsError {
    #[error("Feature '{0}' has negative weight")]
    NegativeWeight(FeatureKind),

    #[error("Feature '{0}' has a non-finite weight")]
    NonFinite(FeatureKind),

    #[error("Total weight cannot be zero")]
    ZeroTotalWeight,
}
