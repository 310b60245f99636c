//! Feature bundle: everything extracted from one product image.
//!
//! A bundle carries one entry per [`FeatureKind`]. Every entry is optional so
//! that partial bundles (older catalog entries, or extraction that was
//! skipped) still score against the features they do have.

use crate::vector::Vector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Score added to every class before a rule-based distribution is normalized.
pub const CLASS_SCORE_EPSILON: f32 = 0.1;

/// The closed set of feature families, in scoring order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Geometric,
    Color,
    Texture,
    Pattern,
    Material,
    ObjectType,
    Embedding,
}

/// How two entries of the same kind are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureMetric {
    /// Unit vectors: cosine mapped onto [0, 1].
    Cosine,
    /// Probability distributions: Bhattacharyya coefficient.
    Bhattacharyya,
}

impl FeatureKind {
    pub const ALL: [FeatureKind; 7] = [
        FeatureKind::Geometric,
        FeatureKind::Color,
        FeatureKind::Texture,
        FeatureKind::Pattern,
        FeatureKind::Material,
        FeatureKind::ObjectType,
        FeatureKind::Embedding,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureKind::Geometric => "geometric",
            FeatureKind::Color => "color",
            FeatureKind::Texture => "texture",
            FeatureKind::Pattern => "pattern",
            FeatureKind::Material => "material",
            FeatureKind::ObjectType => "object_type",
            FeatureKind::Embedding => "embedding",
        }
    }

    #[must_use]
    pub fn metric(&self) -> FeatureMetric {
        match self {
            FeatureKind::Material | FeatureKind::ObjectType => FeatureMetric::Bhattacharyya,
            _ => FeatureMetric::Cosine,
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeatureKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown feature kind '{}'", s))
    }
}

/// A label drawn from a closed, ordered vocabulary with a catch-all member.
pub trait Label: Copy + Eq + fmt::Debug + 'static {
    const ALL: &'static [Self];
    const CATCH_ALL: Self;

    fn as_str(&self) -> &'static str;

    fn index(&self) -> usize {
        Self::ALL.iter().position(|l| l == self).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Material {
    Wood,
    Clay,
    Fabric,
    Metal,
    Stone,
    Mixed,
}

impl Label for Material {
    const ALL: &'static [Self] = &[
        Material::Wood,
        Material::Clay,
        Material::Fabric,
        Material::Metal,
        Material::Stone,
        Material::Mixed,
    ];
    const CATCH_ALL: Self = Material::Mixed;

    fn as_str(&self) -> &'static str {
        match self {
            Material::Wood => "wood",
            Material::Clay => "clay",
            Material::Fabric => "fabric",
            Material::Metal => "metal",
            Material::Stone => "stone",
            Material::Mixed => "mixed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Mask,
    Pottery,
    Jewelry,
    Textile,
    Sculpture,
    Utility,
}

impl Label for ObjectType {
    const ALL: &'static [Self] = &[
        ObjectType::Mask,
        ObjectType::Pottery,
        ObjectType::Jewelry,
        ObjectType::Textile,
        ObjectType::Sculpture,
        ObjectType::Utility,
    ];
    const CATCH_ALL: Self = ObjectType::Utility;

    fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Mask => "mask",
            ObjectType::Pottery => "pottery",
            ObjectType::Jewelry => "jewelry",
            ObjectType::Textile => "textile",
            ObjectType::Sculpture => "sculpture",
            ObjectType::Utility => "utility",
        }
    }
}

impl fmt::Display for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A probability distribution over a closed vocabulary plus its argmax.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction<L> {
    /// One probability per `L::ALL` entry, summing to 1.
    pub probabilities: Vec<f32>,
    pub label: L,
    pub confidence: f32,
}

impl<L: Label> Prediction<L> {
    /// Turn raw rule scores into a distribution: add [`CLASS_SCORE_EPSILON`]
    /// to each class and divide by the total. The first maximum wins.
    #[must_use]
    pub fn from_scores(scores: &[f32]) -> Self {
        let mut probabilities: Vec<f32> = L::ALL
            .iter()
            .enumerate()
            .map(|(i, _)| scores.get(i).copied().unwrap_or(0.0).max(0.0) + CLASS_SCORE_EPSILON)
            .collect();
        let total: f32 = probabilities.iter().sum();
        for p in &mut probabilities {
            *p /= total;
        }

        let mut best = 0;
        for (i, p) in probabilities.iter().enumerate() {
            if *p > probabilities[best] {
                best = i;
            }
        }

        Self {
            label: L::ALL[best],
            confidence: probabilities[best],
            probabilities,
        }
    }

    /// Probability assigned to one label.
    #[must_use]
    pub fn probability(&self, label: L) -> f32 {
        self.probabilities.get(label.index()).copied().unwrap_or(0.0)
    }

    /// Unit-length view of the distribution, used in fused vectors.
    #[must_use]
    pub fn vector(&self) -> Vector {
        Vector::unit(self.probabilities.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometricFeatures {
    pub edge_density: f32,
    pub vertex_count: u32,
    pub aspect_ratio: f32,
    pub compactness: f32,
    pub symmetry: f32,
    pub curvature: f32,
    pub complexity: f32,
    pub edge_count: u32,
    pub contour_count: u32,
    pub vector: Vector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorFeatures {
    pub hue_histogram: Vec<f32>,
    pub saturation_histogram: Vec<f32>,
    pub value_histogram: Vec<f32>,
    /// RGB palette ordered by cluster population, largest first.
    pub dominant_colors: Vec<[u8; 3]>,
    pub brightness: f32,
    pub saturation: f32,
    pub contrast: f32,
    pub uniformity: f32,
    pub transitions: f32,
    pub vector: Vector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureFeatures {
    pub lbp_histogram: Vec<f32>,
    pub roughness: f32,
    pub grain_direction: f32,
    pub uniformity: f32,
    pub periodicity: f32,
    pub irregularity: f32,
    pub vector: Vector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternFeatures {
    pub keypoint_count: u32,
    pub density: f32,
    pub distribution: f32,
    pub detail_strength: f32,
    pub vector: Vector,
}

/// All descriptors of one image.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureBundle {
    pub geometric: Option<GeometricFeatures>,
    pub color: Option<ColorFeatures>,
    pub texture: Option<TextureFeatures>,
    pub pattern: Option<PatternFeatures>,
    pub material: Option<Prediction<Material>>,
    pub object_type: Option<Prediction<ObjectType>>,
    pub embedding: Option<Vector>,
}

impl FeatureBundle {
    /// The unit vector of one kind. Distributions come back L2-normalized.
    #[must_use]
    pub fn vector(&self, kind: FeatureKind) -> Option<Vector> {
        match kind {
            FeatureKind::Geometric => self.geometric.as_ref().map(|g| g.vector.clone()),
            FeatureKind::Color => self.color.as_ref().map(|c| c.vector.clone()),
            FeatureKind::Texture => self.texture.as_ref().map(|t| t.vector.clone()),
            FeatureKind::Pattern => self.pattern.as_ref().map(|p| p.vector.clone()),
            FeatureKind::Material => self.material.as_ref().map(Prediction::vector),
            FeatureKind::ObjectType => self.object_type.as_ref().map(Prediction::vector),
            FeatureKind::Embedding => self.embedding.clone(),
        }
    }

    /// The probability distribution of a classifier kind.
    #[must_use]
    pub fn distribution(&self, kind: FeatureKind) -> Option<&[f32]> {
        match kind {
            FeatureKind::Material => self.material.as_ref().map(|m| m.probabilities.as_slice()),
            FeatureKind::ObjectType => self.object_type.as_ref().map(|o| o.probabilities.as_slice()),
            _ => None,
        }
    }

    #[must_use]
    pub fn has(&self, kind: FeatureKind) -> bool {
        match kind {
            FeatureKind::Geometric => self.geometric.is_some(),
            FeatureKind::Color => self.color.is_some(),
            FeatureKind::Texture => self.texture.is_some(),
            FeatureKind::Pattern => self.pattern.is_some(),
            FeatureKind::Material => self.material.is_some(),
            FeatureKind::ObjectType => self.object_type.is_some(),
            FeatureKind::Embedding => self.embedding.is_some(),
        }
    }

    /// Concatenation of the six extractor vectors, re-normalized.
    /// The embedding is not part of the fused vector.
    #[must_use]
    pub fn fused_vector(&self) -> Vector {
        let parts: Vec<Vector> = FeatureKind::ALL
            .iter()
            .filter(|kind| **kind != FeatureKind::Embedding)
            .filter_map(|kind| self.vector(*kind))
            .collect();
        Vector::concat_normalized(parts.iter())
    }

    #[must_use]
    pub fn predicted_material(&self) -> Option<Material> {
        self.material.as_ref().map(|m| m.label)
    }

    #[must_use]
    pub fn predicted_object_type(&self) -> Option<ObjectType> {
        self.object_type.as_ref().map(|o| o.label)
    }
}
