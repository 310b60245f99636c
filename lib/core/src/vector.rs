use serde::{Deserialize, Serialize};

/// A dense feature vector.
///
/// Every extractor output and every embedding travels as a `Vector`.
/// Normalization maps a vector with no signal (norm ~ 0) to itself, so a
/// normalized vector has norm 1 or is all zeros.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Vector {
    data: Vec<f32>,
}

impl Vector {
    #[inline]
    #[must_use]
    pub fn new(data: Vec<f32>) -> Self {
        Self { data }
    }

    #[inline]
    #[must_use]
    pub fn zeros(dim: usize) -> Self {
        Self { data: vec![0.0; dim] }
    }

    #[inline]
    #[must_use]
    pub fn from_slice(data: &[f32]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }

    #[inline]
    #[must_use]
    pub fn dim(&self) -> usize {
        self.data.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    #[must_use]
    pub fn into_inner(self) -> Vec<f32> {
        self.data
    }

    #[inline]
    #[must_use]
    pub fn norm(&self) -> f32 {
        crate::simd::norm_simd(&self.data)
    }

    /// Cosine similarity in [-1, 1]. Zero when either side has no signal
    /// or the dimensions differ.
    #[inline]
    pub fn cosine_similarity(&self, other: &Vector) -> f32 {
        if self.dim() != other.dim() {
            return 0.0;
        }

        let dot_product = crate::simd::dot_product_simd(&self.data, &other.data);
        let norm_a = self.norm();
        let norm_b = other.norm();

        if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
            return 0.0;
        }

        (dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }

    /// Squared Euclidean distance, infinite on dimension mismatch.
    #[inline]
    pub fn squared_l2(&self, other: &Vector) -> f32 {
        crate::simd::squared_l2_simd(&self.data, &other.data)
    }

    /// Scale to unit length in place; vectors without signal stay zero.
    #[inline]
    pub fn normalize(&mut self) {
        let norm = self.norm();
        if norm > f32::EPSILON && norm.is_finite() {
            let inv_norm = 1.0 / norm;
            for x in &mut self.data {
                *x *= inv_norm;
            }
        } else {
            self.data.iter_mut().for_each(|x| *x = 0.0);
        }
    }

    #[inline]
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut v = self.clone();
        v.normalize();
        v
    }

    /// Build a unit vector straight from raw components.
    #[inline]
    #[must_use]
    pub fn unit(data: Vec<f32>) -> Self {
        let mut v = Self::new(data);
        v.normalize();
        v
    }

    /// Concatenate several vectors and re-normalize the result.
    #[must_use]
    pub fn concat_normalized<'a, I>(parts: I) -> Self
    where
        I: IntoIterator<Item = &'a Vector>,
    {
        let mut data = Vec::new();
        for part in parts {
            data.extend_from_slice(part.as_slice());
        }
        Self::unit(data)
    }
}

impl From<Vec<f32>> for Vector {
    fn from(data: Vec<f32>) -> Self {
        Self::new(data)
    }
}
