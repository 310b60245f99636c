//! Per-feature similarity functions. All return a score in [0, 1] where 1
//! means identical.

use craftx_core::Vector;

/// Cosine similarity of unit vectors mapped from [-1, 1] onto [0, 1].
///
/// Two zero vectors (no signal in either image) count as identical; a zero
/// vector against a non-zero one scores the neutral 0.5.
#[must_use]
pub fn cosine_similarity01(a: &Vector, b: &Vector) -> f32 {
    let a_zero = a.norm() <= f32::EPSILON;
    let b_zero = b.norm() <= f32::EPSILON;
    if a_zero && b_zero && a.dim() == b.dim() {
        return 1.0;
    }
    ((a.cosine_similarity(b) + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Map a squared L2 distance between unit vectors back onto the cosine
/// scale: `cos = 1 - d / 2`, then `(cos + 1) / 2`.
#[must_use]
pub fn squared_l2_to_similarity01(distance: f32) -> f32 {
    let cos = (1.0 - distance / 2.0).clamp(-1.0, 1.0);
    (cos + 1.0) / 2.0
}

/// Bhattacharyya coefficient: sum of sqrt(p_i * q_i). Negative entries are
/// treated as zero; distributions of different length score 0.
#[must_use]
pub fn bhattacharyya(p: &[f32], q: &[f32]) -> f32 {
    if p.len() != q.len() {
        return 0.0;
    }
    p.iter()
        .zip(q)
        .map(|(a, b)| (a.max(0.0) * b.max(0.0)).sqrt())
        .sum::<f32>()
        .clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_mapping() {
        let a = Vector::unit(vec![1.0, 0.0]);
        let b = Vector::unit(vec![0.0, 1.0]);
        let c = Vector::unit(vec![-1.0, 0.0]);
        assert!((cosine_similarity01(&a, &a) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity01(&a, &b) - 0.5).abs() < 1e-6);
        assert!(cosine_similarity01(&a, &c).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vectors() {
        let z = Vector::zeros(3);
        let u = Vector::unit(vec![1.0, 2.0, 2.0]);
        assert_eq!(cosine_similarity01(&z, &z), 1.0);
        assert!((cosine_similarity01(&z, &u) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_distance_mapping_matches_cosine() {
        let a = Vector::unit(vec![1.0, 2.0, 3.0]);
        let b = Vector::unit(vec![3.0, 1.0, 0.5]);
        let expected = cosine_similarity01(&a, &b);
        assert!((squared_l2_to_similarity01(a.squared_l2(&b)) - expected).abs() < 1e-5);
        assert!((squared_l2_to_similarity01(0.0) - 1.0).abs() < 1e-6);
        assert!(squared_l2_to_similarity01(4.0).abs() < 1e-6);
    }

    #[test]
    fn test_bhattacharyya() {
        let p = [0.5, 0.5, 0.0];
        let q = [0.0, 0.0, 1.0];
        assert!((bhattacharyya(&p, &p) - 1.0).abs() < 1e-6);
        assert_eq!(bhattacharyya(&p, &q), 0.0);
        assert_eq!(bhattacharyya(&p, &[1.0]), 0.0);
    }
}
