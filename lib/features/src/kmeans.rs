//! Seeded k-means over RGB samples for dominant-color extraction.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub type Sample = [f64; 3];

#[derive(Debug, Clone)]
pub struct KMeansParams {
    pub k: usize,
    pub restarts: usize,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub seed: u64,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            k: 5,
            restarts: 10,
            max_iterations: 300,
            tolerance: 1e-4,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Clustering {
    pub centers: Vec<Sample>,
    pub sizes: Vec<usize>,
    pub inertia: f64,
}

impl Clustering {
    /// Centers ordered by cluster size, largest first. Ties keep center order.
    #[must_use]
    pub fn centers_by_size(&self) -> Vec<Sample> {
        let mut order: Vec<usize> = (0..self.centers.len()).collect();
        order.sort_by(|&a, &b| self.sizes[b].cmp(&self.sizes[a]).then(a.cmp(&b)));
        order.into_iter().map(|i| self.centers[i]).collect()
    }
}

#[inline]
fn sq_dist(a: &Sample, b: &Sample) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

fn nearest(centers: &[Sample], p: &Sample) -> (usize, f64) {
    centers
        .iter()
        .enumerate()
        .map(|(i, c)| (i, sq_dist(c, p)))
        .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
}

fn plus_plus_init(samples: &[Sample], k: usize, rng: &mut StdRng) -> Vec<Sample> {
    let mut centers = Vec::with_capacity(k);
    centers.push(samples[rng.random_range(0..samples.len())]);
    let mut dist: Vec<f64> = samples.iter().map(|p| sq_dist(&centers[0], p)).collect();

    while centers.len() < k {
        let total: f64 = dist.iter().sum();
        let pick = if total <= 0.0 {
            rng.random_range(0..samples.len())
        } else {
            let mut target = rng.random::<f64>() * total;
            let mut chosen = samples.len() - 1;
            for (i, d) in dist.iter().enumerate() {
                if target < *d {
                    chosen = i;
                    break;
                }
                target -= d;
            }
            chosen
        };
        let c = samples[pick];
        for (d, p) in dist.iter_mut().zip(samples) {
            *d = d.min(sq_dist(&c, p));
        }
        centers.push(c);
    }
    centers
}

fn lloyd(samples: &[Sample], mut centers: Vec<Sample>, params: &KMeansParams) -> Clustering {
    let k = centers.len();
    let mut labels = vec![0usize; samples.len()];

    for _ in 0..params.max_iterations {
        for (label, p) in labels.iter_mut().zip(samples) {
            *label = nearest(&centers, p).0;
        }

        let mut sums = vec![[0.0f64; 3]; k];
        let mut counts = vec![0usize; k];
        for (&label, p) in labels.iter().zip(samples) {
            for c in 0..3 {
                sums[label][c] += p[c];
            }
            counts[label] += 1;
        }

        let mut shift = 0.0;
        for i in 0..k {
            if counts[i] == 0 {
                continue;
            }
            let updated = sums[i].map(|s| s / counts[i] as f64);
            shift += sq_dist(&updated, &centers[i]);
            centers[i] = updated;
        }
        if shift <= params.tolerance {
            break;
        }
    }

    let mut sizes = vec![0usize; k];
    let mut inertia = 0.0;
    for p in samples {
        let (label, d) = nearest(&centers, p);
        sizes[label] += 1;
        inertia += d;
    }
    Clustering {
        centers,
        sizes,
        inertia,
    }
}

/// Best of `params.restarts` k-means++ runs by inertia. Returns `None` when
/// there are fewer samples than clusters.
#[must_use]
pub fn kmeans(samples: &[Sample], params: &KMeansParams) -> Option<Clustering> {
    if params.k == 0 || samples.len() < params.k {
        return None;
    }
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut best: Option<Clustering> = None;
    for _ in 0..params.restarts.max(1) {
        let init = plus_plus_init(samples, params.k, &mut rng);
        let run = lloyd(samples, init, params);
        if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
            best = Some(run);
        }
    }
    best
}
