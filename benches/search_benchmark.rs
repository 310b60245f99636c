// Benchmarks for the retrieval hot paths: index search, re-ranking, extraction
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use craftx_core::{CandidateIndex, FeatureBundle, IndexConfig, IndexKind, ProductId, Vector};
use craftx_features::{FeaturePipeline, ImageNormalizer, ThumbnailEncoder};
use craftx_similarity::{RerankCandidate, Reranker};
use image::{Rgb, RgbImage};
use rand::prelude::*;
use std::sync::Arc;

const DIM: usize = 192;

fn random_vector(rng: &mut StdRng, dim: usize) -> Vector {
    Vector::unit((0..dim).map(|_| rng.random_range(-1.0f32..1.0f32)).collect())
}

fn build_index(kind: IndexKind, size: usize) -> CandidateIndex {
    let mut rng = StdRng::seed_from_u64(7);
    let mut index = CandidateIndex::new(IndexConfig {
        kind,
        hnsw_threshold: 1000,
        ..Default::default()
    });
    for i in 0..size {
        index
            .insert(ProductId::new(format!("p{}", i)), random_vector(&mut rng, DIM))
            .unwrap();
    }
    index
}

fn benchmark_index_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_search");
    let mut rng = StdRng::seed_from_u64(11);
    let query = random_vector(&mut rng, DIM);

    for size in [1_000, 10_000].iter() {
        for kind in [IndexKind::Flat, IndexKind::Hnsw] {
            let index = build_index(kind, *size);
            let name = format!("{:?}", kind).to_lowercase();
            group.bench_with_input(BenchmarkId::new(name, size), size, |b, _| {
                b.iter(|| black_box(index.search(black_box(&query), 15)));
            });
        }
    }

    group.finish();
}

fn sample_image(seed: u8) -> RgbImage {
    RgbImage::from_fn(384, 288, |x, y| {
        let ring = ((x as i32 - 192).pow(2) + (y as i32 - 144).pow(2)) / 900;
        Rgb([
            (ring as u8).wrapping_mul(37).wrapping_add(seed),
            ((x / 12 + y / 12) % 2 * 180) as u8,
            (y % 256) as u8,
        ])
    })
}

fn benchmark_extraction(c: &mut Criterion) {
    let pipeline = FeaturePipeline::new(ImageNormalizer::default(), Arc::new(ThumbnailEncoder::default()));
    let image = sample_image(3);

    c.bench_function("extract_all_384", |b| {
        b.iter(|| black_box(pipeline.extract_all(black_box(&image)).unwrap()));
    });
}

fn benchmark_rerank(c: &mut Criterion) {
    let pipeline = FeaturePipeline::new(ImageNormalizer::new(128), Arc::new(ThumbnailEncoder::default()));
    let bundles: Vec<FeatureBundle> = (0..15u8)
        .map(|i| {
            let image = pipeline.normalizer().resize(&sample_image(i * 13));
            pipeline.extract_all(&image).unwrap()
        })
        .collect();
    let query = bundles[0].clone();
    let reranker = Reranker::default();

    c.bench_function("rerank_15_candidates", |b| {
        b.iter(|| {
            let candidates = bundles
                .iter()
                .enumerate()
                .map(|(i, bundle)| RerankCandidate {
                    id: ProductId::new(format!("c{}", i)),
                    distance: i as f32 * 0.05,
                    bundle: Some(bundle.clone()),
                })
                .collect();
            black_box(reranker.rerank(black_box(&query), candidates))
        });
    });
}

criterion_group!(benches, benchmark_index_search, benchmark_extraction, benchmark_rerank);
criterion_main!(benches);
