// Integration tests for CraftX
use craftx_core::{Error, FeatureBundle, FeatureKind, Label, Material, ObjectType, Outlet, Prediction, ProductId, ProductMetadata, RelationshipKind, Vector};
use craftx_features::ThumbnailEncoder;
use craftx_storage::{CatalogConfig, CatalogService, IndexFile};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

fn config(dir: &Path) -> CatalogConfig {
    let mut config = CatalogConfig::default().with_data_dir(dir);
    config.normalizer.target_edge = 96;
    config.encoder.grid = 4;
    config.storage.lmdb_map_size = 32 * 1024 * 1024;
    config
}

fn open(dir: &Path) -> CatalogService {
    CatalogService::open_default(config(dir)).unwrap()
}

fn png(img: RgbImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// A filled disc of `fg` on a `bg` background.
fn disc(w: u32, h: u32, fg: [u8; 3], bg: [u8; 3]) -> Vec<u8> {
    let (cx, cy, r) = (w as f32 / 2.0, h as f32 / 2.0, w.min(h) as f32 / 3.0);
    png(RgbImage::from_fn(w, h, |x, y| {
        let (dx, dy) = (x as f32 - cx, y as f32 - cy);
        Rgb(if dx * dx + dy * dy <= r * r { fg } else { bg })
    }))
}

/// Vertical stripes of width `period / 2`.
fn stripes(w: u32, h: u32, period: u32, a: [u8; 3], b: [u8; 3]) -> Vec<u8> {
    png(RgbImage::from_fn(w, h, |x, _| Rgb(if x % period < period / 2 { a } else { b })))
}

fn gradient(w: u32, h: u32, tint: u8) -> Vec<u8> {
    png(RgbImage::from_fn(w, h, |x, y| {
        Rgb([(x * 255 / w) as u8, (y * 255 / h) as u8, tint])
    }))
}

fn catalog_images() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("bowl-red", disc(160, 120, [200, 40, 30], [240, 240, 230])),
        ("bowl-blue", disc(140, 140, [30, 60, 200], [235, 235, 235])),
        ("cloth-ochre", stripes(150, 110, 12, [200, 150, 40], [60, 40, 20])),
        ("cloth-green", stripes(120, 160, 20, [40, 150, 60], [230, 230, 200])),
        ("panel-warm", gradient(130, 100, 40)),
        ("panel-cool", gradient(100, 130, 220)),
    ]
}

fn metadata(id: &str) -> ProductMetadata {
    ProductMetadata::new(id.replace('-', " "), format!("Handmade {}", id))
}

fn index_all(catalog: &CatalogService) {
    for (id, bytes) in catalog_images() {
        catalog.index_product(&bytes, ProductId::from(id), metadata(id)).unwrap();
    }
}

#[test]
fn test_empty_catalog_returns_no_results() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = open(dir.path());

    let response = catalog.search(&disc(64, 64, [10, 10, 10], [250, 250, 250]), 5).unwrap();
    assert!(response.results.is_empty());
    assert_eq!(response.total_matches, 0);
    assert!(response.query_features.is_none());
    assert!(!response.query_id.is_empty());
}

#[test]
fn test_undecodable_image_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = open(dir.path());

    assert!(matches!(catalog.search(b"definitely not an image", 5), Err(Error::Decode(_))));
    assert!(matches!(
        catalog.index_product(b"", ProductId::from("x"), metadata("x")),
        Err(Error::Decode(_))
    ));
    assert!(catalog.is_empty());
}

#[test]
fn test_identical_images_match_on_every_feature() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = open(dir.path());
    let image = stripes(140, 100, 16, [180, 90, 30], [20, 20, 60]);

    catalog.index_product(&image, ProductId::from("twin-b"), metadata("twin-b")).unwrap();
    catalog.index_product(&image, ProductId::from("twin-a"), metadata("twin-a")).unwrap();
    catalog
        .index_product(&disc(120, 120, [20, 200, 20], [10, 10, 10]), ProductId::from("other"), metadata("other"))
        .unwrap();

    let response = catalog.search(&image, 3).unwrap();
    assert_eq!(response.total_matches, 3);
    assert_eq!(response.results[0].product_id.as_str(), "twin-a");
    assert_eq!(response.results[1].product_id.as_str(), "twin-b");

    for hit in &response.results[..2] {
        assert!(!hit.embedding_only);
        assert!((hit.score - 1.0).abs() < 1e-4, "score {}", hit.score);
        for kind in FeatureKind::ALL {
            let s = hit.feature_scores[&kind];
            assert!((s - 1.0).abs() < 1e-4, "{} scored {}", kind, s);
        }
    }
    assert!(response.results[2].score < response.results[0].score);

    let summary = response.query_features.unwrap();
    assert!(summary.palette_size > 0);
}

#[test]
fn test_results_sorted_and_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = open(dir.path());
    index_all(&catalog);

    let response = catalog.search(&disc(160, 120, [200, 40, 30], [240, 240, 230]), 4).unwrap();
    assert_eq!(response.results.len(), 4);
    assert_eq!(response.total_matches, 4);
    for (i, hit) in response.results.iter().enumerate() {
        assert_eq!(hit.rank, i + 1);
        assert!((0.0..=1.0).contains(&hit.score));
        assert!(!hit.title.is_empty());
    }
    for pair in response.results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    assert_eq!(response.results[0].product_id.as_str(), "bowl-red");

    let everything = catalog.search(&gradient(100, 100, 100), 50).unwrap();
    assert_eq!(everything.results.len(), 6);

    let candidate_k = catalog.config().retrieval.candidate_k(5, catalog.len());
    assert!(candidate_k >= 5 && candidate_k <= catalog.len());
}

#[test]
fn test_per_request_weight_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = open(dir.path());
    index_all(&catalog);

    let query = stripes(150, 110, 12, [200, 150, 40], [60, 40, 20]);
    let overrides = [(FeatureKind::Embedding, 1.0)].into_iter().collect();
    let response = catalog.search_with_weights(&query, 3, &overrides).unwrap();
    assert_eq!(response.results[0].product_id.as_str(), "cloth-ochre");

    let zeroed = [(FeatureKind::Geometric, 0.0), (FeatureKind::Color, 0.0)]
        .into_iter()
        .collect();
    let response = catalog.search_with_weights(&query, 3, &zeroed).unwrap();
    assert!(!response.results[0].feature_scores.is_empty());
}

#[test]
fn test_duplicate_product_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = open(dir.path());
    let image = gradient(80, 80, 0);
    catalog.index_product(&image, ProductId::from("p"), metadata("p")).unwrap();
    assert!(matches!(
        catalog.index_product(&image, ProductId::from("p"), metadata("p")),
        Err(Error::ProductExists(_))
    ));
    assert_eq!(catalog.len(), 1);
}

fn synthetic(embedding: Vec<f32>, material: Material, object_type: ObjectType) -> FeatureBundle {
    let one_hot = |i: usize| {
        let mut scores = vec![0.0; 6];
        scores[i] = 1.0;
        scores
    };
    let m = Material::ALL.iter().position(|x| *x == material).unwrap();
    let t = ObjectType::ALL.iter().position(|x| *x == object_type).unwrap();
    FeatureBundle {
        material: Some(Prediction::from_scores(&one_hot(m))),
        object_type: Some(Prediction::from_scores(&one_hot(t))),
        embedding: Some(Vector::unit(embedding)),
        ..Default::default()
    }
}

fn graph_catalog(dir: &Path) -> CatalogService {
    let catalog = CatalogService::open(config(dir), Arc::new(ThumbnailEncoder::new(1))).unwrap();
    for (id, e, m, t) in [
        ("A", vec![1.0, 0.0, 0.0], Material::Wood, ObjectType::Mask),
        ("B", vec![0.0, 1.0, 0.0], Material::Wood, ObjectType::Pottery),
        ("C", vec![0.0, 0.0, 1.0], Material::Clay, ObjectType::Mask),
        ("D", vec![1.0, 1.0, 0.0], Material::Metal, ObjectType::Jewelry),
    ] {
        catalog
            .index_extracted(ProductId::from(id), synthetic(e, m, t), metadata(id))
            .unwrap();
    }
    catalog.build_graph().unwrap();
    catalog
}

#[test]
fn test_related_products_by_shared_attributes() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = graph_catalog(dir.path());

    let related = catalog.get_related(&ProductId::from("A"), 10);
    let summary: Vec<(&str, RelationshipKind, f32)> = related
        .iter()
        .map(|r| (r.product_id.as_str(), r.relationship, r.weight))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("B", RelationshipKind::SameMaterial, 0.8),
            ("C", RelationshipKind::SameType, 0.7),
        ]
    );
    assert!(catalog.get_related(&ProductId::from("D"), 10).is_empty());
    assert!(catalog.get_related(&ProductId::from("nobody"), 10).is_empty());
    assert_eq!(catalog.get_related(&ProductId::from("A"), 1).len(), 1);
}

#[test]
fn test_relationships_are_symmetric() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = graph_catalog(dir.path());
    catalog
        .add_relationship(&ProductId::from("B"), &ProductId::from("D"), RelationshipKind::SimilarTo, 0.55)
        .unwrap();

    let ids: Vec<ProductId> = ["A", "B", "C", "D"].into_iter().map(ProductId::from).collect();
    for a in &ids {
        for r in catalog.get_related(a, 10) {
            let back = catalog.get_related(&r.product_id, 10);
            let mirrored = back.iter().find(|x| &x.product_id == a).unwrap();
            assert_eq!(mirrored.weight, r.weight);
        }
    }
}

#[test]
fn test_outlet_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = graph_catalog(dir.path());
    catalog
        .add_outlet(Outlet {
            outlet_id: "shop1".into(),
            name: "Riverside crafts".into(),
            location: "Kumasi".into(),
            coordinates: Some((6.69, -1.62)),
            products: vec!["A".into(), "B".into()],
        })
        .unwrap();

    let outlets = catalog.get_outlets(&ProductId::from("A"));
    assert_eq!(outlets.len(), 1);
    assert_eq!(outlets[0].outlet_id, "shop1");
    assert!(catalog.get_outlets(&ProductId::from("Z")).is_empty());

    let batch = catalog.outlets_for_products(&[ProductId::from("B"), ProductId::from("C")]);
    assert_eq!(batch[&ProductId::from("B")].len(), 1);
    assert!(batch[&ProductId::from("C")].is_empty());

    let stats = catalog.graph_statistics();
    assert_eq!(stats.total_products, 4);
    assert_eq!(stats.total_outlets, 1);
    assert_eq!(stats.products_with_outlets, 2);
}

#[test]
fn test_reopen_restores_index_store_and_graph() {
    let dir = tempfile::tempdir().unwrap();
    let query = disc(130, 110, [40, 70, 190], [230, 230, 230]);

    let (before, stats) = {
        let catalog = open(dir.path());
        index_all(&catalog);
        catalog.build_graph().unwrap();
        catalog
            .add_outlet(Outlet {
                outlet_id: "stall-9".into(),
                name: "Stall 9".into(),
                location: "Marrakesh".into(),
                coordinates: None,
                products: vec!["bowl-blue".into()],
            })
            .unwrap();
        (catalog.search(&query, 4).unwrap(), catalog.graph_statistics())
    };

    let catalog = open(dir.path());
    assert_eq!(catalog.len(), 6);
    assert_eq!(catalog.graph_statistics(), stats);
    assert_eq!(catalog.get_outlets(&ProductId::from("bowl-blue"))[0].outlet_id, "stall-9");

    let after = catalog.search(&query, 4).unwrap();
    assert_eq!(before.results.len(), after.results.len());
    for (x, y) in before.results.iter().zip(&after.results) {
        assert_eq!(x.product_id, y.product_id);
        assert!((x.score - y.score).abs() < 1e-5);
        assert_eq!(x.title, y.title);
    }
}

#[test]
fn test_cold_store_ranks_by_embedding() {
    let dir = tempfile::tempdir().unwrap();
    let near = ProductId::from("near");
    let far = ProductId::from("far");
    // With a 1x1 thumbnail the embedding is the centered mean color.
    let near_vec = Vector::unit(vec![0.5, -0.5, -0.5]);
    let far_vec = Vector::unit(vec![-0.5, -0.5, 0.5]);
    IndexFile::new(dir.path().join("index.bin"))
        .save(vec![(&far, far_vec.as_slice()), (&near, near_vec.as_slice())])
        .unwrap();

    let catalog = CatalogService::open(config(dir.path()), Arc::new(ThumbnailEncoder::new(1))).unwrap();
    assert_eq!(catalog.len(), 2);

    let red = png(RgbImage::from_pixel(50, 50, Rgb([255, 0, 0])));
    let response = catalog.search(&red, 5).unwrap();
    assert_eq!(response.total_matches, 2);
    assert!(response.query_features.is_none());
    assert_eq!(response.results[0].product_id, near);
    assert!(response.results.iter().all(|hit| hit.embedding_only));
    assert!(response.results[0].score > response.results[1].score);
}

#[test]
fn test_metadata_update_shows_in_results() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = open(dir.path());
    let image = disc(100, 100, [120, 60, 20], [250, 250, 250]);
    catalog.index_product(&image, ProductId::from("vase"), metadata("vase")).unwrap();
    catalog
        .update_metadata(&ProductId::from("vase"), ProductMetadata::new("Terracotta vase", "Wheel thrown"))
        .unwrap();

    let hit = &catalog.search(&image, 1).unwrap().results[0];
    assert_eq!(hit.title, "Terracotta vase");
    assert_eq!(hit.description, "Wheel thrown");
}

#[test]
fn test_extraction_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = open(dir.path());
    let bytes = stripes(120, 90, 10, [90, 40, 10], [200, 180, 150]);
    let first = catalog.pipeline().extract_bytes(&bytes).unwrap();
    let second = catalog.pipeline().extract_bytes(&bytes).unwrap();
    assert_eq!(first, second);
    for kind in FeatureKind::ALL {
        if let Some(v) = first.vector(kind) {
            let norm = v.norm();
            assert!(norm < 1e-6 || (norm - 1.0).abs() < 1e-4, "{} norm {}", kind, norm);
        }
    }
}
