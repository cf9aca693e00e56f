//! Binary vector tests.

use kestreldb::{CollectionSchema, CreateIndex, Entities, ErrorKind, IndexType, Metric, SearchQuery};
use serde_json::json;

use crate::fixtures::{binary_vectors, unique_collection_name, TestContext};

fn binary_collection(ctx: &TestContext, metric: Metric) -> String {
    let name = unique_collection_name("binary");
    let schema = CollectionSchema::new(&name)
        .expect("valid name")
        .binary_field("binary_vector", 64, metric)
        .expect("valid field");
    ctx.session.create_collection(schema).expect("failed to create collection");
    name
}

#[test]
fn test_bin_flat_jaccard_search() {
    let ctx = TestContext::new();
    let name = binary_collection(&ctx, Metric::Jaccard);
    let vectors = binary_vectors(500, 64, 21);
    ctx.session
        .insert(&name, Entities::new().binary_vectors("binary_vector", vectors.clone()), None)
        .expect("failed to insert");
    ctx.session.flush(&[name.as_str()]).expect("failed to flush");

    let outcome = ctx
        .session
        .create_index(&name, "binary_vector", CreateIndex::new(json!({"index_type": "BIN_FLAT"})))
        .expect("failed to build index");
    assert_eq!(outcome.index_type, IndexType::BinFlat);
    // BIN_FLAT searches the raw segment and attaches nothing
    let stats = ctx.session.get_collection_stats(&name).expect("stats");
    assert!(stats.segments().all(|s| s.index_name.is_none()));

    let queries: Vec<Vec<u8>> = vectors.iter().take(5).cloned().collect();
    let results = ctx.session.search(&name, &SearchQuery::binary("binary_vector", queries, 3)).expect("search");
    for (i, hits) in results.iter().enumerate() {
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].id.as_u64(), i as u64 + 1);
        assert!(hits[0].distance.abs() < f32::EPSILON);
        assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.distance)));
    }
}

#[test]
fn test_bin_ivf_flat_search() {
    let ctx = TestContext::new();
    let name = binary_collection(&ctx, Metric::Hamming);
    let vectors = binary_vectors(400, 64, 22);
    ctx.session
        .insert(&name, Entities::new().binary_vectors("binary_vector", vectors.clone()), None)
        .expect("failed to insert");

    ctx.session
        .create_index(&name, "binary_vector", CreateIndex::new(json!({"index_type": "BIN_IVF_FLAT", "nlist": 4})))
        .expect("failed to build index");
    let stats = ctx.session.get_collection_stats(&name).expect("stats");
    assert!(stats.segments().all(|s| s.index_name.as_deref() == Some("BIN_IVF_FLAT")));

    let query = SearchQuery::binary("binary_vector", vec![vectors[7].clone()], 1)
        .with_params_json(&json!({"nprobe": 4}))
        .expect("valid params");
    let hits = &ctx.session.search(&name, &query).expect("search")[0];
    assert_eq!(hits[0].id.as_u64(), 8);
    assert!(hits[0].distance.abs() < f32::EPSILON);
}

#[test]
fn test_binary_rejects_float_indexes() {
    let ctx = TestContext::new();
    let name = binary_collection(&ctx, Metric::Tanimoto);

    for params in [json!({"index_type": "IVF_FLAT", "nlist": 4}), json!({"index_type": "HNSW"})] {
        let err = ctx.session.create_index(&name, "binary_vector", CreateIndex::new(params)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedIndex);
    }
    let err = ctx
        .session
        .insert(&name, Entities::new().float_vectors("binary_vector", vec![vec![0.0; 64]]), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidVector);
    let err = ctx
        .session
        .insert(&name, Entities::new().binary_vectors("binary_vector", vec![vec![0; 7]]), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
    assert_eq!(ctx.session.count_entities(&name).expect("count"), 0);
}
