//! Search tests across index types, query counts and partitions.

use kestreldb::{CreateIndex, Entities, ErrorKind, SearchHit, SearchParams};
use serde_json::json;

use crate::fixtures::{float_vectors, TestContext};

fn assert_sorted(hits: &[SearchHit]) {
    for pair in hits.windows(2) {
        assert!(pair[0].distance <= pair[1].distance, "hits out of order: {pair:?}");
    }
}

// ============================================================================
// Query Counts
// ============================================================================

#[test]
fn test_search_query_counts() {
    let ctx = TestContext::new();
    let name = ctx.float_collection("nq", 32, None);
    let vectors = float_vectors(2000, 32, 11);
    ctx.load_float(&name, vectors.clone(), None);
    ctx.session
        .create_index(&name, "float_vector", CreateIndex::new(json!({"index_type": "IVF_FLAT", "nlist": 16})))
        .expect("failed to build index");

    for nq in [1, 10, 1500] {
        let queries: Vec<Vec<f32>> = vectors.iter().take(nq).cloned().collect();
        let query = kestreldb::SearchQuery::float("float_vector", queries, 10);
        let results = ctx.session.search(&name, &query).expect("search failed");
        assert_eq!(results.len(), nq);
        for (i, hits) in results.iter().enumerate() {
            assert_eq!(hits.len(), 10);
            assert_sorted(hits);
            // ids are assigned from 1 in insert order
            assert_eq!(hits[0].id.as_u64(), i as u64 + 1, "query {i} should find itself");
            assert!(hits[0].distance.abs() < 1e-4);
        }
    }
}

#[test]
fn test_search_every_index_type_finds_neighbors() {
    let ctx = TestContext::new();
    let name = ctx.float_collection("types", 16, None);
    let vectors = float_vectors(1000, 16, 12);
    ctx.load_float(&name, vectors.clone(), None);

    let specs = [
        json!({"index_type": "FLAT"}),
        json!({"index_type": "IVF_FLAT", "nlist": 8}),
        json!({"index_type": "IVF_SQ8", "nlist": 8}),
        json!({"index_type": "IVF_PQ", "nlist": 8, "m": 4}),
        json!({"index_type": "HNSW", "M": 16, "efConstruction": 100}),
    ];
    let queries: Vec<Vec<f32>> = vectors.iter().take(20).cloned().collect();
    for params in specs {
        ctx.session
            .create_index(&name, "float_vector", CreateIndex::new(params.clone()))
            .expect("failed to build index");
        let query = kestreldb::SearchQuery::float("float_vector", queries.clone(), 5)
            .with_params_json(&json!({"nprobe": 8, "ef": 64}))
            .expect("valid params");
        let results = ctx.session.search(&name, &query).expect("search failed");
        assert_eq!(results.len(), 20);
        let found_self = results
            .iter()
            .enumerate()
            .filter(|(i, hits)| hits.iter().any(|h| h.id.as_u64() == *i as u64 + 1))
            .count();
        assert!(found_self >= 16, "{params}: only {found_self}/20 queries found themselves");
        for hits in &results {
            assert_eq!(hits.len(), 5);
            assert_sorted(hits);
        }
    }
}

#[test]
fn test_search_small_nprobe_returns_full_top_k() {
    let ctx = TestContext::new();
    let name = ctx.float_collection("nprobe", 16, None);
    let vectors = float_vectors(2000, 16, 15);
    ctx.load_float(&name, vectors.clone(), None);
    ctx.session
        .create_index(&name, "float_vector", CreateIndex::new(json!({"index_type": "IVF_FLAT", "nlist": 512})))
        .expect("failed to build index");

    let queries: Vec<Vec<f32>> = vectors.iter().take(20).cloned().collect();
    let query = kestreldb::SearchQuery::float("float_vector", queries, 10)
        .with_params_json(&json!({"nprobe": 1}))
        .expect("valid params");
    let results = ctx.session.search(&name, &query).expect("search failed");
    assert_eq!(results.len(), 20);
    for hits in &results {
        assert_eq!(hits.len(), 10);
        assert_sorted(hits);
    }
}

#[test]
fn test_search_top_k_larger_than_collection() {
    let ctx = TestContext::new();
    let name = ctx.float_collection("small", 4, None);
    ctx.load_float(&name, float_vectors(3, 4, 13), None);

    let query = kestreldb::SearchQuery::float("float_vector", vec![vec![0.5; 4]], 100);
    let results = ctx.session.search(&name, &query).expect("search failed");
    assert_eq!(results[0].len(), 3);
}

#[test]
fn test_search_includes_unflushed_rows() {
    let ctx = TestContext::new();
    let name = ctx.float_collection("growing", 4, None);
    ctx.session
        .insert(&name, Entities::new().float_vectors("float_vector", vec![vec![1.0, 0.0, 0.0, 0.0]]), None)
        .expect("failed to insert");

    let query = kestreldb::SearchQuery::float("float_vector", vec![vec![1.0, 0.0, 0.0, 0.0]], 1);
    let results = ctx.session.search(&name, &query).expect("search failed");
    assert_eq!(results[0].len(), 1);
}

// ============================================================================
// Metrics and Parameters
// ============================================================================

#[test]
fn test_search_inner_product_override() {
    let ctx = TestContext::new();
    let name = ctx.float_collection("ip", 2, None);
    ctx.load_float(&name, vec![vec![1.0, 0.0], vec![10.0, 0.0], vec![0.0, 1.0]], None);

    let query = kestreldb::SearchQuery::float("float_vector", vec![vec![1.0, 0.0]], 3)
        .with_params(SearchParams { metric: Some(kestreldb::Metric::IP), ..SearchParams::default() });
    let hits = &ctx.session.search(&name, &query).expect("search failed")[0];
    // larger inner product ranks first and is reported as the raw product
    assert_eq!(hits[0].id.as_u64(), 2);
    assert!((hits[0].distance - 10.0).abs() < 1e-4);
    assert_eq!(hits[2].id.as_u64(), 3);
}

#[test]
fn test_search_invalid_requests() {
    let ctx = TestContext::new();
    let name = ctx.float_collection("bad_search", 4, None);
    ctx.load_float(&name, float_vectors(10, 4, 14), None);

    let kind = |query: kestreldb::SearchQuery| ctx.session.search(&name, &query).unwrap_err().kind();
    assert_eq!(kind(kestreldb::SearchQuery::float("float_vector", vec![vec![0.0; 4]], 0)), ErrorKind::InvalidParameter);
    assert_eq!(
        kind(kestreldb::SearchQuery::float("float_vector", vec![vec![0.0; 4]], 16385)),
        ErrorKind::InvalidParameter
    );
    assert_eq!(kind(kestreldb::SearchQuery::float("float_vector", vec![vec![0.0; 3]], 1)), ErrorKind::DimensionMismatch);
    assert_eq!(kind(kestreldb::SearchQuery::binary("float_vector", vec![vec![0; 4]], 1)), ErrorKind::InvalidVector);
    assert_eq!(kind(kestreldb::SearchQuery::float("other", vec![vec![0.0; 4]], 1)), ErrorKind::FieldNotFound);
    assert_eq!(
        ctx.session
            .search("missing_collection", &kestreldb::SearchQuery::float("float_vector", vec![vec![0.0; 4]], 1))
            .unwrap_err()
            .kind(),
        ErrorKind::CollectionNotFound
    );
}

// ============================================================================
// Partitions
// ============================================================================

#[test]
fn test_search_partition_filter() {
    let ctx = TestContext::new();
    let name = ctx.float_collection("parts", 2, None);
    ctx.session.create_partition(&name, "2024-01").expect("failed to create partition");
    ctx.load_float(&name, vec![vec![0.0, 0.0]], None);
    ctx.load_float(&name, vec![vec![5.0, 5.0]], Some("2024-01"));

    let query = kestreldb::SearchQuery::float("float_vector", vec![vec![0.0, 0.0]], 2);
    assert_eq!(ctx.session.search(&name, &query).expect("search")[0].len(), 2);

    let only = query.clone().with_partitions(["2024-01"]);
    let hits = &ctx.session.search(&name, &only).expect("search")[0];
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id.as_u64(), 2);

    let stats = ctx.session.get_collection_stats(&name).expect("stats");
    assert_eq!(stats.partition("2024-01").map(|p| p.row_count), Some(1));
    assert_eq!(stats.partition("_default").map(|p| p.row_count), Some(1));

    ctx.session.drop_partition(&name, "2024-01").expect("failed to drop partition");
    assert_eq!(ctx.session.search(&name, &only).unwrap_err().kind(), ErrorKind::PartitionNotFound);
    assert_eq!(ctx.session.count_entities(&name).expect("count"), 1);
    assert_eq!(ctx.session.drop_partition(&name, "_default").unwrap_err().kind(), ErrorKind::InvalidParameter);
}
