//! Index build and drop tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use kestreldb::{Config, CreateIndex, ErrorKind, IndexType};
use serde_json::json;

use crate::fixtures::{float_vectors, TestContext};

/// Poll stats until every segment reports `index_name` or `deadline` passes.
fn wait_until_indexed(ctx: &TestContext, collection: &str, index_name: &str, deadline: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        let stats = ctx.session.get_collection_stats(collection).expect("failed to get stats");
        if stats.segments().next().is_some() && stats.segments().all(|s| s.index_name.as_deref() == Some(index_name)) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    false
}

// ============================================================================
// Create Index
// ============================================================================

#[test]
fn test_create_index_over_many_segments() {
    let ctx = TestContext::with_config(Config::default().build_workers(2).kmeans_iterations(1));
    let name = ctx.float_collection("ivf", 128, Some(1));
    ctx.load_float(&name, float_vectors(6000, 128, 1), None);

    let outcome = ctx
        .session
        .create_index(&name, "float_vector", CreateIndex::new(json!({"index_type": "IVF_FLAT", "params": {"nlist": 1024}})))
        .expect("failed to build index");
    assert!(outcome.committed);
    assert_eq!(outcome.index_type, IndexType::IvfFlat);

    let stats = ctx.session.get_collection_stats(&name).expect("failed to get stats");
    assert_eq!(stats.row_count, 6000);
    assert!(stats.segments().count() > 1, "1 MiB segments should split 6000 rows");
    assert_eq!(outcome.segments_built, stats.segments().count());
    assert!(stats.segments().all(|s| s.index_name.as_deref() == Some("IVF_FLAT")));

    ctx.session.drop_index(&name, "float_vector", None).expect("failed to drop index");
    let stats = ctx.session.get_collection_stats(&name).expect("failed to get stats");
    assert_eq!(stats.row_count, 6000);
    assert!(stats.segments().all(|s| s.index_name.is_none()));
    assert!(stats.to_json()["partitions"][0]["segments"][0].get("index_name").is_none());
}

#[test]
fn test_create_index_on_empty_collection() {
    let ctx = TestContext::new();
    let name = ctx.float_collection("empty", 16, None);

    let outcome = ctx
        .session
        .create_index(&name, "float_vector", CreateIndex::new(json!({"index_type": "IVF_SQ8", "nlist": 8})))
        .expect("failed to build index");
    assert_eq!(outcome.segments_built, 0);
    let descriptor = ctx.session.describe_index(&name, "float_vector").expect("failed to describe");
    assert_eq!(descriptor.map(|d| d.spec.index_type), Some(IndexType::IvfSq8));

    ctx.load_float(&name, float_vectors(300, 16, 2), None);
    assert_eq!(ctx.session.get_collection_stats(&name).expect("failed to get stats").row_count, 300);
    assert_eq!(ctx.session.count_entities(&name).expect("failed to count"), 300);

    // flushed segments of an indexed field are built in the background
    assert!(wait_until_indexed(&ctx, &name, "IVF_SQ8", Duration::from_secs(30)));
}

#[test]
fn test_create_index_repeatedly_with_different_types() {
    let ctx = TestContext::new();
    let name = ctx.float_collection("repeat", 16, None);
    ctx.load_float(&name, float_vectors(500, 16, 3), None);

    let specs = [
        json!({"index_type": "FLAT"}),
        json!({"index_type": "IVF_FLAT", "nlist": 16}),
        json!({"index_type": "IVF_SQ8", "nlist": 16}),
        json!({"index_type": "IVF_PQ", "nlist": 16, "m": 4}),
        json!({"index_type": "HNSW", "M": 8, "efConstruction": 32}),
        json!({"index_type": "IVF_FLAT", "nlist": 32}),
    ];
    for params in specs {
        let index_type = params["index_type"].as_str().expect("type").to_string();
        let outcome = ctx
            .session
            .create_index(&name, "float_vector", CreateIndex::new(params))
            .expect("failed to build index");
        assert_eq!(outcome.index_type.as_str(), index_type);

        let descriptor = ctx.session.describe_index(&name, "float_vector").expect("describe").expect("active index");
        assert_eq!(descriptor.index_name.as_str(), index_type);
        let stats = ctx.session.get_collection_stats(&name).expect("failed to get stats");
        assert!(stats.segments().all(|s| s.index_name.as_deref() == Some(index_type.as_str())));
    }
}

#[test]
fn test_named_index_and_drop_by_name() {
    let ctx = TestContext::new();
    let name = ctx.float_collection("named", 8, None);
    ctx.load_float(&name, float_vectors(50, 8, 4), None);

    ctx.session
        .create_index(&name, "float_vector", CreateIndex::named("my_index", json!({"index_type": "FLAT"})))
        .expect("failed to build index");
    ctx.session.drop_index(&name, "float_vector", Some("other_index")).expect("drop other");
    assert!(ctx.session.describe_index(&name, "float_vector").expect("describe").is_some());

    ctx.session.drop_index(&name, "float_vector", Some("my_index")).expect("drop by name");
    assert!(ctx.session.describe_index(&name, "float_vector").expect("describe").is_none());
}

// ============================================================================
// Drop Index
// ============================================================================

#[test]
fn test_drop_index_is_idempotent() {
    let ctx = TestContext::new();
    let name = ctx.float_collection("drop", 8, None);
    ctx.load_float(&name, float_vectors(20, 8, 5), None);

    // never indexed
    ctx.session.drop_index(&name, "float_vector", None).expect("first drop");
    ctx.session.drop_index(&name, "float_vector", None).expect("second drop");
    ctx.session.drop_index(&name, "no_such_field", None).expect("unknown field");
    ctx.session.drop_index(&name, "", None).expect("invalid field name");

    assert_eq!(
        ctx.session.drop_index("no_such_collection", "float_vector", None).unwrap_err().kind(),
        ErrorKind::CollectionNotFound
    );
}

#[test]
fn test_drop_index_cancels_in_flight_build() {
    let ctx = TestContext::with_config(Config::default().build_workers(1));
    let name = ctx.float_collection("cancel", 32, None);
    ctx.load_float(&name, float_vectors(3000, 32, 6), None);

    let handle = ctx
        .session
        .create_index_async(&name, "float_vector", CreateIndex::new(json!({"index_type": "HNSW"})), None)
        .expect("failed to schedule build");
    ctx.session.drop_index(&name, "float_vector", None).expect("failed to drop index");

    // either the build was cancelled or it finished first and was discarded
    let _ = handle.wait();
    assert!(ctx.session.describe_index(&name, "float_vector").expect("describe").is_none());
    let stats = ctx.session.get_collection_stats(&name).expect("failed to get stats");
    assert!(stats.segments().all(|s| s.index_name.is_none()));
}

// ============================================================================
// Asynchronous Builds
// ============================================================================

#[test]
fn test_create_index_async_wait() {
    let ctx = TestContext::new();
    let name = ctx.float_collection("async", 16, None);
    ctx.load_float(&name, float_vectors(400, 16, 7), None);

    let handle = ctx
        .session
        .create_index_async(&name, "float_vector", CreateIndex::new(json!({"index_type": "IVF_FLAT", "nlist": 8})), None)
        .expect("failed to schedule build");
    let outcome = handle.wait().expect("build failed");
    assert!(handle.is_finished());
    assert_eq!(outcome.segments_built, 1);
    assert!(matches!(handle.try_result(), Some(Ok(ref o)) if *o == outcome));

    let stats = ctx.session.get_collection_stats(&name).expect("failed to get stats");
    assert!(stats.segments().all(|s| s.index_name.as_deref() == Some("IVF_FLAT")));
}

#[test]
fn test_segment_flushed_during_async_build_gets_indexed() {
    let ctx = TestContext::new();
    let name = ctx.float_collection("late_flush", 16, None);
    ctx.load_float(&name, float_vectors(4000, 16, 21), None);

    let handle = ctx
        .session
        .create_index_async(&name, "float_vector", CreateIndex::new(json!({"index_type": "HNSW"})), None)
        .expect("failed to schedule build");
    ctx.load_float(&name, float_vectors(100, 16, 22), None);
    handle.wait().expect("build failed");

    assert!(wait_until_indexed(&ctx, &name, "HNSW", Duration::from_secs(30)));
    let stats = ctx.session.get_collection_stats(&name).expect("failed to get stats");
    let rows: Vec<u64> = stats.segments().map(|s| s.row_count).collect();
    assert_eq!(rows.iter().sum::<u64>(), 4100);
    assert_eq!(rows.len(), 2);
}

#[test]
fn test_create_index_async_callback() {
    let ctx = TestContext::new();
    let name = ctx.float_collection("callback", 16, None);
    ctx.load_float(&name, float_vectors(400, 16, 8), None);

    let (tx, rx) = mpsc::channel();
    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);
    let handle = ctx
        .session
        .create_index_async(
            &name,
            "float_vector",
            CreateIndex::new(json!({"index_type": "IVF_SQ8", "nlist": 8})),
            Some(Box::new(move |result| {
                flag.store(true, Ordering::SeqCst);
                let _ = tx.send(result.clone());
            })),
        )
        .expect("failed to schedule build");

    handle.wait().expect("build failed");
    assert!(called.load(Ordering::SeqCst), "callback runs before waiters wake");
    let delivered = rx.recv_timeout(Duration::from_secs(5)).expect("callback result");
    assert_eq!(delivered.expect("build failed").index_type, IndexType::IvfSq8);
}

#[test]
fn test_create_index_async_invalid_fails_synchronously() {
    let ctx = TestContext::new();
    let name = ctx.float_collection("async_bad", 16, None);
    ctx.load_float(&name, float_vectors(10, 16, 9), None);

    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);
    let result = ctx.session.create_index_async(
        "",
        "float_vector",
        CreateIndex::new(json!({"index_type": "FLAT"})),
        Some(Box::new(move |_| flag.store(true, Ordering::SeqCst))),
    );
    assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidParameter);

    let result = ctx.session.create_index_async(
        &name,
        "float_vector",
        CreateIndex::new(json!({"index_type": "IVF_FLAT"})),
        None,
    );
    assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidParameter);
    assert!(!called.load(Ordering::SeqCst));
}

#[test]
fn test_build_timeout() {
    let ctx = TestContext::with_config(Config::default().build_workers(1).build_timeout(Duration::ZERO));
    let name = ctx.float_collection("timeout", 32, None);
    ctx.load_float(&name, float_vectors(2000, 32, 10), None);

    let result = ctx.session.create_index(&name, "float_vector", CreateIndex::new(json!({"index_type": "HNSW"})));
    assert_eq!(result.unwrap_err().kind(), ErrorKind::BuildTimeout);
}

// ============================================================================
// Invalid Requests
// ============================================================================

#[test]
fn test_create_index_invalid_names() {
    let ctx = TestContext::new();
    let name = ctx.float_collection("names", 8, None);
    let flat = || CreateIndex::new(json!({"index_type": "FLAT"}));

    let too_long = "a".repeat(256);
    for bad in ["", too_long.as_str(), "12-abc", "has space", "semi;colon"] {
        let err = ctx.session.create_index(bad, "float_vector", flat()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter, "collection {bad:?}");
    }
    assert_eq!(
        ctx.session.create_index("missing_collection", "float_vector", flat()).unwrap_err().kind(),
        ErrorKind::CollectionNotFound
    );
    assert_eq!(
        ctx.session.create_index(&name, "missing_field", flat()).unwrap_err().kind(),
        ErrorKind::FieldNotFound
    );
    for bad in ["", too_long.as_str(), "bad-name"] {
        let err = ctx
            .session
            .create_index(&name, "float_vector", CreateIndex::named(bad, json!({"index_type": "FLAT"})))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter, "index name {bad:?}");
    }
}

#[test]
fn test_create_index_invalid_params() {
    let ctx = TestContext::new();
    let name = ctx.float_collection("params", 16, None);

    let cases = [
        json!({"index_type": "IVF_FLAT"}),
        json!({"index_type": "IVF_FLAT", "nlist": 0}),
        json!({"index_type": "IVF_FLAT", "nlist": 100_000_000}),
        json!({"index_type": "IVF_FLAT", "nlist": "16"}),
        json!({"index_type": "IVF_PQ", "nlist": 16, "m": 5}),
        json!({"index_type": "HNSW", "M": 1000}),
        json!({"index_type": "FLAT", "metric_type": "HAMMING"}),
        json!({"nlist": 16}),
        json!("IVF_FLAT"),
    ];
    for params in cases {
        let err = ctx.session.create_index(&name, "float_vector", CreateIndex::new(params.clone())).unwrap_err();
        assert!(
            matches!(err.kind(), ErrorKind::InvalidParameter | ErrorKind::UnsupportedIndex),
            "{params} gave {err}"
        );
    }

    let err = ctx
        .session
        .create_index(&name, "float_vector", CreateIndex::new(json!({"index_type": "BIN_IVF_FLAT", "nlist": 4})))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedIndex);
    assert!(ctx.session.describe_index(&name, "float_vector").expect("describe").is_none());
}
