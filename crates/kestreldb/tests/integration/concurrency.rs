//! Concurrent inserts, builds and searches.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use kestreldb::{Config, CreateIndex, Entities, SearchQuery};
use serde_json::json;

use crate::fixtures::{float_vectors, TestContext};

#[test]
fn test_parallel_builds_across_collections() {
    let ctx = TestContext::with_config(Config::default().build_workers(4));
    let names: Vec<String> = (0..4).map(|_| ctx.float_collection("parallel", 16, None)).collect();
    for (i, name) in names.iter().enumerate() {
        ctx.load_float(name, float_vectors(500, 16, 30 + i as u64), None);
    }

    let handles: Vec<_> = names
        .iter()
        .map(|name| {
            ctx.session
                .create_index_async(name, "float_vector", CreateIndex::new(json!({"index_type": "IVF_FLAT", "nlist": 8})), None)
                .expect("failed to schedule build")
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.wait().expect("build failed").segments_built, 1);
    }
    for name in &names {
        let stats = ctx.session.get_collection_stats(name).expect("stats");
        assert!(stats.segments().all(|s| s.index_name.as_deref() == Some("IVF_FLAT")));
    }
}

#[test]
fn test_concurrent_inserts_get_unique_ids() {
    let ctx = TestContext::new();
    let name = ctx.float_collection("inserts", 8, None);

    let ids: Vec<_> = thread::scope(|s| {
        let workers: Vec<_> = (0..8)
            .map(|t| {
                let session = ctx.session.clone();
                let name = name.as_str();
                s.spawn(move || {
                    let mut ids = Vec::new();
                    for batch in 0..10 {
                        let rows = Entities::new().float_vectors("float_vector", float_vectors(25, 8, t * 100 + batch));
                        ids.extend(session.insert(name, rows, None).expect("failed to insert"));
                    }
                    ids
                })
            })
            .collect();
        workers.into_iter().flat_map(|w| w.join().expect("insert thread panicked")).collect()
    });

    let unique: HashSet<_> = ids.iter().copied().collect();
    assert_eq!(ids.len(), 8 * 10 * 25);
    assert_eq!(unique.len(), ids.len());
    assert_eq!(ctx.session.count_entities(&name).expect("count"), 2000);
}

#[test]
fn test_search_during_build() {
    let ctx = TestContext::new();
    let name = ctx.float_collection("search_build", 16, None);
    let vectors = float_vectors(1500, 16, 40);
    ctx.load_float(&name, vectors.clone(), None);

    let db = Arc::clone(&ctx.db);
    let handle = ctx
        .session
        .create_index_async(&name, "float_vector", CreateIndex::new(json!({"index_type": "HNSW", "M": 8})), None)
        .expect("failed to schedule build");

    // searches keep working while the build runs and after it commits
    let query = SearchQuery::float("float_vector", vec![vectors[0].clone()], 1).with_params_json(&json!({"ef": 64}));
    let query = query.expect("valid params");
    for _ in 0..20 {
        let hits = db.search(&name, &query).expect("search failed");
        assert_eq!(hits[0].len(), 1);
    }
    handle.wait().expect("build failed");
    let hits = db.search(&name, &query).expect("search failed");
    assert_eq!(hits[0][0].id.as_u64(), 1);
}
