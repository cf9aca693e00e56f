//! Properties that hold regardless of the data or the index chosen.

use proptest::prelude::*;

use kestreldb::{CreateIndex, SearchQuery};
use serde_json::json;

use crate::fixtures::{float_vectors, TestContext};

fn index_params() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        Just(json!({"index_type": "FLAT"})),
        (1usize..32).prop_map(|nlist| json!({"index_type": "IVF_FLAT", "nlist": nlist})),
        (1usize..32).prop_map(|nlist| json!({"index_type": "IVF_SQ8", "nlist": nlist})),
        (4usize..16).prop_map(|m| json!({"index_type": "HNSW", "M": m})),
    ]
}

// ============================================================================
// Search Invariants
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Every query returns `min(top_k, rows)` distinct hits, best first
    #[test]
    fn prop_search_shape(rows in 1usize..300, top_k in 1usize..50, seed in any::<u64>(), params in index_params()) {
        let ctx = TestContext::new();
        let name = ctx.float_collection("prop", 8, None);
        ctx.load_float(&name, float_vectors(rows, 8, seed), None);
        ctx.session.create_index(&name, "float_vector", CreateIndex::new(params)).expect("failed to build index");

        let queries = float_vectors(4, 8, seed.wrapping_add(1));
        // scan every list so IVF results are exact in count
        let query = SearchQuery::float("float_vector", queries, top_k)
            .with_params_json(&json!({"nprobe": 32, "ef": 512}))
            .expect("valid params");
        let results = ctx.session.search(&name, &query).expect("search failed");
        prop_assert_eq!(results.len(), 4);
        for hits in &results {
            prop_assert_eq!(hits.len(), top_k.min(rows));
            let ids: std::collections::HashSet<_> = hits.iter().map(|h| h.id).collect();
            prop_assert_eq!(ids.len(), hits.len());
            for pair in hits.windows(2) {
                prop_assert!(pair[0].distance <= pair[1].distance);
            }
        }
    }

    /// Stats always account for every inserted row
    #[test]
    fn prop_stats_row_count(batches in proptest::collection::vec(1usize..100, 1..5)) {
        let ctx = TestContext::new();
        let name = ctx.float_collection("prop_stats", 4, None);
        for (i, rows) in batches.iter().enumerate() {
            ctx.load_float(&name, float_vectors(*rows, 4, i as u64), None);
        }
        let stats = ctx.session.get_collection_stats(&name).expect("stats");
        prop_assert_eq!(stats.row_count, batches.iter().sum::<usize>() as u64);
        prop_assert_eq!(stats.segments().count(), batches.len());
    }
}
