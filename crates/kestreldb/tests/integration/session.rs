//! Session lifecycle tests.

use kestreldb::{CollectionSchema, CreateIndex, Entities, ErrorKind, SearchQuery};
use serde_json::json;

use crate::fixtures::TestContext;

#[test]
fn test_disconnected_session_rejects_everything() {
    let mut ctx = TestContext::new();
    let name = ctx.float_collection("conn", 4, None);
    ctx.session.disconnect();
    assert!(!ctx.session.is_connected());

    let s = &ctx.session;
    let kinds = [
        s.create_collection(CollectionSchema::new("x").expect("name")).map(|_| ()).unwrap_err().kind(),
        s.list_collections().map(|_| ()).unwrap_err().kind(),
        s.insert(&name, Entities::new().float_vectors("float_vector", vec![vec![0.0; 4]]), None)
            .map(|_| ())
            .unwrap_err()
            .kind(),
        s.flush(&[]).unwrap_err().kind(),
        s.create_index(&name, "float_vector", CreateIndex::new(json!({"index_type": "FLAT"})))
            .map(|_| ())
            .unwrap_err()
            .kind(),
        s.create_index_async(&name, "float_vector", CreateIndex::new(json!({"index_type": "FLAT"})), None)
            .map(|_| ())
            .unwrap_err()
            .kind(),
        s.search(&name, &SearchQuery::float("float_vector", vec![vec![0.0; 4]], 1)).map(|_| ()).unwrap_err().kind(),
        s.create_partition(&name, "p").unwrap_err().kind(),
    ];
    assert!(kinds.iter().all(|k| *k == ErrorKind::Connection), "{kinds:?}");

    // the database itself is untouched
    assert!(ctx.db.has_collection(&name).expect("has collection"));
}

#[test]
fn test_sessions_share_a_database() {
    let ctx = TestContext::new();
    let other = ctx.session.clone();
    let name = ctx.float_collection("shared", 4, None);
    assert!(other.has_collection(&name).expect("has collection"));
    assert!(other.list_partitions(&name).expect("partitions").contains(&"_default".to_string()));
}
