//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use kestreldb::{CollectionSchema, Config, Database, Entities, Session};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

static TRACING: Once = Once::new();

// Counter for unique collection names across tests
static COLLECTION_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Install a test subscriber honoring `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A fresh collection name.
pub fn unique_collection_name(prefix: &str) -> String {
    let count = COLLECTION_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{prefix}_{count}")
}

/// `n` uniform vectors in `[0, 1)^dim` from a fixed seed.
pub fn float_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| (0..dim).map(|_| rng.gen::<f32>()).collect()).collect()
}

/// `n` random binary vectors of `dim` bits from a fixed seed.
pub fn binary_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<u8>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| (0..dim / 8).map(|_| rng.gen::<u8>()).collect()).collect()
}

/// A connected session over a private in-memory database.
pub struct TestContext {
    pub db: Arc<Database>,
    pub session: Session,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(Config::default().build_workers(2))
    }

    pub fn with_config(config: Config) -> Self {
        init_tracing();
        let db = Arc::new(Database::new(config).expect("failed to open database"));
        let session = Session::connect(Arc::clone(&db));
        Self { db, session }
    }

    /// Create a collection with one float field `float_vector`.
    pub fn float_collection(&self, prefix: &str, dim: usize, index_file_size_mb: Option<u64>) -> String {
        let name = unique_collection_name(prefix);
        let mut schema = CollectionSchema::new(&name)
            .expect("valid name")
            .float_field("float_vector", dim)
            .expect("valid field");
        if let Some(mb) = index_file_size_mb {
            schema = schema.with_index_file_size(mb);
        }
        self.session.create_collection(schema).expect("failed to create collection");
        name
    }

    /// Insert seeded float vectors into `float_vector` and flush.
    pub fn load_float(&self, collection: &str, vectors: Vec<Vec<f32>>, partition: Option<&str>) {
        self.session
            .insert(collection, Entities::new().float_vectors("float_vector", vectors), partition)
            .expect("failed to insert");
        self.session.flush(&[collection]).expect("failed to flush");
    }
}
