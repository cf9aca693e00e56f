//! Client sessions.
//!
//! A [`Session`] is a connection to a shared [`Database`]. Every operation on
//! a disconnected session fails with [`Error::Connection`] before touching
//! the database.

use std::sync::Arc;

use kestreldb_core::EntityId;
use kestreldb_vector::{BuildCallback, BuildHandle, BuildOutcome, IndexDescriptor, SearchHit};

use crate::collection::CollectionSchema;
use crate::database::{CreateIndex, Database, SearchQuery};
use crate::entities::Entities;
use crate::error::{Error, Result};
use crate::stats::CollectionStats;

/// A connection to a database.
#[derive(Debug, Clone)]
pub struct Session {
    db: Option<Arc<Database>>,
}

impl Session {
    /// Connect to `db`.
    #[must_use]
    pub const fn connect(db: Arc<Database>) -> Self {
        Self { db: Some(db) }
    }

    /// Close the connection. Later calls fail with [`Error::Connection`].
    pub fn disconnect(&mut self) {
        self.db = None;
    }

    /// Whether the session is connected.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.db.is_some()
    }

    /// The connected database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the session is disconnected.
    pub fn db(&self) -> Result<&Database> {
        self.db.as_deref().ok_or(Error::Connection)
    }

    /// See [`Database::create_collection`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if disconnected, or the database's error.
    pub fn create_collection(&self, schema: CollectionSchema) -> Result<()> {
        self.db()?.create_collection(schema)
    }

    /// See [`Database::drop_collection`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if disconnected, or the database's error.
    pub fn drop_collection(&self, name: &str) -> Result<()> {
        self.db()?.drop_collection(name)
    }

    /// See [`Database::has_collection`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if disconnected, or the database's error.
    pub fn has_collection(&self, name: &str) -> Result<bool> {
        self.db()?.has_collection(name)
    }

    /// See [`Database::list_collections`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if disconnected, or the database's error.
    pub fn list_collections(&self) -> Result<Vec<String>> {
        self.db()?.list_collections()
    }

    /// See [`Database::create_partition`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if disconnected, or the database's error.
    pub fn create_partition(&self, collection: &str, tag: &str) -> Result<()> {
        self.db()?.create_partition(collection, tag)
    }

    /// See [`Database::drop_partition`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if disconnected, or the database's error.
    pub fn drop_partition(&self, collection: &str, tag: &str) -> Result<()> {
        self.db()?.drop_partition(collection, tag)
    }

    /// See [`Database::has_partition`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if disconnected, or the database's error.
    pub fn has_partition(&self, collection: &str, tag: &str) -> Result<bool> {
        self.db()?.has_partition(collection, tag)
    }

    /// See [`Database::list_partitions`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if disconnected, or the database's error.
    pub fn list_partitions(&self, collection: &str) -> Result<Vec<String>> {
        self.db()?.list_partitions(collection)
    }

    /// See [`Database::insert`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if disconnected, or the database's error.
    pub fn insert(&self, collection: &str, entities: Entities, partition_tag: Option<&str>) -> Result<Vec<EntityId>> {
        self.db()?.insert(collection, entities, partition_tag)
    }

    /// See [`Database::flush`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if disconnected, or the database's error.
    pub fn flush(&self, collections: &[&str]) -> Result<()> {
        self.db()?.flush(collections)
    }

    /// See [`Database::count_entities`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if disconnected, or the database's error.
    pub fn count_entities(&self, collection: &str) -> Result<u64> {
        self.db()?.count_entities(collection)
    }

    /// See [`Database::create_index`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if disconnected, or the database's error.
    pub fn create_index(&self, collection: &str, field: &str, index: CreateIndex) -> Result<BuildOutcome> {
        self.db()?.create_index(collection, field, index)
    }

    /// See [`Database::create_index_async`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if disconnected, or the database's error.
    pub fn create_index_async(
        &self,
        collection: &str,
        field: &str,
        index: CreateIndex,
        callback: Option<BuildCallback>,
    ) -> Result<BuildHandle> {
        self.db()?.create_index_async(collection, field, index, callback)
    }

    /// See [`Database::drop_index`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if disconnected, or the database's error.
    pub fn drop_index(&self, collection: &str, field: &str, index_name: Option<&str>) -> Result<()> {
        self.db()?.drop_index(collection, field, index_name)
    }

    /// See [`Database::describe_index`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if disconnected, or the database's error.
    pub fn describe_index(&self, collection: &str, field: &str) -> Result<Option<IndexDescriptor>> {
        self.db()?.describe_index(collection, field)
    }

    /// See [`Database::get_collection_stats`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if disconnected, or the database's error.
    pub fn get_collection_stats(&self, collection: &str) -> Result<CollectionStats> {
        self.db()?.get_collection_stats(collection)
    }

    /// See [`Database::search`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if disconnected, or the database's error.
    pub fn search(&self, collection: &str, query: &SearchQuery) -> Result<Vec<Vec<SearchHit>>> {
        self.db()?.search(collection, query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_disconnected_session_fails_fast() {
        let db = Arc::new(Database::new(Config::default().build_workers(1)).unwrap());
        let mut session = Session::connect(db);
        session.create_collection(CollectionSchema::new("c").unwrap().float_field("v", 2).unwrap()).unwrap();
        session.disconnect();
        assert!(!session.is_connected());

        assert_eq!(session.has_collection("c").unwrap_err().kind(), ErrorKind::Connection);
        assert_eq!(session.drop_index("c", "v", None).unwrap_err().kind(), ErrorKind::Connection);
        assert_eq!(
            session.create_index("c", "v", CreateIndex::new(json!({"index_type": "FLAT"}))).unwrap_err().kind(),
            ErrorKind::Connection
        );
        assert_eq!(session.get_collection_stats("c").unwrap_err().kind(), ErrorKind::Connection);
    }
}
