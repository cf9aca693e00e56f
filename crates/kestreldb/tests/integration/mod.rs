//! Integration tests for `KestrelDB`.
//!
//! These tests drive the database through a [`kestreldb::Session`] the way a
//! client would: collections and partitions, inserts and flushes, index
//! builds and searches.

pub mod binary;
pub mod concurrency;
pub mod index;
pub mod search;
pub mod session;
