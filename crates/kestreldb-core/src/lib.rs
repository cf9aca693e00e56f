//! `KestrelDB` Core
//!
//! This crate provides the fundamental types shared by every layer of `KestrelDB`.
//!
//! # Overview
//!
//! - **Identifiers**: [`EntityId`] for inserted rows and [`SegmentId`] for storage segments
//! - **Names**: validated [`CollectionName`], [`FieldName`], [`IndexName`] and [`PartitionTag`]
//! - **Errors**: [`CoreError`] for validation failures
//!
//! # Example
//!
//! ```
//! use kestreldb_core::{CollectionName, EntityId, PartitionTag};
//!
//! let name = CollectionName::new("documents").unwrap();
//! assert_eq!(name.as_str(), "documents");
//!
//! // Names that start with a digit are rejected
//! assert!(CollectionName::new("12-s").is_err());
//!
//! let tag = PartitionTag::default();
//! assert!(tag.is_default());
//!
//! let id = EntityId::new(7);
//! assert_eq!(id.as_u64(), 7);
//! ```

// Deny unwrap in library code to ensure proper error handling
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod types;

pub use error::CoreError;
pub use types::{CollectionName, EntityId, FieldName, IndexName, PartitionTag, SegmentId};
