//! Core data types for `KestrelDB`.

mod id;
mod name;

pub use id::{EntityId, SegmentId};
pub use name::{CollectionName, FieldName, IndexName, PartitionTag, MAX_NAME_LEN};
