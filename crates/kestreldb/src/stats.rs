//! Collection statistics.

use serde::Serialize;
use serde_json::Value;

use kestreldb_core::SegmentId;
use kestreldb_vector::SegmentState;

/// Statistics of one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentStats {
    /// Segment id.
    pub id: SegmentId,
    /// Lifecycle state.
    pub state: SegmentState,
    /// Rows in the segment.
    pub row_count: u64,
    /// Bytes of ids and vector data.
    pub data_size: u64,
    /// Name of the index whose artifact is attached, absent when the
    /// segment is searched by exact scan.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,
}

/// Statistics of one partition. Empty segments are not listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionStats {
    /// Partition tag.
    pub tag: String,
    /// Rows across the partition's segments.
    pub row_count: u64,
    /// Non-empty segments, in creation order.
    pub segments: Vec<SegmentStats>,
}

/// Statistics of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    /// Partitions ordered by tag.
    pub partitions: Vec<PartitionStats>,
    /// Rows across all partitions.
    pub row_count: u64,
}

impl CollectionStats {
    /// Render as `{"partitions": [{"tag": .., "segments": [..]}], "row_count": ..}`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Every segment across partitions.
    pub fn segments(&self) -> impl Iterator<Item = &SegmentStats> {
        self.partitions.iter().flat_map(|p| p.segments.iter())
    }

    /// The partition with `tag`.
    #[must_use]
    pub fn partition(&self, tag: &str) -> Option<&PartitionStats> {
        self.partitions.iter().find(|p| p.tag == tag)
    }
}
