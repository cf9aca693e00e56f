//! Vector value and field schema types.

mod field;
mod vector_data;

pub use field::{FieldSchema, FieldType};
pub use vector_data::{pack_binary, QueryRef, VectorData};
