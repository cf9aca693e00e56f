//! Property-based tests for `KestrelDB` invariants.

pub mod properties;
