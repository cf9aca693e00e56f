//! Error types for the core crate.

use thiserror::Error;

/// Errors that can occur in the core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A name (collection, field, index or partition tag) failed validation.
    #[error("invalid {kind} name '{name}': {reason}")]
    InvalidName {
        /// What the name identifies ("collection", "field", ...).
        kind: &'static str,
        /// The rejected name, truncated for display.
        name: String,
        /// Why the name was rejected.
        reason: &'static str,
    },
}

impl CoreError {
    /// Build an [`CoreError::InvalidName`], truncating very long names.
    #[must_use]
    pub fn invalid_name(kind: &'static str, name: &str, reason: &'static str) -> Self {
        const MAX_DISPLAY: usize = 64;
        let name = if name.len() > MAX_DISPLAY {
            let cut = (0..=MAX_DISPLAY).rev().find(|&i| name.is_char_boundary(i)).unwrap_or(0);
            format!("{}...", &name[..cut])
        } else {
            name.to_string()
        };
        Self::InvalidName { kind, name, reason }
    }
}
