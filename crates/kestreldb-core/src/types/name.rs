//! Validated names for collections, fields, indexes and partitions.
//!
//! Collection, field and index names share one grammar: at most
//! [`MAX_NAME_LEN`] bytes, the first character an ASCII letter or `_`,
//! the rest ASCII alphanumerics or `_`.
//!
//! Partition tags are freer (dates such as `1970-01-01` are common): any
//! non-empty string up to [`MAX_NAME_LEN`] bytes without control characters
//! and without leading or trailing whitespace.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Maximum length in bytes of any name or tag.
pub const MAX_NAME_LEN: usize = 255;

fn validate_identifier(kind: &'static str, name: &str) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::invalid_name(kind, name, "name is empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(CoreError::invalid_name(kind, name, "name exceeds 255 bytes"));
    }
    let mut chars = name.chars();
    // Non-empty checked above
    let first = chars.next().unwrap_or('_');
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(CoreError::invalid_name(
            kind,
            name,
            "first character must be a letter or underscore",
        ));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(CoreError::invalid_name(
            kind,
            name,
            "only letters, digits and underscores are allowed",
        ));
    }
    Ok(())
}

macro_rules! identifier_name {
    ($(#[$meta:meta])* $ty:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $ty(String);

        impl $ty {
            #[doc = concat!("Validate and wrap a ", $kind, " name.")]
            ///
            /// # Errors
            ///
            /// Returns [`CoreError::InvalidName`] if the name breaks the naming rules.
            pub fn new(name: impl Into<String>) -> Result<Self, CoreError> {
                let name = name.into();
                validate_identifier($kind, &name)?;
                Ok(Self(name))
            }

            /// The name as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $ty {
            type Error = CoreError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl TryFrom<&str> for $ty {
            type Error = CoreError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

identifier_name!(
    /// Name of a collection.
    CollectionName,
    "collection"
);

identifier_name!(
    /// Name of a vector field within a collection schema.
    FieldName,
    "field"
);

identifier_name!(
    /// User-chosen name of an index. Defaults to the index type name.
    IndexName,
    "index"
);

/// Tag identifying a partition within a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartitionTag(String);

impl PartitionTag {
    /// Tag of the partition every collection is created with.
    pub const DEFAULT: &'static str = "_default";

    /// Validate and wrap a partition tag.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidName`] if the tag is empty, too long,
    /// contains control characters or has surrounding whitespace.
    pub fn new(tag: impl Into<String>) -> Result<Self, CoreError> {
        let tag = tag.into();
        if tag.is_empty() {
            return Err(CoreError::invalid_name("partition", &tag, "tag is empty"));
        }
        if tag.len() > MAX_NAME_LEN {
            return Err(CoreError::invalid_name("partition", &tag, "tag exceeds 255 bytes"));
        }
        if tag.chars().any(char::is_control) {
            return Err(CoreError::invalid_name(
                "partition",
                &tag,
                "tag contains control characters",
            ));
        }
        if tag.trim() != tag {
            return Err(CoreError::invalid_name(
                "partition",
                &tag,
                "tag has leading or trailing whitespace",
            ));
        }
        Ok(Self(tag))
    }

    /// The tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the `_default` partition.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.0 == Self::DEFAULT
    }
}

impl Default for PartitionTag {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl TryFrom<String> for PartitionTag {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for PartitionTag {
    type Error = CoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PartitionTag> for String {
    fn from(value: PartitionTag) -> Self {
        value.0
    }
}

impl AsRef<str> for PartitionTag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn valid_collection_names() {
        for name in ["a", "_x", "test_index_1", "Collection9"] {
            assert!(CollectionName::new(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn invalid_collection_names() {
        let long = "a".repeat(256);
        for name in ["", " ", "12-s", "(mn)", "中文", "a b", "a-b", long.as_str()] {
            assert!(CollectionName::new(name).is_err(), "{name:?} should be rejected");
        }
    }

    #[test]
    fn name_at_length_limit_is_accepted() {
        let name = "a".repeat(MAX_NAME_LEN);
        assert!(FieldName::new(name).is_ok());
    }

    #[test]
    fn partition_tags() {
        assert!(PartitionTag::new("1970-01-01").is_ok());
        assert!(PartitionTag::new("tag with spaces").is_ok());
        assert!(PartitionTag::new("").is_err());
        assert!(PartitionTag::new(" padded").is_err());
        assert!(PartitionTag::new("tab\there").is_err());
        assert!(PartitionTag::default().is_default());
    }

    #[test]
    fn serde_rejects_invalid_names() {
        let ok: Result<CollectionName, _> = serde_json::from_str("\"good_name\"");
        assert!(ok.is_ok());
        let bad: Result<CollectionName, _> = serde_json::from_str("\"12-s\"");
        assert!(bad.is_err());
    }

    proptest! {
        #[test]
        fn generated_identifiers_are_accepted(name in "[A-Za-z_][A-Za-z0-9_]{0,254}") {
            prop_assert!(IndexName::new(name).is_ok());
        }

        #[test]
        fn leading_digit_is_rejected(name in "[0-9][A-Za-z0-9_]{0,20}") {
            prop_assert!(CollectionName::new(name).is_err());
        }
    }
}
