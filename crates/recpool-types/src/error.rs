use thiserror::Error;

use crate::field::FieldType;

/// Errors raised while constructing data model values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypeError {
    /// A field type tag or name that does not map to any `FieldType`
    #[error("unknown field type tag '{tag}'")]
    UnknownFieldType {
        /// The rejected tag, rendered as text
        tag: String,
    },

    /// A JSON value whose shape does not fit the declared field type
    #[error("expected {expected} value, found {found}")]
    InvalidValue {
        /// Declared type
        expected: FieldType,
        /// Short rendering of the offending JSON value
        found: String,
    },

    /// Two items share the same identifier
    #[error("duplicate item id '{id}'")]
    DuplicateItemId {
        /// The repeated identifier
        id: String,
    },

    /// An item identifier containing a character reserved by the output layout
    #[error("item id '{}' contains reserved character {reserved:?}", id.escape_debug())]
    InvalidItemId {
        /// The rejected identifier
        id: String,
        /// First reserved character found in it
        reserved: char,
    },

    /// The collection does not fit in the `u32` ordinal space
    #[error("item collection of {len} items exceeds the ordinal space")]
    CollectionTooLarge {
        /// Number of items offered
        len: usize,
    },
}
