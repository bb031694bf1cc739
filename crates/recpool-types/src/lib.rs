//! Recpool Types
//!
//! This crate defines the data model shared by the recpool crates: field type tags,
//! typed field values, items and the item collection, and the schema. It has no
//! knowledge of indexing or output formats so that `recpool-core` and any loader
//! can agree on one representation.

#![deny(missing_docs)]

mod error;
mod field;
mod item;
mod schema;

pub use error::TypeError;
pub use field::{FieldType, FieldValue, IndexValue, KEY_RESERVED, format_float};
pub use item::{ID_RESERVED, Item, ItemCollection, Ordinal};
pub use schema::Schema;
