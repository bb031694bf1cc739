use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::field::FieldType;

/// Field name to `FieldType` mapping.
///
/// Serialized as a flat JSON object (`{"field": tag, ...}`) with keys in sorted
/// order, which is the schema descriptor layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: BTreeMap<String, FieldType>,
}

impl Schema {
    /// Create a schema from `(name, type)` pairs
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, FieldType)>,
        S: Into<String>,
    {
        Self { fields: fields.into_iter().map(|(name, ty)| (name.into(), ty)).collect() }
    }

    /// Declared type of a field
    pub fn get(&self, field: &str) -> Option<FieldType> {
        self.fields.get(field).copied()
    }

    /// Whether the field is declared
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Declared fields in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, FieldType)> {
        self.fields.iter().map(|(name, ty)| (name.as_str(), *ty))
    }

    /// Number of declared fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no field is declared
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
