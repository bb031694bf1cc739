//! Per-field posting indexes
//!
//! A `FieldIndex` maps every value observed for one field to the posting list
//! of items carrying it. Scalar fields contribute each item to exactly one
//! posting list; `StringList` fields are exploded so an item lands in the
//! posting list of every distinct element it contains. String values holding
//! a `KEY_RESERVED` character are rejected, since no index file could spell
//! them as a key.

use std::collections::BTreeMap;

use recpool_types::{FieldType, FieldValue, IndexValue, Item, ItemCollection, KEY_RESERVED, Ordinal};
use roaring::RoaringBitmap;
use tracing::debug;

use crate::error::{PoolError, Result};

/// Posting index for a single field
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldIndex {
    field: String,
    postings: BTreeMap<IndexValue, RoaringBitmap>,
}

impl FieldIndex {
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Posting list for a value, if that value was observed
    pub fn get(&self, value: &IndexValue) -> Option<&RoaringBitmap> {
        self.postings.get(value)
    }

    /// Distinct observed values in ascending order
    pub fn values(&self) -> impl ExactSizeIterator<Item = &IndexValue> {
        self.postings.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IndexValue, &RoaringBitmap)> {
        self.postings.iter()
    }

    /// Number of distinct values
    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// Total postings across all values
    pub fn posting_count(&self) -> u64 {
        self.postings.values().map(RoaringBitmap::len).sum()
    }
}

/// Builds `FieldIndex`es from an item collection
pub struct FieldIndexer;

impl FieldIndexer {
    /// Build the posting index of `field`, declared as `field_type`.
    ///
    /// `Float32`, `Float32List` and `Int64List` fields are rejected with
    /// `UnsupportedFieldType`; every item must carry a value for the field.
    pub fn build(items: &ItemCollection, field: &str, field_type: FieldType) -> Result<FieldIndex> {
        Self::check_indexable(field, field_type)?;

        let mut postings: BTreeMap<IndexValue, RoaringBitmap> = BTreeMap::new();
        for (ordinal, item) in items.enumerate() {
            let value = item
                .get_field(field)
                .ok_or_else(|| PoolError::missing_value(&item.id, field))?;

            if value.field_type() != field_type {
                return Err(PoolError::FieldTypeMismatch {
                    item_id: item.id.clone(),
                    field: field.to_string(),
                    expected: field_type,
                    actual: value.field_type(),
                });
            }

            Self::index_value(&mut postings, item, field, value, ordinal)?;
        }

        debug!(field, values = postings.len(), "Built field index");
        Ok(FieldIndex { field: field.to_string(), postings })
    }

    /// Whether a field type can be grouped on
    pub fn is_indexable(field_type: FieldType) -> bool {
        matches!(field_type, FieldType::Int64 | FieldType::String | FieldType::StringList)
    }

    pub(crate) fn check_indexable(field: &str, field_type: FieldType) -> Result<()> {
        if Self::is_indexable(field_type) {
            Ok(())
        } else {
            Err(PoolError::unsupported(field, field_type, "indexing"))
        }
    }

    fn index_value(
        postings: &mut BTreeMap<IndexValue, RoaringBitmap>,
        item: &Item,
        field: &str,
        value: &FieldValue,
        ordinal: Ordinal,
    ) -> Result<()> {
        match value {
            FieldValue::Int64(v) => {
                postings.entry(IndexValue::Int(*v)).or_default().insert(ordinal);
            }
            FieldValue::String(v) => {
                postings.entry(string_key(item, field, v)?).or_default().insert(ordinal);
            }
            FieldValue::StringList(list) => {
                // Bitmap insertion makes repeated elements contribute once
                for element in list {
                    postings.entry(string_key(item, field, element)?).or_default().insert(ordinal);
                }
            }
            FieldValue::Float32(_)
            | FieldValue::Int64List(_)
            | FieldValue::Float32List(_) => {}
        }
        Ok(())
    }
}

fn string_key(item: &Item, field: &str, value: &str) -> Result<IndexValue> {
    match value.chars().find(|c| KEY_RESERVED.contains(c)) {
        Some(reserved) => Err(PoolError::InvalidValue {
            item_id: item.id.clone(),
            field: field.to_string(),
            message: format!("{:?} contains reserved character {:?}", value, reserved),
        }),
        None => Ok(IndexValue::Str(value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap(ordinals: &[u32]) -> RoaringBitmap {
        ordinals.iter().copied().collect()
    }

    fn list(elements: &[&str]) -> FieldValue {
        FieldValue::StringList(elements.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_scalar_string_field() {
        let items = ItemCollection::new(vec![
            Item::new("a").with_field("lang", FieldValue::String("en".into())),
            Item::new("b").with_field("lang", FieldValue::String("en".into())),
            Item::new("c").with_field("lang", FieldValue::String("fr".into())),
        ])
        .unwrap();

        let index = FieldIndexer::build(&items, "lang", FieldType::String).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(&"en".into()), Some(&bitmap(&[0, 1])));
        assert_eq!(index.get(&"fr".into()), Some(&bitmap(&[2])));
        assert_eq!(index.posting_count(), 3);
    }

    #[test]
    fn test_int_field_ordered_numerically() {
        let items = ItemCollection::new(vec![
            Item::new("a").with_field("level", FieldValue::Int64(10)),
            Item::new("b").with_field("level", FieldValue::Int64(2)),
        ])
        .unwrap();

        let index = FieldIndexer::build(&items, "level", FieldType::Int64).unwrap();
        let values: Vec<_> = index.values().cloned().collect();
        assert_eq!(values, vec![IndexValue::Int(2), IndexValue::Int(10)]);
    }

    #[test]
    fn test_string_list_explodes() {
        let items = ItemCollection::new(vec![
            Item::new("a").with_field("cat2", list(&["x", "y"])),
            Item::new("b").with_field("cat2", list(&["y", "z", "y"])),
            Item::new("c").with_field("cat2", list(&[])),
        ])
        .unwrap();

        let index = FieldIndexer::build(&items, "cat2", FieldType::StringList).unwrap();
        assert_eq!(index.get(&"x".into()), Some(&bitmap(&[0])));
        assert_eq!(index.get(&"y".into()), Some(&bitmap(&[0, 1])));
        assert_eq!(index.get(&"z".into()), Some(&bitmap(&[1])));
        assert_eq!(index.posting_count(), 4);
    }

    #[test]
    fn test_unsupported_types() {
        let items = ItemCollection::new(vec![Item::new("a")]).unwrap();
        for field_type in [FieldType::Float32, FieldType::Float32List, FieldType::Int64List] {
            let err = FieldIndexer::build(&items, "f", field_type).unwrap_err();
            assert!(matches!(err, PoolError::UnsupportedFieldType { .. }), "{:?}", field_type);
        }
    }

    #[test]
    fn test_missing_value() {
        let items = ItemCollection::new(vec![
            Item::new("a").with_field("lang", FieldValue::String("en".into())),
            Item::new("b"),
        ])
        .unwrap();

        let err = FieldIndexer::build(&items, "lang", FieldType::String).unwrap_err();
        assert!(matches!(err, PoolError::MissingFieldValue { ref item_id, .. } if item_id == "b"));
    }

    #[test]
    fn test_empty_collection() {
        let items = ItemCollection::default();
        let index = FieldIndexer::build(&items, "lang", FieldType::String).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.field(), "lang");
    }

    #[test]
    fn test_values_with_key_separators_rejected() {
        let items = ItemCollection::new(vec![
            Item::new("a").with_field("lang", FieldValue::String("en".into())),
            Item::new("b").with_field("lang", FieldValue::String("en\tx\nfr".into())),
        ])
        .unwrap();
        let err = FieldIndexer::build(&items, "lang", FieldType::String).unwrap_err();
        assert!(matches!(err, PoolError::InvalidValue { ref item_id, ref field, .. }
            if item_id == "b" && field == "lang"));

        let items = ItemCollection::new(vec![
            Item::new("a").with_field("cat2", list(&["x", "y|z"])),
        ])
        .unwrap();
        let err = FieldIndexer::build(&items, "cat2", FieldType::StringList).unwrap_err();
        assert_eq!(err.category(), "data");
        assert!(err.to_string().contains("'|'"));

        // ':' only separates a position from its value and stays unambiguous
        let items = ItemCollection::new(vec![
            Item::new("a").with_field("lang", FieldValue::String("zh:hant".into())),
        ])
        .unwrap();
        let index = FieldIndexer::build(&items, "lang", FieldType::String).unwrap();
        assert_eq!(index.get(&"zh:hant".into()), Some(&bitmap(&[0])));
    }
}
