use ahash::AHashMap;
use std::collections::HashMap;

use crate::error::TypeError;
use crate::field::FieldValue;

/// Dense position of an item inside its `ItemCollection`
pub type Ordinal = u32;

/// Characters that delimit lines, columns and id lists in output files; an
/// item id containing one is rejected.
pub const ID_RESERVED: [char; 4] = ['\t', '\n', '\r', ','];

/// One item of the pool: an identifier plus its typed field values
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// Identifier, unique within a collection
    pub id: String,
    /// Field name to typed value
    pub fields: HashMap<String, FieldValue>,
}

impl Item {
    /// Create an item with no fields
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), fields: HashMap::new() }
    }

    /// Builder-style field insertion, used mainly in tests and fixtures
    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Get a field value from this item
    pub fn get_field(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }
}

/// Ordered, immutable sequence of items with unique identifiers.
///
/// Every item is addressed by its ordinal (its position), which is what posting
/// lists store; ascending ordinal order is collection order.
#[derive(Debug, Clone, Default)]
pub struct ItemCollection {
    items: Vec<Item>,
    ordinals: AHashMap<String, Ordinal>,
}

impl ItemCollection {
    /// Build a collection, rejecting duplicate identifiers and identifiers
    /// containing an `ID_RESERVED` character
    pub fn new(items: Vec<Item>) -> Result<Self, TypeError> {
        if items.len() > Ordinal::MAX as usize {
            return Err(TypeError::CollectionTooLarge { len: items.len() });
        }

        let mut ordinals = AHashMap::with_capacity(items.len());
        for (position, item) in items.iter().enumerate() {
            if let Some(reserved) = item.id.chars().find(|c| ID_RESERVED.contains(c)) {
                return Err(TypeError::InvalidItemId { id: item.id.clone(), reserved });
            }
            if ordinals.insert(item.id.clone(), position as Ordinal).is_some() {
                return Err(TypeError::DuplicateItemId { id: item.id.clone() });
            }
        }

        Ok(Self { items, ordinals })
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the collection holds no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item at an ordinal
    pub fn get(&self, ordinal: Ordinal) -> Option<&Item> {
        self.items.get(ordinal as usize)
    }

    /// Identifier of the item at an ordinal
    pub fn id_of(&self, ordinal: Ordinal) -> Option<&str> {
        self.get(ordinal).map(|item| item.id.as_str())
    }

    /// Ordinal of an identifier
    pub fn ordinal_of(&self, id: &str) -> Option<Ordinal> {
        self.ordinals.get(id).copied()
    }

    /// Items in collection order
    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.iter()
    }

    /// `(ordinal, item)` pairs in collection order
    pub fn enumerate(&self) -> impl Iterator<Item = (Ordinal, &Item)> {
        self.items.iter().enumerate().map(|(position, item)| (position as Ordinal, item))
    }

    /// Items as a slice
    pub fn as_slice(&self) -> &[Item] {
        &self.items
    }
}

impl<'a> IntoIterator for &'a ItemCollection {
    type Item = &'a Item;
    type IntoIter = std::slice::Iter<'a, Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
