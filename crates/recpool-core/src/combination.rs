//! Multi-field combination indexes
//!
//! A field group is an ordered list of fields indexed jointly. The joiner walks
//! the cartesian product of each field's observed values in ascending order,
//! intersects posting lists with prefix short-circuiting, and re-checks every
//! surviving item against the combination key before storing it. Combinations
//! with an empty result are never stored.

use std::collections::BTreeMap;
use std::fmt;

use recpool_types::{IndexValue, ItemCollection};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::{PoolError, Result};
use crate::field_indexing::{FieldIndex, FieldIndexer};
use crate::schema::SchemaCatalog;

/// One value per field of a group, in group order
pub type CombinationKey = Vec<IndexValue>;

/// Ordered list of fields indexed jointly
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldGroup {
    pub fields: Vec<String>,
}

impl FieldGroup {
    /// Create a field group, rejecting an empty field list
    pub fn new<I, S>(fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() {
            return Err(PoolError::EmptyFieldGroup);
        }
        Ok(Self { fields })
    }

    /// Output name: field names joined by `|`
    pub fn name(&self) -> String {
        self.fields.join("|")
    }

    pub fn arity(&self) -> usize {
        self.fields.len()
    }
}

impl fmt::Display for FieldGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Combination key to posting list, in ascending key order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombinationIndex {
    fields: Vec<String>,
    entries: BTreeMap<CombinationKey, RoaringBitmap>,
}

impl CombinationIndex {
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Output name: field names joined by `|`
    pub fn name(&self) -> String {
        self.fields.join("|")
    }

    pub fn get(&self, key: &[IndexValue]) -> Option<&RoaringBitmap> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CombinationKey, &RoaringBitmap)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &CombinationKey> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total postings across all keys
    pub fn posting_count(&self) -> u64 {
        self.entries.values().map(RoaringBitmap::len).sum()
    }
}

/// Render a combination key the way the index files spell it.
///
/// A single-field key is `0|<value>`; an N-field key is
/// `0:<v0>|1:<v1>|...|N-1:<vN-1>`.
pub fn format_key(key: &[IndexValue]) -> String {
    match key {
        [single] => format!("0|{}", single),
        _ => key
            .iter()
            .enumerate()
            .map(|(position, value)| format!("{}:{}", position, value))
            .collect::<Vec<_>>()
            .join("|"),
    }
}

/// Joins per-field indexes into combination indexes
#[derive(Debug, Clone, Copy)]
pub struct CombinationJoiner {
    max_combinations: u64,
}

impl Default for CombinationJoiner {
    fn default() -> Self {
        Self { max_combinations: Self::DEFAULT_MAX_COMBINATIONS }
    }
}

impl CombinationJoiner {
    /// Default cap on the size of a group's value product
    pub const DEFAULT_MAX_COMBINATIONS: u64 = 1_000_000;

    pub fn new() -> Self {
        Self::default()
    }

    /// Joiner failing fast once a group's product exceeds `max_combinations`
    pub fn with_max_combinations(max_combinations: u64) -> Self {
        Self { max_combinations }
    }

    pub fn max_combinations(&self) -> u64 {
        self.max_combinations
    }

    /// Build the combination index of one field group.
    ///
    /// Every field is resolved and type-checked before any index is built, so
    /// an unknown or unsupported field aborts the group without doing work.
    #[instrument(skip_all, fields(group = %group))]
    pub fn build(
        &self,
        items: &ItemCollection,
        catalog: &SchemaCatalog,
        group: &FieldGroup,
    ) -> Result<CombinationIndex> {
        if group.fields.is_empty() {
            return Err(PoolError::EmptyFieldGroup);
        }

        let mut field_types = Vec::with_capacity(group.arity());
        for field in &group.fields {
            let field_type = catalog.lookup(field)?;
            FieldIndexer::check_indexable(field, field_type)?;
            field_types.push(field_type);
        }

        let indexes = group
            .fields
            .iter()
            .zip(field_types)
            .map(|(field, field_type)| FieldIndexer::build(items, field, field_type))
            .collect::<Result<Vec<_>>>()?;

        self.join(items, group, &indexes)
    }

    /// Join already-built field indexes, one per field of `group`, in order.
    ///
    /// `indexes` must name exactly the fields of `group` in the same order;
    /// anything else is rejected before any combination is enumerated.
    pub fn join(
        &self,
        items: &ItemCollection,
        group: &FieldGroup,
        indexes: &[FieldIndex],
    ) -> Result<CombinationIndex> {
        if group.fields.is_empty() {
            return Err(PoolError::EmptyFieldGroup);
        }
        if !indexes.iter().map(FieldIndex::field).eq(group.fields.iter().map(String::as_str)) {
            return Err(PoolError::FieldIndexMismatch {
                group: group.name(),
                found: indexes.iter().map(|index| index.field().to_string()).collect(),
            });
        }

        let combinations = indexes.iter().map(|index| index.len() as u128).product::<u128>();
        if combinations > u128::from(self.max_combinations) {
            return Err(PoolError::CombinationLimitExceeded {
                group: group.name(),
                combinations,
                limit: self.max_combinations,
            });
        }

        let mut entries = BTreeMap::new();
        if combinations == 0 {
            return Ok(CombinationIndex { fields: group.fields.clone(), entries });
        }

        let columns: Vec<Vec<(&IndexValue, &RoaringBitmap)>> =
            indexes.iter().map(|index| index.iter().collect()).collect();
        let lengths: Vec<usize> = columns.iter().map(Vec::len).collect();
        let mut cursor = vec![0usize; columns.len()];
        let mut dropped = 0u64;

        loop {
            let mut candidates: Option<RoaringBitmap> = None;
            let mut exhausted_at = None;
            for (position, &choice) in cursor.iter().enumerate() {
                let posting = columns[position][choice].1;
                let next = match candidates.take() {
                    None => posting.clone(),
                    Some(acc) => acc & posting,
                };
                if next.is_empty() {
                    exhausted_at = Some(position);
                    break;
                }
                candidates = Some(next);
            }

            // An empty prefix rules out every combination sharing it
            let advance_from = match (exhausted_at, candidates) {
                (None, Some(candidates)) => {
                    let key: CombinationKey = cursor
                        .iter()
                        .enumerate()
                        .map(|(position, &choice)| columns[position][choice].0.clone())
                        .collect();
                    let verified = revalidate(items, &group.fields, &key, &candidates);
                    dropped += candidates.len() - verified.len();
                    if !verified.is_empty() {
                        entries.insert(key, verified);
                    }
                    cursor.len() - 1
                }
                (Some(position), _) => position,
                (None, None) => cursor.len() - 1,
            };

            if !advance(&mut cursor, &lengths, advance_from) {
                break;
            }
        }

        let index = CombinationIndex { fields: group.fields.clone(), entries };
        if dropped > 0 {
            debug!(dropped, "Re-validation removed postings");
        }
        info!(keys = index.len(), postings = index.posting_count(), "Built combination index");
        Ok(index)
    }
}

// Step the odometer at `from`, carrying leftwards; positions right of `from`
// restart at their first value. Returns false once every combination is done.
fn advance(cursor: &mut [usize], lengths: &[usize], from: usize) -> bool {
    for slot in cursor.iter_mut().skip(from + 1) {
        *slot = 0;
    }
    for position in (0..=from).rev() {
        cursor[position] += 1;
        if cursor[position] < lengths[position] {
            return true;
        }
        cursor[position] = 0;
    }
    false
}

fn revalidate(
    items: &ItemCollection,
    fields: &[String],
    key: &[IndexValue],
    candidates: &RoaringBitmap,
) -> RoaringBitmap {
    candidates
        .iter()
        .filter(|&ordinal| {
            items.get(ordinal).is_some_and(|item| {
                fields.iter().zip(key).all(|(field, component)| {
                    item.get_field(field).is_some_and(|value| value.matches(component))
                })
            })
        })
        .collect()
}
