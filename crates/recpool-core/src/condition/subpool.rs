use recpool_types::ItemCollection;
use roaring::RoaringBitmap;

use super::evaluator::ConditionEvaluator;
use super::predicate::Predicate;
use crate::error::Result;
use crate::schema::SchemaCatalog;

/// Items selected by one predicate; `id` is the 1-based declaration position
#[derive(Debug, Clone, PartialEq)]
pub struct Subpool {
    pub id: u32,
    pub predicate: Predicate,
    pub members: RoaringBitmap,
}

impl Subpool {
    pub fn select(
        id: u32,
        items: &ItemCollection,
        catalog: &SchemaCatalog,
        predicate: &Predicate,
    ) -> Result<Self> {
        let members = ConditionEvaluator::select_ordinals(items, catalog, predicate)?;
        Ok(Self { id, predicate: predicate.clone(), members })
    }

    /// Member identifiers in collection order
    pub fn member_ids<'a>(
        &'a self,
        items: &'a ItemCollection,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.members.iter().filter_map(move |ordinal| items.id_of(ordinal))
    }

    pub fn len(&self) -> u64 {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
