//! Per-item score tables

use recpool_types::{FieldType, FieldValue, ItemCollection};
use tracing::debug;

use crate::error::{PoolError, Result};
use crate::schema::SchemaCatalog;

/// Named mapping of item id to score, in collection order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreTable {
    name: String,
    entries: Vec<(String, f64)>,
}

impl ScoreTable {
    pub fn new(name: impl Into<String>, entries: Vec<(String, f64)>) -> Self {
        Self { name: name.into(), entries }
    }

    /// Project a scalar numeric field into a table named after the field
    pub fn project(items: &ItemCollection, catalog: &SchemaCatalog, field: &str) -> Result<Self> {
        let field_type = catalog.lookup(field)?;
        if !matches!(field_type, FieldType::Int64 | FieldType::Float32) {
            return Err(PoolError::unsupported(field, field_type, "score projection"));
        }

        let entries = items
            .iter()
            .map(|item| {
                let score = match item.get_field(field) {
                    Some(FieldValue::Int64(v)) => *v as f64,
                    Some(FieldValue::Float32(v)) => *v,
                    Some(other) => {
                        return Err(PoolError::FieldTypeMismatch {
                            item_id: item.id.clone(),
                            field: field.to_string(),
                            expected: field_type,
                            actual: other.field_type(),
                        });
                    }
                    None => return Err(PoolError::missing_value(&item.id, field)),
                };
                Ok((item.id.clone(), score))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(field, scores = entries.len(), "Projected score table");
        Ok(Self::new(field, entries))
    }

    /// File name under `scores/`
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entries(&self) -> &[(String, f64)] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<f64> {
        self.entries.iter().find(|(entry, _)| entry == id).map(|(_, score)| *score)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recpool_types::{Item, Schema};

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::new(Schema::new([
            ("d_d_ctr", FieldType::Float32),
            ("d_s_level", FieldType::Int64),
            ("d_s_language", FieldType::String),
            ("d_s_cat2", FieldType::StringList),
        ]))
    }

    #[test]
    fn test_project_float_field() {
        let items = ItemCollection::new(vec![
            Item::new("b").with_field("d_d_ctr", FieldValue::Float32(0.25)),
            Item::new("a").with_field("d_d_ctr", FieldValue::Float32(0.9)),
        ])
        .unwrap();

        let table = ScoreTable::project(&items, &catalog(), "d_d_ctr").unwrap();
        assert_eq!(table.name(), "d_d_ctr");
        assert_eq!(table.entries(), &[("b".to_string(), 0.25), ("a".to_string(), 0.9)]);
        assert_eq!(table.get("a"), Some(0.9));
        assert_eq!(table.get("c"), None);
    }

    #[test]
    fn test_project_int_field() {
        let items =
            ItemCollection::new(vec![Item::new("a").with_field("d_s_level", FieldValue::Int64(3))])
                .unwrap();
        let table = ScoreTable::project(&items, &catalog(), "d_s_level").unwrap();
        assert_eq!(table.entries(), &[("a".to_string(), 3.0)]);
    }

    #[test]
    fn test_project_rejects_non_numeric_and_unknown() {
        let items = ItemCollection::default();
        for field in ["d_s_language", "d_s_cat2"] {
            let err = ScoreTable::project(&items, &catalog(), field).unwrap_err();
            assert!(matches!(err, PoolError::UnsupportedFieldType { .. }));
        }
        let err = ScoreTable::project(&items, &catalog(), "nope").unwrap_err();
        assert!(matches!(err, PoolError::UnknownField { .. }));
    }

    #[test]
    fn test_project_missing_value() {
        let items = ItemCollection::new(vec![Item::new("a")]).unwrap();
        let err = ScoreTable::project(&items, &catalog(), "d_d_ctr").unwrap_err();
        assert!(matches!(err, PoolError::MissingFieldValue { .. }));
    }
}
