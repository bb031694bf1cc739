use recpool_types::{FieldType, FieldValue, Item, ItemCollection};
use roaring::RoaringBitmap;
use tracing::{debug, instrument};

use super::predicate::{Literal, Operator, Predicate, Term};
use crate::error::{PoolError, Result};
use crate::schema::SchemaCatalog;

/// A term checked against the schema, ready to evaluate
#[derive(Debug, Clone)]
struct CheckedTerm<'a> {
    term: &'a Term,
    field_type: FieldType,
}

/// Selects the items satisfying a predicate
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// Identifiers of the selected items, in collection order
    #[instrument(skip_all, fields(predicate = %predicate))]
    pub fn select(
        items: &ItemCollection,
        catalog: &SchemaCatalog,
        predicate: &Predicate,
    ) -> Result<Vec<String>> {
        let ordinals = Self::select_ordinals(items, catalog, predicate)?;
        Ok(ordinals
            .iter()
            .filter_map(|ordinal| items.id_of(ordinal))
            .map(str::to_string)
            .collect())
    }

    /// Ordinals of the selected items
    pub fn select_ordinals(
        items: &ItemCollection,
        catalog: &SchemaCatalog,
        predicate: &Predicate,
    ) -> Result<RoaringBitmap> {
        let checked = Self::validate(catalog, predicate)?;

        let mut selected = RoaringBitmap::new();
        for (ordinal, item) in items.enumerate() {
            if Self::matches_checked(item, &checked)? {
                selected.insert(ordinal);
            }
        }

        debug!(selected = selected.len(), total = items.len(), "Evaluated predicate");
        Ok(selected)
    }

    /// Check every term against the schema without looking at any item
    pub fn check(catalog: &SchemaCatalog, predicate: &Predicate) -> Result<()> {
        Self::validate(catalog, predicate).map(|_| ())
    }

    /// Evaluate a predicate against one item
    pub fn matches(item: &Item, catalog: &SchemaCatalog, predicate: &Predicate) -> Result<bool> {
        let checked = Self::validate(catalog, predicate)?;
        Self::matches_checked(item, &checked)
    }

    fn validate<'a>(
        catalog: &SchemaCatalog,
        predicate: &'a Predicate,
    ) -> Result<Vec<CheckedTerm<'a>>> {
        let malformed = |message: String| PoolError::malformed(predicate.source(), message);

        predicate
            .terms()
            .iter()
            .map(|term| {
                let field_type = catalog.lookup(&term.field).map_err(|_| {
                    malformed(format!("unknown field '{}'", term.field))
                })?;

                let accepted = match term.operator {
                    Operator::Contains => match field_type {
                        FieldType::StringList => matches!(term.literal, Literal::Str(_)),
                        FieldType::Int64List | FieldType::Float32List => term.literal.is_numeric(),
                        _ => false,
                    },
                    Operator::Equal if !field_type.is_numeric() || field_type.is_list() => {
                        matches!(term.literal, Literal::Str(_))
                    }
                    _ if field_type.is_list() || !field_type.is_numeric() => false,
                    _ => term.literal.is_numeric(),
                };

                if !accepted {
                    return Err(malformed(format!(
                        "operator '{}' with literal {} is not applicable to {} field '{}'",
                        term.operator, term.literal, field_type, term.field
                    )));
                }
                Ok(CheckedTerm { term, field_type })
            })
            .collect()
    }

    // Every referenced field must be present before any term is evaluated, so a
    // missing value fails regardless of term order.
    fn matches_checked(item: &Item, checked: &[CheckedTerm<'_>]) -> Result<bool> {
        let mut values = Vec::with_capacity(checked.len());
        for CheckedTerm { term, field_type } in checked {
            let value = item
                .get_field(&term.field)
                .ok_or_else(|| PoolError::missing_value(&item.id, &term.field))?;

            if value.field_type() != *field_type {
                return Err(PoolError::FieldTypeMismatch {
                    item_id: item.id.clone(),
                    field: term.field.clone(),
                    expected: *field_type,
                    actual: value.field_type(),
                });
            }
            values.push(value);
        }

        Ok(checked
            .iter()
            .zip(values)
            .all(|(CheckedTerm { term, .. }, value)| {
                evaluate_term(value, term.operator, &term.literal)
            }))
    }
}

fn evaluate_term(value: &FieldValue, operator: Operator, literal: &Literal) -> bool {
    match (operator, value, literal) {
        (Operator::Contains, FieldValue::StringList(list), Literal::Str(s)) => {
            list.iter().any(|element| element == s)
        }
        (Operator::Contains, FieldValue::Int64List(list), Literal::Int(n)) => list.contains(n),
        (Operator::Contains, FieldValue::Int64List(list), literal) => literal
            .as_f64()
            .is_some_and(|n| list.iter().any(|element| *element as f64 == n)),
        (Operator::Contains, FieldValue::Float32List(list), literal) => literal
            .as_f64()
            .is_some_and(|n| list.iter().any(|element| *element == n)),
        (Operator::Contains, _, _) => false,

        // Strings, and lists flattened to their comma-joined form
        (_, FieldValue::String(s), Literal::Str(literal)) => {
            operator.accepts(s.as_str().cmp(literal.as_str()))
        }
        (_, list, Literal::Str(literal)) if list.field_type().is_list() => {
            operator.accepts(list.flatten().as_str().cmp(literal.as_str()))
        }

        (_, FieldValue::Int64(v), Literal::Int(n)) => operator.accepts(v.cmp(n)),
        (_, scalar, literal) => match (scalar.as_f64(), literal.as_f64()) {
            (Some(v), Some(n)) => {
                v.partial_cmp(&n).is_some_and(|ordering| operator.accepts(ordering))
            }
            _ => false,
        },
    }
}
