//! Item pool loading
//!
//! A pool file holds one item per line, `<id>\t<json-object>`, where every
//! top-level key of the object is a field name and every value is
//! `{"type": <tag>, "value": <scalar-or-list>}`. Blank lines are ignored.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use recpool_types::{FieldType, FieldValue, ID_RESERVED, Item, ItemCollection};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::{PoolError, Result};
use crate::schema::SchemaCatalog;

#[derive(Debug, Deserialize)]
struct RawField {
    #[serde(rename = "type")]
    field_type: Option<FieldType>,
    value: serde_json::Value,
}

/// Reads item pools against a schema catalog
pub struct PoolLoader;

impl PoolLoader {
    /// Load a pool file into an `ItemCollection`, preserving line order
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>, catalog: &SchemaCatalog) -> Result<ItemCollection> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| PoolError::io(path, e))?;
        let source_name = path.display().to_string();
        let items = Self::from_reader(BufReader::new(file), &source_name, catalog)?;
        debug!(items = items.len(), "Loaded item pool");
        Ok(items)
    }

    /// Load items from any buffered reader; `source_name` labels parse errors
    pub fn from_reader<R: BufRead>(
        reader: R,
        source_name: &str,
        catalog: &SchemaCatalog,
    ) -> Result<ItemCollection> {
        let mut items = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| PoolError::io(source_name, e))?;
            let line_number = index + 1;
            let parsed =
                Self::parse_line(&line, catalog).map_err(|e| at_line(e, source_name, line_number))?;
            if let Some(item) = parsed {
                items.push(item);
            }
        }
        Ok(ItemCollection::new(items)?)
    }

    /// Parse one pool line; `Ok(None)` for a blank line
    pub fn parse_line(line: &str, catalog: &SchemaCatalog) -> Result<Option<Item>> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Ok(None);
        }

        let Some((id, payload)) = line.split_once('\t') else {
            return Err(PoolError::parse("pool line", None, "expected '<id>\\t<json>'"));
        };
        if id.is_empty() {
            return Err(PoolError::parse("pool line", None, "empty item id"));
        }
        if let Some(reserved) = id.chars().find(|c| ID_RESERVED.contains(c)) {
            return Err(PoolError::parse(
                "pool line",
                None,
                format!("item id {:?} contains reserved character {:?}", id, reserved),
            ));
        }

        let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_str(payload)
            .map_err(|e| PoolError::parse("pool line", None, format!("invalid item JSON: {}", e)))?;

        let mut item = Item::new(id);
        for (name, entry) in raw {
            let expected = catalog.lookup(&name)?;
            let field: RawField =
                serde_json::from_value(entry).map_err(|e| PoolError::InvalidValue {
                    item_id: id.to_string(),
                    field: name.clone(),
                    message: e.to_string(),
                })?;

            if let Some(actual) = field.field_type {
                if actual != expected {
                    return Err(PoolError::FieldTypeMismatch {
                        item_id: id.to_string(),
                        field: name,
                        expected,
                        actual,
                    });
                }
            }

            let value =
                FieldValue::from_json(expected, &field.value).map_err(|e| PoolError::InvalidValue {
                    item_id: id.to_string(),
                    field: name.clone(),
                    message: e.to_string(),
                })?;
            item.fields.insert(name, value);
        }

        Ok(Some(item))
    }
}

// Parse errors get the file name and line number attached; semantic errors
// already name the item and field.
fn at_line(err: PoolError, source_name: &str, line: usize) -> PoolError {
    match err {
        PoolError::Parse { message, .. } => PoolError::parse(source_name, Some(line), message),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::from_json_str(
            r#"{"d_s_language": 2, "d_s_level": 0, "d_d_ctr": 1, "d_s_cat2": 5}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_line() {
        let line = "item_id_0\t{\"d_s_language\": {\"type\": 2, \"value\": \"en\"}, \
                    \"d_s_level\": {\"type\": 0, \"value\": 3}, \
                    \"d_s_cat2\": {\"type\": \"Strings\", \"value\": [\"cat21\", \"cat22\"]}}";
        let item = PoolLoader::parse_line(line, &catalog()).unwrap().unwrap();

        assert_eq!(item.id, "item_id_0");
        assert_eq!(item.get_field("d_s_language"), Some(&FieldValue::String("en".into())));
        assert_eq!(item.get_field("d_s_level"), Some(&FieldValue::Int64(3)));
        assert_eq!(
            item.get_field("d_s_cat2"),
            Some(&FieldValue::StringList(vec!["cat21".into(), "cat22".into()]))
        );
        assert!(item.get_field("d_d_ctr").is_none());
    }

    #[test]
    fn test_blank_lines_skipped() {
        assert!(PoolLoader::parse_line("", &catalog()).unwrap().is_none());
        assert!(PoolLoader::parse_line("   \r", &catalog()).unwrap().is_none());
    }

    #[test]
    fn test_type_mismatch_and_shape_errors() {
        let catalog = catalog();

        let line = "a\t{\"d_s_level\": {\"type\": 2, \"value\": \"x\"}}";
        let err = PoolLoader::parse_line(line, &catalog).unwrap_err();
        assert!(matches!(
            err,
            PoolError::FieldTypeMismatch {
                expected: FieldType::Int64,
                actual: FieldType::String,
                ..
            }
        ));

        let line = "a\t{\"d_s_level\": {\"type\": 0, \"value\": 1.5}}";
        let err = PoolLoader::parse_line(line, &catalog).unwrap_err();
        assert!(matches!(err, PoolError::InvalidValue { ref field, .. } if field == "d_s_level"));

        let err = PoolLoader::parse_line("a\t{\"d_s_level\": 3}", &catalog).unwrap_err();
        assert!(matches!(err, PoolError::InvalidValue { .. }));

        let err = PoolLoader::parse_line("a\t{\"nope\": {\"type\": 0, \"value\": 1}}", &catalog)
            .unwrap_err();
        assert!(matches!(err, PoolError::UnknownField { ref field } if field == "nope"));
    }

    #[test]
    fn test_reader_reports_line_numbers() {
        let input = "a\t{\"d_s_level\": {\"type\": 0, \"value\": 1}}\n\nno tab here\n";
        let err = PoolLoader::from_reader(Cursor::new(input), "pool.txt", &catalog()).unwrap_err();
        assert!(matches!(err, PoolError::Parse { line: Some(3), .. }));
        assert!(err.to_string().contains("pool.txt at line 3"));
    }

    #[test]
    fn test_reader_rejects_ids_with_separators() {
        let input = "a\t{}\nb,c\t{}\n";
        let err = PoolLoader::from_reader(Cursor::new(input), "pool.txt", &catalog()).unwrap_err();
        assert!(matches!(err, PoolError::Parse { line: Some(2), .. }));
        assert!(err.to_string().contains("reserved character ','"));

        let input = "a\rb\t{}\n";
        let err = PoolLoader::from_reader(Cursor::new(input), "pool.txt", &catalog()).unwrap_err();
        assert!(matches!(err, PoolError::Parse { line: Some(1), .. }));
    }

    #[test]
    fn test_reader_rejects_duplicate_ids() {
        let input = "a\t{}\nb\t{}\na\t{}\n";
        let err = PoolLoader::from_reader(Cursor::new(input), "pool.txt", &catalog()).unwrap_err();
        assert!(matches!(err, PoolError::DuplicateItemId { ref id } if id == "a"));
    }

    #[test]
    fn test_load_file_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.txt");
        std::fs::write(
            &path,
            "z\t{\"d_s_language\": {\"type\": 2, \"value\": \"en\"}}\n\
             y\t{\"d_s_language\": {\"type\": 2, \"value\": \"fr\"}}\n",
        )
        .unwrap();

        let items = PoolLoader::load(&path, &catalog()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items.id_of(0), Some("z"));
        assert_eq!(items.id_of(1), Some("y"));
    }
}
