//! Schema catalog: field name to `FieldType` lookups for every component

use std::fs;
use std::path::Path;

use recpool_types::{FieldType, Schema};
use tracing::debug;

use crate::error::{PoolError, Result};

/// Read-only field catalog shared by every build unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaCatalog {
    schema: Schema,
}

impl SchemaCatalog {
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }

    /// Parse a schema descriptor (`{"field": tag-or-name, ...}`)
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| PoolError::parse("schema descriptor", Some(e.line()), e.to_string()))?;

        let serde_json::Value::Object(entries) = value else {
            return Err(PoolError::parse("schema descriptor", None, "expected a JSON object"));
        };

        let mut fields = Vec::with_capacity(entries.len());
        for (name, tag) in entries {
            let field_type: FieldType = match &tag {
                serde_json::Value::Number(n) => match n.as_i64() {
                    Some(tag) => FieldType::from_tag(tag)?,
                    None => return Err(PoolError::UnknownFieldType { tag: n.to_string() }),
                },
                serde_json::Value::String(s) => s.parse()?,
                other => return Err(PoolError::UnknownFieldType { tag: other.to_string() }),
            };
            fields.push((name, field_type));
        }

        Ok(Self::new(Schema::new(fields)))
    }

    /// Load a schema descriptor file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| PoolError::io(path, e))?;
        let catalog = Self::from_json_str(&raw)?;
        debug!(path = %path.display(), fields = catalog.schema.len(), "Loaded schema descriptor");
        Ok(catalog)
    }

    /// Declared type of a field, `UnknownField` when undeclared
    pub fn lookup(&self, field: &str) -> Result<FieldType> {
        self.schema.get(field).ok_or_else(|| PoolError::unknown_field(field))
    }

    pub fn contains(&self, field: &str) -> bool {
        self.schema.contains(field)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

impl From<Schema> for SchemaCatalog {
    fn from(schema: Schema) -> Self {
        Self::new(schema)
    }
}
