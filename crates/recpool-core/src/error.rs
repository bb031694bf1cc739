//! Error handling for the recpool index builder
//!
//! Every failure aborts the unit of work it occurs in (one field group, one
//! predicate, one output file) and is surfaced to the caller as a `PoolError`.
//! Nothing is retried and nothing is silently skipped.

use recpool_types::{FieldType, TypeError};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for all recpool core operations
#[derive(Error, Debug, Clone)]
pub enum PoolError {
    /// A field referenced by a field group, predicate or score is not in the schema
    #[error("unknown field '{field}'")]
    UnknownField { field: String },

    /// A field of a type that cannot be indexed or projected
    #[error("field '{field}' of type {field_type} is not supported for {operation}")]
    UnsupportedFieldType { field: String, field_type: FieldType, operation: &'static str },

    /// A predicate that does not parse or does not type-check against the schema
    #[error("malformed condition '{condition}': {message}")]
    MalformedCondition { condition: String, message: String },

    /// A read or write target that could not be used
    #[error("I/O failure on '{}': {message}", path.display())]
    Io { path: PathBuf, message: String },

    /// A field type tag that maps to no known type
    #[error("unknown field type tag '{tag}'")]
    UnknownFieldType { tag: String },

    /// An item declares a field with a different type than the schema
    #[error("field '{field}' declared as {expected} in schema but {actual} in item '{item_id}'")]
    FieldTypeMismatch { item_id: String, field: String, expected: FieldType, actual: FieldType },

    /// A value whose JSON shape does not fit its declared type
    #[error("invalid value for field '{field}' of item '{item_id}': {message}")]
    InvalidValue { item_id: String, field: String, message: String },

    /// An item lacks a value for a field that a unit of work needs
    #[error("item '{item_id}' has no value for field '{field}'")]
    MissingFieldValue { item_id: String, field: String },

    /// Two items share an identifier
    #[error("duplicate item id '{id}'")]
    DuplicateItemId { id: String },

    /// A field group without fields
    #[error("field group must name at least one field")]
    EmptyFieldGroup,

    /// Two field groups would write the same output file
    #[error("field group '{group}' is declared more than once")]
    DuplicateFieldGroup { group: String },

    /// The cartesian product of a field group exceeds the configured cap
    #[error(
        "field group '{group}' would enumerate {combinations} combinations, \
         above the limit of {limit}"
    )]
    CombinationLimitExceeded { group: String, combinations: u128, limit: u64 },

    /// Field indexes handed to a join that are not the group's fields in order
    #[error("field indexes [{}] do not match field group '{group}'", found.join(", "))]
    FieldIndexMismatch { group: String, found: Vec<String> },

    /// An item id containing a character the output layout uses as a separator
    #[error("item id '{}' contains reserved character {reserved:?}", id.escape_debug())]
    InvalidItemId { id: String, reserved: char },

    /// Malformed input text (pool line, schema descriptor, output file)
    #[error(
        "parse error in {source_name}{}: {message}",
        line.map(|l| format!(" at line {}", l)).unwrap_or_default()
    )]
    Parse { source_name: String, line: Option<usize>, message: String },

    /// Invalid build configuration
    #[error("configuration error: {message}")]
    Configuration { message: String, setting: Option<String> },

    /// Some units failed while the others were written
    #[error("{} unit(s) failed: {}", failures.len(), describe_failures(failures))]
    PartialBuild { failures: Vec<(String, PoolError)> },
}

impl PoolError {
    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            PoolError::UnknownField { .. } => "unknown_field",
            PoolError::UnsupportedFieldType { .. } => "unsupported_field_type",
            PoolError::MalformedCondition { .. } => "malformed_condition",
            PoolError::Io { .. } => "io",
            PoolError::UnknownFieldType { .. }
            | PoolError::FieldTypeMismatch { .. }
            | PoolError::InvalidValue { .. }
            | PoolError::MissingFieldValue { .. }
            | PoolError::DuplicateItemId { .. }
            | PoolError::InvalidItemId { .. } => "data",
            PoolError::EmptyFieldGroup
            | PoolError::DuplicateFieldGroup { .. }
            | PoolError::CombinationLimitExceeded { .. }
            | PoolError::FieldIndexMismatch { .. } => "field_group",
            PoolError::Parse { .. } => "parse",
            PoolError::Configuration { .. } => "configuration",
            PoolError::PartialBuild { .. } => "partial_build",
        }
    }

    /// Get the error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PoolError::Io { .. } | PoolError::PartialBuild { .. } => ErrorSeverity::Critical,
            PoolError::Configuration { .. }
            | PoolError::Parse { .. }
            | PoolError::DuplicateItemId { .. }
            | PoolError::DuplicateFieldGroup { .. } => ErrorSeverity::High,
            _ => ErrorSeverity::Medium,
        }
    }

    /// Create an unknown field error
    pub fn unknown_field(field: impl Into<String>) -> Self {
        Self::UnknownField { field: field.into() }
    }

    /// Create an unsupported field type error
    pub fn unsupported(
        field: impl Into<String>,
        field_type: FieldType,
        operation: &'static str,
    ) -> Self {
        Self::UnsupportedFieldType { field: field.into(), field_type, operation }
    }

    /// Create a malformed condition error
    pub fn malformed(condition: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedCondition { condition: condition.into(), message: message.into() }
    }

    /// Wrap an I/O error with the path it occurred on
    pub fn io(path: impl AsRef<Path>, err: impl fmt::Display) -> Self {
        Self::Io { path: path.as_ref().to_path_buf(), message: err.to_string() }
    }

    /// Create a missing field value error
    pub fn missing_value(item_id: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingFieldValue { item_id: item_id.into(), field: field.into() }
    }

    /// Create a parse error
    pub fn parse(
        source_name: impl Into<String>,
        line: Option<usize>,
        message: impl Into<String>,
    ) -> Self {
        Self::Parse { source_name: source_name.into(), line, message: message.into() }
    }

    /// Create a configuration error
    pub fn configuration(setting: Option<&str>, message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into(), setting: setting.map(str::to_string) }
    }
}

impl From<TypeError> for PoolError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::UnknownFieldType { tag } => PoolError::UnknownFieldType { tag },
            TypeError::DuplicateItemId { id } => PoolError::DuplicateItemId { id },
            TypeError::InvalidItemId { id, reserved } => PoolError::InvalidItemId { id, reserved },
            other => PoolError::parse("item collection", None, other.to_string()),
        }
    }
}

fn describe_failures(failures: &[(String, PoolError)]) -> String {
    failures.iter().map(|(unit, err)| format!("{}: {}", unit, err)).collect::<Vec<_>>().join("; ")
}

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Medium,
    High,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Medium => write!(f, "MEDIUM"),
            ErrorSeverity::High => write!(f, "HIGH"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, PoolError>;
