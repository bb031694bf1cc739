#![allow(missing_docs)]
//! Core functionality for the recpool fixture builder.
//!
//! Given an item pool and its schema, this crate builds multi-field inverted
//! indexes (one per field group), selects predicate subpools and projects
//! score tables, then writes them in the text layout the serving side loads.

/// Build pipeline: plan, bounded worker pool, all-or-nothing writes
pub mod build;
/// Field groups and combination indexes
pub mod combination;
/// Subpool predicates: parsing, validation and evaluation
pub mod condition;
/// TOML build configuration with environment overrides
pub mod config;
/// Error types
pub mod error;
/// Per-field posting indexes
pub mod field_indexing;
/// Item pool loading
pub mod pool;
/// Reading outputs back and verifying a built directory
pub mod reader;
/// Schema catalog
pub mod schema;
/// Score tables
pub mod scores;
/// Output layout writer
pub mod writer;

pub use build::{BuildPlan, BuildSummary, GroupSummary, IndexBuilder};
pub use combination::{CombinationIndex, CombinationJoiner, CombinationKey, FieldGroup, format_key};
pub use condition::{ConditionEvaluator, Literal, Operator, Predicate, Subpool, Term};
pub use config::BuildConfig;
pub use error::{ErrorSeverity, PoolError, Result};
pub use field_indexing::{FieldIndex, FieldIndexer};
pub use pool::PoolLoader;
pub use reader::{IndexReader, VerifyReport, verify_build};
pub use schema::SchemaCatalog;
pub use scores::ScoreTable;
pub use writer::IndexWriter;

pub use recpool_types::{FieldType, FieldValue, IndexValue, Item, ItemCollection, Ordinal, Schema};
