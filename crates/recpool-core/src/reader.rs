//! Reading build outputs back, and checking a built directory against its items

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use recpool_types::{FieldType, IndexValue, ItemCollection};
use tracing::{info, instrument, warn};

use crate::combination::{CombinationJoiner, FieldGroup, format_key};
use crate::error::{PoolError, Result};
use crate::schema::SchemaCatalog;
use crate::writer::IndexWriter;

/// Loader for the text formats written by `IndexWriter`
pub struct IndexReader;

impl IndexReader {
    /// `(key, ids)` pairs in file order
    pub fn read_combination_index(path: impl AsRef<Path>) -> Result<Vec<(String, Vec<String>)>> {
        let path = path.as_ref();
        read_columns(path)?
            .into_iter()
            .map(|(_, key, ids)| Ok((key, split_ids(&ids))))
            .collect()
    }

    /// Subpool id to member ids
    pub fn read_subpools(path: impl AsRef<Path>) -> Result<BTreeMap<u32, Vec<String>>> {
        let path = path.as_ref();
        let mut subpools = BTreeMap::new();
        for (line, id, ids) in read_columns(path)? {
            let id: u32 = id.trim().parse().map_err(|_| {
                PoolError::parse(
                    path.display().to_string(),
                    Some(line),
                    format!("invalid subpool id '{}'", id),
                )
            })?;
            subpools.insert(id, split_ids(&ids));
        }
        Ok(subpools)
    }

    /// `(item id, score)` pairs in file order
    pub fn read_scores(path: impl AsRef<Path>) -> Result<Vec<(String, f64)>> {
        let path = path.as_ref();
        read_columns(path)?
            .into_iter()
            .map(|(line, id, score)| {
                let score: f64 = score.trim().parse().map_err(|_| {
                    PoolError::parse(
                        path.display().to_string(),
                        Some(line),
                        format!("invalid score '{}'", score),
                    )
                })?;
                Ok((id, score))
            })
            .collect()
    }
}

// Lines with fewer than two tab-separated columns are skipped; extra columns are ignored.
fn read_columns(path: &Path) -> Result<Vec<(usize, String, String)>> {
    let file = File::open(path).map_err(|e| PoolError::io(path, e))?;
    let mut rows = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| PoolError::io(path, e))?;
        let mut columns = line.split('\t');
        if let (Some(first), Some(second)) = (columns.next(), columns.next()) {
            rows.push((index + 1, first.to_string(), second.to_string()));
        }
    }
    Ok(rows)
}

fn split_ids(ids: &str) -> Vec<String> {
    if ids.is_empty() {
        Vec::new()
    } else {
        ids.split(',').map(str::to_string).collect()
    }
}

/// Outcome of `verify_build`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub groups_checked: usize,
    pub keys_checked: usize,
    pub postings_checked: usize,
    pub violations: Vec<String>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Re-check a built directory against the item collection.
///
/// Every posting must satisfy its key (exactness), and every field group file
/// must hold exactly the keys and postings a fresh build produces
/// (completeness). A missing `SUCCESS` marker is also reported.
#[instrument(skip_all, fields(dir = %dir.as_ref().display()))]
pub fn verify_build(
    dir: impl AsRef<Path>,
    items: &ItemCollection,
    catalog: &SchemaCatalog,
    groups: &[FieldGroup],
) -> Result<VerifyReport> {
    let writer = IndexWriter::new(dir.as_ref());
    let mut report = VerifyReport::default();

    if !writer.success_path().exists() {
        report.violations.push("SUCCESS marker is missing".to_string());
    }

    let joiner = CombinationJoiner::with_max_combinations(u64::MAX);
    for group in groups {
        let name = group.name();
        let field_types = group
            .fields
            .iter()
            .map(|field| catalog.lookup(field))
            .collect::<Result<Vec<_>>>()?;

        let written = IndexReader::read_combination_index(writer.combination_index_path(&name))?;
        report.groups_checked += 1;

        for (key_text, ids) in &written {
            report.keys_checked += 1;
            let Some(key) = parse_key(key_text, &field_types) else {
                report.violations.push(format!("{}: unparseable key '{}'", name, key_text));
                continue;
            };

            for id in ids {
                report.postings_checked += 1;
                let Some(item) = items.ordinal_of(id).and_then(|ordinal| items.get(ordinal)) else {
                    report
                        .violations
                        .push(format!("{}: key '{}' lists unknown item '{}'", name, key_text, id));
                    continue;
                };
                let exact = group.fields.iter().zip(&key).all(|(field, component)| {
                    item.get_field(field).is_some_and(|value| value.matches(component))
                });
                if !exact {
                    report.violations.push(format!(
                        "{}: item '{}' does not satisfy key '{}'",
                        name, id, key_text
                    ));
                }
            }
        }

        let rebuilt = joiner.build(items, catalog, group)?;
        let expected: Vec<(String, Vec<String>)> = rebuilt
            .iter()
            .map(|(key, posting)| {
                let ids =
                    posting.iter().filter_map(|o| items.id_of(o)).map(str::to_string).collect();
                (format_key(key), ids)
            })
            .collect();
        if expected != written {
            report.violations.push(format!(
                "{}: file holds {} keys but a rebuild yields {} (or postings differ)",
                name,
                written.len(),
                expected.len()
            ));
        }
    }

    if report.is_ok() {
        info!(groups = report.groups_checked, keys = report.keys_checked, "Build verified");
    } else {
        warn!(violations = report.violations.len(), "Build verification found violations");
    }
    Ok(report)
}

fn parse_key(text: &str, field_types: &[FieldType]) -> Option<Vec<IndexValue>> {
    let components: Vec<&str> = match field_types {
        [_] => vec![text.strip_prefix("0|")?],
        _ => {
            let parts: Vec<&str> = text.split('|').collect();
            if parts.len() != field_types.len() {
                return None;
            }
            parts
                .into_iter()
                .enumerate()
                .map(|(position, part)| {
                    let (index, value) = part.split_once(':')?;
                    (index.parse::<usize>().ok()? == position).then_some(value)
                })
                .collect::<Option<Vec<_>>>()?
        }
    };

    components
        .into_iter()
        .zip(field_types)
        .map(|(component, field_type)| match field_type {
            FieldType::Int64 => component.parse().ok().map(IndexValue::Int),
            _ => Some(IndexValue::Str(component.to_string())),
        })
        .collect()
}
