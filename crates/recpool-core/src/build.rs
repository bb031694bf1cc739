//! Build pipeline
//!
//! Every unit of a build (one field group, one predicate, one score field) is
//! computed in memory on a bounded worker pool before anything touches the
//! output directory. Units only read the shared item collection and schema.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use ahash::AHashSet;
use rayon::prelude::*;
use recpool_types::ItemCollection;
use tracing::{info, instrument, warn};

use crate::combination::{CombinationIndex, CombinationJoiner, FieldGroup};
use crate::condition::{Predicate, Subpool};
use crate::config::BuildConfig;
use crate::error::{PoolError, Result};
use crate::schema::SchemaCatalog;
use crate::scores::ScoreTable;
use crate::writer::IndexWriter;

/// What a build produces
#[derive(Debug, Clone, Default)]
pub struct BuildPlan {
    pub field_groups: Vec<FieldGroup>,
    /// Subpool ids are assigned from 1 in this order
    pub predicates: Vec<Predicate>,
    pub score_fields: Vec<String>,
}

impl BuildPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field_group(mut self, group: FieldGroup) -> Self {
        self.field_groups.push(group);
        self
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn with_score_field(mut self, field: impl Into<String>) -> Self {
        self.score_fields.push(field.into());
        self
    }

    /// Plan described by a build configuration; predicate text is parsed here
    pub fn from_config(config: &BuildConfig) -> Result<Self> {
        let predicates = config
            .predicates
            .iter()
            .map(|text| Predicate::parse(text))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            field_groups: config.field_groups.clone(),
            predicates,
            score_fields: config.score_fields.clone(),
        })
    }

    /// Reject empty groups and groups that would share an output file
    pub fn validate(&self) -> Result<()> {
        let mut seen = AHashSet::with_capacity(self.field_groups.len());
        for group in &self.field_groups {
            if group.fields.is_empty() {
                return Err(PoolError::EmptyFieldGroup);
            }
            let name = group.name();
            if !seen.insert(name.clone()) {
                return Err(PoolError::DuplicateFieldGroup { group: name });
            }
        }
        Ok(())
    }
}

/// Key and posting counts of one written field group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSummary {
    pub name: String,
    pub keys: usize,
    pub postings: u64,
}

/// What a finished build wrote
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub output_dir: PathBuf,
    pub items: usize,
    pub groups: Vec<GroupSummary>,
    /// `(subpool id, member count)`
    pub subpools: Vec<(u32, u64)>,
    /// `(score name, entry count)`
    pub scores: Vec<(String, usize)>,
    pub elapsed: Duration,
}

impl fmt::Display for BuildSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Build written to {} ({} items, {:?})",
            self.output_dir.display(),
            self.items,
            self.elapsed
        )?;
        for group in &self.groups {
            writeln!(
                f,
                "  invert_index/{}: {} keys, {} postings",
                group.name, group.keys, group.postings
            )?;
        }
        for (id, members) in &self.subpools {
            writeln!(f, "  subpool {}: {} items", id, members)?;
        }
        for (name, entries) in &self.scores {
            writeln!(f, "  scores/{}: {} entries", name, entries)?;
        }
        Ok(())
    }
}

/// Runs a `BuildPlan` and writes its outputs
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    workers: usize,
    joiner: CombinationJoiner,
    allow_partial: bool,
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            joiner: CombinationJoiner::default(),
            allow_partial: false,
        }
    }
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &BuildConfig) -> Self {
        Self {
            workers: config.workers,
            joiner: CombinationJoiner::with_max_combinations(config.max_combinations),
            allow_partial: config.allow_partial,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_max_combinations(mut self, max_combinations: u64) -> Self {
        self.joiner = CombinationJoiner::with_max_combinations(max_combinations);
        self
    }

    /// Write the units that succeeded even when others failed
    pub fn with_allow_partial(mut self, allow_partial: bool) -> Self {
        self.allow_partial = allow_partial;
        self
    }

    /// Compute every unit of `plan` and write the outputs under `out_dir`.
    ///
    /// Without `allow_partial`, any failed unit leaves the output directory
    /// untouched and the first failure in declaration order is returned. With
    /// it, successful units are written, `SUCCESS` is withheld and a
    /// `PartialBuild` error lists every failure.
    #[instrument(skip_all, fields(out_dir = %out_dir.as_ref().display(), items = items.len()))]
    pub fn run(
        &self,
        items: &ItemCollection,
        catalog: &SchemaCatalog,
        plan: &BuildPlan,
        out_dir: impl AsRef<Path>,
    ) -> Result<BuildSummary> {
        let started = Instant::now();
        plan.validate()?;

        if self.workers == 0 {
            return Err(PoolError::configuration(Some("workers"), "workers must be at least 1"));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|index| format!("recpool-worker-{}", index))
            .build()
            .map_err(|e| PoolError::configuration(Some("workers"), e.to_string()))?;

        let (indexes, subpools, scores) = pool.install(|| {
            let indexes: Vec<Result<CombinationIndex>> = plan
                .field_groups
                .par_iter()
                .map(|group| self.joiner.build(items, catalog, group))
                .collect();
            let subpools: Vec<Result<Subpool>> = plan
                .predicates
                .par_iter()
                .enumerate()
                .map(|(position, predicate)| {
                    Subpool::select(position as u32 + 1, items, catalog, predicate)
                })
                .collect();
            let scores: Vec<Result<ScoreTable>> = plan
                .score_fields
                .par_iter()
                .map(|field| ScoreTable::project(items, catalog, field))
                .collect();
            (indexes, subpools, scores)
        });

        let mut failures = Vec::new();
        let indexes =
            partition(indexes, &mut failures, |position| plan.field_groups[position].name());
        let subpools =
            partition(subpools, &mut failures, |position| format!("subpool {}", position + 1));
        let scores = partition(scores, &mut failures, |position| {
            format!("scores/{}", plan.score_fields[position])
        });

        if !failures.is_empty() && !self.allow_partial {
            let (unit, err) = failures.swap_remove(0);
            warn!(unit = %unit, category = err.category(), "Build unit failed, nothing written");
            return Err(err);
        }

        let writer = IndexWriter::new(out_dir.as_ref());
        writer.prepare()?;
        writer.write_schema(catalog.schema())?;
        for index in &indexes {
            writer.write_combination_index(items, index)?;
        }
        writer.write_subpools(items, &subpools)?;
        for table in &scores {
            writer.write_scores(table)?;
        }

        if !failures.is_empty() {
            for (unit, err) in &failures {
                warn!(unit = %unit, error = %err, "Build unit failed");
            }
            warn!(failed = failures.len(), "Partial build written without SUCCESS marker");
            return Err(PoolError::PartialBuild { failures });
        }
        writer.mark_success()?;

        let summary = BuildSummary {
            output_dir: writer.root().to_path_buf(),
            items: items.len(),
            groups: indexes
                .iter()
                .map(|index| GroupSummary {
                    name: index.name(),
                    keys: index.len(),
                    postings: index.posting_count(),
                })
                .collect(),
            subpools: subpools.iter().map(|subpool| (subpool.id, subpool.len())).collect(),
            scores: scores.iter().map(|table| (table.name().to_string(), table.len())).collect(),
            elapsed: started.elapsed(),
        };
        info!(
            groups = summary.groups.len(),
            subpools = summary.subpools.len(),
            scores = summary.scores.len(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Build complete"
        );
        Ok(summary)
    }
}

fn partition<T>(
    results: Vec<Result<T>>,
    failures: &mut Vec<(String, PoolError)>,
    unit_name: impl Fn(usize) -> String,
) -> Vec<T> {
    let mut succeeded = Vec::with_capacity(results.len());
    for (position, result) in results.into_iter().enumerate() {
        match result {
            Ok(value) => succeeded.push(value),
            Err(err) => failures.push((unit_name(position), err)),
        }
    }
    succeeded
}
