use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::combination::{CombinationJoiner, FieldGroup};
use crate::error::{PoolError, Result};

/// Build configuration, read from TOML.
///
/// ```toml
/// output_dir = "out"
/// pool = "pool.txt"
/// schema = "resource.meta.json"
/// predicates = ["d_s_language='en'", "d_s_level=2 and d_d_ctr > 0.5"]
/// score_fields = ["d_d_ctr"]
///
/// [[field_groups]]
/// fields = ["d_s_language"]
///
/// [[field_groups]]
/// fields = ["d_s_country", "d_s_cat"]
/// ```
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct BuildConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_pool")]
    pub pool: PathBuf,
    #[serde(default = "default_schema")]
    pub schema: PathBuf,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_max_combinations")]
    pub max_combinations: u64,
    #[serde(default)]
    pub allow_partial: bool,
    #[serde(default)]
    pub field_groups: Vec<FieldGroup>,
    #[serde(default)]
    pub predicates: Vec<String>,
    #[serde(default)]
    pub score_fields: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            pool: default_pool(),
            schema: default_schema(),
            workers: default_workers(),
            max_combinations: default_max_combinations(),
            allow_partial: false,
            field_groups: Vec::new(),
            predicates: Vec::new(),
            score_fields: Vec::new(),
        }
    }
}

impl BuildConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| PoolError::configuration(None, e.to_string()))
    }

    /// Load a config file; relative paths inside it resolve against its directory
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| PoolError::io(path, e))?;
        let mut config = Self::from_toml_str(&raw)?;

        if let Some(base) = path.parent().filter(|base| !base.as_os_str().is_empty()) {
            for target in [&mut config.output_dir, &mut config.pool, &mut config.schema] {
                if target.is_relative() {
                    *target = base.join(&*target);
                }
            }
        }

        info!(
            path = %path.display(),
            groups = config.field_groups.len(),
            "Loaded build configuration"
        );
        Ok(config)
    }

    /// Apply `RECPOOL_*` environment overrides
    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup; unparsable values are ignored with a warning
    pub fn apply_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(output_dir) = lookup("RECPOOL_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(output_dir);
        }
        if let Some(workers) = lookup("RECPOOL_WORKERS") {
            match workers.parse::<usize>() {
                Ok(workers) => self.workers = workers,
                Err(_) => warn!(value = %workers, "Ignoring invalid RECPOOL_WORKERS"),
            }
        }
        if let Some(limit) = lookup("RECPOOL_MAX_COMBINATIONS") {
            match limit.parse::<u64>() {
                Ok(limit) => self.max_combinations = limit,
                Err(_) => warn!(value = %limit, "Ignoring invalid RECPOOL_MAX_COMBINATIONS"),
            }
        }
        if let Some(allow_partial) = lookup("RECPOOL_ALLOW_PARTIAL") {
            match allow_partial.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.allow_partial = true,
                "0" | "false" | "no" => self.allow_partial = false,
                _ => warn!(value = %allow_partial, "Ignoring invalid RECPOOL_ALLOW_PARTIAL"),
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(PoolError::configuration(Some("workers"), "workers must be at least 1"));
        }
        if self.max_combinations == 0 {
            return Err(PoolError::configuration(
                Some("max_combinations"),
                "max_combinations must be at least 1",
            ));
        }
        if let Some(position) = self.field_groups.iter().position(|group| group.fields.is_empty()) {
            return Err(PoolError::configuration(
                Some("field_groups"),
                format!("field group #{} has no fields", position + 1),
            ));
        }
        Ok(())
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("out")
}

fn default_pool() -> PathBuf {
    PathBuf::from("pool.txt")
}

fn default_schema() -> PathBuf {
    PathBuf::from("resource.meta.json")
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_max_combinations() -> u64 {
    CombinationJoiner::DEFAULT_MAX_COMBINATIONS
}
