//! Command definitions and handlers for the `recpool` binary

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use recpool_core::writer::render_combination_index;
use recpool_core::{
    BuildConfig, BuildPlan, CombinationJoiner, ConditionEvaluator, FieldGroup, IndexBuilder,
    ItemCollection, PoolError, PoolLoader, Predicate, SchemaCatalog, verify_build,
};
use tracing::{error, info};

/// Builds inverted indexes, subpools and score tables from an item pool
#[derive(Parser, Debug)]
#[command(name = "recpool")]
#[command(about = "Recommendation pool fixture builder", version)]
pub struct Cli {
    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a full build described by a config file
    Build(BuildArgs),
    /// Print the ids of items matching a predicate, one per line
    Select(SelectArgs),
    /// Print the combination index of one field group
    Index(IndexArgs),
    /// Check a built directory against its pool
    Verify(VerifyArgs),
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Build configuration (TOML)
    #[arg(long, default_value = "recpool.toml")]
    pub config: PathBuf,

    /// Output directory, overriding the config file and environment
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Worker thread count
    #[arg(long)]
    pub workers: Option<usize>,

    /// Write successful units even if others fail
    #[arg(long)]
    pub allow_partial: bool,
}

/// Pool and schema inputs shared by the ad-hoc commands
#[derive(Args, Debug)]
pub struct PoolArgs {
    /// Item pool file
    #[arg(long)]
    pub pool: PathBuf,

    /// Schema descriptor
    #[arg(long, default_value = "resource.meta.json")]
    pub schema: PathBuf,
}

#[derive(Args, Debug)]
pub struct SelectArgs {
    #[command(flatten)]
    pub inputs: PoolArgs,

    /// Predicate, e.g. "d_s_level=2 and d_d_ctr > 0.5"
    #[arg(long)]
    pub predicate: String,
}

#[derive(Args, Debug)]
pub struct IndexArgs {
    #[command(flatten)]
    pub inputs: PoolArgs,

    /// Comma-separated field group, e.g. "d_s_language,d_s_level"
    #[arg(long, value_delimiter = ',', required = true)]
    pub fields: Vec<String>,

    /// Refuse groups with more combinations than this
    #[arg(long, default_value_t = CombinationJoiner::DEFAULT_MAX_COMBINATIONS)]
    pub max_combinations: u64,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Build configuration the directory was built from
    #[arg(long, default_value = "recpool.toml")]
    pub config: PathBuf,
}

/// How a successful command run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    /// The command ran but found problems, e.g. verification violations
    Failed,
}

impl From<Status> for ExitCode {
    fn from(status: Status) -> Self {
        match status {
            Status::Ok => ExitCode::SUCCESS,
            Status::Failed => ExitCode::FAILURE,
        }
    }
}

/// Fold a run's outcome into a `Status`, printing a failure once to `err_out`
pub fn report(result: Result<Status>, err_out: &mut impl Write) -> Status {
    match result {
        Ok(status) => status,
        Err(err) => {
            // stderr may already be closed; the exit code still reports the failure
            let _ = writeln!(err_out, "error: {:#}", err);
            Status::Failed
        }
    }
}

impl Cli {
    pub fn run(self) -> Result<Status> {
        match self.command {
            Commands::Build(args) => run_build(args),
            Commands::Select(args) => run_select(args),
            Commands::Index(args) => run_index(args),
            Commands::Verify(args) => run_verify(args),
        }
    }
}

fn load_config(path: &Path) -> Result<BuildConfig> {
    let config = BuildConfig::load(path)
        .with_context(|| format!("failed to load config {}", path.display()))?
        .apply_env_overrides();
    Ok(config)
}

fn load_inputs(pool: &Path, schema: &Path) -> Result<(ItemCollection, SchemaCatalog)> {
    let catalog = SchemaCatalog::load(schema)
        .with_context(|| format!("failed to load schema {}", schema.display()))?;
    let items = PoolLoader::load(pool, &catalog)
        .with_context(|| format!("failed to load pool {}", pool.display()))?;
    info!(items = items.len(), fields = catalog.schema().len(), "Loaded inputs");
    Ok((items, catalog))
}

fn run_build(args: BuildArgs) -> Result<Status> {
    let mut config = load_config(&args.config)?;
    if let Some(output_dir) = args.output_dir {
        config.output_dir = output_dir;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    config.allow_partial |= args.allow_partial;
    config.validate()?;

    let (items, catalog) = load_inputs(&config.pool, &config.schema)?;
    let plan = BuildPlan::from_config(&config).context("invalid predicate in config")?;

    match IndexBuilder::from_config(&config).run(&items, &catalog, &plan, &config.output_dir) {
        Ok(summary) => {
            print!("{}", summary);
            Ok(Status::Ok)
        }
        Err(PoolError::PartialBuild { failures }) => {
            for (unit, err) in &failures {
                error!(unit = %unit, category = err.category(), "{}", err);
            }
            bail!(
                "{} build unit(s) failed; {} has no SUCCESS marker",
                failures.len(),
                config.output_dir.display()
            )
        }
        Err(err) => Err(err).context("build failed, output directory left unchanged"),
    }
}

fn run_select(args: SelectArgs) -> Result<Status> {
    let (items, catalog) = load_inputs(&args.inputs.pool, &args.inputs.schema)?;
    let predicate = Predicate::parse(&args.predicate)?;
    let ids = ConditionEvaluator::select(&items, &catalog, &predicate)?;

    let mut out = BufWriter::new(io::stdout().lock());
    for id in &ids {
        writeln!(out, "{}", id)?;
    }
    out.flush()?;
    info!(selected = ids.len(), "Selection complete");
    Ok(Status::Ok)
}

fn run_index(args: IndexArgs) -> Result<Status> {
    let (items, catalog) = load_inputs(&args.inputs.pool, &args.inputs.schema)?;
    let group = FieldGroup::new(args.fields)?;
    let joiner = CombinationJoiner::with_max_combinations(args.max_combinations);
    let index = joiner.build(&items, &catalog, &group)?;

    let mut out = BufWriter::new(io::stdout().lock());
    render_combination_index(&mut out, &items, &index)?;
    out.flush()?;
    Ok(Status::Ok)
}

fn run_verify(args: VerifyArgs) -> Result<Status> {
    let config = load_config(&args.config)?;
    let (items, catalog) = load_inputs(&config.pool, &config.schema)?;
    let report = verify_build(&config.output_dir, &items, &catalog, &config.field_groups)?;

    for violation in &report.violations {
        println!("{}", violation);
    }
    println!(
        "{} groups, {} keys, {} postings checked, {} violations",
        report.groups_checked,
        report.keys_checked,
        report.postings_checked,
        report.violations.len()
    );
    Ok(if report.is_ok() { Status::Ok } else { Status::Failed })
}
