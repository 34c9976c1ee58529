use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use grump_discovery::{CrawlConfig, CrawlReport, Discovery, Plan, RegionOutcome};
use grump_domain::DomainSnapshot;
use grump_shapes::{PaginatorDocument, ServiceSchema};
use replay::ReplayInvoker;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod replay;

#[derive(Parser)]
#[command(name = "grump")]
#[command(about = "Discover cloud resources without knowing what exists", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl a service model against recorded responses
    Discover(DiscoverArgs),

    /// Show starters and dependent operations without invoking anything
    Plan(ModelArgs),
}

#[derive(Args)]
struct ModelArgs {
    /// Service model (JSON)
    #[arg(long)]
    schema: PathBuf,

    /// Paginator definitions (JSON)
    #[arg(long)]
    paginators: Option<PathBuf>,

    /// Crawl configuration (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the namespace derived from the model
    #[arg(long)]
    namespace: Option<String>,
}

#[derive(Args)]
struct DiscoverArgs {
    #[command(flatten)]
    model: ModelArgs,

    /// Recorded responses keyed by operation (JSON)
    #[arg(long)]
    responses: Option<PathBuf>,

    /// Regions to crawl (repeatable; replaces the configured list)
    #[arg(long = "region")]
    regions: Vec<String>,

    /// Stop after this many passes
    #[arg(long)]
    max_passes: Option<usize>,

    /// Write the JSON output to a file instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Serialize)]
struct DiscoverOutput {
    regions: Vec<RegionOutput>,
    domain: DomainSnapshot,
    universal: DomainSnapshot,
}

#[derive(Serialize)]
struct RegionOutput {
    region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<CrawlReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<RegionOutcome> for RegionOutput {
    fn from(outcome: RegionOutcome) -> Self {
        let (report, error) = match outcome.result {
            Ok(report) => (Some(report), None),
            Err(err) => (None, Some(err.to_string())),
        };
        Self {
            region: outcome.region,
            report,
            error,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    match cli.command {
        Commands::Discover(args) => run_discover(args).await?,
        Commands::Plan(args) => run_plan(args)?,
    }

    Ok(())
}

async fn run_discover(args: DiscoverArgs) -> Result<()> {
    let mut config = load_config(&args.model)?;
    if !args.regions.is_empty() {
        config.regions = args.regions.clone();
    }
    if args.max_passes.is_some() {
        config.max_passes = args.max_passes;
    }

    let discovery = load_discovery(&args.model, config)?;
    let invoker = match &args.responses {
        Some(path) => ReplayInvoker::from_json(&read(path)?)?,
        None => ReplayInvoker::default(),
    };
    let invoker = Arc::new(invoker);

    let outcome = discovery.run(Arc::clone(&invoker)).await;

    for report in outcome.reports() {
        log::info!(
            "{}/{}: {} resolved, {} unresolved, {} non-fatal failure(s) in {} pass(es)",
            report.namespace,
            report.region,
            report.resolved.len(),
            report.unresolved.len(),
            report.failures.len(),
            report.passes
        );
    }
    log::debug!("{} call(s) replayed", invoker.calls());

    let failed: Vec<String> = outcome
        .failures()
        .map(|(region, err)| format!("{region}: {err}"))
        .collect();

    let output = DiscoverOutput {
        domain: outcome.root.snapshot(),
        universal: outcome.universal.snapshot(),
        regions: outcome.regions.into_iter().map(RegionOutput::from).collect(),
    };
    emit(&output, args.out.as_deref())?;

    if !failed.is_empty() {
        anyhow::bail!("Discovery failed in {}", failed.join("; "));
    }
    Ok(())
}

fn run_plan(args: ModelArgs) -> Result<()> {
    let config = load_config(&args)?;
    let discovery = load_discovery(&args, config)?;
    let plan: Plan = discovery.plan();
    log::info!(
        "{}: {} starter(s), {} dependent, {} skipped",
        plan.namespace,
        plan.starters.len(),
        plan.dependent.len(),
        plan.skipped.len()
    );
    emit(&plan, None)
}

fn load_config(args: &ModelArgs) -> Result<CrawlConfig> {
    let mut config = match &args.config {
        Some(path) => CrawlConfig::from_toml(&read(path)?)
            .map_err(|e| anyhow::anyhow!("Invalid config {}: {e}", path.display()))?,
        None => CrawlConfig::default(),
    };
    if args.namespace.is_some() {
        config.namespace = args.namespace.clone();
    }
    Ok(config)
}

fn load_discovery(args: &ModelArgs, config: CrawlConfig) -> Result<Discovery> {
    let schema = ServiceSchema::from_json(&read(&args.schema)?)
        .with_context(|| format!("Invalid service model {}", args.schema.display()))?;
    let paginators = match &args.paginators {
        Some(path) => Some(
            PaginatorDocument::from_json(&read(path)?)
                .with_context(|| format!("Invalid paginators {}", path.display()))?,
        ),
        None => None,
    };
    Ok(Discovery::new(&schema, paginators.as_ref(), config)?)
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn emit<T: Serialize>(value: &T, out: Option<&Path>) -> Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    match out {
        Some(path) => {
            fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))
        }
        None => {
            println!("{body}");
            Ok(())
        }
    }
}
