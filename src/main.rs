//! fieldscope - resolve web page elements from field descriptors
//!
//! Diagnostic shell over the library: parse descriptors, rank archived snapshots offline and
//! resolve fields against a live Chromium page.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use action_locator::{rank, select_instance, Category, RuleMatch, RuleQuery};
use anyhow::{Context, Result};
use cdp_adapter::{CdpPageProbe, PageProbe};
use clap::{Args, Parser, Subcommand};
use fieldscope::{Config, ElementHandle, FieldDescriptor, FieldScope, RefreshPolicy};
use perceiver_structural::SnapshotArchive;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// fieldscope - locate elements from human-readable field descriptors
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable debug mode
    #[arg(short, long)]
    debug: bool,

    /// Output format
    #[arg(short, long, default_value = "human")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, clap::ValueEnum)]
enum OutputFormat {
    Human,
    Json,
    Yaml,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a field descriptor and print its parts
    Parse(ParseArgs),

    /// Rank an archived snapshot against a selector without a browser
    Rank(RankArgs),

    /// Resolve a field on the first page of a Chromium instance
    Resolve(ResolveArgs),
}

#[derive(Args)]
struct ParseArgs {
    /// Descriptor, e.g. "{{popup_dialog}} OK" or "Email[2]"
    descriptor: String,
}

#[derive(Args)]
struct RankArgs {
    /// Snapshot JSON file (as written by the snapshot archive)
    #[arg(short, long, value_name = "FILE")]
    snapshot: PathBuf,

    /// Element category: button, input, radio, checkbox, dropdown or link
    #[arg(short = 't', long = "type")]
    element_type: String,

    /// Selector descriptor
    selector: String,
}

#[derive(Args)]
struct ResolveArgs {
    /// Field type for pattern resolution, or category with --heuristic
    #[arg(short = 't', long = "type")]
    element_type: String,

    /// Rank a DOM snapshot instead of trying pattern templates
    #[arg(long)]
    heuristic: bool,

    /// Snapshot refresh for heuristic resolution
    #[arg(long, value_parser = parse_refresh, default_value = "none")]
    refresh: RefreshPolicy,

    /// Pattern library overriding pattern.default_library
    #[arg(long)]
    library: Option<String>,

    /// Pattern resolution timeout in milliseconds
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Field descriptor
    field: String,
}

fn parse_refresh(raw: &str) -> Result<RefreshPolicy, String> {
    raw.parse()
}

#[derive(Serialize)]
struct RankReport<'a> {
    selector: &'a str,
    category: Category,
    instance: usize,
    selected: Option<usize>,
    matches: &'a [RuleMatch<'a>],
}

#[derive(Serialize)]
struct ResolveReport<'a> {
    field: &'a str,
    element_type: &'a str,
    strategy: &'static str,
    found: bool,
    handle: &'a ElementHandle,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.debug)?;

    let result = match cli.command {
        Commands::Parse(args) => cmd_parse(args, &cli.output),
        Commands::Rank(args) => cmd_rank(args, &cli.output),
        Commands::Resolve(args) => {
            let config = load_config(cli.config.as_deref())?;
            cmd_resolve(args, &config, &cli.output).await
        }
    };

    if let Err(err) = &result {
        error!("Command failed: {err:#}");
    }
    result
}

fn init_logging(level: &str, debug: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    Config::load(path).context("Failed to load configuration")
}

fn cmd_parse(args: ParseArgs, output: &OutputFormat) -> Result<()> {
    let descriptor =
        FieldDescriptor::parse(&args.descriptor).context("Failed to parse descriptor")?;

    match output {
        OutputFormat::Yaml => print_yaml(&descriptor)?,
        OutputFormat::Human | OutputFormat::Json => print_json(&descriptor)?,
    }
    Ok(())
}

fn cmd_rank(args: RankArgs, output: &OutputFormat) -> Result<()> {
    let category: Category = args.element_type.parse()?;
    let descriptor = FieldDescriptor::parse(&args.selector).context("Failed to parse selector")?;
    let snapshot = SnapshotArchive::load(&args.snapshot)
        .with_context(|| format!("Failed to read snapshot {}", args.snapshot.display()))?;

    let query = RuleQuery::new(&descriptor.field_name, descriptor.section_scope());
    let ranked = rank(&snapshot, category, &query);
    let selected = select_instance(&ranked, descriptor.instance, &args.selector)
        .ok()
        .map(|found| found.record.dom_index);
    info!(
        selector = %args.selector,
        category = %category,
        elements = snapshot.len(),
        matches = ranked.len(),
        "snapshot ranked"
    );

    let report = RankReport {
        selector: &args.selector,
        category,
        instance: descriptor.instance,
        selected,
        matches: &ranked,
    };
    match output {
        OutputFormat::Human => {
            if ranked.is_empty() {
                println!("no {category} matched '{}'", args.selector);
            }
            for (position, found) in ranked.iter().enumerate() {
                let marker = if Some(found.record.dom_index) == selected {
                    '*'
                } else {
                    ' '
                };
                println!(
                    "{marker}{:>3}. [{:>3}] #{:<4} {:<28} {}",
                    position + 1,
                    found.priority,
                    found.record.dom_index,
                    found.record.css_selector,
                    found.description
                );
            }
        }
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Yaml => print_yaml(&report)?,
    }
    Ok(())
}

async fn cmd_resolve(args: ResolveArgs, config: &Config, output: &OutputFormat) -> Result<()> {
    let probe = CdpPageProbe::launch(&config.cdp)
        .await
        .context("Failed to open a Chromium page")?;
    let probe: Arc<dyn PageProbe> = Arc::new(probe);
    let url = probe.url().await.unwrap_or_default();
    info!(%url, "attached to page");

    let scope = FieldScope::from_config(probe, config).context("Failed to load pattern libraries")?;
    let (strategy, handle) = if args.heuristic {
        let handle = scope
            .resolve_heuristic(&args.element_type, &args.field, args.refresh)
            .await?;
        ("heuristic", handle)
    } else {
        let handle = scope
            .resolve_pattern(
                &args.element_type,
                &args.field,
                args.library.as_deref(),
                args.timeout_ms.map(Duration::from_millis),
            )
            .await?;
        ("pattern", handle)
    };

    let report = ResolveReport {
        field: &args.field,
        element_type: &args.element_type,
        strategy,
        found: !handle.is_empty(),
        handle: &handle,
    };
    match output {
        OutputFormat::Human => {
            if handle.is_empty() {
                println!("{}: not found", args.field);
            } else {
                println!("{}: {handle}", args.field);
            }
        }
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Yaml => print_yaml(&report)?,
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_yaml<T: Serialize>(value: &T) -> Result<()> {
    print!("{}", serde_yaml::to_string(value)?);
    Ok(())
}
