#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for building catalog snapshots.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use efficiency_index_appliance_models::Category;
use efficiency_index_catalog::CatalogStore;
use efficiency_index_cli_utils::{IndicatifProgress, MultiProgress};
use efficiency_index_ingest::{
    DEFAULT_WORKERS, Pipeline, PipelineOptions, enabled_categories, registry_jobs,
};
use efficiency_index_ingest_models::{CommitPolicy, RunReport};
use efficiency_index_regional::RegionTable;
use efficiency_index_scoring::{Scorer, ThresholdTable};
use efficiency_index_source::{FetchOptions, RetryPolicy};

#[derive(Parser)]
#[command(name = "efficiency_index_ingest", about = "Appliance efficiency catalog builder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, score, and publish every enabled category
    SyncAll {
        /// Comma-separated categories (overrides `EFFICIENCY_INDEX_CATEGORIES`)
        #[arg(long)]
        categories: Option<String>,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Fetch, score, and publish a single category
    Sync {
        /// Category name (e.g., "`water_heaters`")
        category: String,
        #[command(flatten)]
        run: RunArgs,
    },
    /// List the configured category datasets
    Categories,
    /// List the regions in the region table
    Regions {
        /// Region table override file
        #[arg(long)]
        regions_table: Option<PathBuf>,
    },
    /// Print statistics for the current snapshot
    ShowStats {
        /// Data directory (overrides `EFFICIENCY_INDEX_DATA_DIR`)
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Comma-separated regions to precompute besides the US average, or "all"
    #[arg(long)]
    regions: Option<String>,
    /// Maximum records fetched per category (for testing)
    #[arg(long)]
    limit: Option<u64>,
    /// Publish the categories that succeeded even if others failed
    #[arg(long)]
    allow_partial: bool,
    /// Data directory (overrides `EFFICIENCY_INDEX_DATA_DIR`)
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Score threshold table override file
    #[arg(long)]
    thresholds: Option<PathBuf>,
    /// Region table override file
    #[arg(long)]
    regions_table: Option<PathBuf>,
    /// Per-request timeout in seconds
    #[arg(long, default_value = "60")]
    timeout_secs: u64,
    /// Retries for transient upstream failures
    #[arg(long, default_value = "3")]
    retries: u32,
    /// Categories processed concurrently
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,
}

fn store_for(data_dir: Option<PathBuf>) -> CatalogStore {
    data_dir.map_or_else(CatalogStore::open_default, |dir| CatalogStore::new(&dir))
}

async fn run_pipeline(
    categories: Vec<Category>,
    args: RunArgs,
    multi: &MultiProgress,
) -> Result<RunReport, Box<dyn std::error::Error>> {
    let thresholds = ThresholdTable::load(args.thresholds.as_deref())?;
    let regions = RegionTable::load(args.regions_table.as_deref())?;

    let region_keys: Vec<String> = match args.regions.as_deref().map(str::trim) {
        Some("all") => regions.all().iter().map(|r| r.id.clone()).collect(),
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(String::from)
            .collect(),
        None => Vec::new(),
    };

    let options = PipelineOptions {
        fetch: FetchOptions {
            limit: args.limit,
            timeout: Duration::from_secs(args.timeout_secs.max(1)),
            retry: RetryPolicy {
                max_retries: args.retries,
                ..RetryPolicy::default()
            },
        },
        workers: args.workers,
        regions: region_keys,
        commit_policy: if args.allow_partial {
            CommitPolicy::SucceededOnly
        } else {
            CommitPolicy::AllOrNothing
        },
    };

    let pipeline = Pipeline::new(
        Scorer::new(thresholds),
        regions,
        store_for(args.data_dir),
        options,
    );

    let cancelled = pipeline.cancellation_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted; stopping at the next stage boundary");
            cancelled.store(true, Ordering::SeqCst);
        }
    });

    let jobs = registry_jobs(&categories)
        .into_iter()
        .map(|job| {
            let label = job.source.category().to_string();
            job.with_progress(IndicatifProgress::records_bar(multi, &label))
        })
        .collect();

    Ok(pipeline.run(jobs).await?)
}

fn print_report(report: &RunReport) {
    println!(
        "{:<16} {:>8} {:>10} {:>8} {:>8}  STATE",
        "CATEGORY", "FETCHED", "NORMALIZED", "SCORED", "DROPPED"
    );
    println!("{}", "-".repeat(72));
    for category in &report.categories {
        println!(
            "{:<16} {:>8} {:>10} {:>8} {:>8}  {}",
            category.category.as_ref(),
            category.fetched,
            category.normalized,
            category.scored,
            category.total_dropped(),
            category.state
        );
        for (reason, count) in &category.dropped {
            println!("    dropped {count} × {reason}");
        }
    }
    match &report.snapshot_id {
        Some(id) => println!("\nPublished snapshot {id}"),
        None => println!("\nNothing published"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let multi = efficiency_index_cli_utils::init_logger();

    match cli.command {
        Commands::SyncAll { categories, run } => {
            let categories = enabled_categories(categories)?;
            let report = run_pipeline(categories, run, &multi).await?;
            print_report(&report);
            if !report.committed {
                return Err("run did not publish a snapshot".into());
            }
        }
        Commands::Sync { category, run } => {
            let category = Category::parse(&category)?;
            let report = run_pipeline(vec![category], run, &multi).await?;
            print_report(&report);
            if !report.committed {
                return Err(format!("{category} did not publish").into());
            }
        }
        Commands::Categories => {
            println!("{:<16} {:<10} NAME", "CATEGORY", "DATASET");
            println!("{}", "-".repeat(72));
            for source in efficiency_index_source::registry::all_sources() {
                println!(
                    "{:<16} {:<10} {}",
                    source.category.as_ref(),
                    source.dataset_id,
                    source.name()
                );
            }
        }
        Commands::Regions { regions_table } => {
            let regions = RegionTable::load(regions_table.as_deref())?;
            println!("Region table {}", regions.version());
            println!(
                "{:<22} {:<4} {:>9} {:>9} {:>9} {:>9}",
                "ID", "ABBR", "$/kWh", "lbs/kWh", "$/therm", "lbs/therm"
            );
            println!("{}", "-".repeat(72));
            for r in regions.all() {
                println!(
                    "{:<22} {:<4} {:>9.4} {:>9.3} {:>9.2} {:>9.1}",
                    r.id,
                    r.abbreviation,
                    r.electricity_price_per_kwh,
                    r.grid_emissions_lbs_per_kwh,
                    r.gas_price_per_therm,
                    r.gas_emissions_lbs_per_therm
                );
            }
        }
        Commands::ShowStats { data_dir } => {
            let store = store_for(data_dir);
            let Some(catalog) = store.load_current()? else {
                println!("No snapshot published in {}", store.root().display());
                return Ok(());
            };
            println!(
                "Snapshot {} (generated {}, thresholds {}, regions {})",
                catalog.snapshot_id,
                catalog.generated_at.to_rfc3339(),
                catalog.thresholds_version,
                catalog.regions_version
            );
            println!(
                "{} models, {} ENERGY STAR certified\n",
                catalog.stats.total_models, catalog.stats.total_energy_star
            );
            println!(
                "{:<16} {:>8} {:>8} {:>8}  TOP PERFORMER",
                "CATEGORY", "MODELS", "CERT %", "AVG"
            );
            println!("{}", "-".repeat(72));
            for stats in &catalog.stats.categories {
                let top = stats.top_performer.as_ref().map_or_else(String::new, |t| {
                    format!(
                        "{} {} ({:.1})",
                        t.manufacturer, t.model_number, t.open_efficiency_score
                    )
                });
                println!(
                    "{:<16} {:>8} {:>8.1} {:>8.1}  {top}",
                    stats.category.as_ref(),
                    stats.total_count,
                    stats.energy_star_percentage,
                    stats.average_score
                );
            }
            if let Some(report) = store.load_current_report()? {
                println!("\n{}", serde_json::to_string_pretty(&report)?);
            }
        }
    }

    Ok(())
}
