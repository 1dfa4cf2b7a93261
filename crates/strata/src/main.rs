//! Strata command-line entry point.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use strata::config::StrataConfig;
use strata::export::export_bundle;
use strata::ingest::{ingest_staging, ingest_stands, IngestReport};
use strata::metadata::read_file_metadata;
use strata::mirror::MirrorWatcher;
use strata::query::{QueryService, DEFAULT_PATH_LIMIT, DEFAULT_SEARCH_LIMIT};
use strata::silver::read_silver_paths;
use strata::sync::{prune_missing, sync_catalog, SyncReport};
use strata_db::CatalogDb;
use strata_logging::{init_logging, LogConfig};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "strata", about = "Test-stand data archive: ingest, catalog and search")]
struct Cli {
    /// Configuration file (TOML). Defaults are used when omitted.
    #[arg(short, long, global = true, env = "STRATA_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mirror the configured source trees into staging until Ctrl-C
    Watch,

    /// Convert every configured stand, then synchronize the catalog
    Ingest,

    /// Convert everything under the staging root and catalog the results
    IngestStage,

    /// Rebuild catalog rows from the Bronze and Silver trees
    Sync,

    /// Remove catalog rows whose files no longer exist
    Prune,

    /// Search serial numbers
    Search {
        query: String,

        /// Restrict to these test stands (repeatable)
        #[arg(short, long = "stand")]
        stands: Vec<String>,

        #[arg(short, long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search test stands
    Stands {
        query: String,

        #[arg(short, long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },

    /// List Bronze files for serial labels, e.g. "SN123 (StandA)"
    Paths {
        #[arg(required = true)]
        labels: Vec<String>,

        /// Keep only these test types (plus unfiltered files)
        #[arg(short = 't', long = "test-type")]
        test_types: Vec<String>,

        #[arg(short, long, default_value_t = DEFAULT_PATH_LIMIT)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// Export Bronze snapshots as a zip of CSV files
    Export {
        #[arg(required = true)]
        paths: Vec<String>,

        /// Output zip file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show footer metadata (and Bronze references for Silver files)
    Inspect { file: PathBuf },

    /// Show catalog row counts
    Stats,

    /// Print the effective configuration, or write it to a file
    Config {
        #[arg(long)]
        write: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _log_guard = init_logging(LogConfig {
        app_name: "strata",
        verbose: cli.verbose,
    });

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")
        .and_then(|rt| rt.block_on(run(cli)));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:?}", err);
            ExitCode::from(1)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<StrataConfig> {
    match path {
        Some(path) => StrataConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display())),
        None => Ok(StrataConfig::default()),
    }
}

async fn open_catalog(config: &StrataConfig) -> Result<CatalogDb> {
    CatalogDb::open(&config.database_path)
        .await
        .with_context(|| format!("Catalog unavailable: {}", config.database_path.display()))
}

async fn open_catalog_for_query(config: &StrataConfig) -> Result<CatalogDb> {
    CatalogDb::open_existing(&config.database_path)
        .await
        .with_context(|| format!("Catalog unavailable: {}", config.database_path.display()))
}

async fn query_service(config: &StrataConfig) -> Result<QueryService> {
    let db = open_catalog_for_query(config).await?;
    Ok(QueryService::new(db, config.cache_capacity))
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let classifier = config.validate().context("Invalid configuration")?;

    match cli.command {
        Commands::Watch => {
            let watcher = MirrorWatcher::from_config(&config)?;
            let token = CancellationToken::new();
            let signal_token = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Stopping watcher...");
                }
                signal_token.cancel();
            });
            info!(destination = %config.mirror_destination().display(), "Mirroring changes");
            watcher.run(token).await?;
        }

        Commands::Ingest => {
            let db = open_catalog(&config).await?;
            let report = ingest_stands(&db, &config, &classifier).await?;
            print_ingest(&report);
        }

        Commands::IngestStage => {
            let db = open_catalog(&config).await?;
            let report = ingest_staging(&db, &config, &classifier).await?;
            print_ingest(&report);
        }

        Commands::Sync => {
            let db = open_catalog(&config).await?;
            let report = sync_catalog(&db, &config.silver_root, &config.bronze_root).await?;
            print_sync(&report);
        }

        Commands::Prune => {
            let db = open_catalog(&config).await?;
            let report = prune_missing(&db).await?;
            println!(
                "Pruned {} Silver rows, {} Bronze rows",
                report.silver_removed, report.bronze_removed
            );
        }

        Commands::Search {
            query,
            stands,
            limit,
            json,
        } => {
            let service = query_service(&config).await?;
            let stands = (!stands.is_empty()).then_some(stands.as_slice());
            let labels: Vec<String> = service
                .search_serials(&query, limit, stands)
                .await?
                .iter()
                .map(ToString::to_string)
                .collect();
            print_list(&labels, json)?;
        }

        Commands::Stands { query, limit } => {
            let service = query_service(&config).await?;
            print_list(&service.search_teststands(&query, limit).await?, false)?;
        }

        Commands::Paths {
            labels,
            test_types,
            limit,
            json,
        } => {
            let service = query_service(&config).await?;
            let paths = service.bronze_paths_for_selection(&labels, limit).await?;
            let paths = service.filter_by_testtype(&paths, &test_types).await?;
            print_list(&paths, json)?;
        }

        Commands::Export { paths, output } => {
            let bundle = tokio::task::spawn_blocking(move || export_bundle(&paths)).await??;
            std::fs::write(&output, &bundle.bytes)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!(
                "Wrote {} ({} exported, {} failed)",
                output.display(),
                bundle.data_entries(),
                bundle.failed_entries()
            );
            if bundle.data_entries() == 0 && !bundle.entries.is_empty() {
                anyhow::bail!("No input file could be exported");
            }
        }

        Commands::Inspect { file } => {
            let mut meta: Vec<_> = read_file_metadata(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?
                .into_iter()
                .filter(|(k, _)| !k.starts_with("ARROW:"))
                .collect();
            meta.sort();
            for (key, value) in meta {
                println!("{}: {}", key, value);
            }
            if let Ok(refs) = read_silver_paths(&file) {
                println!("Bronze references ({}):", refs.len());
                for r in refs {
                    println!("  {}", r);
                }
            }
        }

        Commands::Stats => {
            let db = open_catalog_for_query(&config).await?;
            let stats = db.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        Commands::Config { write } => {
            match write {
                Some(path) => {
                    config.save(&path)?;
                    println!("Wrote {}", path.display());
                }
                None => print!("{}", toml::to_string_pretty(&config)?),
            }
        }
    }

    Ok(())
}

fn print_list(items: &[String], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(items)?);
    } else {
        for item in items {
            println!("{}", item);
        }
    }
    Ok(())
}

fn print_sync(report: &SyncReport) {
    println!(
        "Silver: new={} updated={} skipped={}",
        report.silver.new, report.silver.updated, report.silver.skipped
    );
    println!(
        "Bronze: new={} updated={} skipped={}",
        report.bronze.new, report.bronze.updated, report.bronze.skipped
    );
    if report.unreadable > 0 {
        println!("Unreadable files: {}", report.unreadable);
    }
}

fn print_ingest(report: &IngestReport) {
    println!(
        "Serials: converted={} skipped={} failed={}; Bronze files written={}",
        report.serials_converted,
        report.serials_skipped,
        report.serials_failed,
        report.bronze_written
    );
    print_sync(&report.sync);
}
