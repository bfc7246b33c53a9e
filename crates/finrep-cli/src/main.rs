use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use finrep_adapters::{load_raw_reports, load_statement_bundle, statement_bundle_paths, FixtureReportSource};
use finrep_core::{build_statement_tree, validate_batch, validate_report, ReportId, ReportType, StatementKind};
use finrep_ingest::{deduplicate, IngestConfig, IngestionCoordinator, ReingestPolicy, SyncPipeline};
use finrep_storage::{connect, LedgerStore, MemoryLedgerStore, PgLedgerStore, ReportFilter, DEFAULT_LIST_LIMIT};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "finrep")]
#[command(about = "Financial report ingestion command-line interface")]
struct Cli {
    /// Overrides DATABASE_URL.
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Log at debug level unless RUST_LOG is set.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply SQL migrations.
    Migrate,
    /// Deduplicate a raw report listing and print the result.
    Dedup {
        file: PathBuf,
        /// Also run boundary validation and print rejections.
        #[arg(long)]
        validate: bool,
    },
    /// Fetch, deduplicate and upsert report metadata for each symbol.
    Sync {
        #[arg(required = true, value_delimiter = ',')]
        symbols: Vec<String>,
        #[arg(long)]
        fixtures: Option<PathBuf>,
        #[arg(long)]
        source: Option<String>,
        /// Run against an in-memory ledger.
        #[arg(long)]
        dry_run: bool,
    },
    /// Ingest statement bundles (a report plus its item lists).
    Ingest {
        #[arg(required_unless_present = "dir")]
        files: Vec<PathBuf>,
        /// Ingest every bundle in this directory.
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long)]
        policy: Option<ReingestPolicy>,
        #[arg(long)]
        dry_run: bool,
    },
    #[command(subcommand)]
    Reports(ReportCommands),
    /// Report counts, overall or for one symbol.
    Stats {
        #[arg(long)]
        symbol: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum ReportCommands {
    List(ListArgs),
    Show {
        id: ReportId,
        /// Print statements as parent/child trees.
        #[arg(long)]
        tree: bool,
    },
    Delete {
        id: ReportId,
    },
    DeleteSymbol {
        symbol: String,
    },
}

#[derive(Debug, Args)]
struct ListArgs {
    #[arg(long)]
    symbol: Option<String>,
    #[arg(long = "type")]
    report_type: Option<ReportType>,
    #[arg(long)]
    year: Option<i32>,
    #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
    limit: i64,
    #[arg(long, default_value_t = 0)]
    offset: i64,
}

#[derive(Debug, Serialize)]
struct IngestReport {
    file: String,
    report_id: Option<ReportId>,
    created: Option<bool>,
    items: usize,
    error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let mut config = IngestConfig::from_env()?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }

    match cli.command {
        Commands::Migrate => {
            let store = postgres_store(&config).await?;
            store.migrate().await.context("running migrations")?;
            println!("migrations applied");
        }
        Commands::Dedup { file, validate } => {
            let raw = load_raw_reports(&file)?;
            let reports = deduplicate(raw);
            if validate {
                let (records, rejections) = validate_batch(reports);
                print_json(&serde_json::json!({ "reports": records, "rejections": rejections }))?;
            } else {
                print_json(&reports)?;
            }
        }
        Commands::Sync {
            symbols,
            fixtures,
            source,
            dry_run,
        } => {
            let store = open_store(&config, dry_run).await?;
            let source = FixtureReportSource::new(
                source.unwrap_or_else(|| config.source_id.clone()),
                fixtures.unwrap_or_else(|| config.fixtures_dir.clone()),
            );
            let coordinator = IngestionCoordinator::new(store).with_policy(config.reingest_policy);
            let pipeline = SyncPipeline::new(Arc::new(source), coordinator);
            let summary = pipeline.run_once(symbols.as_slice()).await;
            print_json(&summary)?;
            if summary.failed_symbols > 0 {
                bail!("{} of {} symbols failed", summary.failed_symbols, summary.symbols.len());
            }
        }
        Commands::Ingest {
            mut files,
            dir,
            policy,
            dry_run,
        } => {
            if let Some(dir) = dir {
                files.extend(statement_bundle_paths(&dir)?);
            }
            let store = open_store(&config, dry_run).await?;
            let coordinator =
                IngestionCoordinator::new(store).with_policy(policy.unwrap_or(config.reingest_policy));
            let results = ingest_files(&coordinator, &files).await;
            let failed = results.iter().filter(|r| r.error.is_some()).count();
            print_json(&results)?;
            if failed > 0 {
                bail!("{failed} of {} bundles failed", results.len());
            }
        }
        Commands::Reports(command) => {
            let store = postgres_store(&config).await?;
            run_report_command(&store, command).await?;
        }
        Commands::Stats { symbol } => {
            let store = postgres_store(&config).await?;
            let total = store.count_reports(symbol.as_deref()).await?;
            print_json(&serde_json::json!({ "symbol": symbol, "reports": total }))?;
        }
    }

    Ok(())
}

fn setup_logging(verbose: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("finrep={level}")));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

async fn postgres_store(config: &IngestConfig) -> Result<PgLedgerStore> {
    let pool = connect(&config.database_url, config.max_connections)
        .await
        .context("connecting to database")?;
    Ok(PgLedgerStore::new(pool))
}

async fn open_store(config: &IngestConfig, dry_run: bool) -> Result<Arc<dyn LedgerStore>> {
    if dry_run {
        info!("dry run: writing to an in-memory ledger");
        return Ok(Arc::new(MemoryLedgerStore::new()));
    }
    Ok(Arc::new(postgres_store(config).await?))
}

async fn ingest_files(coordinator: &IngestionCoordinator, files: &[PathBuf]) -> Vec<IngestReport> {
    let mut results = Vec::with_capacity(files.len());
    for path in files {
        let file = path.display().to_string();
        let outcome = match load_statement_bundle(path) {
            Ok(bundle) => match validate_report(&bundle.report) {
                Ok(record) => coordinator
                    .ingest(&record, &bundle.statements)
                    .await
                    .map_err(|err| err.to_string()),
                Err(err) => Err(format!("rejected: {err}")),
            },
            Err(err) => Err(format!("{err:#}")),
        };
        results.push(match outcome {
            Ok(outcome) => IngestReport {
                file,
                report_id: Some(outcome.report_id),
                created: Some(outcome.created),
                items: outcome.counts.total(),
                error: None,
            },
            Err(error) => {
                warn!(%file, %error, "bundle not ingested");
                IngestReport {
                    file,
                    report_id: None,
                    created: None,
                    items: 0,
                    error: Some(error),
                }
            }
        });
    }
    results
}

async fn run_report_command(store: &PgLedgerStore, command: ReportCommands) -> Result<()> {
    match command {
        ReportCommands::List(args) => {
            let filter = ReportFilter {
                symbol: args.symbol,
                report_type: args.report_type,
                report_year: args.year,
                limit: args.limit,
                offset: args.offset,
            };
            print_json(&store.reports(&filter).await?)?;
        }
        ReportCommands::Show { id, tree } => {
            let Some(report) = store.report(id).await? else {
                bail!("report {id} not found");
            };
            let mut statements = serde_json::Map::new();
            for kind in StatementKind::ALL {
                let items = store.items(id, kind).await?;
                let value = if tree {
                    serde_json::to_value(build_statement_tree(&items))?
                } else {
                    serde_json::to_value(&items)?
                };
                statements.insert(kind.to_string(), value);
            }
            print_json(&serde_json::json!({ "report": report, "statements": statements }))?;
        }
        ReportCommands::Delete { id } => {
            if !store.delete_report(id).await? {
                bail!("report {id} not found");
            }
            println!("deleted report {id}");
        }
        ReportCommands::DeleteSymbol { symbol } => {
            let deleted = store.delete_reports_by_symbol(&symbol).await?;
            println!("deleted {deleted} reports for {}", symbol.trim().to_uppercase());
        }
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
