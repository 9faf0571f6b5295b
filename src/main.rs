use anyhow::{Context, Result};
use chrono::Datelike;
use clap::{Args, Parser, Subcommand};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use loan_insight::address::AddressResolver;
use loan_insight::boundary::BoundaryIndex;
use loan_insight::enrich::matched_count;
use loan_insight::registry::{
    HttpTransport, LookupEvent, LookupResult, RegistryClient, RegistryTransport, Sleeper, ThreadSleeper,
};
use loan_insight::{
    aggregate, dashboard, export_csv_file, get_all_records, get_events_for_entity, insert_event,
    insert_records, load_csv, load_statuses, merge, save_statuses, setup_database, verify_count,
    AppConfig, Event, FilterParams, RecordStore,
};

#[derive(Parser)]
#[command(
    name = "loan-insight",
    version,
    about = "Loan guarantee analytics: registry status enrichment and district maps"
)]
struct Cli {
    /// Configuration file (default: loan-insight.toml in the working directory, if present)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// SQLite database (overrides `database_path` from the config)
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a loan guarantee CSV into the database
    Import(ImportArgs),
    /// Bank, quarter, industry and age cohort aggregates
    Summary(SummaryArgs),
    /// Loan totals per district as JSON map data
    Districts(DistrictsArgs),
    /// Look up business registration statuses and export the enriched dataset
    Enrich(EnrichArgs),
    /// Audit trail for one entity (e.g. `dataset loans.csv`, `registry_lookup 3`)
    Events(EventsArgs),
}

#[derive(Args)]
struct ImportArgs {
    #[arg(value_name = "CSV")]
    csv: PathBuf,
}

/// Comma-separated filter values, shared by every read command
#[derive(Args)]
struct FilterArgs {
    #[arg(long)]
    bank: Option<String>,
    #[arg(long)]
    year: Option<String>,
    #[arg(long)]
    industry: Option<String>,
    /// Inclusive start date, YYYY-MM-DD
    #[arg(long)]
    from: Option<String>,
    /// Inclusive end date, YYYY-MM-DD
    #[arg(long)]
    to: Option<String>,
}

impl FilterArgs {
    fn params(&self) -> FilterParams {
        FilterParams {
            bank: self.bank.clone(),
            year: self.year.clone(),
            industry: self.industry.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
        }
    }
}

#[derive(Args)]
struct SummaryArgs {
    #[command(flatten)]
    filter: FilterArgs,

    /// Year ages are computed against (default: current year)
    #[arg(long)]
    reference_year: Option<i32>,

    /// Print JSON instead of the text report
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct DistrictsArgs {
    #[command(flatten)]
    filter: FilterArgs,

    /// Boundary GeoJSON (overrides `geo.boundary_path`)
    #[arg(long, value_name = "PATH")]
    boundaries: Option<PathBuf>,

    /// Write JSON here instead of stdout
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,
}

#[derive(Args)]
struct EnrichArgs {
    #[command(flatten)]
    filter: FilterArgs,

    /// Enriched CSV output
    #[arg(long, value_name = "PATH")]
    out: PathBuf,

    /// Merge previously stored statuses without calling the registry
    #[arg(long)]
    offline: bool,
}

#[derive(Args)]
struct EventsArgs {
    #[arg(value_name = "ENTITY_TYPE")]
    entity_type: String,

    #[arg(value_name = "ENTITY_ID")]
    entity_id: String,

    /// Print JSON instead of one line per event
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("loan_insight=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }

    match cli.command {
        Commands::Import(args) => run_import(&config, &args),
        Commands::Summary(args) => run_summary(&config, &args),
        Commands::Districts(args) => run_districts(&config, &args),
        Commands::Enrich(args) => run_enrich(&config, &args),
        Commands::Events(args) => run_events(&config, &args),
    }
}

fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database: {}", path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

fn load_filtered(config: &AppConfig, filter: &FilterArgs) -> Result<RecordStore> {
    let conn = open_database(&config.database_path)?;
    let store = get_all_records(&conn, &config.columns)?;
    let filter = filter.params().to_filter()?;
    if filter.is_unrestricted() {
        return Ok(store);
    }
    Ok(filter.apply(&store))
}

fn run_import(config: &AppConfig, args: &ImportArgs) -> Result<()> {
    println!("🗄️  Data Import - CSV → SQLite + WAL");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load CSV
    println!("\n📂 Loading CSV...");
    let ingested = load_csv(&args.csv, &config.columns)?;
    println!("✓ Loaded {} records from CSV", ingested.store.len());
    if !ingested.quality.is_empty() {
        println!("⚠️  {}", ingested.quality.summary());
    }

    // 2. Setup database
    println!("\n🔧 Setting up database...");
    let conn = open_database(&config.database_path)?;
    println!("✓ Database initialized with WAL mode");

    // 3. Insert records
    println!("\n💾 Inserting records...");
    let source = args.csv.display().to_string();
    let stats = insert_records(&conn, &ingested.store, &source)?;
    println!("✓ Inserted: {} records", stats.inserted);
    println!("✓ Skipped duplicates: {}", stats.duplicates);

    // 4. Verify count
    println!("\n🔍 Verifying database...");
    let count = verify_count(&conn)?;
    println!("✓ Database contains {} records", count);

    Ok(())
}

fn run_summary(config: &AppConfig, args: &SummaryArgs) -> Result<()> {
    let store = load_filtered(config, &args.filter)?;
    let reference_year = args
        .reference_year
        .unwrap_or_else(|| chrono::Local::now().year());
    let report = dashboard(store.records(), reference_year, config.cohort.century_pivot);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match store.date_bounds() {
        Some((first, last)) => println!("📊 {} records, {} → {}", report.total_records, first, last),
        None => println!("📊 {} records", report.total_records),
    }

    println!("\n🏦 Working capital by bank");
    for bank in &report.banks {
        println!("  {:<12} {:>18.0}  ({} loans)", bank.bank, bank.total, bank.count);
    }

    println!("\n📈 Quarterly amounts");
    for point in &report.quarters {
        println!("  {:<8} {:>18.0}  ({} loans)", point.label, point.amount, point.count);
    }

    println!("\n🏭 Top industries");
    for industry in report.industries.iter().take(10) {
        println!("  {:<20} {:>18.0}  ({} loans)", industry.industry, industry.total, industry.count);
    }

    println!("\n👥 Amount by age band (reference year {})", reference_year);
    for (band, amount) in &report.cohorts.amount_by_band {
        println!("  {:<10} {:>18.0}", band.label(), amount);
    }
    if !report.cohorts.quality.is_empty() {
        println!("⚠️  {}", report.cohorts.quality.summary());
    }

    Ok(())
}

fn run_districts(config: &AppConfig, args: &DistrictsArgs) -> Result<()> {
    let store = load_filtered(config, &args.filter)?;

    let mut geo = config.geo.clone();
    if let Some(path) = &args.boundaries {
        geo.boundary_path = path.clone();
    }
    let index = BoundaryIndex::load(&geo)?;
    let resolver = AddressResolver::new(geo.region.clone());

    let result = aggregate(store.records(), &resolver, &index);
    tracing::info!(
        districts = result.metrics.len(),
        mapped = result.mapped_records(),
        unmatched = result.unmatched,
        missing_coordinate = result.missing_coordinate,
        "district map ready"
    );

    let json = serde_json::to_string_pretty(&result.metrics)?;
    match &args.out {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("✅ {} districts written to {}", result.metrics.len(), path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}

fn run_enrich(config: &AppConfig, args: &EnrichArgs) -> Result<()> {
    let store = load_filtered(config, &args.filter)?;
    let conn = open_database(&config.database_path)?;

    if args.offline {
        println!("📦 Using stored registry statuses");
        let statuses = load_statuses(&conn)?;
        let enriched = merge(store.records(), &statuses);
        export_csv_file(&store, &enriched, &args.out)?;
        println!(
            "✅ {} rows written to {} ({} with a status)",
            enriched.len(),
            args.out.display(),
            matched_count(&enriched)
        );
        return Ok(());
    }

    // First Ctrl-C stops before the next batch; a second one aborts
    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        if handler_flag.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        println!("\n⚡ Interrupt received, stopping after the current batch (again to abort)");
    })
    .context("Failed to install Ctrl-C handler")?;

    println!("🏛️  Looking up {} rows in the business registry...", store.len());
    let transport = HttpTransport::new(&config.registry)?;
    let client = RegistryClient::from_config(transport, ThreadSleeper, &config.registry);

    let run = lookup_and_export(&conn, &store, &client, &cancel, &args.out)?;

    if run.lookup.cancelled {
        println!("⚠️  Lookup interrupted; rows past the last finished batch have no status");
    } else if !run.lookup.is_complete() {
        println!(
            "⚠️  {} identifiers could not be looked up; their status columns stay empty",
            run.lookup.failed_identifiers().len()
        );
    }
    println!(
        "✅ {} rows written to {} ({} with a status)",
        run.rows,
        args.out.display(),
        run.matched
    );

    Ok(())
}

/// Outcome of one online enrichment run
struct EnrichRun {
    lookup: LookupResult,
    rows: usize,
    matched: usize,
}

/// Look up, export, then store.
///
/// Whatever the lookup gathered reaches the CSV even when it was cancelled,
/// and a storage failure is logged rather than returned.
fn lookup_and_export<T: RegistryTransport, S: Sleeper>(
    conn: &Connection,
    store: &RecordStore,
    client: &RegistryClient<T, S>,
    cancel: &AtomicBool,
    out: &Path,
) -> Result<EnrichRun> {
    let lookup = client.lookup_until(store.identifiers(), cancel, &mut |event: &LookupEvent| match event {
        LookupEvent::Progress { completed, total } => {
            println!("  … {}/{}", completed, total);
        }
        LookupEvent::BatchFailed { batch, identifiers, error, .. } => {
            println!("  ❌ batch {} failed ({} identifiers): {}", batch, identifiers.len(), error);
        }
        _ => {}
    });

    let enriched = merge(store.records(), &lookup.statuses);
    let exported = export_csv_file(store, &enriched, out);

    match persist_lookup(conn, &lookup) {
        Ok(saved) => println!("✓ {} statuses stored", saved),
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "failed to store lookup results");
            println!("⚠️  Statuses were not stored: {:#}", e);
        }
    }

    exported?;
    Ok(EnrichRun {
        rows: enriched.len(),
        matched: matched_count(&enriched),
        lookup,
    })
}

/// Batch failures go to the audit trail, statuses to the status table
fn persist_lookup(conn: &Connection, lookup: &LookupResult) -> Result<usize> {
    for event in &lookup.events {
        if let LookupEvent::BatchFailed { batch, .. } = event {
            let record = Event::new(
                "batch_failed",
                "registry_lookup",
                &batch.to_string(),
                serde_json::to_value(event)?,
                "registry_client",
            );
            insert_event(conn, &record)?;
        }
    }

    save_statuses(conn, &lookup.statuses)
}

fn run_events(config: &AppConfig, args: &EventsArgs) -> Result<()> {
    let conn = open_database(&config.database_path)?;
    let events = get_events_for_entity(&conn, &args.entity_type, &args.entity_id)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&events)?);
        return Ok(());
    }

    if events.is_empty() {
        println!("No events for {} {}", args.entity_type, args.entity_id);
        return Ok(());
    }

    println!("📜 {} event(s) for {} {}", events.len(), args.entity_type, args.entity_id);
    for event in &events {
        println!(
            "  {}  {:<16} {:<16} {}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event.event_type,
            event.actor,
            event.data
        );
    }

    Ok(())
}
