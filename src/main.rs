//! who-gho-ingest: binary entrypoint.
//! Parses the command line, loads `.env`, wires the fetcher and sinks, and maps
//! the run outcome to an exit status.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use who_gho_ingest::ingest::config::WarehouseConfig;
use who_gho_ingest::ingest::providers::gho::GHO_BASE;
use who_gho_ingest::layout::{utc_today, RunLayout, RunMetadata};
use who_gho_ingest::sink::postgres::{PostgresWarehouse, MAX_BATCH_ROWS};
use who_gho_ingest::sink::warehouse::{default_table_name, validate_table_name};
use who_gho_ingest::sink::WarehouseTarget;
use who_gho_ingest::{run_ingest, GhoApiFetcher, IngestError, PaginationConfig, SinkMode};

const EXIT_FAILURE: u8 = 1;
const EXIT_CONFIG: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser, Debug)]
#[command(
    name = "who-gho-ingest",
    version,
    about = "Ingest WHO GHO API indicator data to raw JSONL"
)]
struct Cli {
    /// Indicator code / endpoint (e.g. MDG_0000000007)
    #[arg(long)]
    indicator: String,

    /// Rows per page ($top)
    #[arg(long, default_value_t = 1000)]
    page_size: usize,

    /// Max total rows to fetch
    #[arg(long)]
    top: Option<usize>,

    /// OData $select, comma-separated (e.g. Id,SpatialDim,TimeDim,NumericValue)
    #[arg(long)]
    select: Option<String>,

    /// OData $filter (e.g. "SpatialDimType eq 'COUNTRY'")
    #[arg(long = "filter")]
    filter: Option<String>,

    /// Seconds to sleep between pages
    #[arg(long, default_value_t = 0.0)]
    sleep: f64,

    /// HTTP timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// API base URL
    #[arg(long, default_value = GHO_BASE)]
    base_url: String,

    /// Root of the local data directory
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Also load rows into the warehouse (credentials from WAREHOUSE_* env vars)
    #[arg(long)]
    warehouse: bool,

    /// Warehouse table (default: who_<indicator>)
    #[arg(long)]
    warehouse_table: Option<String>,

    /// Warehouse insert batch size
    #[arg(long, default_value_t = 1000)]
    warehouse_batch_size: usize,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("who_gho_ingest=info,warn"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

fn check_args(cli: &Cli) -> Result<(), IngestError> {
    if cli.warehouse_batch_size == 0 || cli.warehouse_batch_size > MAX_BATCH_ROWS {
        return Err(IngestError::Config(format!(
            "--warehouse-batch-size must be in 1..={MAX_BATCH_ROWS}"
        )));
    }
    page_delay(cli.sleep)?;
    if cli.timeout == 0 {
        return Err(IngestError::Config("--timeout must be > 0".into()));
    }
    Ok(())
}

/// `--sleep` seconds as a pause; negative, NaN or out-of-range values are
/// configuration errors.
fn page_delay(secs: f64) -> Result<Duration, IngestError> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| IngestError::Config(format!("--sleep {secs}: {e}")))
}

async fn run(cli: Cli) -> Result<()> {
    check_args(&cli)?;

    let cfg = PaginationConfig::new(cli.indicator.clone())
        .with_page_size(cli.page_size)
        .with_max_rows(cli.top)
        .with_select(cli.select.clone())
        .with_filter(cli.filter.clone())
        .with_page_delay(page_delay(cli.sleep)?);
    cfg.validate()?;

    let table = cli
        .warehouse_table
        .clone()
        .unwrap_or_else(|| default_table_name(&cli.indicator));
    if cli.warehouse {
        validate_table_name(&table)?;
    }

    let ingest_date = utc_today();
    let layout = RunLayout::new(&cli.data_dir, &cli.indicator, ingest_date);
    layout.ensure_dir()?;
    let meta_file = layout.write_metadata(&RunMetadata::new(&cfg, ingest_date, chrono::Utc::now()))?;

    let fetcher = GhoApiFetcher::new(cli.base_url.clone())
        .context("building HTTP client")?
        .with_timeout(Duration::from_secs(cli.timeout));

    let mode = if cli.warehouse {
        let wh_cfg = WarehouseConfig::from_env()?;
        let session = PostgresWarehouse::connect(&wh_cfg).await?;
        SinkMode::Warehouse(WarehouseTarget::new(
            Box::new(session),
            table,
            cli.warehouse_batch_size,
        )?)
    } else {
        SinkMode::RawOnly
    };

    let outcome = run_ingest(&fetcher, &cfg, ingest_date, &layout.part_file(), mode).await?;

    if let Some(table) = &outcome.table {
        println!("Warehouse load complete: {table}");
    }
    println!("Wrote {} rows to: {}", outcome.records, outcome.output.display());
    println!("Meta: {}", meta_file.display());
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; a missing file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.log_json);

    tokio::select! {
        res = run(cli) => match res {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("error: {e:#}");
                let config = e
                    .downcast_ref::<IngestError>()
                    .is_some_and(IngestError::is_config);
                ExitCode::from(if config { EXIT_CONFIG } else { EXIT_FAILURE })
            }
        },
        Ok(()) = tokio::signal::ctrl_c() => {
            eprintln!("\nInterrupted.");
            ExitCode::from(EXIT_INTERRUPTED)
        }
    }
}
