//! Granule harvester.
//!
//! Synchronizes one dataset from the remote granule catalog into the
//! metadata index:
//! - Pages through the catalog feed for the configured window
//! - Downloads new or changed granules, splitting aggregated files per day
//! - Optionally uploads harvested files to object storage
//! - Publishes granule, lineage and dataset documents
//!
//! Exits 0 on a clean run, 2 when the run completed with isolated failures
//! and 1 when it could not complete.

mod settings;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use harvest_common::DatasetConfig;
use harvesting::{
    Collaborators, HttpCatalogSource, HttpFetcher, NetCdfSlicer, RunReport, Synchronizer,
    EXIT_FATAL,
};
use settings::BucketSettings;
use storage::{ObjectStorage, ObjectUploader, SolrIndex};

#[derive(Parser, Debug)]
#[command(name = "harvester")]
#[command(about = "Incremental granule harvester for one dataset")]
struct Args {
    /// Dataset configuration file
    #[arg(short, long, env = "HARVEST_CONFIG")]
    config: Option<PathBuf>,

    /// Dataset name, resolved to {config_dir}/{dataset}.yaml when --config is absent
    #[arg(short, long)]
    dataset: Option<String>,

    /// Directory holding dataset configurations
    #[arg(long, env = "CONFIG_DIR", default_value = "config/datasets")]
    config_dir: PathBuf,

    /// Index base URL
    #[arg(long, env = "SOLR_HOST", default_value = "http://localhost:8983/solr/")]
    solr_host: String,

    /// Bucket for harvested files; files stay in the target directory when unset
    #[arg(long, env = "S3_BUCKET")]
    s3_bucket: Option<String>,

    /// Custom S3 endpoint (MinIO etc.)
    #[arg(long, env = "S3_ENDPOINT")]
    s3_endpoint: Option<String>,

    #[arg(long, env = "S3_ACCESS_KEY")]
    s3_access_key: Option<String>,

    #[arg(long, env = "S3_SECRET_KEY")]
    s3_secret_key: Option<String>,

    #[arg(long, env = "S3_REGION", default_value = "us-west-2")]
    s3_region: String,

    /// Allow plain HTTP to the S3 endpoint
    #[arg(long, env = "S3_ALLOW_HTTP")]
    s3_allow_http: bool,

    /// Root for per-dataset scratch directories
    #[arg(long, env = "HARVEST_SCRATCH_DIR")]
    scratch_root: Option<PathBuf>,

    /// Timeout for catalog, download and index requests
    #[arg(long, env = "HARVEST_REQUEST_TIMEOUT", default_value = "600")]
    request_timeout_secs: u64,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn bucket_settings(&self) -> BucketSettings {
        BucketSettings {
            bucket: self.s3_bucket.clone(),
            endpoint: self.s3_endpoint.clone(),
            access_key_id: self.s3_access_key.clone(),
            secret_access_key: self.s3_secret_key.clone(),
            region: self.s3_region.clone(),
            allow_http: self.s3_allow_http,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let code = match run(&args).await {
        Ok(report) => {
            if report.is_degraded() {
                warn!(
                    failed = report.failed,
                    transfer_failures = report.transfer_failures,
                    index_failures = report.index_failures,
                    "Harvest completed with failures"
                );
            }
            report.exit_code()
        }
        Err(e) => {
            error!(error = ?e, "Harvest failed");
            EXIT_FATAL
        }
    };

    std::process::exit(code);
}

async fn run(args: &Args) -> Result<RunReport> {
    let path = settings::config_path(args.config.as_deref(), &args.config_dir, args.dataset.as_deref())
        .ok_or_else(|| anyhow!("either --config or --dataset is required"))?;

    let mut config = DatasetConfig::load(&path)
        .with_context(|| format!("Failed to load dataset config {}", path.display()))?;
    settings::apply_scratch_root(&mut config, args.scratch_root.as_deref());

    info!(
        dataset = %config.ds_name,
        aggregated = config.aggregated,
        target_dir = %config.target_dir.display(),
        "Starting granule harvester"
    );

    let timeout = Duration::from_secs(args.request_timeout_secs);

    let index = SolrIndex::new(&settings::index_config(
        &args.solr_host,
        &config,
        args.request_timeout_secs,
    ))?;

    let uploader: Option<Arc<dyn ObjectUploader>> = match args.bucket_settings().storage_config() {
        Some(storage_config) => {
            info!(bucket = %storage_config.bucket, "Uploading harvested files to object storage");
            Some(Arc::new(ObjectStorage::new(&storage_config)?))
        }
        None => {
            info!("No bucket configured, keeping harvested files locally");
            None
        }
    };

    let collaborators = Collaborators {
        catalog: Arc::new(HttpCatalogSource::new(timeout)?),
        index: Arc::new(index),
        fetcher: Arc::new(HttpFetcher::new(timeout)?),
        slicer: Arc::new(NetCdfSlicer),
        uploader,
    };

    let synchronizer = Synchronizer::new(config, collaborators)?;
    Ok(synchronizer.run().await?)
}
