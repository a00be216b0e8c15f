//! Subcommand handlers.
//!
//! Handlers own all file and console I/O; the library only sees values.

use std::path::Path;
use std::sync::Arc;

use cdx_export::config::Config;
use cdx_export::engine::{AthenaEngine, MockQueryEngine, QueryEngine};
use cdx_export::error::{CdxError, Result};
use cdx_export::export::dedup::parse_allow_list_csv;
use cdx_export::export::{
    count_export_lines, list_export, preview_export, upload_allow_list, ExportOrchestrator,
    ExportManifest, ExportOutcome, IndexRow,
};
use cdx_export::schema::PartitionKey;
use cdx_export::storage::{format_bytes, MemoryBlobStore, S3BlobStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{Cli, Command, ExportArgs};

/// Bucket name used for `--mock-engine` runs without a config file.
const MOCK_BUCKET: &str = "cdx-export-mock";

pub async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    match cli.command {
        Command::Init {
            bucket,
            region,
            force,
        } => init(&config_path, bucket, region, force),
        Command::Upload { path } => upload(&config_path, &path).await,
        Command::Export(args) => export(&config_path, &args).await,
        Command::Results => results(&config_path).await,
        Command::Preview { lines } => preview(&config_path, lines).await,
    }
}

fn init(config_path: &Path, bucket: String, region: String, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        return Err(CdxError::config(format!(
            "{} already exists. Pass --force to overwrite it",
            config_path.display()
        )));
    }

    let config = Config::for_bucket(bucket, region);
    config.validate()?;
    config.save_to_file(config_path)?;

    info!("Wrote {}", config_path.display());
    println!("Domains:        {}", config.domains_location);
    println!("Results:        {}", config.results_location);
    println!("Engine output:  {}", config.athena_results_location);
    Ok(())
}

async fn upload(config_path: &Path, csv_path: &Path) -> Result<()> {
    let config = Config::load_from_file(config_path)?;
    let csv = read_text(csv_path)?;
    let file_name = csv_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("domains.csv");

    let store = S3BlobStore::new(&config.aws_sdk_config().await);
    let uploaded = upload_allow_list(&store, &config, file_name, &csv).await?;

    println!(
        "Uploaded {} ({} domains, {} after normalization)",
        uploaded.location, uploaded.raw_count, uploaded.normalized_count
    );
    Ok(())
}

async fn export(config_path: &Path, args: &ExportArgs) -> Result<()> {
    let partition = args.partition_key()?;
    let cancel = shutdown_token();

    if args.mock_engine {
        return export_mock(config_path, args, &partition, cancel).await;
    }

    let file_config = Config::load_from_file(config_path)?;
    let config = args.apply_overrides(file_config.clone());
    let sdk_config = config.aws_sdk_config().await;
    let engine: Arc<dyn QueryEngine> = Arc::new(AthenaEngine::new(&sdk_config, &config.workgroup));

    let outcome = ExportOrchestrator::new(engine, config)?
        .with_cancellation(cancel)
        .run(&partition)
        .await?;
    print_outcome(&outcome);

    // Command-line overrides are not persisted, only the manifest.
    if let Err(e) = file_config.persist_last_export(config_path, outcome.manifest.clone()) {
        warn!(
            "Export succeeded but {} was not updated: {}",
            config_path.display(),
            e
        );
    }
    Ok(())
}

async fn export_mock(
    config_path: &Path,
    args: &ExportArgs,
    partition: &PartitionKey,
    cancel: CancellationToken,
) -> Result<()> {
    let config = if config_path.exists() {
        Config::load_from_file(config_path)?
    } else {
        Config::for_bucket(MOCK_BUCKET, "us-east-1")
    };
    let config = args.apply_overrides(config);

    let rows = match &args.seed {
        Some(path) => read_index_rows(path)?,
        None => Vec::new(),
    };
    let domains = match &args.domains {
        Some(path) => parse_allow_list_csv(&read_text(path)?),
        None => Vec::new(),
    };
    info!("In-memory engine: {} index rows, {} domains", rows.len(), domains.len());

    let store = Arc::new(MemoryBlobStore::new());
    let engine = Arc::new(
        MockQueryEngine::new()
            .with_domains(domains)
            .with_index_rows(rows)
            .with_store(store.clone()),
    );

    let outcome = ExportOrchestrator::new(engine, config)?
        .with_cancellation(cancel)
        .run(partition)
        .await?;
    print_outcome(&outcome);

    let output = &outcome.manifest.output_location;
    let count = count_export_lines(store.as_ref(), output).await?;
    println!("Records:        {count}");
    if count > 0 {
        for line in preview_export(store.as_ref(), output, 5).await? {
            println!("{line}");
        }
    }
    Ok(())
}

async fn results(config_path: &Path) -> Result<()> {
    let config = Config::load_from_file(config_path)?;
    let manifest = last_export(&config)?;
    let store = S3BlobStore::new(&config.aws_sdk_config().await);

    let listing = list_export(&store, &manifest.output_location).await?;
    println!("Crawl:          {}", manifest.crawl_id);
    println!("Location:       {}", listing.prefix);
    println!("Files:          {}", listing.files.len());
    println!("Total size:     {}", format_bytes(listing.total_size()));
    for file in &listing.files {
        let modified = file
            .last_modified
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        println!(
            "  {:<48} {:>12}  {}",
            file.location.file_name(),
            format_bytes(file.size),
            modified
        );
    }
    Ok(())
}

async fn preview(config_path: &Path, lines: usize) -> Result<()> {
    let config = Config::load_from_file(config_path)?;
    let manifest = last_export(&config)?;
    let store = S3BlobStore::new(&config.aws_sdk_config().await);

    for line in preview_export(&store, &manifest.output_location, lines).await? {
        println!("{line}");
    }
    Ok(())
}

fn last_export(config: &Config) -> Result<&ExportManifest> {
    config.last_export.as_ref().ok_or_else(|| {
        CdxError::invalid_state("No export recorded yet. Run `cdx-export export` first")
    })
}

fn print_outcome(outcome: &ExportOutcome) {
    println!("Execution:      {}", outcome.manifest.execution_id);
    println!("Output:         {}", outcome.manifest.output_location);
    println!("Export type:    {}", outcome.manifest.export_type);
    println!("Domains:        {}", outcome.allow_list_size);
    if let Some(bytes) = outcome.query.execution.data_scanned_bytes {
        println!(
            "Data scanned:   {} (~${:.4})",
            format_bytes(bytes),
            outcome.query.cost_estimate_usd
        );
    }
}

/// Cancels the returned token on Ctrl-C. Remote queries keep running.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, abandoning the wait");
            trigger.cancel();
        }
    });
    token
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| CdxError::config(format!("Failed to read {}: {e}", path.display())))
}

fn read_index_rows(path: &Path) -> Result<Vec<IndexRow>> {
    read_text(path)?
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).map_err(|e| {
                CdxError::config(format!("{}:{}: invalid index row: {e}", path.display(), n + 1))
            })
        })
        .collect()
}
