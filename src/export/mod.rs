//! Deduplicated CDX export.
//!
//! The orchestrator runs the pipeline stage by stage and stops at the first
//! failure:
//!
//! 1. allow-list table and normalized view, then a non-empty check
//! 2. index table
//! 3. partition add and metadata verification
//! 4. the ranked-dedup UNLOAD
//! 5. a manifest, returned inside an updated `Config`

pub mod dedup;
pub mod files;
pub mod manifest;
pub mod query;
pub mod record;

pub use dedup::{AllowList, IndexRow};
pub use files::{
    count_export_lines, list_export, preview_export, upload_allow_list, ExportListing,
    UploadedAllowList,
};
pub use manifest::{ExportManifest, EXPORT_TYPE};
pub use query::ExportQuery;
pub use record::ExportRecord;

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::engine::QueryEngine;
use crate::error::{CdxError, Result};
use crate::query::{CompletedQuery, QueryRunner};
use crate::schema::{ExternalTable, PartitionKey, SchemaManager, ViewDefinition, DOMAINS_TABLE};

/// Crawl exported when none is given.
pub const DEFAULT_CRAWL_ID: &str = "CC-MAIN-2025-30";

/// Index subset exported when none is given.
pub const DEFAULT_SUBSET: &str = "warc";

/// Result of a successful export.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    /// Provenance of this export.
    pub manifest: ExportManifest,

    /// The input configuration with `last_export` set to `manifest`.
    pub config: Config,

    /// The finished export query.
    pub query: CompletedQuery,

    /// Normalized allow-list size at export time.
    pub allow_list_size: u64,
}

/// Runs the export pipeline against one engine.
pub struct ExportOrchestrator {
    engine: Arc<dyn QueryEngine>,
    config: Config,
    cancel: CancellationToken,
}

impl ExportOrchestrator {
    /// Creates an orchestrator after validating `config`.
    pub fn new(engine: Arc<dyn QueryEngine>, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            engine,
            config,
            cancel: CancellationToken::new(),
        })
    }

    /// Uses `cancel` to abandon any in-progress wait.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Exports the latest capture per digest of one partition.
    pub async fn run(&self, partition: &PartitionKey) -> Result<ExportOutcome> {
        let started = Instant::now();
        let config = &self.config;
        let output_prefix = config.export_prefix(partition);

        info!("Target crawl: {}", partition);
        info!("Domains CSV prefix: {}", config.domains_prefix());
        info!("Output prefix: {}", output_prefix);

        let runner = QueryRunner::new(
            self.engine.clone(),
            config.poll_settings(),
            config.athena_results_location.clone(),
        )
        .with_cancellation(self.cancel.clone());
        let schema = SchemaManager::new(&runner);

        // 1. allow-list
        let domains_table = ExternalTable::domains_csv(&config.database, &config.domains_prefix());
        let domains_view = ViewDefinition::normalized_domains(&config.database, DOMAINS_TABLE);
        schema.ensure_external_table(&domains_table).await?;
        schema.ensure_normalized_view(&domains_view).await?;

        let allow_list_size = runner.count(&domains_view.count_sql(), "cnt").await?;
        if allow_list_size == 0 {
            return Err(CdxError::empty_input(format!(
                "{} is empty. Upload a CSV with a single 'domain' column under {}",
                domains_view.qualified_name(),
                config.domains_prefix()
            )));
        }
        info!("Allow-list domains: {}", allow_list_size);

        // 2. index table
        let index_table = ExternalTable::cc_index(&config.database);
        schema.ensure_external_table(&index_table).await?;

        // 3. partition
        schema
            .add_and_verify_partition(&index_table, partition)
            .await?;

        // 4. export
        info!("Exporting latest capture per digest (status 200, text/html)");
        let export_sql = ExportQuery {
            index: &index_table,
            domains: &domains_view,
            partition,
            output_prefix: &output_prefix,
        }
        .to_sql();
        let query = runner.execute(&export_sql).await?;

        // 5. manifest
        let manifest = ExportManifest::new(
            partition.crawl_id.clone(),
            output_prefix,
            query.execution.id.clone(),
        );
        info!(
            "Export finished in {:.0}s, results in {}",
            started.elapsed().as_secs_f64(),
            manifest.output_location
        );

        Ok(ExportOutcome {
            config: config.with_last_export(manifest.clone()),
            manifest,
            query,
            allow_list_size,
        })
    }
}
