//! Idempotent schema and partition management.
//!
//! Every operation runs through the `QueryRunner`, so each one is complete
//! before the caller moves on.

mod ddl;

pub use ddl::{
    quote_literal, validate_identifier, ColumnDef, ExternalTable, PartitionKey, StorageFormat,
    ViewDefinition, CC_INDEX_LOCATION, DOMAINS_TABLE, DOMAINS_VIEW, INDEX_TABLE,
};

use tracing::info;

use crate::error::{CdxError, Result};
use crate::query::QueryRunner;

/// Creates tables, views and partitions, and checks partition registration.
pub struct SchemaManager<'a> {
    runner: &'a QueryRunner,
}

impl<'a> SchemaManager<'a> {
    pub fn new(runner: &'a QueryRunner) -> Self {
        Self { runner }
    }

    /// Creates `table` if absent. An existing table is left untouched.
    pub async fn ensure_external_table(&self, table: &ExternalTable) -> Result<()> {
        self.runner.execute(&table.create_sql()).await?;
        info!("Table {} created/verified", table.qualified_name());
        Ok(())
    }

    /// Replaces `view` with its current definition.
    pub async fn ensure_normalized_view(&self, view: &ViewDefinition) -> Result<()> {
        self.runner.execute(&view.create_sql()).await?;
        info!("View {} created/replaced", view.qualified_name());
        Ok(())
    }

    /// Registers one partition of `table` at `location` if absent.
    pub async fn add_partition(
        &self,
        table: &ExternalTable,
        key: &PartitionKey,
        location: &str,
    ) -> Result<()> {
        self.runner
            .execute(&table.add_partition_sql(key, location))
            .await?;
        info!("Partition add executed ({})", key);
        Ok(())
    }

    /// Returns whether the partition metadata table lists `key`.
    pub async fn verify_partition(&self, table: &ExternalTable, key: &PartitionKey) -> Result<bool> {
        let count = self
            .runner
            .count(&table.partition_count_sql(key), "cnt")
            .await?;
        Ok(count > 0)
    }

    /// Adds a partition under the table location and checks it registered.
    ///
    /// A partition that is still missing afterwards is an error; it is not
    /// retried.
    pub async fn add_and_verify_partition(
        &self,
        table: &ExternalTable,
        key: &PartitionKey,
    ) -> Result<()> {
        self.add_partition(table, key, &key.location(&table.location))
            .await?;

        if !self.verify_partition(table, key).await? {
            return Err(CdxError::PartitionMissing {
                crawl_id: key.crawl_id.clone(),
                subset: key.subset.clone(),
            });
        }
        info!("Partition present ({})", key);
        Ok(())
    }
}
