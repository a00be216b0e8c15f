//! Query submission, completion polling and result reading.
//!
//! This module isolates the asynchronous query lifecycle from the schema and
//! export logic built on top of it.

pub mod executor;
pub mod poller;
pub mod reader;

pub use executor::QueryExecutor;
pub use poller::{
    estimate_cost_usd, CompletedQuery, CompletionPoller, PollSettings, DEFAULT_MAX_WAIT,
    DEFAULT_POLL_INTERVAL,
};
pub use reader::ResultReader;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::engine::{QueryEngine, ResultSet};
use crate::error::{CdxError, Result};

/// Runs statements to completion: submit, wait, and optionally read.
///
/// Every statement shares one scratch output location and one cancellation
/// token, so a caller can abandon a whole pipeline run at once.
#[derive(Clone)]
pub struct QueryRunner {
    executor: QueryExecutor,
    poller: CompletionPoller,
    reader: ResultReader,
    scratch_location: String,
    cancel: CancellationToken,
}

impl QueryRunner {
    /// Creates a runner writing engine scratch output to `scratch_location`.
    pub fn new(
        engine: Arc<dyn QueryEngine>,
        settings: PollSettings,
        scratch_location: impl Into<String>,
    ) -> Self {
        Self {
            executor: QueryExecutor::new(engine.clone()),
            poller: CompletionPoller::new(engine.clone(), settings),
            reader: ResultReader::new(engine),
            scratch_location: scratch_location.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `cancel` to abandon waits.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Submits `sql` and waits for it to succeed.
    pub async fn execute(&self, sql: &str) -> Result<CompletedQuery> {
        let execution = self.executor.submit(sql, &self.scratch_location).await?;
        self.poller.await_completion(execution, &self.cancel).await
    }

    /// Submits `sql`, waits, and reads up to `max_rows` rows.
    pub async fn query(&self, sql: &str, max_rows: usize) -> Result<ResultSet> {
        let completed = self.execute(sql).await?;
        self.reader
            .fetch_results(&completed.execution, max_rows)
            .await
    }

    /// Runs a single-row count query and parses `column` as an integer.
    pub async fn count(&self, sql: &str, column: &str) -> Result<u64> {
        let results = self.query(sql, 1).await?;
        let value = results.first_value(column).ok_or_else(|| {
            CdxError::engine(format!("count query returned no '{column}' value"))
        })?;
        value.trim().parse().map_err(|_| {
            CdxError::engine(format!("count query returned non-numeric '{value}'"))
        })
    }
}
