//! Managed query engine abstraction for cdx-export.
//!
//! Provides a trait-based interface over an asynchronous SQL engine, allowing
//! Athena and the in-memory engine to be used interchangeably.

mod athena;
mod mock;
mod types;

pub use athena::AthenaEngine;
pub use mock::MockQueryEngine;
pub use types::{ExecutionStatus, QueryExecution, QueryState, ResultPage, ResultSet};

use crate::error::Result;
use async_trait::async_trait;

/// Trait defining the interface for managed query engines.
///
/// All calls return immediately; only the poller waits on a running query.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Starts a query and returns its execution id.
    ///
    /// `output_location` is where the engine writes its result and spill files.
    async fn start_execution(&self, sql: &str, output_location: &str) -> Result<String>;

    /// Samples the current status of an execution.
    async fn get_execution_status(&self, execution_id: &str) -> Result<ExecutionStatus>;

    /// Returns one page of results, header row included, of at most `page_size` rows.
    async fn get_results(&self, execution_id: &str, page_size: usize) -> Result<ResultPage>;
}
